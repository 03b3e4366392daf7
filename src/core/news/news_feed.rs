// News feed - articles from the EVE Online news, dev blog and patch notes feeds.

use crate::core::feeds::{Category, FeedItem};
use chrono::{DateTime, Utc};

/// Embed descriptions are cut down to this many characters.
pub const SUMMARY_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub author: Option<String>,
    pub category: Category,
    pub published_at: Option<DateTime<Utc>>,
}

/// Shorten an article body for an embed.
///
/// Long bodies are truncated and their markdown is flattened, since a cut can
/// leave emphasis markers unbalanced and headings don't render in embeds.
pub fn summarize(description: &str) -> String {
    if description.chars().count() <= SUMMARY_LIMIT {
        return description.to_string();
    }

    let truncated: String = description.chars().take(SUMMARY_LIMIT).collect();
    let mut summary = truncated
        .replace("__*", "***")
        .replace("*__", "***")
        .replace("__", "**")
        .replace("###", "")
        .replace("##", "");
    summary.push_str("...");
    summary
}

pub fn article_item(article: Article) -> FeedItem<Article> {
    FeedItem {
        id: article.id.clone(),
        ordinal: None,
        category: article.category,
        entities: Vec::new(),
        published_at: article.published_at,
        payload: article,
    }
}
