use crate::core::feeds::{Category, FeedItem, FeedSource, FetchError};
use crate::core::news::{article_item, Article};
use crate::infra::feeds::JsonHttpClient;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

pub const NEWS_URL: &str = "https://www.eveonline.com/rss/json/news";
pub const DEV_BLOGS_URL: &str = "https://www.eveonline.com/rss/json/dev-blogs";
pub const PATCH_NOTES_URL: &str = "https://www.eveonline.com/rss/json/patch-notes";

/// One of the EVE Online JSON feeds. The endpoint decides the category.
pub struct EveNewsSource {
    http: Arc<JsonHttpClient>,
    url: String,
    category: Category,
    name: String,
}

impl EveNewsSource {
    pub fn new(http: Arc<JsonHttpClient>, url: &str, category: Category) -> Self {
        Self {
            http,
            url: url.to_string(),
            category,
            name: format!("eve-{}", category.as_str()),
        }
    }

    /// The three feeds the bot follows.
    pub fn all(http: Arc<JsonHttpClient>) -> Vec<Self> {
        vec![
            Self::new(http.clone(), NEWS_URL, Category::News),
            Self::new(http.clone(), DEV_BLOGS_URL, Category::DevBlog),
            Self::new(http, PATCH_NOTES_URL, Category::PatchNotes),
        ]
    }
}

#[async_trait]
impl FeedSource<Article> for EveNewsSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<FeedItem<Article>>, FetchError> {
        let articles: Vec<ApiArticle> = self.http.get_json(&self.url).await?;
        Ok(map_articles(articles, self.category))
    }
}

/// The feeds list newest first; the engine wants oldest first.
fn map_articles(articles: Vec<ApiArticle>, category: Category) -> Vec<FeedItem<Article>> {
    let mut items: Vec<FeedItem<Article>> = articles
        .into_iter()
        .filter_map(|api| {
            let id = api.id?;
            Some(article_item(Article {
                id,
                title: api.title.unwrap_or_else(|| "Untitled article".to_string()),
                link: api.link.unwrap_or_default(),
                description: api.description.unwrap_or_default(),
                author: api.author.filter(|a| !a.trim().is_empty()),
                category,
                published_at: parse_publishing_date(api.publishing_date.as_deref()),
            }))
        })
        .collect();

    items.reverse();
    items.sort_by_key(|item| item.published_at);
    items
}

fn parse_publishing_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiArticle {
    id: Option<String>,
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    author: Option<String>,
    publishing_date: Option<String>,
}
