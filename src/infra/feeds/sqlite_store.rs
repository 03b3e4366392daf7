use crate::core::feeds::{
    Category, ConfigurationError, Destination, EntityKind, EntityRef, FeedCursor, FeedKind,
    FeedStore, PersistenceError, Subscription, SubscriptionScope,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

fn storage_error(err: sqlx::Error) -> PersistenceError {
    PersistenceError::Store(err.to_string())
}

/// Cursors and subscriptions for every feed, in one SQLite database.
pub struct SqliteFeedStore {
    pool: Pool<Sqlite>,
}

impl SqliteFeedStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure the file exists if it's a file path
        let path_str = database_url.trim_start_matches("sqlite://");
        if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&conn_str)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_cursors (
                feed TEXT PRIMARY KEY,
                cursor TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Unused scope columns hold '' / 0 so the UNIQUE constraint sees them.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_subscriptions (
                guild_id INTEGER NOT NULL,
                channel_id INTEGER NOT NULL,
                feed TEXT NOT NULL,
                scope TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                entity_kind TEXT NOT NULL DEFAULT '',
                entity_id INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                UNIQUE (guild_id, channel_id, feed, scope, category, entity_kind, entity_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_feed_subscriptions_feed ON feed_subscriptions (feed)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_subscriptions(
        &self,
        query: &str,
        bind: SubscriptionFilter<'_>,
    ) -> Result<Vec<Subscription>, PersistenceError> {
        let query = sqlx::query(query);
        let query = match bind {
            SubscriptionFilter::Feed(feed) => query.bind(feed),
            SubscriptionFilter::Guild(guild_id) => query.bind(guild_id as i64),
        };
        let rows = query.fetch_all(&self.pool).await.map_err(storage_error)?;

        let mut subscriptions = Vec::with_capacity(rows.len());
        for row in rows {
            match subscription_from_row(&row) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(err) => tracing::warn!(error = %err, "Skipping unreadable subscription row"),
            }
        }
        Ok(subscriptions)
    }
}

enum SubscriptionFilter<'a> {
    Feed(&'a str),
    Guild(u64),
}

/// Column values for a scope: (scope, category, entity_kind, entity_id).
fn scope_columns(scope: &SubscriptionScope) -> (&'static str, &'static str, &'static str, i64) {
    match scope {
        SubscriptionScope::All => ("all", "", "", 0),
        SubscriptionScope::Category(category) => ("category", category.as_str(), "", 0),
        SubscriptionScope::Entity { category, entity } => (
            "entity",
            category.as_str(),
            entity.kind.as_str(),
            entity.id as i64,
        ),
    }
}

fn subscription_from_row(row: &SqliteRow) -> Result<Subscription, ConfigurationError> {
    let guild_id = row.get::<i64, _>("guild_id") as u64;
    let channel_id = row.get::<i64, _>("channel_id") as u64;
    let feed = FeedKind::parse(&row.get::<String, _>("feed"))?;
    let category = row.get::<String, _>("category");

    let scope = match row.get::<String, _>("scope").as_str() {
        "all" => SubscriptionScope::All,
        "category" => SubscriptionScope::Category(Category::parse(&category)?),
        "entity" => SubscriptionScope::Entity {
            category: Category::parse(&category)?,
            entity: EntityRef::new(
                EntityKind::parse(&row.get::<String, _>("entity_kind"))?,
                row.get::<i64, _>("entity_id") as u64,
            ),
        },
        other => return Err(ConfigurationError::UnknownScope(other.to_string())),
    };

    Ok(Subscription {
        destination: Destination::new(guild_id, channel_id),
        feed,
        scope,
    })
}

#[async_trait]
impl FeedStore for SqliteFeedStore {
    async fn load_cursor(&self, feed: FeedKind) -> Result<Option<FeedCursor>, PersistenceError> {
        let row = sqlx::query("SELECT cursor FROM feed_cursors WHERE feed = ?")
            .bind(feed.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        match row {
            Some(row) => {
                let text: String = row.get("cursor");
                Ok(Some(serde_json::from_str(&text)?))
            }
            None => Ok(None),
        }
    }

    async fn save_cursor(&self, feed: FeedKind, cursor: &FeedCursor) -> Result<(), PersistenceError> {
        let text = serde_json::to_string(cursor)?;

        sqlx::query(
            r#"
            INSERT INTO feed_cursors (feed, cursor, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(feed) DO UPDATE SET
                cursor = excluded.cursor,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(feed.as_str())
        .bind(text)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn list_subscriptions(&self, feed: FeedKind) -> Result<Vec<Subscription>, PersistenceError> {
        self.fetch_subscriptions(
            "SELECT * FROM feed_subscriptions WHERE feed = ? ORDER BY rowid",
            SubscriptionFilter::Feed(feed.as_str()),
        )
        .await
    }

    async fn guild_subscriptions(&self, guild_id: u64) -> Result<Vec<Subscription>, PersistenceError> {
        self.fetch_subscriptions(
            "SELECT * FROM feed_subscriptions WHERE guild_id = ? ORDER BY rowid",
            SubscriptionFilter::Guild(guild_id),
        )
        .await
    }

    async fn add_subscription(&self, subscription: &Subscription) -> Result<bool, PersistenceError> {
        let (scope, category, entity_kind, entity_id) = scope_columns(&subscription.scope);

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO feed_subscriptions
                (guild_id, channel_id, feed, scope, category, entity_kind, entity_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(subscription.destination.guild_id as i64)
        .bind(subscription.destination.channel_id as i64)
        .bind(subscription.feed.as_str())
        .bind(scope)
        .bind(category)
        .bind(entity_kind)
        .bind(entity_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_subscription(&self, subscription: &Subscription) -> Result<bool, PersistenceError> {
        let (scope, category, entity_kind, entity_id) = scope_columns(&subscription.scope);

        let result = sqlx::query(
            r#"
            DELETE FROM feed_subscriptions
            WHERE guild_id = ? AND channel_id = ? AND feed = ?
              AND scope = ? AND category = ? AND entity_kind = ? AND entity_id = ?
            "#,
        )
        .bind(subscription.destination.guild_id as i64)
        .bind(subscription.destination.channel_id as i64)
        .bind(subscription.feed.as_str())
        .bind(scope)
        .bind(category)
        .bind(entity_kind)
        .bind(entity_id)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }
}
