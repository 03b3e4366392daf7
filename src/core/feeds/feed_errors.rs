use super::feed_models::{Category, EntityKind, FeedKind};
use thiserror::Error;

/// A feed could not be read this cycle. The source counts as empty.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },
    #[error("network error talking to {endpoint}: {message}")]
    Network { endpoint: String, message: String },
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("malformed response from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },
}

/// A single destination could not receive an item.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("chat gateway is not ready")]
    NotReady,
    #[error("channel {channel_id} is unreachable")]
    Unreachable { channel_id: u64 },
    #[error("missing permission to post in channel {channel_id}")]
    Forbidden { channel_id: u64 },
    #[error("rate limited while posting to channel {channel_id}")]
    RateLimited { channel_id: u64 },
    #[error("failed to send to channel {channel_id}: {message}")]
    Send { channel_id: u64, message: String },
}

/// The cursor or subscription store is unavailable.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage error: {0}")]
    Store(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("the {0} watcher is already running")]
    AlreadyRunning(FeedKind),
}

/// A subscription that can never match anything.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("unknown feed `{0}`")]
    UnknownFeed(String),
    #[error("unknown category `{0}`")]
    UnknownCategory(String),
    #[error("unknown entity type `{0}`")]
    UnknownEntityKind(String),
    #[error("unknown subscription scope `{0}`")]
    UnknownScope(String),
    #[error("category `{category}` is not part of the {feed} feed")]
    CategoryNotInFeed { category: Category, feed: FeedKind },
    #[error("{category} items never reference a {kind}")]
    EntityScopeUnsupported { category: Category, kind: EntityKind },
    #[error("`{id}` is not a valid {kind} id")]
    InvalidEntityId { kind: EntityKind, id: u64 },
    #[error("subscription points at channel {channel_id}, which does not exist")]
    DanglingDestination { channel_id: u64 },
}
