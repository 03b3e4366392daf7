// Feed engine - generic poll, route and deliver loop shared by every feed

pub mod cursor;
pub mod entity_names;
pub mod fanout;
pub mod feed_errors;
pub mod feed_models;
mod feed_service;
pub mod subscription_index;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use cursor::{CursorStrategy, FeedCursor};
pub use entity_names::{EntityNameResolver, NamedEntity};
pub use feed_errors::{ConfigurationError, DeliveryError, FetchError, LifecycleError, PersistenceError};
pub use feed_models::{
    Category, DeliveryOutcome, DeliveryReport, Destination, EntityKind, EntityRef, FeedItem,
    FeedKind, Subscription, SubscriptionScope,
};
pub use feed_service::{FeedService, FeedServiceError};
pub use subscription_index::SubscriptionIndex;
pub use watcher::{
    CycleSummary, FeedConfig, FeedGateway, FeedSource, FeedStore, FeedWatcher, WatcherHandle,
    WatcherState,
};
