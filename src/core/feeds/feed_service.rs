use super::feed_errors::{ConfigurationError, PersistenceError};
use super::feed_models::{FeedKind, Subscription};
use super::watcher::{FeedStore, WatcherHandle, WatcherState};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors surfaced to the command layer.
#[derive(Debug, Error)]
pub enum FeedServiceError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("the {0} feed is not running")]
    FeedNotRunning(FeedKind),
}

/// Entry point for everything outside the watchers: subscription management,
/// manual polls and shutdown.
///
/// Subscriptions always go through the store first. The affected watcher is
/// then told to rebuild its index, so the change shows up on its next cycle.
pub struct FeedService {
    store: Arc<dyn FeedStore>,
    watchers: RwLock<BTreeMap<FeedKind, WatcherHandle>>,
}

impl FeedService {
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self {
            store,
            watchers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Take ownership of a started watcher. A previous handle for the same
    /// feed is stopped first.
    pub async fn register(&self, handle: WatcherHandle) {
        let previous = self.watchers.write().await.insert(handle.kind(), handle);
        if let Some(previous) = previous {
            tracing::warn!(feed = %previous.kind(), "Replacing an already registered feed watcher");
            previous.stop().await;
        }
    }

    /// Returns false when the exact subscription already existed.
    pub async fn subscribe(&self, subscription: Subscription) -> Result<bool, FeedServiceError> {
        subscription.validate()?;

        let added = self.store.add_subscription(&subscription).await?;
        if added {
            self.refresh(subscription.feed).await;
            tracing::info!(
                feed = %subscription.feed,
                guild_id = subscription.destination.guild_id,
                channel_id = subscription.destination.channel_id,
                scope = %subscription.scope,
                "Feed subscription added"
            );
        }
        Ok(added)
    }

    /// Returns false when there was no such subscription.
    pub async fn unsubscribe(&self, subscription: Subscription) -> Result<bool, FeedServiceError> {
        let removed = self.store.remove_subscription(&subscription).await?;
        if removed {
            self.refresh(subscription.feed).await;
            tracing::info!(
                feed = %subscription.feed,
                guild_id = subscription.destination.guild_id,
                channel_id = subscription.destination.channel_id,
                scope = %subscription.scope,
                "Feed subscription removed"
            );
        }
        Ok(removed)
    }

    /// Every subscription in a guild, grouped by feed then channel.
    pub async fn list_subscriptions(&self, guild_id: u64) -> Result<Vec<Subscription>, FeedServiceError> {
        let mut subscriptions = self.store.guild_subscriptions(guild_id).await?;
        subscriptions.sort_by_key(|s| (s.feed, s.destination.channel_id, s.scope.to_string()));
        Ok(subscriptions)
    }

    /// Queue an immediate poll of `feed`.
    pub async fn poll_now(&self, feed: FeedKind) -> Result<(), FeedServiceError> {
        let watchers = self.watchers.read().await;
        match watchers.get(&feed) {
            Some(handle) if handle.poll_now() => Ok(()),
            _ => Err(FeedServiceError::FeedNotRunning(feed)),
        }
    }

    pub async fn status(&self) -> Vec<(FeedKind, WatcherState)> {
        let watchers = self.watchers.read().await;
        FeedKind::ALL
            .iter()
            .map(|feed| {
                let state = watchers
                    .get(feed)
                    .map(WatcherHandle::state)
                    .unwrap_or(WatcherState::Stopped);
                (*feed, state)
            })
            .collect()
    }

    /// Stop every watcher and wait for them to wind down.
    pub async fn shutdown(&self) {
        let watchers = std::mem::take(&mut *self.watchers.write().await);
        futures::future::join_all(watchers.values().map(WatcherHandle::stop)).await;
        tracing::info!(count = watchers.len(), "All feed watchers stopped");
    }

    async fn refresh(&self, feed: FeedKind) {
        if let Some(handle) = self.watchers.read().await.get(&feed) {
            if !handle.refresh_subscriptions() {
                tracing::warn!(feed = %feed, "Feed watcher is gone; subscription change not applied");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::feeds::cursor::CursorStrategy;
    use crate::core::feeds::feed_models::{Category, Destination, EntityKind, EntityRef, SubscriptionScope};
    use crate::core::feeds::testing::{MemoryStore, RecordingGateway, StaticSource};
    use crate::core::feeds::watcher::{FeedConfig, FeedSource, FeedWatcher};
    use std::time::Duration;

    fn news(channel_id: u64, scope: SubscriptionScope) -> Subscription {
        Subscription {
            destination: Destination::new(7, channel_id),
            feed: FeedKind::News,
            scope,
        }
    }

    async fn running_news_watcher(store: Arc<MemoryStore>) -> (Arc<FeedWatcher<()>>, WatcherHandle) {
        let gateway = Arc::new(RecordingGateway::default());
        gateway.set_ready(false);
        let watcher = Arc::new(FeedWatcher::new(
            FeedConfig {
                kind: FeedKind::News,
                poll_interval: Duration::from_millis(20),
                strategy: CursorStrategy::SeenSet { max_retained: 10 },
                deliver_backlog: false,
            },
            vec![Arc::new(StaticSource::new("news")) as Arc<dyn FeedSource<()>>],
            store,
            gateway,
        ));
        let handle = watcher.clone().start().unwrap();
        handle.wait_for(WatcherState::Running).await;
        (watcher, handle)
    }

    #[tokio::test]
    async fn subscribe_reaches_the_running_watcher() {
        let store = Arc::new(MemoryStore::default());
        let service = FeedService::new(store.clone());
        let (watcher, handle) = running_news_watcher(store).await;
        service.register(handle).await;

        assert!(service.subscribe(news(70, SubscriptionScope::All)).await.unwrap());
        tokio::time::timeout(Duration::from_secs(2), async {
            while watcher.index().await.len() != 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(service.unsubscribe(news(70, SubscriptionScope::All)).await.unwrap());
        tokio::time::timeout(Duration::from_secs(2), async {
            while !watcher.index().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        service.shutdown().await;
        assert_eq!(watcher.state(), WatcherState::Stopped);
    }

    #[tokio::test]
    async fn duplicate_and_missing_subscriptions_report_false() {
        let service = FeedService::new(Arc::new(MemoryStore::default()));
        let sub = news(70, SubscriptionScope::Category(Category::DevBlog));

        assert!(service.subscribe(sub).await.unwrap());
        assert!(!service.subscribe(sub).await.unwrap());
        assert!(service.unsubscribe(sub).await.unwrap());
        assert!(!service.unsubscribe(sub).await.unwrap());
    }

    #[tokio::test]
    async fn invalid_subscriptions_never_reach_the_store() {
        let store = Arc::new(MemoryStore::default());
        let service = FeedService::new(store.clone());

        let wrong_category = news(70, SubscriptionScope::Category(Category::Kill));
        assert!(matches!(
            service.subscribe(wrong_category).await,
            Err(FeedServiceError::Configuration(ConfigurationError::CategoryNotInFeed { .. }))
        ));

        let bad_entity = Subscription {
            destination: Destination::new(7, 70),
            feed: FeedKind::Kills,
            scope: SubscriptionScope::Entity {
                category: Category::Kill,
                entity: EntityRef::new(EntityKind::Alliance, 5),
            },
        };
        assert!(service.subscribe(bad_entity).await.is_err());
        assert!(service.list_subscriptions(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_is_scoped_to_the_guild() {
        let service = FeedService::new(Arc::new(MemoryStore::default()));
        service.subscribe(news(71, SubscriptionScope::All)).await.unwrap();
        service.subscribe(news(70, SubscriptionScope::All)).await.unwrap();
        service
            .subscribe(Subscription {
                destination: Destination::new(8, 80),
                feed: FeedKind::News,
                scope: SubscriptionScope::All,
            })
            .await
            .unwrap();

        let listed = service.list_subscriptions(7).await.unwrap();
        let channels: Vec<u64> = listed.iter().map(|s| s.destination.channel_id).collect();
        assert_eq!(channels, vec![70, 71]);
    }

    #[tokio::test]
    async fn poll_now_needs_a_registered_watcher() {
        let store = Arc::new(MemoryStore::default());
        let service = FeedService::new(store.clone());
        assert!(matches!(
            service.poll_now(FeedKind::Kills).await,
            Err(FeedServiceError::FeedNotRunning(FeedKind::Kills))
        ));

        let (_watcher, handle) = running_news_watcher(store).await;
        service.register(handle).await;
        assert!(service.poll_now(FeedKind::News).await.is_ok());

        let status = service.status().await;
        assert!(status.contains(&(FeedKind::News, WatcherState::Running)));
        assert!(status.contains(&(FeedKind::Kills, WatcherState::Stopped)));
        service.shutdown().await;
    }
}
