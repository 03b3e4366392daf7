// In-memory ports shared by the feed engine tests.

use super::cursor::FeedCursor;
use super::feed_errors::{DeliveryError, FetchError, PersistenceError};
use super::feed_models::{Category, Destination, FeedItem, FeedKind, Subscription};
use super::watcher::{FeedGateway, FeedSource, FeedStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn news_item(id: &str) -> FeedItem<()> {
    FeedItem {
        id: id.to_string(),
        ordinal: None,
        category: Category::News,
        entities: Vec::new(),
        published_at: None,
        payload: (),
    }
}

/// A news item published `minutes` after a fixed epoch.
pub fn dated_item(id: &str, minutes: i64) -> FeedItem<()> {
    FeedItem {
        published_at: DateTime::<Utc>::from_timestamp(1_700_000_000 + minutes * 60, 0),
        ..news_item(id)
    }
}

// ============================================================================
// SOURCE
// ============================================================================

pub struct StaticSource {
    name: String,
    items: Mutex<Vec<FeedItem<()>>>,
    failing: AtomicBool,
    fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, items: Vec<FeedItem<()>>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource<()> for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<FeedItem<()>>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Status {
                endpoint: self.name.clone(),
                status: 503,
            });
        }
        Ok(self.items.lock().unwrap().clone())
    }
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    cursors: Mutex<HashMap<FeedKind, FeedCursor>>,
    subscriptions: Mutex<Vec<Subscription>>,
    failing_saves: AtomicBool,
    failing_loads: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn set_cursor(&self, feed: FeedKind, cursor: FeedCursor) {
        self.cursors.lock().unwrap().insert(feed, cursor);
    }

    pub fn cursor(&self, feed: FeedKind) -> Option<FeedCursor> {
        self.cursors.lock().unwrap().get(&feed).cloned()
    }

    pub fn insert_subscription(&self, subscription: Subscription) {
        self.subscriptions.lock().unwrap().push(subscription);
    }

    pub fn fail_saves(&self, failing: bool) {
        self.failing_saves.store(failing, Ordering::SeqCst);
    }

    pub fn fail_loads(&self, failing: bool) {
        self.failing_loads.store(failing, Ordering::SeqCst);
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check_loads(&self) -> Result<(), PersistenceError> {
        if self.failing_loads.load(Ordering::SeqCst) {
            return Err(PersistenceError::Store("database is locked".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn load_cursor(&self, feed: FeedKind) -> Result<Option<FeedCursor>, PersistenceError> {
        self.check_loads()?;
        Ok(self.cursor(feed))
    }

    async fn save_cursor(&self, feed: FeedKind, cursor: &FeedCursor) -> Result<(), PersistenceError> {
        if self.failing_saves.load(Ordering::SeqCst) {
            return Err(PersistenceError::Store("disk I/O error".to_string()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.set_cursor(feed, cursor.clone());
        Ok(())
    }

    async fn list_subscriptions(&self, feed: FeedKind) -> Result<Vec<Subscription>, PersistenceError> {
        self.check_loads()?;
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.feed == feed)
            .copied()
            .collect())
    }

    async fn guild_subscriptions(&self, guild_id: u64) -> Result<Vec<Subscription>, PersistenceError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.destination.guild_id == guild_id)
            .copied()
            .collect())
    }

    async fn add_subscription(&self, subscription: &Subscription) -> Result<bool, PersistenceError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        if subscriptions.contains(subscription) {
            return Ok(false);
        }
        subscriptions.push(*subscription);
        Ok(true)
    }

    async fn remove_subscription(&self, subscription: &Subscription) -> Result<bool, PersistenceError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let before = subscriptions.len();
        subscriptions.retain(|s| s != subscription);
        Ok(subscriptions.len() != before)
    }
}

// ============================================================================
// GATEWAY
// ============================================================================

pub struct RecordingGateway {
    ready: AtomicBool,
    hanging: AtomicBool,
    broken_channels: Mutex<Vec<u64>>,
    sent: Mutex<Vec<(Destination, String)>>,
    attempts: AtomicUsize,
    disconnect_at: Mutex<Option<usize>>,
}

impl Default for RecordingGateway {
    fn default() -> Self {
        Self {
            ready: AtomicBool::new(true),
            hanging: AtomicBool::new(false),
            broken_channels: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            disconnect_at: Mutex::new(None),
        }
    }
}

impl RecordingGateway {
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Every send blocks forever once set.
    pub fn hang(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    /// Stay ready for `sends` more sends, then drop the connection: that
    /// send and every later one fails with `NotReady`. `None` reconnects.
    pub fn disconnect_after(&self, sends: Option<usize>) {
        *self.disconnect_at.lock().unwrap() = sends.map(|n| self.attempts() + n);
        if sends.is_none() {
            self.set_ready(true);
        }
    }

    pub fn fail_channel(&self, channel_id: u64) {
        self.broken_channels.lock().unwrap().push(channel_id);
    }

    pub fn sent(&self) -> Vec<(Destination, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedGateway<()> for RecordingGateway {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn send(&self, destination: &Destination, item: &FeedItem<()>) -> Result<(), DeliveryError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if matches!(*self.disconnect_at.lock().unwrap(), Some(at) if attempt >= at) {
            self.set_ready(false);
            return Err(DeliveryError::NotReady);
        }
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.broken_channels.lock().unwrap().contains(&destination.channel_id) {
            return Err(DeliveryError::Forbidden {
                channel_id: destination.channel_id,
            });
        }
        self.sent.lock().unwrap().push((*destination, item.id.clone()));
        Ok(())
    }
}
