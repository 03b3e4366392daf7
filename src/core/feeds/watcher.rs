// Generic feed watcher.
//
// One watcher runs per feed. It owns the cursor snapshot and the subscription
// index for that feed and drives the poll -> filter -> match -> deliver ->
// persist cycle on a fixed timer. Everything feed specific (where items come
// from, how they are rendered) is injected through the ports below, so the
// whole lifecycle can be exercised in tests without Discord or HTTP.

use super::cursor::{CursorStrategy, FeedCursor};
use super::fanout;
use super::feed_errors::{DeliveryError, FetchError, LifecycleError, PersistenceError};
use super::feed_models::{Destination, FeedItem, FeedKind, Subscription};
use super::subscription_index::SubscriptionIndex;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

// ============================================================================
// PORTS
// ============================================================================

/// One external endpoint that produces feed items.
#[async_trait]
pub trait FeedSource<P>: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch and normalize the current contents, oldest first.
    async fn fetch(&self) -> Result<Vec<FeedItem<P>>, FetchError>;
}

/// Durable cursor and subscription storage.
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn load_cursor(&self, feed: FeedKind) -> Result<Option<FeedCursor>, PersistenceError>;
    async fn save_cursor(&self, feed: FeedKind, cursor: &FeedCursor) -> Result<(), PersistenceError>;

    async fn list_subscriptions(&self, feed: FeedKind) -> Result<Vec<Subscription>, PersistenceError>;
    async fn guild_subscriptions(&self, guild_id: u64) -> Result<Vec<Subscription>, PersistenceError>;
    /// Returns false when the subscription already existed.
    async fn add_subscription(&self, subscription: &Subscription) -> Result<bool, PersistenceError>;
    /// Returns false when there was nothing to remove.
    async fn remove_subscription(&self, subscription: &Subscription) -> Result<bool, PersistenceError>;
}

/// The chat side: readiness plus one send per destination.
#[async_trait]
pub trait FeedGateway<P>: Send + Sync {
    fn is_ready(&self) -> bool;
    async fn send(&self, destination: &Destination, item: &FeedItem<P>) -> Result<(), DeliveryError>;
}

// ============================================================================
// CONFIG AND STATE
// ============================================================================

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub kind: FeedKind,
    pub poll_interval: Duration,
    pub strategy: CursorStrategy,
    /// Post whatever the feed holds on the very first poll instead of
    /// recording it as already seen.
    pub deliver_backlog: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// What one poll cycle did. Only used for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub fetched: usize,
    pub fresh: usize,
    pub unrouted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub deferred: bool,
    pub baselined: bool,
}

#[derive(Debug, Clone, Copy)]
enum Control {
    PollNow,
    RefreshSubscriptions,
}

enum Wake {
    Poll,
    Refresh,
    Stop,
}

// ============================================================================
// WATCHER
// ============================================================================

pub struct FeedWatcher<P> {
    config: FeedConfig,
    sources: Vec<Arc<dyn FeedSource<P>>>,
    store: Arc<dyn FeedStore>,
    gateway: Arc<dyn FeedGateway<P>>,
    index: RwLock<Arc<SubscriptionIndex>>,
    // None until a baseline exists.
    cursor: Mutex<Option<FeedCursor>>,
    state: watch::Sender<WatcherState>,
}

impl<P> FeedWatcher<P>
where
    P: Send + Sync + 'static,
{
    pub fn new(
        config: FeedConfig,
        sources: Vec<Arc<dyn FeedSource<P>>>,
        store: Arc<dyn FeedStore>,
        gateway: Arc<dyn FeedGateway<P>>,
    ) -> Self {
        let (state, _) = watch::channel(WatcherState::Stopped);
        let index = RwLock::new(Arc::new(SubscriptionIndex::empty(config.kind)));

        Self {
            config,
            sources,
            store,
            gateway,
            index,
            cursor: Mutex::new(None),
            state,
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.config.kind
    }

    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    fn set_state(&self, state: WatcherState) {
        self.state.send_replace(state);
        tracing::debug!(feed = %self.config.kind, ?state, "Feed watcher state changed");
    }

    /// Current routing snapshot. Callers keep a consistent view even if a
    /// rebuild is published while they use it.
    pub async fn index(&self) -> Arc<SubscriptionIndex> {
        self.index.read().await.clone()
    }

    pub async fn cursor(&self) -> Option<FeedCursor> {
        self.cursor.lock().await.clone()
    }

    /// Load the persisted cursor. One written under another strategy is
    /// discarded so the next poll records a fresh baseline.
    pub async fn load_cursor(&self) -> Result<(), PersistenceError> {
        let stored = self.store.load_cursor(self.config.kind).await?;
        let cursor = match stored {
            Some(cursor) if cursor.matches_strategy(self.config.strategy) => Some(cursor),
            Some(_) => {
                tracing::warn!(
                    feed = %self.config.kind,
                    "Stored cursor uses a different strategy; a new baseline will be recorded"
                );
                None
            }
            None => None,
        };

        *self.cursor.lock().await = cursor;
        Ok(())
    }

    /// Rebuild the subscription index from the store and publish it.
    pub async fn rebuild_index(&self) -> Result<usize, PersistenceError> {
        let subscriptions = self.store.list_subscriptions(self.config.kind).await?;
        let index = Arc::new(SubscriptionIndex::build(self.config.kind, &subscriptions));
        let count = index.len();
        tracing::debug!(
            feed = %index.feed(),
            subscriptions = count,
            skipped = index.skipped(),
            "Subscription index rebuilt"
        );

        *self.index.write().await = index;
        Ok(count)
    }

    /// Fetch every source concurrently. A failing source contributes nothing.
    pub async fn poll(&self) -> Vec<FeedItem<P>> {
        let fetches = self
            .sources
            .iter()
            .map(|source| async move { (source.name(), source.fetch().await) });

        let mut items = Vec::new();
        for (name, result) in join_all(fetches).await {
            match result {
                Ok(mut fetched) => items.append(&mut fetched),
                Err(err) => tracing::warn!(
                    feed = %self.config.kind,
                    source = name,
                    error = %err,
                    "Feed fetch failed"
                ),
            }
        }

        // Each source is already chronological; merge them stably, undated last.
        if self.sources.len() > 1 {
            items.sort_by_key(|item| (item.published_at.is_none(), item.published_at));
        }
        items
    }

    /// Run one full cycle. The cursor is written only after new items have
    /// been offered to their destinations, and only moves past the items that
    /// went out before the gateway dropped, if it did.
    pub async fn run_cycle(&self) -> Result<CycleSummary, PersistenceError> {
        let kind = self.config.kind;
        let strategy = self.config.strategy;
        let mut summary = CycleSummary::default();

        if !self.gateway.is_ready() {
            tracing::debug!(feed = %kind, "Chat gateway not ready; deferring poll");
            summary.deferred = true;
            return Ok(summary);
        }

        let items = self.poll().await;
        summary.fetched = items.len();

        let snapshot = self.cursor.lock().await.clone();
        let cursor = match snapshot {
            Some(cursor) => cursor,
            None if !self.config.deliver_backlog => {
                // First run: store a baseline so we don't flood channels with history.
                if items.is_empty() {
                    return Ok(summary);
                }
                let baseline = FeedCursor::empty(strategy).advance(&items).compact(strategy);
                self.store.save_cursor(kind, &baseline).await?;
                tracing::info!(feed = %kind, items = items.len(), "Recorded feed baseline");
                *self.cursor.lock().await = Some(baseline);
                summary.baselined = true;
                return Ok(summary);
            }
            None => FeedCursor::empty(strategy),
        };

        let fresh = cursor.filter_new(items);
        summary.fresh = fresh.len();
        if fresh.is_empty() {
            return Ok(summary);
        }

        let index = self.index().await;
        let mut handled = 0;
        for item in &fresh {
            let destinations = index.match_item(item);
            if destinations.is_empty() {
                summary.unrouted += 1;
                handled += 1;
                continue;
            }

            let report = fanout::deliver(self.gateway.as_ref(), item, &destinations).await;
            if report.interrupted() {
                // This item and the rest of the batch go out again next cycle.
                tracing::warn!(
                    feed = %kind,
                    item = %item.id,
                    remaining = fresh.len() - handled,
                    "Chat gateway dropped mid-cycle; deferring the rest of the batch"
                );
                summary.deferred = true;
                break;
            }
            summary.delivered += report.delivered();
            summary.failed += report.failed();
            handled += 1;
        }

        if handled == 0 {
            return Ok(summary);
        }

        let advanced = cursor.advance(&fresh[..handled]).compact(strategy);
        self.store.save_cursor(kind, &advanced).await?;
        *self.cursor.lock().await = Some(advanced);

        Ok(summary)
    }

    /// Spawn the watcher loop. Fails if this watcher is already running.
    pub fn start(self: Arc<Self>) -> Result<WatcherHandle, LifecycleError> {
        let started = self.state.send_if_modified(|state| {
            if *state == WatcherState::Stopped {
                *state = WatcherState::Starting;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(LifecycleError::AlreadyRunning(self.config.kind));
        }

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let kind = self.config.kind;
        let state = self.state.subscribe();
        let task = tokio::spawn(self.run(control_rx, stop_rx));

        Ok(WatcherHandle {
            kind,
            control: control_tx,
            stop: stop_tx,
            state,
            task: Mutex::new(Some(task)),
        })
    }

    async fn run(
        self: Arc<Self>,
        mut control: mpsc::UnboundedReceiver<Control>,
        mut stop: watch::Receiver<bool>,
    ) {
        let kind = self.config.kind;

        loop {
            match self.prepare().await {
                Ok(subscriptions) => {
                    tracing::info!(feed = %kind, subscriptions, "Feed watcher running");
                    break;
                }
                Err(err) => {
                    tracing::error!(feed = %kind, error = %err, "Failed to load feed state; retrying");
                    tokio::select! {
                        _ = stop.changed() => {
                            self.set_state(WatcherState::Stopping);
                            self.set_state(WatcherState::Stopped);
                            return;
                        }
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }
        self.set_state(WatcherState::Running);

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let wake = tokio::select! {
                biased;
                _ = stop.changed() => Wake::Stop,
                message = control.recv() => match message {
                    Some(Control::PollNow) => Wake::Poll,
                    Some(Control::RefreshSubscriptions) => Wake::Refresh,
                    None => Wake::Stop,
                },
                _ = ticker.tick() => Wake::Poll,
            };

            match wake {
                Wake::Stop => {
                    self.set_state(WatcherState::Stopping);
                    break;
                }
                Wake::Refresh => {
                    if let Err(err) = self.rebuild_index().await {
                        tracing::error!(feed = %kind, error = %err, "Failed to rebuild subscription index");
                    }
                }
                Wake::Poll => {
                    // Pinned out here so the cycle is still alive while the
                    // stop arm runs; it is dropped when this block ends.
                    let cycle = self.run_cycle();
                    tokio::pin!(cycle);

                    tokio::select! {
                        biased;
                        _ = stop.changed() => {
                            self.set_state(WatcherState::Stopping);
                            tracing::info!(feed = %kind, "Abandoning in-flight poll; cursor left unchanged");
                            break;
                        }
                        result = &mut cycle => self.log_cycle(result),
                    }
                }
            }
        }

        self.set_state(WatcherState::Stopped);
        tracing::info!(feed = %kind, "Feed watcher stopped");
    }

    async fn prepare(&self) -> Result<usize, PersistenceError> {
        self.load_cursor().await?;
        self.rebuild_index().await
    }

    fn log_cycle(&self, result: Result<CycleSummary, PersistenceError>) {
        let kind = self.config.kind;
        match result {
            Ok(summary) if summary.delivered > 0 || summary.failed > 0 => tracing::info!(
                feed = %kind,
                fresh = summary.fresh,
                delivered = summary.delivered,
                failed = summary.failed,
                unrouted = summary.unrouted,
                deferred = summary.deferred,
                "Delivered feed items"
            ),
            Ok(summary) => tracing::debug!(
                feed = %kind,
                fetched = summary.fetched,
                fresh = summary.fresh,
                deferred = summary.deferred,
                baselined = summary.baselined,
                "Feed poll finished"
            ),
            Err(err) => tracing::error!(
                feed = %kind,
                error = %err,
                "Feed cycle aborted before the cursor was saved"
            ),
        }
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// Control surface for a running watcher.
pub struct WatcherHandle {
    kind: FeedKind,
    control: mpsc::UnboundedSender<Control>,
    stop: watch::Sender<bool>,
    state: watch::Receiver<WatcherState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WatcherHandle {
    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    /// Queue an immediate poll. It runs after any cycle already in flight.
    pub fn poll_now(&self) -> bool {
        self.control.send(Control::PollNow).is_ok()
    }

    /// Ask the watcher to rebuild its index from the store.
    pub fn refresh_subscriptions(&self) -> bool {
        self.control.send(Control::RefreshSubscriptions).is_ok()
    }

    pub async fn wait_for(&self, target: WatcherState) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|current| *current == target).await;
    }

    /// Stop the watcher and wait for its task to finish. A cycle in flight is
    /// abandoned without touching the cursor.
    pub async fn stop(&self) {
        self.stop.send_replace(true);

        if let Some(task) = self.task.lock().await.take() {
            if let Err(err) = task.await {
                tracing::error!(feed = %self.kind, error = %err, "Feed watcher task failed");
            }
        }
    }
}
