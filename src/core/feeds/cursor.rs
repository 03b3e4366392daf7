// Feed cursors: durable markers of how far a watcher has progressed.
//
// A cursor is only ever replaced, never edited in place, so the snapshot taken
// at the start of a cycle stays valid until the advanced copy is persisted.

use super::feed_models::FeedItem;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a feed decides whether an item has been seen before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStrategy {
    /// Remember every delivered id, keeping at most `max_retained` of them.
    SeenSet { max_retained: usize },
    /// Remember the highest ordinal delivered so far.
    HighWatermark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FeedCursor {
    SeenSet {
        /// Oldest first, so compaction drops from the front.
        ids: Vec<String>,
    },
    HighWatermark {
        last_seen: Option<u64>,
    },
}

impl FeedCursor {
    pub fn empty(strategy: CursorStrategy) -> Self {
        match strategy {
            CursorStrategy::SeenSet { .. } => FeedCursor::SeenSet { ids: Vec::new() },
            CursorStrategy::HighWatermark => FeedCursor::HighWatermark { last_seen: None },
        }
    }

    pub fn matches_strategy(&self, strategy: CursorStrategy) -> bool {
        matches!(
            (self, strategy),
            (FeedCursor::SeenSet { .. }, CursorStrategy::SeenSet { .. })
                | (FeedCursor::HighWatermark { .. }, CursorStrategy::HighWatermark)
        )
    }

    /// Return the items this cursor has not seen, in their original order.
    ///
    /// Every item is judged against `self` alone, so items in the same batch
    /// never influence each other. An id repeated inside the batch is kept
    /// once, at its first position.
    pub fn filter_new<P>(&self, items: Vec<FeedItem<P>>) -> Vec<FeedItem<P>> {
        let mut batch_ids = HashSet::new();
        let mut fresh = Vec::new();

        match self {
            FeedCursor::SeenSet { ids } => {
                let seen: HashSet<&str> = ids.iter().map(String::as_str).collect();
                for item in items {
                    if seen.contains(item.id.as_str()) || !batch_ids.insert(item.id.clone()) {
                        continue;
                    }
                    fresh.push(item);
                }
            }
            FeedCursor::HighWatermark { last_seen } => {
                for item in items {
                    let Some(ordinal) = item.ordinal else {
                        tracing::warn!(item_id = %item.id, "Item has no ordinal; watermark cursor skips it");
                        continue;
                    };
                    if last_seen.is_some_and(|last| ordinal <= last) {
                        continue;
                    }
                    if batch_ids.insert(item.id.clone()) {
                        fresh.push(item);
                    }
                }
            }
        }

        fresh
    }

    /// Return a cursor that also covers `delivered`.
    pub fn advance<P>(&self, delivered: &[FeedItem<P>]) -> FeedCursor {
        match self {
            FeedCursor::SeenSet { ids } => {
                let mut next = ids.clone();
                let mut known: HashSet<String> = ids.iter().cloned().collect();
                for item in delivered {
                    if known.insert(item.id.clone()) {
                        next.push(item.id.clone());
                    }
                }
                FeedCursor::SeenSet { ids: next }
            }
            FeedCursor::HighWatermark { last_seen } => {
                let newest = delivered.iter().filter_map(|item| item.ordinal).max();
                let last_seen = match (*last_seen, newest) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
                FeedCursor::HighWatermark { last_seen }
            }
        }
    }

    /// Drop the oldest remembered ids beyond the retention limit.
    pub fn compact(self, strategy: CursorStrategy) -> FeedCursor {
        match (self, strategy) {
            (FeedCursor::SeenSet { mut ids }, CursorStrategy::SeenSet { max_retained }) => {
                if ids.len() > max_retained {
                    let excess = ids.len() - max_retained;
                    ids.drain(..excess);
                }
                FeedCursor::SeenSet { ids }
            }
            (cursor, _) => cursor,
        }
    }

    pub fn contains<P>(&self, item: &FeedItem<P>) -> bool {
        match self {
            FeedCursor::SeenSet { ids } => ids.iter().any(|id| id == &item.id),
            FeedCursor::HighWatermark { last_seen } => match (item.ordinal, last_seen) {
                (Some(ordinal), Some(last)) => ordinal <= *last,
                _ => false,
            },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FeedCursor::SeenSet { ids } => ids.len(),
            FeedCursor::HighWatermark { last_seen } => usize::from(last_seen.is_some()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::feeds::feed_models::Category;

    fn item(id: &str) -> FeedItem<()> {
        FeedItem {
            id: id.to_string(),
            ordinal: id.parse().ok(),
            category: Category::News,
            entities: Vec::new(),
            published_at: None,
            payload: (),
        }
    }

    fn ids(items: &[FeedItem<()>]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    fn seen(ids: &[&str]) -> FeedCursor {
        FeedCursor::SeenSet {
            ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn seen_set_filters_and_advances() {
        let cursor = seen(&["k1", "k2"]);
        let fresh = cursor.filter_new(vec![item("k1"), item("k3"), item("k4")]);
        assert_eq!(ids(&fresh), vec!["k3", "k4"]);

        let advanced = cursor.advance(&fresh);
        assert_eq!(advanced, seen(&["k1", "k2", "k3", "k4"]));
    }

    #[test]
    fn watermark_filters_and_advances() {
        let cursor = FeedCursor::HighWatermark {
            last_seen: Some(100),
        };
        let fresh = cursor.filter_new(vec![item("98"), item("101"), item("103")]);
        assert_eq!(ids(&fresh), vec!["101", "103"]);

        let advanced = cursor.advance(&fresh);
        assert_eq!(
            advanced,
            FeedCursor::HighWatermark {
                last_seen: Some(103)
            }
        );
    }

    #[test]
    fn items_in_cursor_are_always_excluded() {
        let set = seen(&["a", "b"]);
        let watermark = FeedCursor::HighWatermark { last_seen: Some(7) };

        for cursor in [set, watermark] {
            let batch = vec![item("a"), item("b"), item("5"), item("7")];
            let fresh = cursor.filter_new(batch.clone());
            for candidate in &batch {
                if cursor.contains(candidate) {
                    assert!(fresh.iter().all(|f| f.id != candidate.id));
                }
            }
        }
    }

    #[test]
    fn replaying_a_delivered_batch_yields_nothing() {
        for cursor in [
            FeedCursor::empty(CursorStrategy::SeenSet { max_retained: 100 }),
            FeedCursor::empty(CursorStrategy::HighWatermark),
        ] {
            let batch = vec![item("10"), item("11"), item("12")];
            let fresh = cursor.filter_new(batch.clone());
            assert_eq!(fresh.len(), 3);

            let advanced = cursor.advance(&fresh);
            assert!(advanced.filter_new(batch).is_empty());
        }
    }

    #[test]
    fn duplicates_within_a_batch_collapse() {
        let cursor = seen(&[]);
        let fresh = cursor.filter_new(vec![item("x"), item("y"), item("x")]);
        assert_eq!(ids(&fresh), vec!["x", "y"]);
    }

    #[test]
    fn watermark_skips_items_without_ordinal() {
        let cursor = FeedCursor::HighWatermark { last_seen: None };
        let fresh = cursor.filter_new(vec![item("abc"), item("4")]);
        assert_eq!(ids(&fresh), vec!["4"]);
    }

    #[test]
    fn compaction_drops_oldest_ids() {
        let strategy = CursorStrategy::SeenSet { max_retained: 2 };
        let cursor = seen(&["a", "b", "c"]).compact(strategy);
        assert_eq!(cursor, seen(&["b", "c"]));
    }

    #[test]
    fn cursor_round_trips_through_json() {
        let cursor = FeedCursor::HighWatermark { last_seen: Some(42) };
        let text = serde_json::to_string(&cursor).unwrap();
        assert!(text.contains("high_watermark"));
        assert_eq!(serde_json::from_str::<FeedCursor>(&text).unwrap(), cursor);
    }
}
