use super::feed_models::{Category, Destination, EntityRef, FeedItem, FeedKind, Subscription, SubscriptionScope};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RouteKey {
    All,
    Category(Category),
    Entity(Category, EntityRef),
}

impl From<SubscriptionScope> for RouteKey {
    fn from(scope: SubscriptionScope) -> Self {
        match scope {
            SubscriptionScope::All => RouteKey::All,
            SubscriptionScope::Category(category) => RouteKey::Category(category),
            SubscriptionScope::Entity { category, entity } => RouteKey::Entity(category, entity),
        }
    }
}

/// Read-only routing table for one feed, derived from its subscriptions.
///
/// Built in one go from the persisted subscription set and swapped in whole.
/// There is no way to edit an existing index.
#[derive(Debug, Clone)]
pub struct SubscriptionIndex {
    feed: FeedKind,
    routes: HashMap<RouteKey, BTreeSet<Destination>>,
    subscriptions: usize,
    skipped: usize,
}

impl SubscriptionIndex {
    pub fn empty(feed: FeedKind) -> Self {
        Self {
            feed,
            routes: HashMap::new(),
            subscriptions: 0,
            skipped: 0,
        }
    }

    /// Build the index for `feed`. Subscriptions for other feeds are ignored,
    /// malformed ones are logged and left out.
    pub fn build(feed: FeedKind, subscriptions: &[Subscription]) -> Self {
        let mut index = Self::empty(feed);

        for subscription in subscriptions.iter().filter(|s| s.feed == feed) {
            if let Err(err) = subscription.validate() {
                tracing::warn!(
                    feed = %feed,
                    guild_id = subscription.destination.guild_id,
                    channel_id = subscription.destination.channel_id,
                    error = %err,
                    "Skipping malformed subscription"
                );
                index.skipped += 1;
                continue;
            }

            index
                .routes
                .entry(RouteKey::from(subscription.scope))
                .or_default()
                .insert(subscription.destination);
            index.subscriptions += 1;
        }

        index
    }

    pub fn feed(&self) -> FeedKind {
        self.feed
    }

    /// Destinations interested in `item`: entity matches for every referenced
    /// entity, plus the item's category, plus everything-subscribers.
    pub fn match_item<P>(&self, item: &FeedItem<P>) -> BTreeSet<Destination> {
        let mut destinations = BTreeSet::new();

        let keys = item
            .entities
            .iter()
            .map(|entity| RouteKey::Entity(item.category, *entity))
            .chain([RouteKey::Category(item.category), RouteKey::All]);

        for key in keys {
            if let Some(found) = self.routes.get(&key) {
                destinations.extend(found.iter().copied());
            }
        }

        destinations
    }

    /// Number of subscriptions that made it into the index.
    pub fn len(&self) -> usize {
        self.subscriptions
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions == 0
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::feeds::feed_models::EntityKind;

    const A: Destination = Destination {
        guild_id: 1,
        channel_id: 11,
    };
    const B: Destination = Destination {
        guild_id: 2,
        channel_id: 22,
    };
    const C: Destination = Destination {
        guild_id: 3,
        channel_id: 33,
    };

    fn sub(destination: Destination, feed: FeedKind, scope: SubscriptionScope) -> Subscription {
        Subscription {
            destination,
            feed,
            scope,
        }
    }

    fn item(category: Category, entities: Vec<EntityRef>) -> FeedItem<()> {
        FeedItem {
            id: "item".to_string(),
            ordinal: None,
            category,
            entities,
            published_at: None,
            payload: (),
        }
    }

    #[test]
    fn all_and_category_subscribers() {
        let index = SubscriptionIndex::build(
            FeedKind::News,
            &[
                sub(A, FeedKind::News, SubscriptionScope::All),
                sub(B, FeedKind::News, SubscriptionScope::Category(Category::News)),
            ],
        );

        let news = index.match_item(&item(Category::News, vec![]));
        assert_eq!(news, BTreeSet::from([A, B]));

        let patch = index.match_item(&item(Category::PatchNotes, vec![]));
        assert_eq!(patch, BTreeSet::from([A]));
    }

    #[test]
    fn union_of_entity_category_and_all_without_duplicates() {
        let e1 = EntityRef::new(EntityKind::Alliance, 99_000_001);
        let e2 = EntityRef::new(EntityKind::Corporation, 98_000_002);
        let entity = |entity| SubscriptionScope::Entity {
            category: Category::Kill,
            entity,
        };

        let index = SubscriptionIndex::build(
            FeedKind::Kills,
            &[
                sub(A, FeedKind::Kills, entity(e1)),
                sub(A, FeedKind::Kills, entity(e2)),
                sub(A, FeedKind::Kills, SubscriptionScope::All),
                sub(B, FeedKind::Kills, entity(e2)),
                sub(C, FeedKind::Kills, SubscriptionScope::Category(Category::Kill)),
            ],
        );

        let matched = index.match_item(&item(Category::Kill, vec![e1, e2]));
        assert_eq!(matched, BTreeSet::from([A, B, C]));
        assert_eq!(matched.len(), 3);
    }

    #[test]
    fn destinations_without_matching_subscriptions_get_nothing() {
        let watched = EntityRef::new(EntityKind::System, 30_000_142);
        let other = EntityRef::new(EntityKind::System, 30_002_187);
        let index = SubscriptionIndex::build(
            FeedKind::Wormholes,
            &[sub(
                A,
                FeedKind::Wormholes,
                SubscriptionScope::Entity {
                    category: Category::Wormhole,
                    entity: watched,
                },
            )],
        );

        assert!(index.match_item(&item(Category::Wormhole, vec![other])).is_empty());
        assert_eq!(
            index.match_item(&item(Category::Wormhole, vec![watched])),
            BTreeSet::from([A])
        );
    }

    #[test]
    fn other_feeds_and_malformed_subscriptions_are_left_out() {
        let index = SubscriptionIndex::build(
            FeedKind::News,
            &[
                sub(A, FeedKind::Kills, SubscriptionScope::All),
                sub(B, FeedKind::News, SubscriptionScope::Category(Category::Kill)),
                sub(Destination::new(3, 0), FeedKind::News, SubscriptionScope::All),
                sub(C, FeedKind::News, SubscriptionScope::All),
            ],
        );

        assert_eq!(index.feed(), FeedKind::News);
        assert_eq!(index.len(), 1);
        assert_eq!(index.skipped(), 2);
        assert_eq!(
            index.match_item(&item(Category::News, vec![])),
            BTreeSet::from([C])
        );
    }

    #[test]
    fn index_is_a_pure_function_of_its_input() {
        let subscriptions = [
            sub(A, FeedKind::News, SubscriptionScope::All),
            sub(B, FeedKind::News, SubscriptionScope::Category(Category::DevBlog)),
        ];
        let first = SubscriptionIndex::build(FeedKind::News, &subscriptions);
        let second = SubscriptionIndex::build(FeedKind::News, &subscriptions);
        let sample = item(Category::DevBlog, vec![]);
        assert_eq!(first.match_item(&sample), second.match_item(&sample));
    }
}
