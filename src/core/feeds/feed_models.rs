// Domain models shared by every feed watcher.
//
// Nothing in here knows about Discord or HTTP. Channels are plain u64 ids and
// feed payloads are generic so each feed can carry its own data through the
// engine untouched.

use super::feed_errors::{ConfigurationError, DeliveryError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// FEEDS AND CATEGORIES
// ============================================================================

/// One external feed. Each kind gets exactly one watcher and one cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Kills,
    News,
    Wormholes,
}

impl FeedKind {
    pub const ALL: [FeedKind; 3] = [FeedKind::Kills, FeedKind::News, FeedKind::Wormholes];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Kills => "kills",
            FeedKind::News => "news",
            FeedKind::Wormholes => "wormholes",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kills" | "kill" | "killfeed" => Ok(FeedKind::Kills),
            "news" => Ok(FeedKind::News),
            "wormholes" | "wormhole" | "thera" => Ok(FeedKind::Wormholes),
            other => Err(ConfigurationError::UnknownFeed(other.to_string())),
        }
    }

    /// Categories whose items flow through this feed.
    pub fn categories(&self) -> &'static [Category] {
        match self {
            FeedKind::Kills => &[Category::Kill],
            FeedKind::News => &[Category::News, Category::DevBlog, Category::PatchNotes],
            FeedKind::Wormholes => &[Category::Wormhole],
        }
    }

    /// Category used when a subscription names an entity without a category.
    /// News articles do not reference entities, so there is none.
    pub fn entity_category(&self) -> Option<Category> {
        match self {
            FeedKind::Kills => Some(Category::Kill),
            FeedKind::Wormholes => Some(Category::Wormhole),
            FeedKind::News => None,
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Kill,
    News,
    DevBlog,
    PatchNotes,
    Wormhole,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Kill => "kill",
            Category::News => "news",
            Category::DevBlog => "devblogs",
            Category::PatchNotes => "patchnotes",
            Category::Wormhole => "wormhole",
        }
    }

    /// Accepts the spellings admins have always typed for news categories.
    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kill" | "kills" => Ok(Category::Kill),
            "news" => Ok(Category::News),
            "devblogs" | "devblog" | "dev blogs" | "dev-blogs" | "dev_blogs" => {
                Ok(Category::DevBlog)
            }
            "patchnotes" | "patch notes" | "patch_notes" | "patch-notes" => {
                Ok(Category::PatchNotes)
            }
            "wormhole" | "wormholes" | "thera" => Ok(Category::Wormhole),
            other => Err(ConfigurationError::UnknownCategory(other.to_string())),
        }
    }

    pub fn feed(&self) -> FeedKind {
        match self {
            Category::Kill => FeedKind::Kills,
            Category::News | Category::DevBlog | Category::PatchNotes => FeedKind::News,
            Category::Wormhole => FeedKind::Wormholes,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Kill => "Kill",
            Category::News => "News",
            Category::DevBlog => "Dev Blog",
            Category::PatchNotes => "Patch Notes",
            Category::Wormhole => "Wormhole",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    System,
    Constellation,
    Region,
    Character,
    Corporation,
    Alliance,
    ShipType,
}

// EVE id ranges (inclusive).
const REGION_IDS: (u64, u64) = (10_000_000, 13_000_000);
const CONSTELLATION_IDS: (u64, u64) = (20_000_000, 23_000_000);
const SYSTEM_IDS: (u64, u64) = (30_000_000, 33_000_000);
const CHARACTER_IDS: (u64, u64) = (90_000_000, 98_000_000);
const CORPORATION_IDS: (u64, u64) = (98_000_000, 99_000_000);
const ALLIANCE_IDS: (u64, u64) = (99_000_000, 2_100_000_000);
const ALT_CHAR_CORP_IDS: (u64, u64) = (100_000_000, 2_100_000_000);
const ALT_CHAR_IDS: (u64, u64) = (2_100_000_000, 2_147_483_647);
const SHIP_TYPE_IDS: (u64, u64) = (1, 100_000);

fn within(range: (u64, u64), id: u64) -> bool {
    range.0 <= id && id <= range.1
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::System => "system",
            EntityKind::Constellation => "constellation",
            EntityKind::Region => "region",
            EntityKind::Character => "character",
            EntityKind::Corporation => "corporation",
            EntityKind::Alliance => "alliance",
            EntityKind::ShipType => "ship",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "system" | "systems" => Ok(EntityKind::System),
            "constellation" | "constellations" => Ok(EntityKind::Constellation),
            "region" | "regions" => Ok(EntityKind::Region),
            "character" | "characters" => Ok(EntityKind::Character),
            "corporation" | "corporations" | "corp" => Ok(EntityKind::Corporation),
            "alliance" | "alliances" => Ok(EntityKind::Alliance),
            "ship" | "ships" | "ship_type" => Ok(EntityKind::ShipType),
            other => Err(ConfigurationError::UnknownEntityKind(other.to_string())),
        }
    }

    /// Whether `id` can belong to an entity of this kind.
    pub fn accepts_id(&self, id: u64) -> bool {
        match self {
            EntityKind::Region => within(REGION_IDS, id),
            EntityKind::Constellation => within(CONSTELLATION_IDS, id),
            EntityKind::System => within(SYSTEM_IDS, id),
            EntityKind::Corporation => {
                within(CORPORATION_IDS, id) || within(ALT_CHAR_CORP_IDS, id)
            }
            EntityKind::Alliance => within(ALLIANCE_IDS, id) || within(ALT_CHAR_CORP_IDS, id),
            EntityKind::Character => {
                within(CHARACTER_IDS, id)
                    || within(ALT_CHAR_CORP_IDS, id)
                    || within(ALT_CHAR_IDS, id)
            }
            EntityKind::ShipType => within(SHIP_TYPE_IDS, id),
        }
    }

    /// Entity kinds that items of `category` can reference.
    pub fn for_category(category: Category) -> &'static [EntityKind] {
        match category {
            Category::Kill => &[
                EntityKind::System,
                EntityKind::Constellation,
                EntityKind::Region,
                EntityKind::Character,
                EntityKind::Corporation,
                EntityKind::Alliance,
                EntityKind::ShipType,
            ],
            Category::Wormhole => &[
                EntityKind::System,
                EntityKind::Constellation,
                EntityKind::Region,
            ],
            Category::News | Category::DevBlog | Category::PatchNotes => &[],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: u64,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: u64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

// ============================================================================
// ITEMS
// ============================================================================

/// One normalized unit of feed content. Built fresh every poll cycle.
#[derive(Debug, Clone)]
pub struct FeedItem<P> {
    /// Stable identifier used by set cursors.
    pub id: String,
    /// Monotonic position used by watermark cursors.
    pub ordinal: Option<u64>,
    pub category: Category,
    pub entities: Vec<EntityRef>,
    pub published_at: Option<DateTime<Utc>>,
    pub payload: P,
}

// ============================================================================
// SUBSCRIPTIONS
// ============================================================================

/// A channel messages can be delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Destination {
    pub guild_id: u64,
    pub channel_id: u64,
}

impl Destination {
    pub fn new(guild_id: u64, channel_id: u64) -> Self {
        Self {
            guild_id,
            channel_id,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<#{}>", self.channel_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionScope {
    All,
    Category(Category),
    Entity { category: Category, entity: EntityRef },
}

impl SubscriptionScope {
    /// Build a scope from the loose pieces a command receives.
    ///
    /// An entity without a category uses the feed's entity category. Region 0
    /// has always meant "every region", which is the same as subscribing to
    /// the whole feed.
    pub fn from_parts(
        feed: FeedKind,
        category: Option<Category>,
        entity: Option<EntityRef>,
    ) -> Result<Self, ConfigurationError> {
        match (category, entity) {
            (_, Some(EntityRef {
                kind: EntityKind::Region,
                id: 0,
            })) => Ok(SubscriptionScope::All),
            (category, Some(entity)) => {
                let category = category
                    .or_else(|| feed.entity_category())
                    .ok_or(ConfigurationError::EntityScopeUnsupported {
                        category: feed.categories()[0],
                        kind: entity.kind,
                    })?;
                Ok(SubscriptionScope::Entity { category, entity })
            }
            (Some(category), None) => Ok(SubscriptionScope::Category(category)),
            (None, None) => Ok(SubscriptionScope::All),
        }
    }
}

impl fmt::Display for SubscriptionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionScope::All => f.write_str("everything"),
            SubscriptionScope::Category(category) => write!(f, "category `{category}`"),
            SubscriptionScope::Entity { entity, .. } => write!(f, "{} `{}`", entity.kind, entity.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub destination: Destination,
    pub feed: FeedKind,
    pub scope: SubscriptionScope,
}

impl Subscription {
    /// Check that the subscription can ever match something on its feed.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.destination.channel_id == 0 || self.destination.guild_id == 0 {
            return Err(ConfigurationError::DanglingDestination {
                channel_id: self.destination.channel_id,
            });
        }

        let check_category = |category: Category| {
            if category.feed() == self.feed {
                Ok(())
            } else {
                Err(ConfigurationError::CategoryNotInFeed {
                    category,
                    feed: self.feed,
                })
            }
        };

        match self.scope {
            SubscriptionScope::All => Ok(()),
            SubscriptionScope::Category(category) => check_category(category),
            SubscriptionScope::Entity { category, entity } => {
                check_category(category)?;
                if !EntityKind::for_category(category).contains(&entity.kind) {
                    return Err(ConfigurationError::EntityScopeUnsupported {
                        category,
                        kind: entity.kind,
                    });
                }
                if !entity.kind.accepts_id(entity.id) {
                    return Err(ConfigurationError::InvalidEntityId {
                        kind: entity.kind,
                        id: entity.id,
                    });
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// DELIVERY
// ============================================================================

#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(DeliveryError),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// What happened to one item at each destination.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub item_id: String,
    pub outcomes: BTreeMap<Destination, DeliveryOutcome>,
}

impl DeliveryReport {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            outcomes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, destination: Destination, outcome: DeliveryOutcome) {
        self.outcomes.insert(destination, outcome);
    }

    pub fn delivered(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }

    pub fn outcome(&self, destination: &Destination) -> Option<&DeliveryOutcome> {
        self.outcomes.get(destination)
    }

    /// The gateway went away while this item was going out, so at least one
    /// destination never had a chance to receive it.
    pub fn interrupted(&self) -> bool {
        self.outcomes
            .values()
            .any(|o| matches!(o, DeliveryOutcome::Failed(DeliveryError::NotReady)))
    }
}
