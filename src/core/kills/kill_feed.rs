// Kill feed - killmails from zKillboard, routed by everyone involved and by location.

use crate::core::feeds::{Category, EntityKind, EntityRef, FeedItem, FetchError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One side of a fight. The victim reports damage taken, attackers damage done.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Combatant {
    pub character_id: Option<u64>,
    pub corporation_id: Option<u64>,
    pub alliance_id: Option<u64>,
    pub ship_type_id: Option<u64>,
    pub damage: u64,
    pub final_blow: bool,
}

/// zKillboard's own annotations on a killmail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZkbMeta {
    pub total_value: f64,
    pub url: String,
    pub npc: bool,
    pub solo: bool,
}

/// Where a solar system sits in the map hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemLocation {
    pub system_id: u64,
    pub system_name: Option<String>,
    pub constellation_id: u64,
    pub region_id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Killmail {
    pub killmail_id: u64,
    pub killmail_time: Option<DateTime<Utc>>,
    pub solar_system_id: u64,
    pub victim: Combatant,
    pub attackers: Vec<Combatant>,
    pub zkb: ZkbMeta,
    /// Filled in when the system could be resolved.
    pub location: Option<SystemLocation>,
}

impl Killmail {
    pub fn final_blow(&self) -> Option<&Combatant> {
        self.attackers.iter().find(|attacker| attacker.final_blow)
    }

    pub fn link(&self) -> String {
        if self.zkb.url.is_empty() {
            format!("https://zkillboard.com/kill/{}/", self.killmail_id)
        } else {
            self.zkb.url.clone()
        }
    }
}

/// Resolves a solar system to its constellation and region.
#[async_trait]
pub trait LocationResolver: Send + Sync {
    async fn resolve(&self, system_id: u64) -> Result<SystemLocation, FetchError>;
}

/// Every entity a kill subscription can match on, without duplicates.
///
/// Faction and weapon ids are not part of a combatant, so they never show up.
pub fn kill_entities(killmail: &Killmail) -> Vec<EntityRef> {
    let mut entities = Vec::new();
    let mut push = |kind: EntityKind, id: Option<u64>| {
        if let Some(id) = id {
            let entity = EntityRef::new(kind, id);
            if !entities.contains(&entity) {
                entities.push(entity);
            }
        }
    };

    for combatant in std::iter::once(&killmail.victim).chain(&killmail.attackers) {
        push(EntityKind::Character, combatant.character_id);
        push(EntityKind::Corporation, combatant.corporation_id);
        push(EntityKind::Alliance, combatant.alliance_id);
        push(EntityKind::ShipType, combatant.ship_type_id);
    }

    push(EntityKind::System, Some(killmail.solar_system_id));
    if let Some(location) = &killmail.location {
        push(EntityKind::Constellation, Some(location.constellation_id));
        push(EntityKind::Region, Some(location.region_id));
    }

    entities
}

pub fn kill_item(killmail: Killmail) -> FeedItem<Killmail> {
    FeedItem {
        id: killmail.killmail_id.to_string(),
        ordinal: Some(killmail.killmail_id),
        category: Category::Kill,
        entities: kill_entities(&killmail),
        published_at: killmail.killmail_time,
        payload: killmail,
    }
}
