// Wormhole feed - new connections out of Thera, as reported by EVE-Scout.

use crate::core::feeds::{Category, EntityKind, EntityRef, FeedItem};
use chrono::{DateTime, Utc};

pub const THERA: &str = "Thera";

/// The exit side of a K162 says nothing about the hole, so the entry side is used.
const K162: &str = "K162";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WormholeConnection {
    pub id: u64,
    pub source_system: String,
    pub destination_system_id: u64,
    pub destination_system: String,
    pub constellation_id: u64,
    pub region_id: u64,
    pub region_name: String,
    pub wormhole_type: String,
    /// Signature in Thera.
    pub signature_in: String,
    /// Signature on the far side.
    pub signature_out: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl WormholeConnection {
    pub fn from_thera(&self) -> bool {
        self.source_system.eq_ignore_ascii_case(THERA)
    }
}

pub fn wormhole_type(destination_type: &str, source_type: &str) -> String {
    if destination_type == K162 {
        source_type.to_string()
    } else {
        destination_type.to_string()
    }
}

pub fn connection_item(connection: WormholeConnection) -> FeedItem<WormholeConnection> {
    let entities = vec![
        EntityRef::new(EntityKind::System, connection.destination_system_id),
        EntityRef::new(EntityKind::Constellation, connection.constellation_id),
        EntityRef::new(EntityKind::Region, connection.region_id),
    ];

    FeedItem {
        id: connection.id.to_string(),
        ordinal: Some(connection.id),
        category: Category::Wormhole,
        entities,
        published_at: connection.created_at,
        payload: connection,
    }
}
