use crate::core::feeds::{FeedItem, FeedSource, FetchError};
use crate::core::wormholes::{connection_item, wormhole_type, WormholeConnection};
use crate::infra::feeds::JsonHttpClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

pub const DEFAULT_EVE_SCOUT_URL: &str = "https://www.eve-scout.com/api/wormholes";

/// EVE-Scout's public wormhole list, reduced to connections out of Thera.
pub struct EveScoutSource {
    http: Arc<JsonHttpClient>,
    url: String,
}

impl EveScoutSource {
    pub fn new(http: Arc<JsonHttpClient>, url: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl FeedSource<WormholeConnection> for EveScoutSource {
    fn name(&self) -> &str {
        "eve-scout"
    }

    async fn fetch(&self) -> Result<Vec<FeedItem<WormholeConnection>>, FetchError> {
        let holes: Vec<ApiWormhole> = self.http.get_json(&self.url).await?;
        Ok(map_wormholes(holes))
    }
}

fn map_wormholes(holes: Vec<ApiWormhole>) -> Vec<FeedItem<WormholeConnection>> {
    let mut connections: Vec<WormholeConnection> = holes
        .into_iter()
        .map(map_wormhole)
        .filter(WormholeConnection::from_thera)
        .collect();

    // Connection ids grow over time, so ascending id is oldest first.
    connections.sort_by_key(|c| c.id);
    connections.into_iter().map(connection_item).collect()
}

fn map_wormhole(api: ApiWormhole) -> WormholeConnection {
    let destination = api.destination_solar_system;

    WormholeConnection {
        id: api.id,
        source_system: api.source_solar_system.name.unwrap_or_default(),
        destination_system_id: destination.id,
        destination_system: destination.name.unwrap_or_else(|| destination.id.to_string()),
        constellation_id: destination.constellation_id,
        region_id: destination.region_id,
        region_name: destination
            .region
            .and_then(|r| r.name)
            .unwrap_or_else(|| "Unknown".to_string()),
        wormhole_type: wormhole_type(
            &api.destination_wormhole_type.name,
            &api.source_wormhole_type.name,
        ),
        signature_in: api.wormhole_destination_signature_id.unwrap_or_default(),
        signature_out: api.signature_id.unwrap_or_default(),
        created_at: api
            .created_at
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiWormhole {
    id: u64,
    signature_id: Option<String>,
    wormhole_destination_signature_id: Option<String>,
    source_solar_system: ApiSourceSystem,
    destination_solar_system: ApiDestinationSystem,
    #[serde(default)]
    destination_wormhole_type: ApiWormholeType,
    #[serde(default)]
    source_wormhole_type: ApiWormholeType,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiSourceSystem {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiDestinationSystem {
    id: u64,
    name: Option<String>,
    #[serde(rename = "constellationID")]
    constellation_id: u64,
    #[serde(rename = "regionId")]
    region_id: u64,
    region: Option<ApiRegion>,
}

#[derive(Debug, Deserialize)]
struct ApiRegion {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiWormholeType {
    #[serde(default)]
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::feeds::http_client::parse_json;

    const RESPONSE: &str = r#"[
        {
            "id": 40120,
            "signatureId": "OUT-222",
            "wormholeDestinationSignatureId": "IN-222",
            "sourceSolarSystem": { "id": 31000005, "name": "Thera" },
            "destinationSolarSystem": {
                "id": 30002187, "name": "Amarr",
                "constellationID": 20000322, "regionId": 10000043,
                "region": { "id": 10000043, "name": "Domain" }
            },
            "destinationWormholeType": { "name": "K162" },
            "sourceWormholeType": { "name": "Q063" },
            "createdAt": "2024-05-01T10:00:00Z"
        },
        {
            "id": 40112,
            "signatureId": "OUT-111",
            "wormholeDestinationSignatureId": "IN-111",
            "sourceSolarSystem": { "id": 31000005, "name": "Thera" },
            "destinationSolarSystem": {
                "id": 30000142, "name": "Jita",
                "constellationID": 20000020, "regionId": 10000002,
                "region": { "id": 10000002, "name": "The Forge" }
            },
            "destinationWormholeType": { "name": "V898" },
            "sourceWormholeType": { "name": "K162" }
        },
        {
            "id": 40130,
            "signatureId": "OUT-333",
            "sourceSolarSystem": { "id": 31000005, "name": "Turnur" },
            "destinationSolarSystem": {
                "id": 30002187, "constellationID": 20000322, "regionId": 10000043
            }
        }
    ]"#;

    #[test]
    fn keeps_thera_connections_in_id_order() {
        let holes: Vec<ApiWormhole> = parse_json("eve-scout", RESPONSE).unwrap();
        let items = map_wormholes(holes);

        let ids: Vec<u64> = items.iter().filter_map(|i| i.ordinal).collect();
        assert_eq!(ids, vec![40_112, 40_120]);

        let amarr = &items[1].payload;
        assert_eq!(amarr.wormhole_type, "Q063");
        assert_eq!(amarr.signature_in, "IN-222");
        assert_eq!(amarr.signature_out, "OUT-222");
        assert_eq!(amarr.region_name, "Domain");
        assert!(amarr.created_at.is_some());

        let jita = &items[0].payload;
        assert_eq!(jita.wormhole_type, "V898");
        assert!(jita.created_at.is_none());
    }
}
