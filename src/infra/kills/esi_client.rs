use crate::core::feeds::{EntityKind, EntityNameResolver, EntityRef, FetchError, NamedEntity};
use crate::core::kills::{LocationResolver, SystemLocation};
use crate::infra::feeds::JsonHttpClient;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;

pub const DEFAULT_ESI_BASE_URL: &str = "https://esi.evetech.net/latest";

/// Resolves systems through ESI. The map never changes at runtime, so every
/// answer is cached for the life of the process.
pub struct EsiLocationResolver {
    http: Arc<JsonHttpClient>,
    base_url: String,
    cache: DashMap<u64, SystemLocation>,
}

impl EsiLocationResolver {
    pub fn new(http: Arc<JsonHttpClient>, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: DashMap::new(),
        }
    }
}

#[async_trait]
impl LocationResolver for EsiLocationResolver {
    async fn resolve(&self, system_id: u64) -> Result<SystemLocation, FetchError> {
        if let Some(found) = self.cache.get(&system_id) {
            return Ok(found.clone());
        }

        let system: ApiSystem = self
            .http
            .get_json(&format!("{}/universe/systems/{}/", self.base_url, system_id))
            .await?;
        let constellation: ApiConstellation = self
            .http
            .get_json(&format!(
                "{}/universe/constellations/{}/",
                self.base_url, system.constellation_id
            ))
            .await?;

        let location = map_location(system_id, system, constellation);
        self.cache.insert(system_id, location.clone());
        Ok(location)
    }
}

fn map_location(system_id: u64, system: ApiSystem, constellation: ApiConstellation) -> SystemLocation {
    SystemLocation {
        system_id,
        system_name: system.name,
        constellation_id: system.constellation_id,
        region_id: constellation.region_id,
    }
}

/// Looks names up through ESI's bulk `/universe/ids/` endpoint. Matches are
/// exact (ESI ignores case), so typos come back as "not found".
pub struct EsiNameResolver {
    http: Arc<JsonHttpClient>,
    base_url: String,
}

impl EsiNameResolver {
    pub fn new(http: Arc<JsonHttpClient>, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl EntityNameResolver for EsiNameResolver {
    async fn resolve_name(&self, kind: EntityKind, name: &str) -> Result<Option<NamedEntity>, FetchError> {
        let name = name.trim();
        if kind == EntityKind::Region && name.eq_ignore_ascii_case("all regions") {
            return Ok(Some(NamedEntity {
                entity: EntityRef::new(EntityKind::Region, 0),
                name: "All Regions".to_string(),
            }));
        }

        let ids: ApiUniverseIds = self
            .http
            .post_json(&format!("{}/universe/ids/", self.base_url), &[name])
            .await?;
        Ok(ids.first(kind))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiUniverseIds {
    #[serde(default)]
    alliances: Vec<ApiNamedId>,
    #[serde(default)]
    characters: Vec<ApiNamedId>,
    #[serde(default)]
    constellations: Vec<ApiNamedId>,
    #[serde(default)]
    corporations: Vec<ApiNamedId>,
    #[serde(default)]
    inventory_types: Vec<ApiNamedId>,
    #[serde(default)]
    regions: Vec<ApiNamedId>,
    #[serde(default)]
    systems: Vec<ApiNamedId>,
}

#[derive(Debug, Deserialize)]
struct ApiNamedId {
    id: u64,
    name: String,
}

impl ApiUniverseIds {
    fn first(self, kind: EntityKind) -> Option<NamedEntity> {
        let matches = match kind {
            EntityKind::System => self.systems,
            EntityKind::Constellation => self.constellations,
            EntityKind::Region => self.regions,
            EntityKind::Character => self.characters,
            EntityKind::Corporation => self.corporations,
            EntityKind::Alliance => self.alliances,
            EntityKind::ShipType => self.inventory_types,
        };

        matches.into_iter().next().map(|found| NamedEntity {
            entity: EntityRef::new(kind, found.id),
            name: found.name,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiSystem {
    constellation_id: u64,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiConstellation {
    region_id: u64,
}
