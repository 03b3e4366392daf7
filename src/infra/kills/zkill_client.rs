use crate::core::feeds::{FeedItem, FeedSource, FetchError};
use crate::core::kills::{kill_item, Combatant, Killmail, LocationResolver, ZkbMeta};
use crate::infra::feeds::JsonHttpClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub const DEFAULT_REDISQ_URL: &str = "https://zkillredisq.stream/listen.php";

/// zKillboard's RedisQ queue. Each request hands out at most one killmail,
/// so a poll drains the queue until it comes back empty or the cap is hit.
pub struct ZkillRedisQSource {
    http: Arc<JsonHttpClient>,
    endpoint: String,
    queue_id: String,
    max_per_poll: usize,
    locations: Arc<dyn LocationResolver>,
}

impl ZkillRedisQSource {
    pub fn new(
        http: Arc<JsonHttpClient>,
        endpoint: &str,
        queue_id: &str,
        max_per_poll: usize,
        locations: Arc<dyn LocationResolver>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            queue_id: queue_id.to_string(),
            max_per_poll: max_per_poll.max(1),
            locations,
        }
    }

    fn listen_url(&self) -> String {
        format!("{}?queueID={}&ttw=1", self.endpoint, self.queue_id)
    }
}

#[async_trait]
impl FeedSource<Killmail> for ZkillRedisQSource {
    fn name(&self) -> &str {
        "zkillboard"
    }

    async fn fetch(&self) -> Result<Vec<FeedItem<Killmail>>, FetchError> {
        let url = self.listen_url();
        let mut killmails = Vec::new();

        while killmails.len() < self.max_per_poll {
            let response: ApiRedisQResponse = match self.http.get_json(&url).await {
                Ok(response) => response,
                Err(err) if killmails.is_empty() => return Err(err),
                Err(err) => {
                    // The queue already handed these out; dropping them would lose them.
                    tracing::warn!(
                        error = %err,
                        pulled = killmails.len(),
                        "RedisQ request failed mid-drain; keeping what was pulled"
                    );
                    break;
                }
            };

            match response.package {
                Some(package) => killmails.push(map_package(package)),
                None => break,
            }
        }

        Ok(locate(self.locations.as_ref(), killmails).await)
    }
}

/// Attach locations, looking each distinct system up once and all of them at
/// the same time.
async fn locate(locations: &dyn LocationResolver, killmails: Vec<Killmail>) -> Vec<FeedItem<Killmail>> {
    let systems: BTreeSet<u64> = killmails.iter().map(|k| k.solar_system_id).collect();
    let lookups = systems
        .into_iter()
        .map(|system_id| async move { (system_id, locations.resolve(system_id).await) });

    let mut resolved = HashMap::new();
    for (system_id, result) in join_all(lookups).await {
        match result {
            Ok(location) => {
                resolved.insert(system_id, location);
            }
            Err(err) => tracing::warn!(
                system_id,
                error = %err,
                "Could not resolve kill location; routing by system only"
            ),
        }
    }

    killmails
        .into_iter()
        .map(|mut killmail| {
            killmail.location = resolved.get(&killmail.solar_system_id).cloned();
            kill_item(killmail)
        })
        .collect()
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn map_package(package: ApiPackage) -> Killmail {
    let ApiPackage {
        kill_id,
        killmail,
        zkb,
    } = package;

    let victim = Combatant {
        character_id: killmail.victim.character_id,
        corporation_id: killmail.victim.corporation_id,
        alliance_id: killmail.victim.alliance_id,
        ship_type_id: killmail.victim.ship_type_id,
        damage: killmail.victim.damage_taken,
        final_blow: false,
    };

    let attackers = killmail
        .attackers
        .into_iter()
        .map(|a| Combatant {
            character_id: a.character_id,
            corporation_id: a.corporation_id,
            alliance_id: a.alliance_id,
            ship_type_id: a.ship_type_id,
            damage: a.damage_done,
            final_blow: a.final_blow,
        })
        .collect();

    let killmail_id = killmail.killmail_id.unwrap_or(kill_id);

    Killmail {
        killmail_id,
        killmail_time: parse_time(killmail.killmail_time.as_deref()),
        solar_system_id: killmail.solar_system_id,
        victim,
        attackers,
        zkb: ZkbMeta {
            total_value: zkb.total_value,
            url: zkb
                .url
                .unwrap_or_else(|| format!("https://zkillboard.com/kill/{}/", killmail_id)),
            npc: zkb.npc,
            solo: zkb.solo,
        },
        location: None,
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiRedisQResponse {
    package: Option<ApiPackage>,
}

#[derive(Debug, Deserialize)]
struct ApiPackage {
    #[serde(rename = "killID")]
    kill_id: u64,
    killmail: ApiKillmail,
    #[serde(default)]
    zkb: ApiZkb,
}

#[derive(Debug, Deserialize)]
struct ApiKillmail {
    killmail_id: Option<u64>,
    killmail_time: Option<String>,
    solar_system_id: u64,
    victim: ApiVictim,
    #[serde(default)]
    attackers: Vec<ApiAttacker>,
}

#[derive(Debug, Deserialize)]
struct ApiVictim {
    character_id: Option<u64>,
    corporation_id: Option<u64>,
    alliance_id: Option<u64>,
    ship_type_id: Option<u64>,
    #[serde(default)]
    damage_taken: u64,
}

#[derive(Debug, Deserialize)]
struct ApiAttacker {
    character_id: Option<u64>,
    corporation_id: Option<u64>,
    alliance_id: Option<u64>,
    ship_type_id: Option<u64>,
    #[serde(default)]
    damage_done: u64,
    #[serde(default)]
    final_blow: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiZkb {
    #[serde(default)]
    total_value: f64,
    url: Option<String>,
    #[serde(default)]
    npc: bool,
    #[serde(default)]
    solo: bool,
}
