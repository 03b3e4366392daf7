// Runtime configuration, read once from the environment (after `.env` is loaded).

use crate::infra::kills::esi_client::DEFAULT_ESI_BASE_URL;
use crate::infra::kills::zkill_client::DEFAULT_REDISQ_URL;
use crate::infra::wormholes::DEFAULT_EVE_SCOUT_URL;
use anyhow::{anyhow, Result};
use std::env;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/mercury.db";

/// Settings for one feed watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    pub enabled: bool,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub database_url: String,
    /// Contact put in the User-Agent of every outgoing request.
    pub contact: String,
    pub fetch_timeout: Duration,
    pub seen_retention: usize,
    pub deliver_backlog: bool,

    pub kills: FeedSettings,
    pub redisq_url: String,
    pub zkill_queue_id: String,
    pub zkill_max_per_poll: usize,
    pub esi_base_url: String,

    pub news: FeedSettings,

    pub wormholes: FeedSettings,
    pub eve_scout_url: String,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup. Unparseable values fall back to
    /// their defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let discord_token = var("DISCORD_TOKEN").ok_or_else(|| {
            anyhow!("Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.")
        })?;

        let number = |key: &str, default: u64| -> u64 {
            match var(key) {
                Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
                    tracing::warn!(key, value = %raw, default, "Ignoring unparseable setting");
                    default
                }),
                None => default,
            }
        };
        let flag = |key: &str, default: bool| -> bool {
            var(key).map(|raw| parse_bool(&raw, default)).unwrap_or(default)
        };
        let seconds = |key: &str, default: u64| Duration::from_secs(number(key, default).max(1));

        Ok(Self {
            discord_token,
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            contact: var("MERCURY_USER_AGENT").unwrap_or_else(|| "unknown".to_string()),
            fetch_timeout: seconds("FEED_FETCH_TIMEOUT_SECS", 15),
            seen_retention: number("FEED_SEEN_RETENTION", 5000).max(1) as usize,
            deliver_backlog: flag("FEED_DELIVER_BACKLOG", false),

            kills: FeedSettings {
                enabled: flag("KILL_FEED_ENABLED", true),
                interval: seconds("KILL_FEED_INTERVAL_SECS", 60),
            },
            redisq_url: var("ZKILL_REDISQ_URL").unwrap_or_else(|| DEFAULT_REDISQ_URL.to_string()),
            zkill_queue_id: var("ZKILL_QUEUE_ID").unwrap_or_else(|| "mercury-bot".to_string()),
            zkill_max_per_poll: number("ZKILL_MAX_PER_POLL", 50).max(1) as usize,
            esi_base_url: var("ESI_BASE_URL").unwrap_or_else(|| DEFAULT_ESI_BASE_URL.to_string()),

            news: FeedSettings {
                enabled: flag("NEWS_FEED_ENABLED", true),
                interval: seconds("NEWS_FEED_INTERVAL_SECS", 300),
            },

            wormholes: FeedSettings {
                enabled: flag("WORMHOLE_FEED_ENABLED", true),
                interval: seconds("WORMHOLE_FEED_INTERVAL_SECS", 60),
            },
            eve_scout_url: var("EVE_SCOUT_URL").unwrap_or_else(|| DEFAULT_EVE_SCOUT_URL.to_string()),
        })
    }
}

fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<BotConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn token_is_required() {
        assert!(config(&[]).is_err());
        assert!(config(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("DISCORD_TOKEN", "abc")]).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.fetch_timeout, Duration::from_secs(15));
        assert_eq!(config.seen_retention, 5000);
        assert!(!config.deliver_backlog);
        assert_eq!(
            config.kills,
            FeedSettings {
                enabled: true,
                interval: Duration::from_secs(60)
            }
        );
        assert_eq!(config.news.interval, Duration::from_secs(300));
        assert_eq!(config.zkill_max_per_poll, 50);
    }

    #[test]
    fn overrides_and_bad_values() {
        let config = config(&[
            ("DISCORD_TOKEN", "abc"),
            ("NEWS_FEED_ENABLED", "off"),
            ("WORMHOLE_FEED_INTERVAL_SECS", "90"),
            ("KILL_FEED_INTERVAL_SECS", "soon"),
            ("FEED_DELIVER_BACKLOG", "yes"),
            ("ZKILL_MAX_PER_POLL", "0"),
        ])
        .unwrap();

        assert!(!config.news.enabled);
        assert_eq!(config.wormholes.interval, Duration::from_secs(90));
        assert_eq!(config.kills.interval, Duration::from_secs(60));
        assert!(config.deliver_backlog);
        assert_eq!(config.zkill_max_per_poll, 1);
    }

    #[test]
    fn bool_parsing() {
        assert!(parse_bool("TRUE", false));
        assert!(!parse_bool("0", true));
        assert!(parse_bool("maybe", true));
    }
}
