// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "feeds/mod.rs"]
pub mod feeds;

#[path = "kills/mod.rs"]
pub mod kills;

#[path = "news/news_client.rs"]
pub mod news;

#[path = "wormholes/eve_scout_client.rs"]
pub mod wormholes;
