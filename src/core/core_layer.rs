// The core module contains all business logic.
// The generic feed engine lives in `feeds`; each concrete feed gets its own submodule.

#[path = "feeds/mod.rs"]
pub mod feeds;

#[path = "kills/kill_feed.rs"]
pub mod kills;

#[path = "news/news_feed.rs"]
pub mod news;

#[path = "wormholes/wormhole_feed.rs"]
pub mod wormholes;
