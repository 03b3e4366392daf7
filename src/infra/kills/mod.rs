// Kill feed infra.
// - `zkill_client.rs` drains zKillboard's RedisQ queue.
// - `esi_client.rs` resolves systems to constellations and regions, and
//   entity names to ids for subscriptions.

#[path = "zkill_client.rs"]
pub mod zkill_client;

#[path = "esi_client.rs"]
pub mod esi_client;

pub use esi_client::{EsiLocationResolver, EsiNameResolver};
pub use zkill_client::ZkillRedisQSource;
