// Shared feed infra.
// - `http_client.rs` is the one reqwest client every feed source uses.
// - `sqlite_store.rs` persists cursors and subscriptions.

#[path = "http_client.rs"]
pub mod http_client;

#[path = "sqlite_store.rs"]
pub mod sqlite_store;

pub use http_client::JsonHttpClient;
pub use sqlite_store::SqliteFeedStore;
