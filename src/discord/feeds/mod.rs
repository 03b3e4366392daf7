// Feed delivery on the Discord side.
// - `dispatcher.rs` is the gateway the watchers post through.
// - `embeds.rs` renders each feed's payload.

#[path = "dispatcher.rs"]
pub mod dispatcher;

#[path = "embeds.rs"]
pub mod embeds;

pub use dispatcher::{GatewayStatus, SerenityGateway};
pub use embeds::FeedEmbed;
