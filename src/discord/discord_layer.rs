// Discord layer - commands, event wiring and feed delivery.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "feeds/mod.rs"]
pub mod feeds;

// Re-export command types for convenience
pub use commands::feeds::{Context, Data, Error};
