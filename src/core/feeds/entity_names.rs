// Name lookups for subscriptions typed by hand ("Jita", "Goonswarm Federation").

use super::feed_errors::FetchError;
use super::feed_models::{EntityKind, EntityRef};
use async_trait::async_trait;

/// An entity together with the name the game uses for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEntity {
    pub entity: EntityRef,
    pub name: String,
}

#[async_trait]
pub trait EntityNameResolver: Send + Sync {
    /// `Ok(None)` when nothing of that kind carries this exact name.
    async fn resolve_name(&self, kind: EntityKind, name: &str) -> Result<Option<NamedEntity>, FetchError>;
}
