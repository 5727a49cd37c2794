//! Store domains.
//!
//! A domain is a zero-sized marker type that scopes every id the ECS hands
//! out. Component ids registered in the entity store mean nothing in the
//! chunk store, so every handle type ([`ComponentType`](crate::component::ComponentType),
//! [`Query`](crate::query::Query), [`CommandBuffer`](crate::command::CommandBuffer),
//! ...) carries its domain as a type parameter and the compiler rejects
//! cross-domain mixing.

use std::fmt::Debug;

/// Marker trait implemented by every store domain.
pub trait StoreDomain: Debug + Send + Sync + 'static {
    /// Human-readable domain name used in logs and error messages.
    const NAME: &'static str;
}

/// Domain of per-world game objects (players, NPCs, projectiles, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityDomain;

impl StoreDomain for EntityDomain {
    const NAME: &'static str = "entity";
}

/// Domain of world chunk columns (terrain sections, block data, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkDomain;

impl StoreDomain for ChunkDomain {
    const NAME: &'static str = "chunk";
}
