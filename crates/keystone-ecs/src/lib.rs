//! Keystone ECS -- archetype-chunked Entity Component System for game servers.
//!
//! Entities are opaque [`Ref`](entity::Ref) handles. Their components live in
//! fixed-capacity chunks grouped by exact component signature (archetypes),
//! one densely packed column per component type. Behavior lives in
//! [`System`](system::System)s that iterate the chunks matched by a
//! [`Query`](query::Query), ordered by declared dependencies.
//!
//! Structural changes (spawning, despawning, adding or removing components)
//! are queued on a [`CommandBuffer`](command::CommandBuffer) and applied at
//! the flush points around the systems of each [`Store::tick`](store::Store::tick).
//!
//! # Quick Start
//!
//! ```
//! use keystone_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut store = EntityStore::new(StoreConfig::named("overworld")).unwrap();
//! let position = store.register_component::<Position>("position").unwrap();
//! let velocity = store.register_component::<Velocity>("velocity").unwrap();
//!
//! let template = Holder::new()
//!     .with(&position, Position { x: 0.0, y: 0.0 })
//!     .with(&velocity, Velocity { dx: 1.0, dy: 0.0 });
//! let entity = store.commands().add_entity(template, AddReason::Spawn);
//! store.tick(1.0).unwrap();
//!
//! assert_eq!(store.get_component(&entity, &position), Some(&Position { x: 0.0, y: 0.0 }));
//! assert!(store.get_archetype(&entity).unwrap().has(&velocity));
//! ```

#![deny(unsafe_code)]

pub mod archetype;
pub mod command;
pub mod component;
pub mod config;
pub mod domain;
pub mod entity;
pub mod holder;
pub mod query;
pub mod resource;
pub mod schedule;
pub mod store;
pub mod system;

use crate::component::ComponentTypeId;
use crate::entity::StoreId;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
///
/// Configuration errors (registration, cycles, config) come back from setup
/// calls and should abort initialization. Access errors come back from
/// lookups and are the caller's to handle. Structural errors during a flush
/// never reach the caller: the command is skipped and logged.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// A component type, name, or resource was registered twice.
    #[error("{domain} store: '{name}' is already registered")]
    DuplicateRegistration { domain: &'static str, name: String },

    /// Registration attempted after the store started ticking.
    #[error("{domain} store: cannot register '{name}' after the first tick")]
    RegistryFrozen { domain: &'static str, name: String },

    /// System dependencies form a cycle.
    #[error("system dependency cycle between [{}]", .systems.join(", "))]
    DependencyCycle { systems: Vec<String> },

    /// A system of the same type is already registered.
    #[error("system '{name}' is already registered")]
    DuplicateSystem { name: String },

    /// Store configuration failed validation.
    #[error("invalid store configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The entity exists but lacks the component.
    #[error("entity {entity} has no component '{component}'")]
    MissingComponent { entity: String, component: String },

    /// No resource of the requested type was registered.
    #[error("resource '{resource}' is not registered")]
    UnregisteredResource { resource: String },

    /// A component id unknown to the registry.
    #[error("component {id:?} is not registered")]
    UnregisteredComponent { id: ComponentTypeId },

    /// A component name unknown to the registry.
    #[error("no component named '{name}' is registered")]
    UnknownComponent { name: String },

    /// The entity was removed, or never created.
    #[error("entity {entity} is not valid")]
    InvalidRef { entity: String },

    /// The entity belongs to another store.
    #[error("entity {entity} belongs to {owner}, not {store}")]
    ForeignRef {
        entity: String,
        owner: StoreId,
        store: StoreId,
    },

    /// Command buffers of different stores cannot be merged.
    #[error("cannot append a command buffer of {found} to one of {expected}")]
    ForeignCommandBuffer { expected: StoreId, found: StoreId },

    /// No system of the requested type is registered.
    #[error("system '{name}' is not registered")]
    UnknownSystem { name: String },

    /// A value's Rust type differs from the registered component type.
    #[error("value does not match the registered type of component '{component}'")]
    ComponentTypeMismatch { component: String },

    /// Component values do not line up with an archetype's columns.
    #[error("component values do not match the archetype signature")]
    SignatureMismatch,

    /// A chunk was asked to take a row past its capacity.
    #[error("chunk is full (capacity {capacity})")]
    ChunkFull { capacity: usize },

    /// The component was registered without a codec.
    #[error("component '{component}' has no codec")]
    MissingCodec { component: String },

    /// The component was registered without a default factory.
    #[error("component '{component}' has no default factory")]
    MissingDefault { component: String },

    /// Serializing or deserializing a component failed.
    #[error("codec error for component '{component}': {details}")]
    Codec { component: String, details: String },

    /// The store was shut down.
    #[error("store has been shut down")]
    StoreShutDown,

    /// A system-specific failure.
    #[error("system failure: {message}")]
    System { message: String },
}

impl EcsError {
    /// Build a system-specific failure.
    pub fn system(message: impl Into<String>) -> Self {
        EcsError::System {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeChunk, ArchetypeId};
    pub use crate::command::{AddReason, ApplyReport, Command, CommandBuffer, RemoveReason};
    pub use crate::component::{
        Component, ComponentInfo, ComponentOptions, ComponentRegistry, ComponentType,
        ComponentTypeId,
    };
    pub use crate::config::StoreConfig;
    pub use crate::domain::{ChunkDomain, EntityDomain, StoreDomain};
    pub use crate::entity::{EntityLocation, Ref, StoreId};
    pub use crate::holder::{EntitySnapshot, Holder};
    pub use crate::query::{Query, QueryExpr};
    pub use crate::resource::{Resource, ResourceType};
    pub use crate::schedule::{ExecutionPlan, PlanBatch, PlanLevel};
    pub use crate::store::{ChunkStore, EntityStore, Store, TickDiagnostics};
    pub use crate::system::{Dependency, System, SystemContext, SystemState};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
