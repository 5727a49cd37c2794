//! Deferred structural mutations.
//!
//! The [`CommandBuffer`] is the only way to change which entities exist or
//! which components they carry. Systems queue commands while they iterate
//! chunks; the store applies them at its flush points (before and after the
//! systems of a tick run), strictly in FIFO order.
//!
//! Nothing queued is observable until the flush: a `Ref` returned by
//! [`add_entity`](CommandBuffer::add_entity) stays pending, `get_component`
//! keeps returning the old value, and the archetype does not change.
//!
//! Commands targeting a `Ref` that is no longer valid when its turn comes
//! are skipped with a warning. This is expected when an earlier command in
//! the same flush already removed the entity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::{BoxedComponent, Component, ComponentType, ComponentTypeId};
use crate::entity::{Ref, StoreId};
use crate::holder::Holder;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Reasons
// ---------------------------------------------------------------------------

/// Why an entity is being added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddReason {
    /// Freshly created by game logic.
    Spawn,
    /// Restored from persistent storage.
    Load,
}

/// Why an entity is being removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoveReason {
    /// Destroyed by game logic.
    Remove,
    /// Evicted to persistent storage.
    Unload,
}

impl AddReason {
    /// Lowercase name, for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            AddReason::Spawn => "spawn",
            AddReason::Load => "load",
        }
    }
}

impl RemoveReason {
    /// Lowercase name, for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            RemoveReason::Remove => "remove",
            RemoveReason::Unload => "unload",
        }
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A single queued structural mutation.
pub enum Command<D> {
    /// Create an entity from a template; `entity` is bound at apply time.
    AddEntity {
        entity: Ref,
        template: Holder<D>,
        reason: AddReason,
    },
    /// Destroy an entity and invalidate every alias of its `Ref`.
    RemoveEntity { entity: Ref, reason: RemoveReason },
    /// Add a component, or overwrite it if already present.
    AddComponent {
        entity: Ref,
        component: ComponentTypeId,
        value: BoxedComponent,
    },
    /// Add a component built by its registered default factory.
    AddDefaultComponent {
        entity: Ref,
        component: ComponentTypeId,
    },
    /// Remove a component; a no-op if absent.
    RemoveComponent {
        entity: Ref,
        component: ComponentTypeId,
    },
}

impl<D> Command<D> {
    /// Short name of the command kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::AddEntity { .. } => "add_entity",
            Command::RemoveEntity { .. } => "remove_entity",
            Command::AddComponent { .. } => "add_component",
            Command::AddDefaultComponent { .. } => "add_default_component",
            Command::RemoveComponent { .. } => "remove_component",
        }
    }

    /// The add or remove reason of entity lifecycle commands.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Command::AddEntity { reason, .. } => Some(reason.as_str()),
            Command::RemoveEntity { reason, .. } => Some(reason.as_str()),
            _ => None,
        }
    }

    /// The entity the command targets.
    pub fn entity(&self) -> &Ref {
        match self {
            Command::AddEntity { entity, .. }
            | Command::RemoveEntity { entity, .. }
            | Command::AddComponent { entity, .. }
            | Command::AddDefaultComponent { entity, .. }
            | Command::RemoveComponent { entity, .. } => entity,
        }
    }
}

impl<D> fmt::Debug for Command<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::AddEntity {
                entity,
                template,
                reason,
            } => f
                .debug_struct("AddEntity")
                .field("entity", entity)
                .field("template", template)
                .field("reason", reason)
                .finish(),
            Command::RemoveEntity { entity, reason } => f
                .debug_struct("RemoveEntity")
                .field("entity", entity)
                .field("reason", reason)
                .finish(),
            Command::AddComponent {
                entity, component, ..
            } => f
                .debug_struct("AddComponent")
                .field("entity", entity)
                .field("component", component)
                .finish_non_exhaustive(),
            Command::AddDefaultComponent { entity, component } => f
                .debug_struct("AddDefaultComponent")
                .field("entity", entity)
                .field("component", component)
                .finish(),
            Command::RemoveComponent { entity, component } => f
                .debug_struct("RemoveComponent")
                .field("entity", entity)
                .field("component", component)
                .finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Commands that changed the store.
    pub applied: usize,
    /// Commands skipped because their target was stale, foreign, or the
    /// value was unusable. Each skip is logged.
    pub skipped: usize,
    /// Applied `AddEntity` commands with [`AddReason::Spawn`].
    pub spawned: usize,
    /// Applied `AddEntity` commands with [`AddReason::Load`].
    pub loaded: usize,
    /// Applied `RemoveEntity` commands with [`RemoveReason::Remove`].
    pub removed: usize,
    /// Applied `RemoveEntity` commands with [`RemoveReason::Unload`].
    pub unloaded: usize,
}

impl ApplyReport {
    /// Total commands drained.
    pub fn total(&self) -> usize {
        self.applied + self.skipped
    }

    pub(crate) fn record_added(&mut self, reason: AddReason) {
        match reason {
            AddReason::Spawn => self.spawned += 1,
            AddReason::Load => self.loaded += 1,
        }
    }

    pub(crate) fn record_removed(&mut self, reason: RemoveReason) {
        match reason {
            RemoveReason::Remove => self.removed += 1,
            RemoveReason::Unload => self.unloaded += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// CommandBuffer
// ---------------------------------------------------------------------------

/// FIFO log of structural mutations for one store.
///
/// Every buffer is tied to the store that created it; refs it mints belong
/// to that store. A producer may fill its own buffer from
/// [`Store::new_command_buffer`](crate::store::Store::new_command_buffer)
/// and [`append`](Self::append) it to the store's buffer later. The relative
/// order of one producer's commands is always preserved; across producers
/// the order is the order of the `append` calls.
pub struct CommandBuffer<D> {
    store: StoreId,
    commands: Vec<Command<D>>,
}

impl<D> CommandBuffer<D> {
    pub(crate) fn new(store: StoreId) -> Self {
        Self {
            store,
            commands: Vec::new(),
        }
    }

    /// Identity of the store this buffer feeds.
    pub fn store_id(&self) -> StoreId {
        self.store
    }

    /// Queue creation of an entity from `template`.
    ///
    /// Returns a pending `Ref` that becomes valid when the command is
    /// applied.
    pub fn add_entity(&mut self, template: Holder<D>, reason: AddReason) -> Ref {
        let entity = Ref::pending(self.store);
        self.commands.push(Command::AddEntity {
            entity: entity.clone(),
            template,
            reason,
        });
        entity
    }

    /// Queue destruction of `entity`.
    pub fn remove_entity(&mut self, entity: &Ref, reason: RemoveReason) {
        self.commands.push(Command::RemoveEntity {
            entity: entity.clone(),
            reason,
        });
    }

    /// Queue adding (or overwriting) component `ty` on `entity`.
    pub fn add_component<T: Component>(
        &mut self,
        entity: &Ref,
        ty: &ComponentType<D, T>,
        value: T,
    ) {
        self.commands.push(Command::AddComponent {
            entity: entity.clone(),
            component: ty.id(),
            value: Box::new(value),
        });
    }

    /// Queue adding component `ty` built from its default factory.
    pub fn add_default_component<T>(&mut self, entity: &Ref, ty: &ComponentType<D, T>) {
        self.commands.push(Command::AddDefaultComponent {
            entity: entity.clone(),
            component: ty.id(),
        });
    }

    /// Queue removal of component `ty` from `entity`.
    pub fn remove_component<T>(&mut self, entity: &Ref, ty: &ComponentType<D, T>) {
        self.commands.push(Command::RemoveComponent {
            entity: entity.clone(),
            component: ty.id(),
        });
    }

    /// Move every command of `other` to the end of this buffer, keeping
    /// their order. `other` is left empty.
    ///
    /// # Errors
    ///
    /// [`EcsError::ForeignCommandBuffer`] if `other` belongs to a different
    /// store; neither buffer is changed.
    pub fn append(&mut self, other: &mut CommandBuffer<D>) -> Result<(), EcsError> {
        if other.store != self.store {
            return Err(EcsError::ForeignCommandBuffer {
                expected: self.store,
                found: other.store,
            });
        }
        self.commands.append(&mut other.commands);
        Ok(())
    }

    /// Queued commands, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Command<D>> {
        self.commands.iter()
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop every queued command. Pending refs they minted never bind.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Take the queued commands, leaving the buffer empty.
    pub(crate) fn take(&mut self) -> Vec<Command<D>> {
        std::mem::take(&mut self.commands)
    }
}

impl<D> fmt::Debug for CommandBuffer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("store", &self.store)
            .field("commands", &self.commands)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
