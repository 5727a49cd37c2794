//! Systems: the behavior half of the ECS.
//!
//! A [`System`] declares a [`Query`] and zero or more [`Dependency`] edges.
//! Every tick the store hands it a [`SystemContext`] through which it
//! iterates the chunks its query matched, mutates their columns in place,
//! and queues structural changes on the store's command buffer.
//!
//! Returning `Err` from [`System::tick`] does not abort the tick: the store
//! logs the error and runs the remaining systems.

use std::any::{type_name, TypeId};
use std::fmt;

use crate::archetype::{Archetype, ArchetypeChunk, ArchetypeId};
use crate::command::CommandBuffer;
use crate::component::{Component, ComponentType};
use crate::domain::StoreDomain;
use crate::entity::Ref;
use crate::query::{Query, QueryCache};
use crate::resource::{Resource, ResourceType};
use crate::store::Store;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Dependency
// ---------------------------------------------------------------------------

/// Identifies a system by its Rust type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemKey {
    type_id: TypeId,
    name: &'static str,
}

impl SystemKey {
    /// Key of system type `S`.
    pub fn of<S: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            name: type_name::<S>(),
        }
    }

    /// Rust type name of the system.
    pub fn type_name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for SystemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemKey({})", self.name)
    }
}

/// An ordering constraint relative to another system type.
///
/// Constraints naming a system that is not registered are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// Run after the named system.
    After(SystemKey),
    /// Run before the named system.
    Before(SystemKey),
}

impl Dependency {
    /// Run after system type `S`.
    pub fn after<S: 'static>() -> Self {
        Dependency::After(SystemKey::of::<S>())
    }

    /// Run before system type `S`.
    pub fn before<S: 'static>() -> Self {
        Dependency::Before(SystemKey::of::<S>())
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Lifecycle state of a registered system.
///
/// An unregistered system has no state; [`Store::system_state`] returns
/// `None` for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemState {
    /// Registered and validated, has not run yet.
    Registered,
    /// Participating in ticks.
    Active,
}

/// Per-tick behavior over the chunks matched by a query.
pub trait System<D: StoreDomain>: Send + 'static {
    /// Name used in logs, diagnostics, and cycle errors.
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// The archetypes this system iterates.
    fn query(&self) -> Query<D>;

    /// Ordering constraints. Read once at registration.
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// Run one tick.
    fn tick(&mut self, dt: f32, ctx: &mut SystemContext<'_, D>) -> Result<(), EcsError>;

    /// Called once after the system passed dependency validation.
    fn on_system_registered(&mut self) {}

    /// Called once when the system is unregistered or the store shuts down.
    fn on_system_unregistered(&mut self) {}
}

// ---------------------------------------------------------------------------
// SystemContext
// ---------------------------------------------------------------------------

/// What a system sees while it ticks.
///
/// Chunk columns can be written in place. Structural changes go through
/// [`commands`](Self::commands) and become visible after the post-system
/// flush.
pub struct SystemContext<'a, D: StoreDomain> {
    store: &'a mut Store<D>,
    cache: &'a QueryCache<D>,
}

impl<'a, D: StoreDomain> SystemContext<'a, D> {
    pub(crate) fn new(store: &'a mut Store<D>, cache: &'a QueryCache<D>) -> Self {
        Self { store, cache }
    }

    /// Archetypes matched by this system's query.
    pub fn matched_archetypes(&self) -> &[ArchetypeId] {
        self.cache.matched()
    }

    /// Visit every non-empty matched chunk with mutable access to its
    /// columns and to the command buffer.
    pub fn for_each_chunk<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut ArchetypeChunk, &mut CommandBuffer<D>),
    {
        let (archetypes, commands) = self.store.archetypes_and_commands();
        for id in self.cache.matched() {
            let Some(archetype) = archetypes.get_mut(id.index()) else {
                continue;
            };
            for chunk in archetype.chunks_mut() {
                if !chunk.is_empty() {
                    f(chunk, commands);
                }
            }
        }
    }

    /// Like [`for_each_chunk`](Self::for_each_chunk) but stops at the first
    /// error.
    pub fn try_for_each_chunk<F>(&mut self, mut f: F) -> Result<(), EcsError>
    where
        F: FnMut(&mut ArchetypeChunk, &mut CommandBuffer<D>) -> Result<(), EcsError>,
    {
        let (archetypes, commands) = self.store.archetypes_and_commands();
        for id in self.cache.matched() {
            let Some(archetype) = archetypes.get_mut(id.index()) else {
                continue;
            };
            for chunk in archetype.chunks_mut() {
                if !chunk.is_empty() {
                    f(chunk, commands)?;
                }
            }
        }
        Ok(())
    }

    /// Read-only view of the matched chunks.
    pub fn chunks(&self) -> impl Iterator<Item = &ArchetypeChunk> + '_ {
        let archetypes: &[Archetype] = self.store.archetypes();
        self.cache
            .matched()
            .iter()
            .filter_map(move |id| archetypes.get(id.index()))
            .flat_map(|a| a.chunks().iter())
            .filter(|c| !c.is_empty())
    }

    /// The store's command buffer.
    pub fn commands(&mut self) -> &mut CommandBuffer<D> {
        self.store.commands()
    }

    /// See [`Store::get_component`].
    pub fn get_component<T: Component>(
        &self,
        entity: &Ref,
        ty: &ComponentType<D, T>,
    ) -> Option<&T> {
        self.store.get_component(entity, ty)
    }

    /// See [`Store::get_component_mut`].
    pub fn get_component_mut<T: Component>(
        &mut self,
        entity: &Ref,
        ty: &ComponentType<D, T>,
    ) -> Option<&mut T> {
        self.store.get_component_mut(entity, ty)
    }

    /// See [`Store::ensure_and_get_component`].
    pub fn ensure_and_get_component<T: Component>(
        &self,
        entity: &Ref,
        ty: &ComponentType<D, T>,
    ) -> Result<&T, EcsError> {
        self.store.ensure_and_get_component(entity, ty)
    }

    /// See [`Store::get_resource`].
    pub fn get_resource<R: Resource>(&self, ty: &ResourceType<D, R>) -> Result<&R, EcsError> {
        self.store.get_resource(ty)
    }

    /// See [`Store::get_resource_mut`].
    pub fn get_resource_mut<R: Resource>(
        &mut self,
        ty: &ResourceType<D, R>,
    ) -> Result<&mut R, EcsError> {
        self.store.get_resource_mut(ty)
    }

    /// See [`Store::resource`].
    pub fn resource<R: Resource>(&self) -> Result<&R, EcsError> {
        self.store.resource::<R>()
    }

    /// See [`Store::resource_mut`].
    pub fn resource_mut<R: Resource>(&mut self) -> Result<&mut R, EcsError> {
        self.store.resource_mut::<R>()
    }

    /// Read-only access to the whole store.
    ///
    /// Systems are detached from the store while they tick, so the store's
    /// system list reads as empty from here.
    pub fn store(&self) -> &Store<D> {
        &*self.store
    }
}
