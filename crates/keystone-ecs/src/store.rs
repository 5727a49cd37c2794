//! The per-domain ECS universe.
//!
//! A [`Store`] owns the component registry, the archetypes and their chunks,
//! the entity slot table, resources, the systems, and one command buffer.
//!
//! # Ticking
//!
//! [`Store::tick`] is the only place structural state changes:
//!
//! 1. flush the command buffer (commands queued outside the tick);
//! 2. run every system in scheduler order, each over the chunks its query
//!    matched at the moment it starts;
//! 3. flush the command buffer again (commands queued by the systems).
//!
//! Writes to components that already exist happen in place and are visible
//! immediately. Everything else (spawning, despawning, adding or removing
//! components) waits for a flush.
//!
//! ```
//! use keystone_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Health(f32);
//!
//! struct Regen {
//!     health: ComponentType<EntityDomain, Health>,
//! }
//!
//! impl System<EntityDomain> for Regen {
//!     fn query(&self) -> Query<EntityDomain> {
//!         Query::from(self.health)
//!     }
//!
//!     fn tick(
//!         &mut self,
//!         _dt: f32,
//!         ctx: &mut SystemContext<'_, EntityDomain>,
//!     ) -> Result<(), EcsError> {
//!         let health = self.health;
//!         ctx.for_each_chunk(|chunk, _| {
//!             for h in chunk.column_mut(&health).into_iter().flatten() {
//!                 h.0 += 1.0;
//!             }
//!         });
//!         Ok(())
//!     }
//! }
//!
//! let mut store = EntityStore::new(StoreConfig::default()).unwrap();
//! let health = store.register_component::<Health>("health").unwrap();
//! store.register_system(Regen { health }).unwrap();
//!
//! let entity = store
//!     .commands()
//!     .add_entity(Holder::new().with(&health, Health(10.0)), AddReason::Spawn);
//! assert!(!entity.is_valid());
//!
//! store.tick(0.05).unwrap();
//! assert_eq!(store.get_component(&entity, &health), Some(&Health(11.0)));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::archetype::{Archetype, ArchetypeChunk, ArchetypeId};
use crate::command::{ApplyReport, Command, CommandBuffer};
use crate::component::{
    BoxedComponent, Component, ComponentOptions, ComponentRegistry, ComponentType, ComponentTypeId,
};
use crate::config::StoreConfig;
use crate::domain::{ChunkDomain, EntityDomain, StoreDomain};
use crate::entity::{EntityLocation, EntitySlots, Ref, StoreId};
use crate::holder::Holder;
use crate::query::Query;
use crate::resource::{Resource, ResourceType, Resources};
use crate::schedule::{ExecutionPlan, Scheduler};
use crate::system::{System, SystemContext, SystemKey, SystemState};
use crate::EcsError;

/// Store of per-world game objects.
pub type EntityStore = Store<EntityDomain>;

/// Store of world chunk data.
pub type ChunkStore = Store<ChunkDomain>;

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Timing and outcome of the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time per system, in execution order.
    pub system_times: Vec<(String, Duration)>,
    /// Systems whose `tick` returned an error.
    pub failed_systems: Vec<String>,
    /// Flush before the systems ran.
    pub pre_flush: ApplyReport,
    /// Flush after the systems ran.
    pub post_flush: ApplyReport,
    /// Time spent in both flushes.
    pub command_apply_time: Duration,
    /// Time for the whole tick.
    pub total_time: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreState {
    /// Registration open, never ticked.
    Setup,
    Running,
    ShutDown,
}

/// Component change carried through a migration.
enum Change {
    Add(ComponentTypeId, BoxedComponent),
    Remove(ComponentTypeId),
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The ECS universe of domain `D`.
pub struct Store<D: StoreDomain> {
    id: StoreId,
    config: StoreConfig,
    registry: ComponentRegistry<D>,
    archetypes: Vec<Archetype>,
    /// Sorted signature to archetype.
    archetype_index: HashMap<Vec<ComponentTypeId>, ArchetypeId>,
    entities: EntitySlots,
    resources: Resources<D>,
    scheduler: Scheduler<D>,
    commands: CommandBuffer<D>,
    state: StoreState,
    tick_count: u64,
    last_diagnostics: TickDiagnostics,
}

impl<D: StoreDomain> Store<D> {
    /// Create an empty store.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: StoreConfig) -> Result<Self, EcsError> {
        config.validate()?;
        let id = StoreId::next();
        debug!(store = %id, name = %config.name, domain = D::NAME, "store created");
        Ok(Self {
            id,
            config,
            registry: ComponentRegistry::new(),
            archetypes: Vec::new(),
            archetype_index: HashMap::new(),
            entities: EntitySlots::new(),
            resources: Resources::new(),
            scheduler: Scheduler::new(),
            commands: CommandBuffer::new(id),
            state: StoreState::Setup,
            tick_count: 0,
            last_diagnostics: TickDiagnostics::default(),
        })
    }

    // -- registration -------------------------------------------------------

    /// Register component type `T` with no codec and no default factory.
    pub fn register_component<T: Component>(
        &mut self,
        name: &str,
    ) -> Result<ComponentType<D, T>, EcsError> {
        self.registry.register(name, ComponentOptions::new())
    }

    /// Register component type `T` with extra capabilities.
    pub fn register_component_with<T: Component>(
        &mut self,
        name: &str,
        options: ComponentOptions<T>,
    ) -> Result<ComponentType<D, T>, EcsError> {
        self.registry.register(name, options)
    }

    /// Create the singleton resource `R` from `factory`.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateRegistration`] if `R` already exists,
    /// [`EcsError::RegistryFrozen`] once the store has ticked.
    pub fn register_resource<R: Resource>(
        &mut self,
        factory: impl FnOnce() -> R,
    ) -> Result<ResourceType<D, R>, EcsError> {
        if self.state != StoreState::Setup {
            return Err(EcsError::RegistryFrozen {
                domain: D::NAME,
                name: std::any::type_name::<R>().to_owned(),
            });
        }
        self.resources.register(factory)
    }

    /// Add a system and recompute the tick order.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateSystem`] if a system of type `S` is registered,
    /// [`EcsError::DependencyCycle`] if its dependencies close a cycle,
    /// [`EcsError::StoreShutDown`] after [`shutdown`](Self::shutdown).
    pub fn register_system<S: System<D>>(&mut self, system: S) -> Result<(), EcsError> {
        if self.state == StoreState::ShutDown {
            return Err(EcsError::StoreShutDown);
        }
        self.scheduler.register(system)
    }

    /// Remove the system of type `S`, firing its unregister hook.
    pub fn unregister_system<S: System<D>>(&mut self) -> Result<(), EcsError> {
        self.scheduler.unregister(SystemKey::of::<S>())
    }

    // -- entity access ------------------------------------------------------

    /// Current location of a live entity of this store.
    fn resolve(&self, entity: &Ref) -> Result<EntityLocation, EcsError> {
        if entity.store_id() != self.id {
            return Err(EcsError::ForeignRef {
                entity: entity.to_string(),
                owner: entity.store_id(),
                store: self.id,
            });
        }
        self.entities
            .location(entity)
            .ok_or_else(|| EcsError::InvalidRef {
                entity: entity.to_string(),
            })
    }

    fn chunk_at(&self, location: EntityLocation) -> Option<&ArchetypeChunk> {
        self.archetypes
            .get(location.archetype.index())?
            .chunk(location.chunk)
    }

    fn chunk_at_mut(&mut self, location: EntityLocation) -> Option<&mut ArchetypeChunk> {
        self.archetypes
            .get_mut(location.archetype.index())?
            .chunk_mut(location.chunk)
    }

    /// Whether `entity` is a live entity of this store.
    pub fn is_valid(&self, entity: &Ref) -> bool {
        self.resolve(entity).is_ok()
    }

    /// Where `entity` lives right now. Stale after the next flush.
    pub fn location(&self, entity: &Ref) -> Option<EntityLocation> {
        self.resolve(entity).ok()
    }

    /// Component `ty` of `entity`; `None` if the entity lacks it or is not
    /// valid.
    pub fn get_component<T: Component>(
        &self,
        entity: &Ref,
        ty: &ComponentType<D, T>,
    ) -> Option<&T> {
        let location = self.resolve(entity).ok()?;
        self.chunk_at(location)?.get(ty, location.row as usize)
    }

    /// Mutable component `ty` of `entity`. Writes are visible immediately.
    pub fn get_component_mut<T: Component>(
        &mut self,
        entity: &Ref,
        ty: &ComponentType<D, T>,
    ) -> Option<&mut T> {
        let location = self.resolve(entity).ok()?;
        self.chunk_at_mut(location)?
            .get_mut(ty, location.row as usize)
    }

    /// Like [`get_component`](Self::get_component) for callers that treat
    /// absence as a bug.
    ///
    /// # Errors
    ///
    /// [`EcsError::MissingComponent`] if the entity lacks `ty`,
    /// [`EcsError::InvalidRef`] / [`EcsError::ForeignRef`] if the entity
    /// cannot be resolved.
    pub fn ensure_and_get_component<T: Component>(
        &self,
        entity: &Ref,
        ty: &ComponentType<D, T>,
    ) -> Result<&T, EcsError> {
        let location = self.resolve(entity)?;
        self.chunk_at(location)
            .and_then(|chunk| chunk.get(ty, location.row as usize))
            .ok_or_else(|| self.missing(entity, ty.id()))
    }

    /// Mutable form of [`ensure_and_get_component`](Self::ensure_and_get_component).
    pub fn ensure_and_get_component_mut<T: Component>(
        &mut self,
        entity: &Ref,
        ty: &ComponentType<D, T>,
    ) -> Result<&mut T, EcsError> {
        let location = self.resolve(entity)?;
        let missing = self.missing(entity, ty.id());
        self.chunk_at_mut(location)
            .and_then(|chunk| chunk.get_mut(ty, location.row as usize))
            .ok_or(missing)
    }

    fn missing(&self, entity: &Ref, component: ComponentTypeId) -> EcsError {
        EcsError::MissingComponent {
            entity: entity.to_string(),
            component: self.registry.name_of(component).to_owned(),
        }
    }

    /// The archetype `entity` currently belongs to.
    pub fn get_archetype(&self, entity: &Ref) -> Result<&Archetype, EcsError> {
        let location = self.resolve(entity)?;
        self.archetypes
            .get(location.archetype.index())
            .ok_or_else(|| EcsError::InvalidRef {
                entity: entity.to_string(),
            })
    }

    /// Clone every component of `entity` into a detached template.
    pub fn snapshot_entity(&self, entity: &Ref) -> Result<Holder<D>, EcsError> {
        let location = self.resolve(entity)?;
        let chunk = self
            .chunk_at(location)
            .ok_or_else(|| EcsError::InvalidRef {
                entity: entity.to_string(),
            })?;
        let mut holder = Holder::new();
        for (id, value) in chunk.clone_row(location.row as usize) {
            let vtable = self
                .registry
                .vtable(id)
                .ok_or(EcsError::UnregisteredComponent { id })?;
            holder.insert_erased(id, value, vtable.clone_fn);
        }
        Ok(holder)
    }

    // -- archetypes ---------------------------------------------------------

    /// The archetype with exactly `signature`, created if needed.
    ///
    /// Order and duplicates in `signature` do not matter.
    pub fn archetype_for(&mut self, signature: &[ComponentTypeId]) -> Result<&Archetype, EcsError> {
        let id = self.archetype_id_for(signature)?;
        Ok(&self.archetypes[id.index()])
    }

    fn archetype_id_for(&mut self, signature: &[ComponentTypeId]) -> Result<ArchetypeId, EcsError> {
        let mut key = signature.to_vec();
        key.sort_unstable();
        key.dedup();
        if let Some(id) = self.archetype_index.get(&key) {
            return Ok(*id);
        }

        let factories = key
            .iter()
            .map(|&cid| {
                self.registry
                    .vtable(cid)
                    .map(|vtable| (cid, vtable.new_column))
                    .ok_or(EcsError::UnregisteredComponent { id: cid })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let id = ArchetypeId(self.archetypes.len() as u32);
        self.archetypes
            .push(Archetype::new(id, factories, self.config.chunk_capacity));
        self.archetype_index.insert(key, id);
        debug!(
            store = %self.id,
            archetype = id.0,
            signature = ?self.archetypes[id.index()].signature(),
            "archetype created"
        );
        Ok(id)
    }

    /// All archetypes, in creation order.
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub(crate) fn archetypes_and_commands(&mut self) -> (&mut [Archetype], &mut CommandBuffer<D>) {
        (&mut self.archetypes, &mut self.commands)
    }

    // -- queries ------------------------------------------------------------

    /// Non-empty chunks of every archetype matching `query`.
    pub fn query_chunks<'a>(
        &'a self,
        query: &'a Query<D>,
    ) -> impl Iterator<Item = &'a ArchetypeChunk> + 'a {
        self.archetypes
            .iter()
            .filter(move |a| query.matches(a))
            .flat_map(|a| a.chunks().iter())
            .filter(|c| !c.is_empty())
    }

    /// Visit every non-empty chunk matching `query` with mutable column
    /// access. Structural changes still go through [`commands`](Self::commands).
    pub fn for_each_chunk_mut<F>(&mut self, query: &Query<D>, mut f: F)
    where
        F: FnMut(&mut ArchetypeChunk),
    {
        for archetype in &mut self.archetypes {
            if !query.matches(archetype) {
                continue;
            }
            for chunk in archetype.chunks_mut() {
                if !chunk.is_empty() {
                    f(chunk);
                }
            }
        }
    }

    // -- resources ----------------------------------------------------------

    /// Resource behind `ty`.
    pub fn get_resource<R: Resource>(&self, ty: &ResourceType<D, R>) -> Result<&R, EcsError> {
        self.resources.get(ty)
    }

    /// Mutable resource behind `ty`.
    pub fn get_resource_mut<R: Resource>(
        &mut self,
        ty: &ResourceType<D, R>,
    ) -> Result<&mut R, EcsError> {
        self.resources.get_mut(ty)
    }

    /// Resource of type `R`.
    pub fn resource<R: Resource>(&self) -> Result<&R, EcsError> {
        self.resources.by_type::<R>()
    }

    /// Mutable resource of type `R`.
    pub fn resource_mut<R: Resource>(&mut self) -> Result<&mut R, EcsError> {
        self.resources.by_type_mut::<R>()
    }

    /// Handle of resource `R`, if registered.
    pub fn resource_type<R: Resource>(&self) -> Option<ResourceType<D, R>> {
        self.resources.handle::<R>()
    }

    // -- commands -----------------------------------------------------------

    /// The buffer drained at the next flush point.
    pub fn commands(&mut self) -> &mut CommandBuffer<D> {
        &mut self.commands
    }

    /// A fresh detached buffer for this store. Merge it with
    /// [`CommandBuffer::append`].
    pub fn new_command_buffer(&self) -> CommandBuffer<D> {
        CommandBuffer::new(self.id)
    }

    /// Apply every queued command in FIFO order.
    fn flush(&mut self) -> ApplyReport {
        let commands = self.commands.take();
        let mut report = ApplyReport::default();
        for command in commands {
            let kind = command.kind();
            let reason = command.reason();
            let entity = command.entity().clone();
            match self.apply(command, &mut report) {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    report.skipped += 1;
                    warn!(
                        store = %self.id,
                        command = kind,
                        entity = %entity,
                        reason = reason.unwrap_or("none"),
                        error = %err,
                        "command skipped"
                    );
                }
            }
        }
        if report.total() > 0 {
            debug!(
                store = %self.id,
                applied = report.applied,
                skipped = report.skipped,
                spawned = report.spawned,
                loaded = report.loaded,
                removed = report.removed,
                unloaded = report.unloaded,
                "command buffer flushed"
            );
        }
        report
    }

    fn apply(&mut self, command: Command<D>, report: &mut ApplyReport) -> Result<(), EcsError> {
        match command {
            Command::AddEntity {
                entity,
                template,
                reason,
            } => {
                self.spawn(&entity, template)?;
                report.record_added(reason);
                debug!(
                    store = %self.id,
                    entity = %entity,
                    reason = reason.as_str(),
                    "entity added"
                );
                Ok(())
            }
            Command::RemoveEntity { entity, reason } => {
                self.despawn(&entity)?;
                report.record_removed(reason);
                debug!(
                    store = %self.id,
                    entity = %entity,
                    reason = reason.as_str(),
                    "entity removed"
                );
                Ok(())
            }
            Command::AddComponent {
                entity,
                component,
                value,
            } => {
                let location = self.resolve(&entity)?;
                self.registry.check_value(component, &value)?;
                self.insert_component(&entity, location, component, value)
            }
            Command::AddDefaultComponent { entity, component } => {
                let location = self.resolve(&entity)?;
                let vtable = self
                    .registry
                    .vtable(component)
                    .ok_or(EcsError::UnregisteredComponent { id: component })?;
                let factory = vtable
                    .factory
                    .as_ref()
                    .ok_or_else(|| EcsError::MissingDefault {
                        component: self.registry.name_of(component).to_owned(),
                    })?;
                let value = factory();
                self.insert_component(&entity, location, component, value)
            }
            Command::RemoveComponent { entity, component } => {
                let location = self.resolve(&entity)?;
                if self.registry.vtable(component).is_none() {
                    return Err(EcsError::UnregisteredComponent { id: component });
                }
                if !self.archetypes[location.archetype.index()].contains(component) {
                    return Ok(());
                }
                self.migrate(&entity, location, Change::Remove(component))
            }
        }
    }

    fn spawn(&mut self, entity: &Ref, template: Holder<D>) -> Result<(), EcsError> {
        if entity.store_id() != self.id {
            return Err(EcsError::ForeignRef {
                entity: entity.to_string(),
                owner: entity.store_id(),
                store: self.id,
            });
        }
        if !entity.is_pending() {
            return Err(EcsError::InvalidRef {
                entity: entity.to_string(),
            });
        }
        let values = template.into_sorted_values();
        for (id, value) in &values {
            self.registry.check_value(*id, value)?;
        }
        let signature: Vec<ComponentTypeId> = values.iter().map(|(id, _)| *id).collect();
        let archetype = self.archetype_id_for(&signature)?;
        let (chunk, row) = self.archetypes[archetype.index()].insert(entity.clone(), values)?;
        self.entities.insert(
            entity,
            EntityLocation {
                archetype,
                chunk,
                row,
            },
        );
        Ok(())
    }

    fn despawn(&mut self, entity: &Ref) -> Result<(), EcsError> {
        let location = self.resolve(entity)?;
        self.entities.remove(entity);
        let moved = self
            .chunk_at_mut(location)
            .and_then(|chunk| chunk.swap_remove(location.row as usize));
        if let Some(moved) = moved {
            self.entities.set_location(&moved, location);
        }
        Ok(())
    }

    /// Overwrite in place if present, migrate otherwise.
    fn insert_component(
        &mut self,
        entity: &Ref,
        location: EntityLocation,
        component: ComponentTypeId,
        value: BoxedComponent,
    ) -> Result<(), EcsError> {
        if self.archetypes[location.archetype.index()].contains(component) {
            return self
                .chunk_at_mut(location)
                .ok_or_else(|| EcsError::InvalidRef {
                    entity: entity.to_string(),
                })?
                .replace(component, location.row as usize, value);
        }
        self.migrate(entity, location, Change::Add(component, value))
    }

    /// Move `entity` to the archetype its signature has after `change`.
    fn migrate(
        &mut self,
        entity: &Ref,
        location: EntityLocation,
        change: Change,
    ) -> Result<(), EcsError> {
        let mut signature = self.archetypes[location.archetype.index()]
            .signature()
            .to_vec();
        match &change {
            Change::Add(id, _) => signature.push(*id),
            Change::Remove(id) => signature.retain(|c| c != id),
        }
        let destination = self.archetype_id_for(&signature)?;

        let chunk = self
            .chunk_at_mut(location)
            .ok_or_else(|| EcsError::InvalidRef {
                entity: entity.to_string(),
            })?;
        let (mut values, moved) = chunk.swap_take(location.row as usize);
        if let Some(moved) = moved {
            self.entities.set_location(&moved, location);
        }

        match change {
            Change::Add(id, value) => {
                values.push((id, value));
                values.sort_by_key(|(cid, _)| *cid);
            }
            Change::Remove(id) => values.retain(|(cid, _)| *cid != id),
        }

        match self.archetypes[destination.index()].insert(entity.clone(), values) {
            Ok((chunk, row)) => {
                self.entities.set_location(
                    entity,
                    EntityLocation {
                        archetype: destination,
                        chunk,
                        row,
                    },
                );
                Ok(())
            }
            Err(err) => {
                // The values are gone with the failed insert; drop the entity
                // rather than leave its slot pointing at another row.
                self.entities.remove(entity);
                error!(
                    store = %self.id,
                    entity = %entity,
                    error = %err,
                    "migration failed, entity dropped"
                );
                Err(err)
            }
        }
    }

    // -- ticking ------------------------------------------------------------

    /// Run one tick: flush, systems in order, flush.
    ///
    /// A system returning `Err` is logged and recorded in
    /// [`TickDiagnostics::failed_systems`]; the remaining systems still run.
    ///
    /// # Errors
    ///
    /// [`EcsError::StoreShutDown`] after [`shutdown`](Self::shutdown).
    pub fn tick(&mut self, dt: f32) -> Result<(), EcsError> {
        match self.state {
            StoreState::ShutDown => return Err(EcsError::StoreShutDown),
            StoreState::Setup => {
                self.registry.freeze();
                self.state = StoreState::Running;
                info!(
                    store = %self.id,
                    name = %self.config.name,
                    components = self.registry.len(),
                    systems = self.scheduler.len(),
                    "store started"
                );
            }
            StoreState::Running => {}
        }
        self.scheduler.activate();

        let tick_start = Instant::now();
        let pre_flush = self.flush();
        let mut command_apply_time = tick_start.elapsed();

        let order = self.scheduler.order().to_vec();
        let mut slots = self.scheduler.take_slots();
        let mut system_times = Vec::with_capacity(order.len());
        let mut failed_systems = Vec::new();
        for index in order {
            let Some(slot) = slots.get_mut(index) else {
                continue;
            };
            slot.cache.refresh(&self.archetypes);
            let started = Instant::now();
            let result = {
                let mut ctx = SystemContext::new(self, &slot.cache);
                slot.system.tick(dt, &mut ctx)
            };
            system_times.push((slot.name.clone(), started.elapsed()));
            if let Err(err) = result {
                error!(
                    store = %self.id,
                    system = %slot.name,
                    tick = self.tick_count,
                    error = %err,
                    "system failed"
                );
                failed_systems.push(slot.name.clone());
            }
        }
        self.scheduler.restore_slots(slots);

        let apply_start = Instant::now();
        let post_flush = self.flush();
        command_apply_time += apply_start.elapsed();

        self.tick_count += 1;
        self.last_diagnostics = TickDiagnostics {
            system_times,
            failed_systems,
            pre_flush,
            post_flush,
            command_apply_time,
            total_time: tick_start.elapsed(),
        };
        Ok(())
    }

    /// Unregister every system in reverse tick order and stop ticking.
    pub fn shutdown(&mut self) {
        if self.state == StoreState::ShutDown {
            return;
        }
        self.scheduler.shutdown();
        self.state = StoreState::ShutDown;
        info!(
            store = %self.id,
            name = %self.config.name,
            ticks = self.tick_count,
            "store shut down"
        );
    }

    // -- inspection ---------------------------------------------------------

    /// Identity stamped into every `Ref` this store creates.
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// The configuration the store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The component registry.
    pub fn registry(&self) -> &ComponentRegistry<D> {
        &self.registry
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of archetypes ever created.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Number of registered resources.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Completed ticks.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.state == StoreState::ShutDown
    }

    /// System names in tick order.
    pub fn system_order(&self) -> Vec<&str> {
        self.scheduler.names_in_order()
    }

    /// Lifecycle state of system `S`; `None` if not registered.
    pub fn system_state<S: System<D>>(&self) -> Option<SystemState> {
        self.scheduler.state_of(SystemKey::of::<S>())
    }

    /// Dependency levels and disjoint batches over the current archetypes.
    pub fn execution_plan(&self) -> ExecutionPlan {
        self.scheduler.plan(&self.archetypes)
    }

    /// Diagnostics of the most recent tick.
    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }
}

impl<D: StoreDomain> fmt::Debug for Store<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("domain", &D::NAME)
            .field("name", &self.config.name)
            .field("entities", &self.entities.len())
            .field("archetypes", &self.archetypes.len())
            .field("systems", &self.scheduler)
            .field("resources", &self.resources)
            .field("state", &self.state)
            .field("tick_count", &self.tick_count)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
