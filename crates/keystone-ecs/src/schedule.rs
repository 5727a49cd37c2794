//! Deterministic system ordering.
//!
//! Systems form a directed graph from their declared [`Dependency`] edges.
//! The tick order is a topological sort (Kahn's algorithm) in which every
//! choice between unconstrained systems goes to the one registered first,
//! so two systems without an edge between them always run in registration
//! order.
//!
//! Cycles are rejected when the offending system is registered, with an
//! error naming the systems on the cycle. The scheduler is left exactly as
//! it was before the call.
//!
//! [`ExecutionPlan`] groups systems into dependency levels and, within a
//! level, into batches whose matched archetypes are pairwise disjoint. The
//! store still runs systems one at a time; the plan describes which systems
//! could share a level without touching the same chunks.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use tracing::info;

use crate::archetype::{Archetype, ArchetypeId};
use crate::domain::StoreDomain;
use crate::query::QueryCache;
use crate::system::{Dependency, System, SystemKey, SystemState};
use crate::EcsError;

// ---------------------------------------------------------------------------
// SystemSlot
// ---------------------------------------------------------------------------

/// A registered system with its scheduling metadata.
pub(crate) struct SystemSlot<D: StoreDomain> {
    pub(crate) key: SystemKey,
    pub(crate) name: String,
    pub(crate) system: Box<dyn System<D>>,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) cache: QueryCache<D>,
    pub(crate) state: SystemState,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Registered systems in registration order plus the computed tick order.
pub(crate) struct Scheduler<D: StoreDomain> {
    /// Registration order.
    slots: Vec<SystemSlot<D>>,
    /// Indices into `slots`, in tick order.
    order: Vec<usize>,
}

impl<D: StoreDomain> Scheduler<D> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Validate and add a system, recomputing the tick order.
    pub(crate) fn register<S: System<D>>(&mut self, system: S) -> Result<(), EcsError> {
        let key = SystemKey::of::<S>();
        let name = system.name().to_owned();
        if self.slots.iter().any(|s| s.key == key) {
            return Err(EcsError::DuplicateSystem { name });
        }

        let dependencies = system.dependencies();
        let query = system.query();
        self.slots.push(SystemSlot {
            key,
            name: name.clone(),
            system: Box::new(system),
            dependencies,
            cache: QueryCache::new(query),
            state: SystemState::Registered,
        });

        match topological_order(&self.slots) {
            Ok(order) => {
                self.order = order;
                if let Some(slot) = self.slots.last_mut() {
                    slot.system.on_system_registered();
                }
                info!(system = %name, domain = D::NAME, "system registered");
                Ok(())
            }
            Err(systems) => {
                self.slots.pop();
                Err(EcsError::DependencyCycle { systems })
            }
        }
    }

    /// Remove the system of type `key`, firing its unregister hook.
    pub(crate) fn unregister(&mut self, key: SystemKey) -> Result<(), EcsError> {
        let index = self
            .slots
            .iter()
            .position(|s| s.key == key)
            .ok_or_else(|| EcsError::UnknownSystem {
                name: key.type_name().to_owned(),
            })?;
        let mut slot = self.slots.remove(index);
        slot.system.on_system_unregistered();
        info!(system = %slot.name, domain = D::NAME, "system unregistered");

        // Removing a node cannot create a cycle.
        self.order = topological_order(&self.slots).unwrap_or_default();
        Ok(())
    }

    /// Unregister everything in reverse tick order.
    pub(crate) fn shutdown(&mut self) {
        for &index in self.order.iter().rev() {
            let slot = &mut self.slots[index];
            slot.system.on_system_unregistered();
            info!(system = %slot.name, domain = D::NAME, "system unregistered");
        }
        self.slots.clear();
        self.order.clear();
    }

    /// Mark every registered system as active.
    pub(crate) fn activate(&mut self) {
        for slot in &mut self.slots {
            slot.state = SystemState::Active;
        }
    }

    pub(crate) fn state_of(&self, key: SystemKey) -> Option<SystemState> {
        self.slots.iter().find(|s| s.key == key).map(|s| s.state)
    }

    /// Names in tick order.
    pub(crate) fn names_in_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&i| self.slots[i].name.as_str())
            .collect()
    }

    pub(crate) fn order(&self) -> &[usize] {
        &self.order
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Detach the slots for the duration of a tick.
    pub(crate) fn take_slots(&mut self) -> Vec<SystemSlot<D>> {
        std::mem::take(&mut self.slots)
    }

    pub(crate) fn restore_slots(&mut self, slots: Vec<SystemSlot<D>>) {
        self.slots = slots;
    }

    /// Group systems into dependency levels and disjoint batches.
    pub(crate) fn plan(&self, archetypes: &[Archetype]) -> ExecutionPlan {
        let preds = predecessors(&self.slots);
        let mut level_of = vec![0usize; self.slots.len()];
        for &i in &self.order {
            let level = preds[i].iter().map(|&p| level_of[p] + 1).max();
            level_of[i] = level.unwrap_or(0);
        }

        let depth = self.order.iter().map(|&i| level_of[i] + 1).max().unwrap_or(0);
        let mut levels: Vec<PlanLevel> = (0..depth).map(|_| PlanLevel::default()).collect();
        for &i in &self.order {
            let slot = &self.slots[i];
            let matched: BTreeSet<ArchetypeId> = archetypes
                .iter()
                .filter(|a| slot.cache.query().matches(a))
                .map(Archetype::id)
                .collect();
            levels[level_of[i]].place(slot.name.clone(), matched);
        }
        ExecutionPlan { levels }
    }
}

impl<D: StoreDomain> fmt::Debug for Scheduler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("order", &self.names_in_order())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// `preds[i]` lists the slots that must run before slot `i`.
fn predecessors<D: StoreDomain>(slots: &[SystemSlot<D>]) -> Vec<Vec<usize>> {
    let index_of: HashMap<SystemKey, usize> =
        slots.iter().enumerate().map(|(i, s)| (s.key, i)).collect();
    let mut preds = vec![Vec::new(); slots.len()];
    for (i, slot) in slots.iter().enumerate() {
        for dep in &slot.dependencies {
            let (from, to) = match *dep {
                Dependency::After(key) => match index_of.get(&key) {
                    Some(&j) => (j, i),
                    None => continue,
                },
                Dependency::Before(key) => match index_of.get(&key) {
                    Some(&j) => (i, j),
                    None => continue,
                },
            };
            if from != to && !preds[to].contains(&from) {
                preds[to].push(from);
            }
        }
    }
    preds
}

/// Kahn's algorithm, ready set ordered by registration index.
///
/// On a cycle returns the names of the systems on it.
fn topological_order<D: StoreDomain>(slots: &[SystemSlot<D>]) -> Result<Vec<usize>, Vec<String>> {
    let preds = predecessors(slots);
    let mut succs = vec![Vec::new(); slots.len()];
    let mut in_degree = vec![0usize; slots.len()];
    for (to, from_list) in preds.iter().enumerate() {
        in_degree[to] = from_list.len();
        for &from in from_list {
            succs[from].push(to);
        }
    }

    let mut ready: BTreeSet<usize> = (0..slots.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(slots.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &succ in &succs[next] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                ready.insert(succ);
            }
        }
    }

    if order.len() == slots.len() {
        return Ok(order);
    }

    // Whatever Kahn could not drain is on a cycle or downstream of one.
    // Peel off nodes with no successor left in the set until only cycle
    // members remain.
    let mut remaining: BTreeSet<usize> = (0..slots.len()).filter(|&i| in_degree[i] > 0).collect();
    loop {
        let sinks: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| !succs[i].iter().any(|s| remaining.contains(s)))
            .collect();
        if sinks.is_empty() {
            break;
        }
        for sink in sinks {
            remaining.remove(&sink);
        }
    }
    Err(remaining.into_iter().map(|i| slots[i].name.clone()).collect())
}

// ---------------------------------------------------------------------------
// ExecutionPlan
// ---------------------------------------------------------------------------

/// Systems that could run side by side: no dependency between them and no
/// archetype in common.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanBatch {
    /// System names, in tick order.
    pub systems: Vec<String>,
    /// Union of the archetypes matched by the batch's systems.
    pub archetypes: BTreeSet<ArchetypeId>,
}

/// Systems whose longest dependency chain has the same length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanLevel {
    /// Disjoint batches, first-fit in tick order.
    pub batches: Vec<PlanBatch>,
}

impl PlanLevel {
    fn place(&mut self, system: String, matched: BTreeSet<ArchetypeId>) {
        let slot = self
            .batches
            .iter_mut()
            .find(|b| b.archetypes.is_disjoint(&matched));
        match slot {
            Some(batch) => {
                batch.systems.push(system);
                batch.archetypes.extend(matched);
            }
            None => self.batches.push(PlanBatch {
                systems: vec![system],
                archetypes: matched,
            }),
        }
    }
}

/// Dependency levels of the current system set, see
/// [`Store::execution_plan`](crate::store::Store::execution_plan).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Levels in execution order.
    pub levels: Vec<PlanLevel>,
}

impl ExecutionPlan {
    /// Number of systems in the plan.
    pub fn system_count(&self) -> usize {
        self.levels
            .iter()
            .flat_map(|l| &l.batches)
            .map(|b| b.systems.len())
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
