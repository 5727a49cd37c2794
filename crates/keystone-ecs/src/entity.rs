//! Entity references and slot bookkeeping.
//!
//! A [`Ref`] is a shared handle: every clone of it observes the same slot
//! index. When the store destroys the entity it writes the invalid sentinel
//! into that shared index, so all aliases report `is_valid() == false` at
//! once. A slot index is recycled only after the old `Ref` was invalidated,
//! and the new entity gets a fresh handle, so a stale alias can never
//! resolve to the entity that inherited its index.

use std::collections::VecDeque;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::archetype::ArchetypeId;

// ---------------------------------------------------------------------------
// StoreId
// ---------------------------------------------------------------------------

/// Identity of a single [`Store`](crate::store::Store) instance.
///
/// Refs carry the id of the store that created them; a store rejects refs
/// minted by any other store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(u32);

impl StoreId {
    /// Allocate a process-unique store id.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric id.
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Ref
// ---------------------------------------------------------------------------

struct RefSlot {
    store: StoreId,
    index: AtomicU32,
}

/// Opaque handle to an entity: `(store identity, slot index)`.
///
/// Cloning a `Ref` creates an alias that shares the slot index. Equality and
/// hashing are by handle identity, not by index.
pub struct Ref {
    slot: Arc<RefSlot>,
}

impl Ref {
    /// Sentinel index of a destroyed entity.
    pub const INVALID_INDEX: u32 = u32::MAX;
    /// Index of an entity queued for creation but not yet flushed.
    pub const PENDING_INDEX: u32 = u32::MAX - 1;

    /// A handle that will be bound to a slot when its `AddEntity` command
    /// is applied.
    pub(crate) fn pending(store: StoreId) -> Self {
        Self {
            slot: Arc::new(RefSlot {
                store,
                index: AtomicU32::new(Self::PENDING_INDEX),
            }),
        }
    }

    /// The store that created this handle.
    #[inline]
    pub fn store_id(&self) -> StoreId {
        self.slot.store
    }

    /// The raw slot index, including the sentinel values.
    #[inline]
    pub fn raw_index(&self) -> u32 {
        self.slot.index.load(Ordering::Acquire)
    }

    /// The slot index if the entity currently exists.
    #[inline]
    pub fn index(&self) -> Option<u32> {
        let index = self.raw_index();
        (index < Self::PENDING_INDEX).then_some(index)
    }

    /// Whether the entity currently exists in its store.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.index().is_some()
    }

    /// Whether the entity is queued for creation and not yet flushed.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.raw_index() == Self::PENDING_INDEX
    }

    pub(crate) fn bind(&self, index: u32) {
        debug_assert!(index < Self::PENDING_INDEX);
        self.slot.index.store(index, Ordering::Release);
    }

    pub(crate) fn invalidate(&self) {
        self.slot.index.store(Self::INVALID_INDEX, Ordering::Release);
    }
}

impl Clone for Ref {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl Eq for Ref {}

impl Hash for Ref {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.slot) as usize).hash(state);
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw_index() {
            Self::INVALID_INDEX => write!(f, "Ref(invalid@{})", self.slot.store),
            Self::PENDING_INDEX => write!(f, "Ref(pending@{})", self.slot.store),
            index => write!(f, "Ref({index}@{})", self.slot.store),
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// EntityLocation
// ---------------------------------------------------------------------------

/// Where an entity lives right now: archetype, chunk within the archetype,
/// and row within the chunk.
///
/// Only valid until the next command-buffer flush; structural changes move
/// entities between rows, chunks, and archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    /// Archetype holding the entity.
    pub archetype: ArchetypeId,
    /// Chunk index inside the archetype.
    pub chunk: u32,
    /// Row inside the chunk.
    pub row: u32,
}

// ---------------------------------------------------------------------------
// EntitySlots
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SlotEntry {
    entity: Ref,
    location: EntityLocation,
}

/// Slot table mapping slot index to the live `Ref` and its location.
///
/// Free indices are kept in a FIFO queue so recycling is spread over the
/// whole table instead of hammering one hot index.
#[derive(Debug, Default)]
pub(crate) struct EntitySlots {
    slots: Vec<Option<SlotEntry>>,
    free_indices: VecDeque<u32>,
    live: usize,
}

impl EntitySlots {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Bind a pending `Ref` to a slot and record its location.
    pub(crate) fn insert(&mut self, entity: &Ref, location: EntityLocation) -> u32 {
        let entry = SlotEntry {
            entity: entity.clone(),
            location,
        };
        let index = match self.free_indices.pop_front() {
            Some(index) => {
                self.slots[index as usize] = Some(entry);
                index
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Some(entry));
                index
            }
        };
        entity.bind(index);
        self.live += 1;
        index
    }

    /// Release the slot held by `entity` and invalidate every alias.
    pub(crate) fn remove(&mut self, entity: &Ref) -> Option<EntityLocation> {
        let index = entity.index()?;
        let slot = self.slots.get_mut(index as usize)?;
        if !slot.as_ref().is_some_and(|e| e.entity == *entity) {
            return None;
        }
        let entry = slot.take()?;
        entry.entity.invalidate();
        self.free_indices.push_back(index);
        self.live -= 1;
        Some(entry.location)
    }

    pub(crate) fn location(&self, entity: &Ref) -> Option<EntityLocation> {
        self.entry(entity).map(|e| e.location)
    }

    pub(crate) fn set_location(&mut self, entity: &Ref, location: EntityLocation) {
        if let Some(entry) = self.entry_mut(entity) {
            entry.location = location;
        }
    }

    /// Number of live entities.
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    fn entry(&self, entity: &Ref) -> Option<&SlotEntry> {
        let index = entity.index()? as usize;
        self.slots
            .get(index)?
            .as_ref()
            .filter(|e| e.entity == *entity)
    }

    fn entry_mut(&mut self, entity: &Ref) -> Option<&mut SlotEntry> {
        let index = entity.index()? as usize;
        self.slots
            .get_mut(index)?
            .as_mut()
            .filter(|e| e.entity == *entity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
