//! Archetype storage for the ECS.
//!
//! An [`Archetype`] owns every entity whose component set is exactly its
//! signature. Entities are packed into fixed-capacity [`ArchetypeChunk`]s laid
//! out Structure-of-Arrays style: one column per component type plus a
//! parallel `Vec<Ref>` mapping row to entity.
//!
//! Occupied rows of a chunk are always the prefix `[0, len)`. Removal is a
//! swap-remove: the last row moves into the freed one, so row order inside a
//! chunk is NOT stable across structural changes. Iteration order over a
//! query is therefore unspecified from one tick to the next.
//!
//! Columns are type-erased behind [`ErasedColumn`]. Dispatch happens once per
//! column access, never per value; typed slices come out of a single
//! downcast and are iterated directly.

use std::any::Any;
use std::fmt;

use tracing::debug;

use crate::component::{BoxedComponent, Component, ComponentType, ComponentTypeId, NewColumnFn};
use crate::entity::Ref;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Identifies an archetype within a store. Indices into the store's archetype
/// list; archetypes are never destroyed so ids stay valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    /// Position in the store's archetype list.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// A densely packed column of one component type with the type erased.
pub(crate) trait ErasedColumn: Send + Sync {
    fn len(&self) -> usize;
    /// Whether `value` has this column's element type.
    fn accepts(&self, value: &BoxedComponent) -> bool;
    /// Append a value; hands it back if the type does not match.
    fn push(&mut self, value: BoxedComponent) -> Result<(), BoxedComponent>;
    /// Drop the value at `row`, moving the last value into its place.
    fn swap_remove(&mut self, row: usize);
    /// Like [`swap_remove`](Self::swap_remove) but returns the value.
    fn swap_take(&mut self, row: usize) -> BoxedComponent;
    /// Overwrite the value at `row`; hands it back on type mismatch.
    fn replace(&mut self, row: usize, value: BoxedComponent) -> Result<(), BoxedComponent>;
    fn clone_at(&self, row: usize) -> Option<BoxedComponent>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Concrete storage behind an [`ErasedColumn`].
pub(crate) struct TypedColumn<T> {
    values: Vec<T>,
}

impl<T: Component> TypedColumn<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }
}

impl<T: Component> ErasedColumn for TypedColumn<T> {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn accepts(&self, value: &BoxedComponent) -> bool {
        value.is::<T>()
    }

    fn push(&mut self, value: BoxedComponent) -> Result<(), BoxedComponent> {
        let typed = value.downcast::<T>()?;
        self.values.push(*typed);
        Ok(())
    }

    fn swap_remove(&mut self, row: usize) {
        self.values.swap_remove(row);
    }

    fn swap_take(&mut self, row: usize) -> BoxedComponent {
        Box::new(self.values.swap_remove(row))
    }

    fn replace(&mut self, row: usize, value: BoxedComponent) -> Result<(), BoxedComponent> {
        let Some(slot) = self.values.get_mut(row) else {
            return Err(value);
        };
        *slot = *value.downcast::<T>()?;
        Ok(())
    }

    fn clone_at(&self, row: usize) -> Option<BoxedComponent> {
        self.values
            .get(row)
            .map(|v| Box::new(v.clone()) as BoxedComponent)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn typed<T: Component>(column: &dyn ErasedColumn) -> Option<&[T]> {
    column
        .as_any()
        .downcast_ref::<TypedColumn<T>>()
        .map(|c| c.values.as_slice())
}

fn typed_mut<T: Component>(column: &mut dyn ErasedColumn) -> Option<&mut [T]> {
    column
        .as_any_mut()
        .downcast_mut::<TypedColumn<T>>()
        .map(|c| c.values.as_mut_slice())
}

// ---------------------------------------------------------------------------
// ArchetypeChunk
// ---------------------------------------------------------------------------

/// Fixed-capacity columnar block of entities sharing one archetype.
///
/// Row `i` of every column and of [`entities`](Self::entities) belongs to the
/// same entity. Chunks never grow past their capacity; the archetype adds a
/// new chunk instead.
pub struct ArchetypeChunk {
    capacity: usize,
    entities: Vec<Ref>,
    /// Sorted by `ComponentTypeId`, mirrors the archetype signature.
    columns: Vec<(ComponentTypeId, Box<dyn ErasedColumn>)>,
}

impl ArchetypeChunk {
    pub(crate) fn new(capacity: usize, factories: &[(ComponentTypeId, NewColumnFn)]) -> Self {
        Self {
            capacity,
            entities: Vec::with_capacity(capacity),
            columns: factories
                .iter()
                .map(|(id, new_column)| (*id, new_column(capacity)))
                .collect(),
        }
    }

    /// Number of occupied rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether no rows are occupied.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Maximum number of rows.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether every row is occupied.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.entities.len() >= self.capacity
    }

    /// Entity handles by row.
    #[inline]
    pub fn entities(&self) -> &[Ref] {
        &self.entities
    }

    /// Entity handle at `row`.
    pub fn entity(&self, row: usize) -> Option<&Ref> {
        self.entities.get(row)
    }

    /// Whether the chunk stores component `id`.
    pub fn contains(&self, id: ComponentTypeId) -> bool {
        self.column_index(id).is_some()
    }

    #[inline]
    fn column_index(&self, id: ComponentTypeId) -> Option<usize> {
        self.columns.binary_search_by_key(&id, |(cid, _)| *cid).ok()
    }

    /// All values of component `T`, indexed by row.
    pub fn column<D, T: Component>(&self, ty: &ComponentType<D, T>) -> Option<&[T]> {
        let idx = self.column_index(ty.id())?;
        typed::<T>(self.columns[idx].1.as_ref())
    }

    /// Mutable values of component `T`, indexed by row.
    pub fn column_mut<D, T: Component>(&mut self, ty: &ComponentType<D, T>) -> Option<&mut [T]> {
        let idx = self.column_index(ty.id())?;
        typed_mut::<T>(self.columns[idx].1.as_mut())
    }

    /// Two distinct columns borrowed mutably at once.
    ///
    /// Returns `None` if either type is missing or both handles name the same
    /// component.
    pub fn column_pair_mut<D, A: Component, B: Component>(
        &mut self,
        a: &ComponentType<D, A>,
        b: &ComponentType<D, B>,
    ) -> Option<(&mut [A], &mut [B])> {
        let ia = self.column_index(a.id())?;
        let ib = self.column_index(b.id())?;
        if ia == ib {
            return None;
        }
        let (col_a, col_b) = if ia < ib {
            let (left, right) = self.columns.split_at_mut(ib);
            (&mut left[ia].1, &mut right[0].1)
        } else {
            let (left, right) = self.columns.split_at_mut(ia);
            (&mut right[0].1, &mut left[ib].1)
        };
        Some((typed_mut::<A>(col_a.as_mut())?, typed_mut::<B>(col_b.as_mut())?))
    }

    /// Component `T` of the entity at `row`.
    pub fn get<D, T: Component>(&self, ty: &ComponentType<D, T>, row: usize) -> Option<&T> {
        self.column(ty)?.get(row)
    }

    /// Mutable component `T` of the entity at `row`.
    pub fn get_mut<D, T: Component>(
        &mut self,
        ty: &ComponentType<D, T>,
        row: usize,
    ) -> Option<&mut T> {
        self.column_mut(ty)?.get_mut(row)
    }

    // -- structural operations (store only) ---------------------------------

    /// Append an entity. `values` must be sorted by id and match the
    /// chunk's columns exactly.
    pub(crate) fn push(
        &mut self,
        entity: Ref,
        values: Vec<(ComponentTypeId, BoxedComponent)>,
    ) -> Result<u32, EcsError> {
        if self.is_full() {
            return Err(EcsError::ChunkFull {
                capacity: self.capacity,
            });
        }
        if values.len() != self.columns.len() {
            return Err(EcsError::SignatureMismatch);
        }
        for ((id, value), (column_id, column)) in values.iter().zip(&self.columns) {
            if id != column_id {
                return Err(EcsError::SignatureMismatch);
            }
            if !column.accepts(value) {
                return Err(EcsError::ComponentTypeMismatch {
                    component: format!("{id:?}"),
                });
            }
        }

        let row = self.entities.len() as u32;
        for ((id, value), (_, column)) in values.into_iter().zip(&mut self.columns) {
            if column.push(value).is_err() {
                return Err(EcsError::ComponentTypeMismatch {
                    component: format!("{id:?}"),
                });
            }
        }
        self.entities.push(entity);
        Ok(row)
    }

    /// Remove the entity at `row`, dropping its components.
    ///
    /// Returns the entity that was moved into `row`, if any.
    pub(crate) fn swap_remove(&mut self, row: usize) -> Option<Ref> {
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        for (_, column) in &mut self.columns {
            column.swap_remove(row);
        }
        (row < last).then(|| self.entities[row].clone())
    }

    /// Remove the entity at `row` and hand back its components, sorted by id.
    ///
    /// Returns the extracted values and the entity moved into `row`, if any.
    pub(crate) fn swap_take(
        &mut self,
        row: usize,
    ) -> (Vec<(ComponentTypeId, BoxedComponent)>, Option<Ref>) {
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        let values = self
            .columns
            .iter_mut()
            .map(|(id, column)| (*id, column.swap_take(row)))
            .collect();
        let moved = (row < last).then(|| self.entities[row].clone());
        (values, moved)
    }

    /// Clone every component of the entity at `row`, sorted by id.
    pub(crate) fn clone_row(&self, row: usize) -> Vec<(ComponentTypeId, BoxedComponent)> {
        self.columns
            .iter()
            .filter_map(|(id, column)| column.clone_at(row).map(|value| (*id, value)))
            .collect()
    }

    /// Overwrite one component of the entity at `row`.
    pub(crate) fn replace(
        &mut self,
        id: ComponentTypeId,
        row: usize,
        value: BoxedComponent,
    ) -> Result<(), EcsError> {
        let idx = self.column_index(id).ok_or(EcsError::SignatureMismatch)?;
        self.columns[idx]
            .1
            .replace(row, value)
            .map_err(|_| EcsError::ComponentTypeMismatch {
                component: format!("{id:?}"),
            })
    }
}

impl fmt::Debug for ArchetypeChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchetypeChunk")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field(
                "columns",
                &self.columns.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// All entities sharing one exact component signature.
///
/// The signature is sorted, so the same set of component types always maps
/// to the same archetype no matter the order components were added in.
pub struct Archetype {
    id: ArchetypeId,
    /// Sorted, deduplicated component ids.
    signature: Vec<ComponentTypeId>,
    /// Column constructors, parallel to `signature`.
    factories: Vec<(ComponentTypeId, NewColumnFn)>,
    chunk_capacity: usize,
    chunks: Vec<ArchetypeChunk>,
}

impl Archetype {
    /// `factories` must be sorted by id and is the signature.
    pub(crate) fn new(
        id: ArchetypeId,
        factories: Vec<(ComponentTypeId, NewColumnFn)>,
        chunk_capacity: usize,
    ) -> Self {
        Self {
            id,
            signature: factories.iter().map(|(cid, _)| *cid).collect(),
            factories,
            chunk_capacity,
            chunks: Vec::new(),
        }
    }

    /// The archetype's id.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The sorted component ids defining this archetype.
    #[inline]
    pub fn signature(&self) -> &[ComponentTypeId] {
        &self.signature
    }

    /// Whether the signature includes `id`.
    #[inline]
    pub fn contains(&self, id: ComponentTypeId) -> bool {
        self.signature.binary_search(&id).is_ok()
    }

    /// Whether the signature includes the component behind `ty`.
    #[inline]
    pub fn has<D, T>(&self, ty: &ComponentType<D, T>) -> bool {
        self.contains(ty.id())
    }

    /// Number of entities across all chunks.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(ArchetypeChunk::len).sum()
    }

    /// Whether no entity has this signature.
    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(ArchetypeChunk::is_empty)
    }

    /// Rows per chunk.
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// The chunks, in allocation order.
    pub fn chunks(&self) -> &[ArchetypeChunk] {
        &self.chunks
    }

    /// Mutable chunks, for in-place component writes.
    pub fn chunks_mut(&mut self) -> &mut [ArchetypeChunk] {
        &mut self.chunks
    }

    pub(crate) fn chunk(&self, chunk: u32) -> Option<&ArchetypeChunk> {
        self.chunks.get(chunk as usize)
    }

    pub(crate) fn chunk_mut(&mut self, chunk: u32) -> Option<&mut ArchetypeChunk> {
        self.chunks.get_mut(chunk as usize)
    }

    /// Place an entity in the first chunk with a free row, allocating a new
    /// chunk when all are full. Returns `(chunk, row)`.
    pub(crate) fn insert(
        &mut self,
        entity: Ref,
        values: Vec<(ComponentTypeId, BoxedComponent)>,
    ) -> Result<(u32, u32), EcsError> {
        let chunk_idx = match self.chunks.iter().position(|c| !c.is_full()) {
            Some(idx) => idx,
            None => {
                self.chunks
                    .push(ArchetypeChunk::new(self.chunk_capacity, &self.factories));
                debug!(
                    archetype = self.id.0,
                    chunk = self.chunks.len() - 1,
                    capacity = self.chunk_capacity,
                    "allocated archetype chunk"
                );
                self.chunks.len() - 1
            }
        };
        let row = self.chunks[chunk_idx].push(entity, values)?;
        Ok((chunk_idx as u32, row))
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .field("chunks", &self.chunks.len())
            .field("len", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
