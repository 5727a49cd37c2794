//! Entity templates and persistence snapshots.
//!
//! A [`Holder`] is an unattached, ordered bag of component values. It is the
//! input to [`CommandBuffer::add_entity`](crate::command::CommandBuffer::add_entity)
//! and the output of [`Store::snapshot_entity`](crate::store::Store::snapshot_entity).
//! Templates are plain data: sharing fields between templates is done by
//! cloning one holder and inserting the differences.
//!
//! For persistence a holder converts to an [`EntitySnapshot`], a JSON map
//! keyed by registered component name. Only components registered with a
//! codec are written; the rest are treated as transient.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::component::{
    clone_value, BoxedComponent, CloneFn, Component, ComponentRegistry, ComponentType,
    ComponentTypeId,
};
use crate::domain::StoreDomain;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Holder
// ---------------------------------------------------------------------------

struct HolderEntry {
    id: ComponentTypeId,
    value: BoxedComponent,
    clone_fn: CloneFn,
}

/// An ordered list of component values not attached to any store.
pub struct Holder<D> {
    entries: Vec<HolderEntry>,
    _marker: PhantomData<fn() -> D>,
}

impl<D> Holder<D> {
    /// An empty holder. Spawning it creates an entity with no components.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Set component `ty` to `value`, replacing any previous value in place.
    pub fn insert<T: Component>(&mut self, ty: &ComponentType<D, T>, value: T) -> &mut Self {
        self.insert_erased(ty.id(), Box::new(value), clone_value::<T>);
        self
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with<T: Component>(mut self, ty: &ComponentType<D, T>, value: T) -> Self {
        self.insert(ty, value);
        self
    }

    pub(crate) fn insert_erased(
        &mut self,
        id: ComponentTypeId,
        value: BoxedComponent,
        clone_fn: CloneFn,
    ) {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.value = value;
                entry.clone_fn = clone_fn;
            }
            None => self.entries.push(HolderEntry {
                id,
                value,
                clone_fn,
            }),
        }
    }

    /// The value of component `ty`, if present.
    pub fn get<T: Component>(&self, ty: &ComponentType<D, T>) -> Option<&T> {
        self.entries
            .iter()
            .find(|e| e.id == ty.id())
            .and_then(|e| e.value.downcast_ref::<T>())
    }

    /// Mutable value of component `ty`, if present.
    pub fn get_mut<T: Component>(&mut self, ty: &ComponentType<D, T>) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find(|e| e.id == ty.id())
            .and_then(|e| e.value.downcast_mut::<T>())
    }

    /// Drop component `ty`. Returns whether it was present.
    pub fn remove<T>(&mut self, ty: &ComponentType<D, T>) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != ty.id());
        self.entries.len() != before
    }

    /// Whether component `id` is present.
    pub fn contains(&self, id: ComponentTypeId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Component ids in insertion order.
    pub fn component_ids(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the holder has no components.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume into `(id, value)` pairs sorted by id.
    pub(crate) fn into_sorted_values(self) -> Vec<(ComponentTypeId, BoxedComponent)> {
        let mut values: Vec<_> = self.entries.into_iter().map(|e| (e.id, e.value)).collect();
        values.sort_by_key(|(id, _)| *id);
        values
    }
}

impl<D: StoreDomain> Holder<D> {
    /// Encode every codec-carrying component into a snapshot.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredComponent`] if the holder carries an id the
    /// registry does not know, [`EcsError::Codec`] if serialization fails.
    pub fn to_snapshot(&self, registry: &ComponentRegistry<D>) -> Result<EntitySnapshot, EcsError> {
        let mut components = BTreeMap::new();
        for entry in &self.entries {
            let vtable = registry
                .vtable(entry.id)
                .ok_or(EcsError::UnregisteredComponent { id: entry.id })?;
            let name = registry.name_of(entry.id);
            let Some(codec) = vtable.codec else {
                debug!(component = name, "skipping transient component in snapshot");
                continue;
            };
            let json = (codec.serialize)(entry.value.as_ref()).map_err(|details| {
                EcsError::Codec {
                    component: name.to_owned(),
                    details,
                }
            })?;
            components.insert(name.to_owned(), json);
        }
        Ok(EntitySnapshot { components })
    }

    /// Rebuild a holder from a snapshot.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponent`] for a name that is not registered,
    /// [`EcsError::MissingCodec`] for a component registered without a codec,
    /// [`EcsError::Codec`] if a value fails to deserialize.
    pub fn from_snapshot(
        registry: &ComponentRegistry<D>,
        snapshot: &EntitySnapshot,
    ) -> Result<Self, EcsError> {
        let mut holder = Self::new();
        for (name, json) in &snapshot.components {
            let id = registry
                .lookup_by_name(name)
                .ok_or_else(|| EcsError::UnknownComponent { name: name.clone() })?;
            let vtable = registry
                .vtable(id)
                .ok_or(EcsError::UnregisteredComponent { id })?;
            let codec = vtable.codec.ok_or_else(|| EcsError::MissingCodec {
                component: name.clone(),
            })?;
            let value = (codec.deserialize)(json).map_err(|details| EcsError::Codec {
                component: name.clone(),
                details,
            })?;
            holder.insert_erased(id, value, vtable.clone_fn);
        }
        Ok(holder)
    }
}

impl<D> Default for Holder<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Clone for Holder<D> {
    fn clone(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter_map(|e| {
                    (e.clone_fn)(e.value.as_ref()).map(|value| HolderEntry {
                        id: e.id,
                        value,
                        clone_fn: e.clone_fn,
                    })
                })
                .collect(),
            _marker: PhantomData,
        }
    }
}

impl<D> fmt::Debug for Holder<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Holder")
            .field("components", &self.component_ids().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EntitySnapshot
// ---------------------------------------------------------------------------

/// Serializable form of an entity: component name to JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Keyed by registered component name; sorted for stable output.
    pub components: BTreeMap<String, serde_json::Value>,
}

impl EntitySnapshot {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, EcsError> {
        serde_json::to_string(self).map_err(|e| EcsError::Codec {
            component: "<snapshot>".to_owned(),
            details: e.to_string(),
        })
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, EcsError> {
        serde_json::from_str(json).map_err(|e| EcsError::Codec {
            component: "<snapshot>".to_owned(),
            details: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
