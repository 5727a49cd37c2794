//! Store-scoped singleton resources.
//!
//! A resource is one value of a given Rust type per store, not attached to
//! any entity. It is created from a factory at registration and lives until
//! the store is dropped. Lookup through a [`ResourceType`] handle is a
//! vector index; lookup by type goes through a `TypeId` map.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::domain::StoreDomain;
use crate::EcsError;

/// Bound satisfied by every type that can be stored as a resource.
pub trait Resource: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Resource for T {}

/// Typed handle to a registered resource of domain `D`.
pub struct ResourceType<D, R> {
    index: u32,
    _marker: PhantomData<fn() -> (D, R)>,
}

impl<D, R> ResourceType<D, R> {
    fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    /// Position in registration order.
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl<D, R> Clone for ResourceType<D, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D, R> Copy for ResourceType<D, R> {}

impl<D, R> PartialEq for ResourceType<D, R> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<D, R> Eq for ResourceType<D, R> {}

impl<D: StoreDomain, R> fmt::Debug for ResourceType<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ResourceType<{}, {}>({})",
            D::NAME,
            type_name::<R>(),
            self.index
        )
    }
}

struct ResourceEntry {
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

/// The resource table of one store.
pub(crate) struct Resources<D> {
    by_type: HashMap<TypeId, u32>,
    entries: Vec<ResourceEntry>,
    _marker: PhantomData<fn() -> D>,
}

impl<D: StoreDomain> Resources<D> {
    pub(crate) fn new() -> Self {
        Self {
            by_type: HashMap::new(),
            entries: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn register<R: Resource>(
        &mut self,
        factory: impl FnOnce() -> R,
    ) -> Result<ResourceType<D, R>, EcsError> {
        let type_id = TypeId::of::<R>();
        if self.by_type.contains_key(&type_id) {
            return Err(EcsError::DuplicateRegistration {
                domain: D::NAME,
                name: type_name::<R>().to_owned(),
            });
        }
        let index = self.entries.len() as u32;
        self.entries.push(ResourceEntry {
            type_name: type_name::<R>(),
            value: Box::new(factory()),
        });
        self.by_type.insert(type_id, index);
        Ok(ResourceType::new(index))
    }

    pub(crate) fn get<R: Resource>(&self, ty: &ResourceType<D, R>) -> Result<&R, EcsError> {
        self.entries
            .get(ty.index())
            .and_then(|e| e.value.downcast_ref::<R>())
            .ok_or_else(unregistered::<R>)
    }

    pub(crate) fn get_mut<R: Resource>(
        &mut self,
        ty: &ResourceType<D, R>,
    ) -> Result<&mut R, EcsError> {
        self.entries
            .get_mut(ty.index())
            .and_then(|e| e.value.downcast_mut::<R>())
            .ok_or_else(unregistered::<R>)
    }

    pub(crate) fn handle<R: Resource>(&self) -> Option<ResourceType<D, R>> {
        self.by_type
            .get(&TypeId::of::<R>())
            .map(|index| ResourceType::new(*index))
    }

    pub(crate) fn by_type<R: Resource>(&self) -> Result<&R, EcsError> {
        let ty = self.handle::<R>().ok_or_else(unregistered::<R>)?;
        self.get(&ty)
    }

    pub(crate) fn by_type_mut<R: Resource>(&mut self) -> Result<&mut R, EcsError> {
        let ty = self.handle::<R>().ok_or_else(unregistered::<R>)?;
        self.get_mut(&ty)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<D> fmt::Debug for Resources<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.type_name))
            .finish()
    }
}

fn unregistered<R>() -> EcsError {
    EcsError::UnregisteredResource {
        resource: type_name::<R>().to_owned(),
    }
}
