//! Component type registration and metadata.
//!
//! Every component type used in a store must be registered in that store's
//! [`ComponentRegistry`] before any entity uses it. Registration assigns a
//! dense [`ComponentTypeId`] (0, 1, 2, ... in registration order) and records
//! a [`ComponentVtable`]: plain function pointers for cloning a value,
//! creating a typed column, and the optional codec and default factory.
//! Archetype storage dispatches through those pointers by array index, so
//! the registry freezes once the store starts ticking.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::archetype::{ErasedColumn, TypedColumn};
use crate::domain::StoreDomain;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Bound satisfied by every type that can be stored as a component.
///
/// Clone is required: templates ([`Holder`](crate::holder::Holder)) are
/// duplicated by cloning their values.
pub trait Component: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Component for T {}

/// A type-erased, owned component value.
pub type BoxedComponent = Box<dyn Any + Send + Sync>;

/// The concrete `TypeId` of the value inside a [`BoxedComponent`].
#[inline]
pub(crate) fn value_type_id(value: &BoxedComponent) -> TypeId {
    (**value).type_id()
}

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Dense id of a registered component type within one store domain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    /// Position of this type in registration order.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentType
// ---------------------------------------------------------------------------

/// Typed handle to a registered component type in domain `D`.
///
/// Two handles are equal iff they share the domain (checked by the type
/// system) and the registered id.
pub struct ComponentType<D, T> {
    id: ComponentTypeId,
    _marker: PhantomData<fn() -> (D, T)>,
}

impl<D, T> ComponentType<D, T> {
    pub(crate) fn new(id: ComponentTypeId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The erased id used in archetype signatures and queries.
    #[inline]
    pub fn id(&self) -> ComponentTypeId {
        self.id
    }
}

impl<D, T> Clone for ComponentType<D, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D, T> Copy for ComponentType<D, T> {}

impl<D, T> PartialEq for ComponentType<D, T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<D, T> Eq for ComponentType<D, T> {}

impl<D, T> Hash for ComponentType<D, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<D: StoreDomain, T> fmt::Debug for ComponentType<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ComponentType<{}, {}>({})",
            D::NAME,
            type_name::<T>(),
            self.id.0
        )
    }
}

// ---------------------------------------------------------------------------
// ComponentVtable
// ---------------------------------------------------------------------------

pub(crate) type CloneFn = fn(&(dyn Any + Send + Sync)) -> Option<BoxedComponent>;
pub(crate) type NewColumnFn = fn(usize) -> Box<dyn ErasedColumn>;
pub(crate) type SerializeFn = fn(&(dyn Any + Send + Sync)) -> Result<serde_json::Value, String>;
pub(crate) type DeserializeFn = fn(&serde_json::Value) -> Result<BoxedComponent, String>;
pub(crate) type DefaultFactory = Arc<dyn Fn() -> BoxedComponent + Send + Sync>;

/// JSON conversion functions for one component type.
#[derive(Clone, Copy)]
pub(crate) struct ComponentCodec {
    pub(crate) serialize: SerializeFn,
    pub(crate) deserialize: DeserializeFn,
}

/// Type-erased operations recorded once per component type at registration.
#[derive(Clone)]
pub(crate) struct ComponentVtable {
    pub(crate) type_id: TypeId,
    pub(crate) clone_fn: CloneFn,
    pub(crate) new_column: NewColumnFn,
    pub(crate) codec: Option<ComponentCodec>,
    pub(crate) factory: Option<DefaultFactory>,
}

impl fmt::Debug for ComponentVtable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentVtable")
            .field("type_id", &self.type_id)
            .field("codec", &self.codec.is_some())
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

pub(crate) fn clone_value<T: Component>(value: &(dyn Any + Send + Sync)) -> Option<BoxedComponent> {
    value
        .downcast_ref::<T>()
        .map(|v| Box::new(v.clone()) as BoxedComponent)
}

fn new_column<T: Component>(capacity: usize) -> Box<dyn ErasedColumn> {
    Box::new(TypedColumn::<T>::with_capacity(capacity))
}

fn serialize_value<T>(value: &(dyn Any + Send + Sync)) -> Result<serde_json::Value, String>
where
    T: Component + Serialize,
{
    let typed = value
        .downcast_ref::<T>()
        .ok_or_else(|| format!("value is not a {}", type_name::<T>()))?;
    serde_json::to_value(typed).map_err(|e| e.to_string())
}

fn deserialize_value<T>(value: &serde_json::Value) -> Result<BoxedComponent, String>
where
    T: Component + DeserializeOwned,
{
    let typed: T = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    Ok(Box::new(typed))
}

// ---------------------------------------------------------------------------
// ComponentOptions
// ---------------------------------------------------------------------------

/// Optional capabilities attached to a component type at registration.
pub struct ComponentOptions<T> {
    codec: Option<ComponentCodec>,
    factory: Option<DefaultFactory>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> ComponentOptions<T> {
    /// No codec, no default factory.
    pub fn new() -> Self {
        Self {
            codec: None,
            factory: None,
            _marker: PhantomData,
        }
    }

    /// Attach a JSON codec so the component survives entity snapshots.
    pub fn with_codec(mut self) -> Self
    where
        T: Serialize + DeserializeOwned,
    {
        self.codec = Some(ComponentCodec {
            serialize: serialize_value::<T>,
            deserialize: deserialize_value::<T>,
        });
        self
    }

    /// Attach a default-construction factory.
    pub fn with_factory(mut self, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.factory = Some(Arc::new(move || Box::new(factory()) as BoxedComponent));
        self
    }

    /// Use `T::default()` as the default-construction factory.
    pub fn with_default(self) -> Self
    where
        T: Default,
    {
        self.with_factory(T::default)
    }
}

impl<T: Component> Default for ComponentOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Dense id assigned at registration time.
    pub id: ComponentTypeId,
    /// Name supplied by the caller; also the key in entity snapshots.
    pub name: String,
    /// `std::any::type_name::<T>()`
    pub type_name: &'static str,
    /// Rust `TypeId` for runtime type checking.
    pub type_id: TypeId,
    /// Whether a JSON codec was registered.
    pub has_codec: bool,
    /// Whether a default factory was registered.
    pub has_factory: bool,
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry mapping Rust types to dense [`ComponentTypeId`]s for domain `D`.
///
/// Append-only. Registering the same Rust type or the same name twice is a
/// configuration error, and so is registering after [`freeze`](Self::freeze).
pub struct ComponentRegistry<D> {
    by_type: HashMap<TypeId, ComponentTypeId>,
    by_name: HashMap<String, ComponentTypeId>,
    /// Indexed by `ComponentTypeId.0`.
    infos: Vec<ComponentInfo>,
    /// Indexed by `ComponentTypeId.0`.
    vtables: Vec<ComponentVtable>,
    frozen: bool,
    _marker: PhantomData<fn() -> D>,
}

impl<D: StoreDomain> ComponentRegistry<D> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            by_type: HashMap::new(),
            by_name: HashMap::new(),
            infos: Vec::new(),
            vtables: Vec::new(),
            frozen: false,
            _marker: PhantomData,
        }
    }

    /// Register component type `T` under `name`.
    ///
    /// # Errors
    ///
    /// - [`EcsError::RegistryFrozen`] once the owning store has ticked.
    /// - [`EcsError::DuplicateRegistration`] if `T` or `name` is already
    ///   registered in this domain.
    pub fn register<T: Component>(
        &mut self,
        name: &str,
        options: ComponentOptions<T>,
    ) -> Result<ComponentType<D, T>, EcsError> {
        if self.frozen {
            return Err(EcsError::RegistryFrozen {
                domain: D::NAME,
                name: name.to_owned(),
            });
        }
        let rust_type_id = TypeId::of::<T>();
        if self.by_type.contains_key(&rust_type_id) {
            return Err(EcsError::DuplicateRegistration {
                domain: D::NAME,
                name: type_name::<T>().to_owned(),
            });
        }
        if self.by_name.contains_key(name) {
            return Err(EcsError::DuplicateRegistration {
                domain: D::NAME,
                name: name.to_owned(),
            });
        }

        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            id,
            name: name.to_owned(),
            type_name: type_name::<T>(),
            type_id: rust_type_id,
            has_codec: options.codec.is_some(),
            has_factory: options.factory.is_some(),
        });
        self.vtables.push(ComponentVtable {
            type_id: rust_type_id,
            clone_fn: clone_value::<T>,
            new_column: new_column::<T>,
            codec: options.codec,
            factory: options.factory,
        });
        self.by_type.insert(rust_type_id, id);
        self.by_name.insert(name.to_owned(), id);
        Ok(ComponentType::new(id))
    }

    /// Look up the handle for Rust type `T`.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentType<D, T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|id| ComponentType::new(*id))
    }

    /// Look up a component type by its registered name.
    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    /// Metadata for a registered id.
    pub fn info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.index())
    }

    pub(crate) fn vtable(&self, id: ComponentTypeId) -> Option<&ComponentVtable> {
        self.vtables.get(id.index())
    }

    /// Name of a registered id, or `"<unregistered>"`.
    pub fn name_of(&self, id: ComponentTypeId) -> &str {
        self.info(id).map_or("<unregistered>", |info| info.name.as_str())
    }

    /// Verify that `value` is an instance of the type registered as `id`.
    pub(crate) fn check_value(
        &self,
        id: ComponentTypeId,
        value: &BoxedComponent,
    ) -> Result<(), EcsError> {
        let vtable = self
            .vtable(id)
            .ok_or(EcsError::UnregisteredComponent { id })?;
        if vtable.type_id != value_type_id(value) {
            return Err(EcsError::ComponentTypeMismatch {
                component: self.name_of(id).to_owned(),
            });
        }
        Ok(())
    }

    /// Number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Whether registration is closed.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Close registration. Called by the store on its first tick.
    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Names of all registered component types, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}

impl<D: StoreDomain> Default for ComponentRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: StoreDomain> fmt::Debug for ComponentRegistry<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("domain", &D::NAME)
            .field("components", &self.infos)
            .field("frozen", &self.frozen)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChunkDomain, EntityDomain};

    #[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Vel {
        dx: f32,
        dy: f32,
    }

    #[test]
    fn ids_are_dense_in_registration_order() {
        let mut reg = ComponentRegistry::<EntityDomain>::new();
        let p = reg.register::<Pos>("position", ComponentOptions::new()).unwrap();
        let v = reg.register::<Vel>("velocity", ComponentOptions::new()).unwrap();
        assert_eq!(p.id().index(), 0);
        assert_eq!(v.id().index(), 1);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = ComponentRegistry::<EntityDomain>::new();
        let p = reg.register::<Pos>("position", ComponentOptions::new()).unwrap();
        assert_eq!(reg.lookup::<Pos>(), Some(p));
        assert_eq!(reg.lookup_by_name("position"), Some(p.id()));
        assert_eq!(reg.lookup::<Vel>(), None);
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let mut reg = ComponentRegistry::<EntityDomain>::new();
        reg.register::<Pos>("position", ComponentOptions::new()).unwrap();
        let err = reg
            .register::<Pos>("position_again", ComponentOptions::new())
            .unwrap_err();
        assert!(matches!(err, EcsError::DuplicateRegistration { .. }));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut reg = ComponentRegistry::<EntityDomain>::new();
        reg.register::<Pos>("thing", ComponentOptions::new()).unwrap();
        let err = reg
            .register::<Vel>("thing", ComponentOptions::new())
            .unwrap_err();
        assert!(matches!(err, EcsError::DuplicateRegistration { .. }));
    }

    #[test]
    fn frozen_registry_rejects_registration() {
        let mut reg = ComponentRegistry::<EntityDomain>::new();
        reg.freeze();
        let err = reg
            .register::<Pos>("position", ComponentOptions::new())
            .unwrap_err();
        assert!(matches!(err, EcsError::RegistryFrozen { .. }));
    }

    #[test]
    fn domains_register_independently() {
        let mut entities = ComponentRegistry::<EntityDomain>::new();
        let mut chunks = ComponentRegistry::<ChunkDomain>::new();
        entities
            .register::<Vel>("velocity", ComponentOptions::new())
            .unwrap();
        let in_entities = entities
            .register::<Pos>("position", ComponentOptions::new())
            .unwrap();
        let in_chunks = chunks
            .register::<Pos>("position", ComponentOptions::new())
            .unwrap();
        assert_eq!(in_entities.id().index(), 1);
        assert_eq!(in_chunks.id().index(), 0);
    }

    #[test]
    fn info_records_capabilities() {
        let mut reg = ComponentRegistry::<EntityDomain>::new();
        let id = reg
            .register::<Pos>("position", ComponentOptions::new().with_codec().with_default())
            .unwrap()
            .id();
        let info = reg.info(id).unwrap();
        assert_eq!(info.name, "position");
        assert_eq!(info.type_id, TypeId::of::<Pos>());
        assert!(info.has_codec);
        assert!(info.has_factory);
    }

    #[test]
    fn vtable_clone_and_codec_round_trip() {
        let mut reg = ComponentRegistry::<EntityDomain>::new();
        let id = reg
            .register::<Pos>("position", ComponentOptions::new().with_codec())
            .unwrap()
            .id();
        let vtable = reg.vtable(id).unwrap();
        let value: BoxedComponent = Box::new(Pos { x: 1.0, y: 2.0 });

        let cloned = (vtable.clone_fn)(value.as_ref()).unwrap();
        assert_eq!(cloned.downcast_ref::<Pos>(), Some(&Pos { x: 1.0, y: 2.0 }));

        let codec = vtable.codec.unwrap();
        let json = (codec.serialize)(value.as_ref()).unwrap();
        assert_eq!(json, serde_json::json!({"x": 1.0, "y": 2.0}));
        let back = (codec.deserialize)(&json).unwrap();
        assert_eq!(back.downcast_ref::<Pos>(), Some(&Pos { x: 1.0, y: 2.0 }));
    }

    #[test]
    fn check_value_detects_mismatch() {
        let mut reg = ComponentRegistry::<EntityDomain>::new();
        let id = reg
            .register::<Pos>("position", ComponentOptions::new())
            .unwrap()
            .id();
        let right: BoxedComponent = Box::new(Pos::default());
        let wrong: BoxedComponent = Box::new(Vel { dx: 0.0, dy: 0.0 });
        assert!(reg.check_value(id, &right).is_ok());
        assert!(matches!(
            reg.check_value(id, &wrong),
            Err(EcsError::ComponentTypeMismatch { .. })
        ));
        assert!(matches!(
            reg.check_value(ComponentTypeId(9), &right),
            Err(EcsError::UnregisteredComponent { .. })
        ));
    }
}
