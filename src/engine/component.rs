//! # Type Registry
//!
//! This module provides the process-wide registry that assigns stable indices
//! and short textual keys to component, tag and script types, and exposes the
//! type-erased factories the store needs to allocate columns, indexes and to
//! decode record values.
//!
//! ## Purpose
//! The registry decouples Rust type information (`TypeId`, name) from runtime
//! storage. Archetypes hold heterogeneous columns behind [`Column`], and the
//! record codec resolves `"pos"` to a component without knowing `Position`.
//!
//! ## Design
//! - Types declare their capability and key through a trait impl:
//!   [`Component::KEY`], [`Tag::NAME`], [`Script::KEY`].
//! - Components are assigned a compact `ComponentID` in `[0, COMPONENT_CAP)`,
//!   tags a `TagID` in `[0, TAG_CAP)`, scripts a `ScriptID`, in registration
//!   order.
//! - Component and script keys share one namespace (the `components` bag of an
//!   entity record). Tag names live in their own namespace.
//! - The built-in [`Unresolved`] component is registered first, so it always
//!   owns `ComponentID` 0.
//! - The registry can be frozen to reject further registrations.
//!
//! ## Invariants
//! - Ids are unique and stable for the lifetime of the process.
//! - Registering the same type twice returns the existing id.
//! - A key is owned by exactly one type.
//!
//! ## Concurrency
//! The registry lives in a `OnceLock<RwLock<_>>`: registration takes the write
//! lock (normally once at startup), every lookup takes the read lock.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::engine::error::RegistryError;
use crate::engine::index::{ComponentIndex, RangeIndex};
use crate::engine::storage::{ChunkedColumn, Column};
use crate::engine::types::{ComponentID, ScriptID, TagID, COMPONENT_CAP, SCRIPT_CAP, TAG_CAP};


/// A value type stored in archetype columns.
///
/// ## Example
/// ```ignore
/// #[derive(Clone, Default, Serialize, Deserialize)]
/// struct Position { x: f32, y: f32, z: f32 }
///
/// impl Component for Position { const KEY: &'static str = "pos"; }
/// ```

pub trait Component: 'static + Send + Sync + Clone + Serialize + DeserializeOwned {
    /// Short stable key used in entity records.
    const KEY: &'static str;
}

/// A component whose values are mirrored in a [`RangeIndex`].
///
/// Mutable access to indexed components is refused by the store; values change
/// through `set_component` so the index stays consistent.

pub trait IndexedComponent: Component {
    /// Ordered key stored in the index.
    type Value: Ord + Clone + Send + Sync + std::fmt::Debug + 'static;

    /// Extracts the indexed key from a component value.
    fn indexed_value(&self) -> Self::Value;
}

/// A zero-sized marker that only participates in archetype signatures.

pub trait Tag: 'static {
    /// Name used in the `tags` list of entity records.
    const NAME: &'static str;
}

/// A per-entity object stored on the node rather than in an archetype column.

pub trait Script: 'static + Send + Sync + Serialize + DeserializeOwned {
    /// Short stable key used in the `components` bag of entity records.
    const KEY: &'static str;
}

/// Holder for component keys and tag names found in a record but not
/// registered in this process.
///
/// Values are kept as raw JSON text and emitted again on export, so a round
/// trip through a process that does not know a type is lossless.

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unresolved {
    /// `(key, raw JSON value)` pairs in key order.
    pub components: Vec<(String, String)>,
    /// Unknown tag names in record order.
    pub tags: Vec<String>,
}

impl Component for Unresolved {
    const KEY: &'static str = "unresolved";
}

impl Unresolved {
    /// Returns `true` if nothing was left unresolved.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.tags.is_empty()
    }
}

/// Decodes a JSON fragment into a boxed value of a registered type.
pub type DecodeFn = fn(&str) -> Result<Box<dyn Any + Send>, serde_json::Error>;

/// Creates an empty column for a registered component.
pub type ColumnFactory = fn() -> Box<dyn Column>;

/// Creates an empty index for a registered indexed component.
pub type IndexFactory = fn() -> Box<dyn ComponentIndex>;

/// Decodes a JSON fragment into a boxed script object.
pub type ScriptDecodeFn = fn(&str) -> Result<Box<dyn ScriptObject>, serde_json::Error>;

fn new_column<T: Component>() -> Box<dyn Column> {
    Box::new(ChunkedColumn::<T>::new())
}

fn new_index<T: IndexedComponent>() -> Box<dyn ComponentIndex> {
    Box::new(RangeIndex::<T>::new())
}

fn decode_value<T: Component>(json: &str) -> Result<Box<dyn Any + Send>, serde_json::Error> {
    serde_json::from_str::<T>(json).map(|value| Box::new(value) as Box<dyn Any + Send>)
}

fn decode_script<S: Script>(json: &str) -> Result<Box<dyn ScriptObject>, serde_json::Error> {
    serde_json::from_str::<S>(json).map(|value| Box::new(value) as Box<dyn ScriptObject>)
}

/// Type-erased script held by an entity node.

pub trait ScriptObject: Any + Send + Sync {
    /// Downcasting hook.
    fn as_any(&self) -> &dyn Any;
    /// Mutable downcasting hook.
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Owned downcasting hook.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    /// Encodes the script as a JSON fragment.
    fn encode_json(&self) -> Result<Box<RawValue>, serde_json::Error>;
}

impl<S: Script> ScriptObject for S {
    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }
    fn into_any(self: Box<Self>) -> Box<dyn Any> { self }

    fn encode_json(&self) -> Result<Box<RawValue>, serde_json::Error> {
        serde_json::value::to_raw_value(self)
    }
}

/// Registration record of a component type.

#[derive(Clone, Copy, Debug)]
pub struct ComponentInfo {
    /// Assigned signature bit.
    pub id: ComponentID,
    /// Record key.
    pub key: &'static str,
    /// Rust type name for diagnostics.
    pub type_name: &'static str,
    /// Runtime type of the stored value.
    pub type_id: TypeId,
    /// Column factory.
    pub new_column: ColumnFactory,
    /// Record decoder.
    pub decode: DecodeFn,
    /// Index factory; `Some` for indexed components.
    pub new_index: Option<IndexFactory>,
}

impl ComponentInfo {
    /// Returns `true` if the component is mirrored in an index.
    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.new_index.is_some()
    }
}

/// Registration record of a tag type.

#[derive(Clone, Copy, Debug)]
pub struct TagInfo {
    /// Assigned signature bit.
    pub id: TagID,
    /// Record name.
    pub name: &'static str,
    /// Rust type name for diagnostics.
    pub type_name: &'static str,
}

/// Registration record of a script type.

#[derive(Clone, Copy, Debug)]
pub struct ScriptInfo {
    /// Assigned slot.
    pub id: ScriptID,
    /// Record key.
    pub key: &'static str,
    /// Rust type name for diagnostics.
    pub type_name: &'static str,
    /// Record decoder.
    pub decode: ScriptDecodeFn,
}

/// What a key in the `components` bag of a record resolves to.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaKey {
    /// A registered component.
    Component(ComponentID),
    /// A registered script.
    Script(ScriptID),
}

/// Global mapping between Rust types, compact ids and record keys.
///
/// ## Invariants
/// - `components[id].id == id`, likewise for tags and scripts.
/// - Every entry in `by_type` and `by_key` points at an existing registration.

pub struct TypeRegistry {
    components: Vec<ComponentInfo>,
    tags: Vec<TagInfo>,
    scripts: Vec<ScriptInfo>,
    components_by_type: HashMap<TypeId, ComponentID>,
    tags_by_type: HashMap<TypeId, TagID>,
    scripts_by_type: HashMap<TypeId, ScriptID>,
    by_key: HashMap<&'static str, SchemaKey>,
    tags_by_name: HashMap<&'static str, TagID>,
    frozen: bool,
}

static REGISTRY: OnceLock<RwLock<TypeRegistry>> = OnceLock::new();

fn type_registry() -> &'static RwLock<TypeRegistry> {
    REGISTRY.get_or_init(|| {
        let mut registry = TypeRegistry {
            components: Vec::new(),
            tags: Vec::new(),
            scripts: Vec::new(),
            components_by_type: HashMap::new(),
            tags_by_type: HashMap::new(),
            scripts_by_type: HashMap::new(),
            by_key: HashMap::new(),
            tags_by_name: HashMap::new(),
            frozen: false,
        };
        // Cannot fail on an empty registry.
        let _ = registry.register_component::<Unresolved>(None);
        RwLock::new(registry)
    })
}

fn read_registry() -> RwLockReadGuard<'static, TypeRegistry> {
    type_registry().read().unwrap_or_else(PoisonError::into_inner)
}

fn write_registry() -> RwLockWriteGuard<'static, TypeRegistry> {
    type_registry().write().unwrap_or_else(PoisonError::into_inner)
}

impl TypeRegistry {

    /// Registers component `T`, optionally with an index factory.
    ///
    /// ## Behavior
    /// - If `T` is already registered, returns the existing id. Asking for an
    ///   index on a type registered without one is refused: stores may
    ///   already hold unindexed values of it.
    /// - Otherwise checks the freeze flag, key uniqueness and capacity, then
    ///   assigns the next id.

    fn register_component<T: Component>(
        &mut self,
        index: Option<IndexFactory>,
    ) -> Result<ComponentID, RegistryError> {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.components_by_type.get(&type_id) {
            let info = &self.components[existing as usize];
            if info.new_index.is_none() && index.is_some() {
                return Err(RegistryError::AlreadyRegistered { type_name: info.type_name });
            }
            return Ok(existing);
        }

        if self.frozen {
            return Err(RegistryError::Frozen);
        }
        self.check_key(T::KEY)?;
        if self.components.len() >= COMPONENT_CAP {
            return Err(RegistryError::CapacityExceeded { kind: "component", capacity: COMPONENT_CAP });
        }

        let id = self.components.len() as ComponentID;
        self.components.push(ComponentInfo {
            id,
            key: T::KEY,
            type_name: type_name::<T>(),
            type_id,
            new_column: new_column::<T>,
            decode: decode_value::<T>,
            new_index: index,
        });
        self.components_by_type.insert(type_id, id);
        self.by_key.insert(T::KEY, SchemaKey::Component(id));
        Ok(id)
    }

    fn register_tag<G: Tag>(&mut self) -> Result<TagID, RegistryError> {
        let type_id = TypeId::of::<G>();
        if let Some(&existing) = self.tags_by_type.get(&type_id) {
            return Ok(existing);
        }
        if self.frozen {
            return Err(RegistryError::Frozen);
        }
        if let Some(&other) = self.tags_by_name.get(G::NAME) {
            return Err(RegistryError::DuplicateKey {
                key: G::NAME,
                existing: self.tags[other as usize].type_name,
            });
        }
        if self.tags.len() >= TAG_CAP {
            return Err(RegistryError::CapacityExceeded { kind: "tag", capacity: TAG_CAP });
        }

        let id = self.tags.len() as TagID;
        self.tags.push(TagInfo { id, name: G::NAME, type_name: type_name::<G>() });
        self.tags_by_type.insert(type_id, id);
        self.tags_by_name.insert(G::NAME, id);
        Ok(id)
    }

    fn register_script<S: Script>(&mut self) -> Result<ScriptID, RegistryError> {
        let type_id = TypeId::of::<S>();
        if let Some(&existing) = self.scripts_by_type.get(&type_id) {
            return Ok(existing);
        }
        if self.frozen {
            return Err(RegistryError::Frozen);
        }
        self.check_key(S::KEY)?;
        if self.scripts.len() >= SCRIPT_CAP {
            return Err(RegistryError::CapacityExceeded { kind: "script", capacity: SCRIPT_CAP });
        }

        let id = self.scripts.len() as ScriptID;
        self.scripts.push(ScriptInfo {
            id,
            key: S::KEY,
            type_name: type_name::<S>(),
            decode: decode_script::<S>,
        });
        self.scripts_by_type.insert(type_id, id);
        self.by_key.insert(S::KEY, SchemaKey::Script(id));
        Ok(id)
    }

    fn check_key(&self, key: &'static str) -> Result<(), RegistryError> {
        let existing = match self.by_key.get(key) {
            None => return Ok(()),
            Some(SchemaKey::Component(id)) => self.components[*id as usize].type_name,
            Some(SchemaKey::Script(id)) => self.scripts[*id as usize].type_name,
        };
        Err(RegistryError::DuplicateKey { key, existing })
    }
}

/// Registers component `T` and returns its `ComponentID`.
///
/// Idempotent for the same type.
///
/// ## Errors
/// `Frozen`, `DuplicateKey` or `CapacityExceeded`.

pub fn register_component<T: Component>() -> Result<ComponentID, RegistryError> {
    write_registry().register_component::<T>(None)
}

/// Registers component `T` as indexed and returns its `ComponentID`.
///
/// Every store then keeps a [`RangeIndex<T>`] of its values.
///
/// ## Errors
/// Those of [`register_component`], plus `AlreadyRegistered` if `T` was
/// registered without an index before.

pub fn register_indexed_component<T: IndexedComponent>() -> Result<ComponentID, RegistryError> {
    write_registry().register_component::<T>(Some(new_index::<T>))
}

/// Registers tag `G` and returns its `TagID`.
pub fn register_tag<G: Tag>() -> Result<TagID, RegistryError> {
    write_registry().register_tag::<G>()
}

/// Registers script `S` and returns its `ScriptID`.
pub fn register_script<S: Script>() -> Result<ScriptID, RegistryError> {
    write_registry().register_script::<S>()
}

/// Freezes the registry, rejecting any further registration.
pub fn freeze_registry() {
    write_registry().frozen = true;
}

/// Returns `true` once [`freeze_registry`] was called.
pub fn is_registry_frozen() -> bool {
    read_registry().frozen
}

/// Returns the `ComponentID` of `T`.
///
/// ## Errors
/// `NotRegistered` if `T` was never registered.

pub fn component_id_of<T: 'static>() -> Result<ComponentID, RegistryError> {
    read_registry()
        .components_by_type
        .get(&TypeId::of::<T>())
        .copied()
        .ok_or(RegistryError::NotRegistered { type_name: type_name::<T>() })
}

/// Returns the `TagID` of `G`.
pub fn tag_id_of<G: 'static>() -> Result<TagID, RegistryError> {
    read_registry()
        .tags_by_type
        .get(&TypeId::of::<G>())
        .copied()
        .ok_or(RegistryError::NotRegistered { type_name: type_name::<G>() })
}

/// Returns the `ScriptID` of `S`.
pub fn script_id_of<S: 'static>() -> Result<ScriptID, RegistryError> {
    read_registry()
        .scripts_by_type
        .get(&TypeId::of::<S>())
        .copied()
        .ok_or(RegistryError::NotRegistered { type_name: type_name::<S>() })
}

/// Returns the registration record of `component_id`.
pub fn component_info(component_id: ComponentID) -> Option<ComponentInfo> {
    read_registry().components.get(component_id as usize).copied()
}

/// Returns the registration record of component `T`.
pub fn component_info_of<T: 'static>() -> Result<ComponentInfo, RegistryError> {
    let registry = read_registry();
    registry
        .components_by_type
        .get(&TypeId::of::<T>())
        .and_then(|id| registry.components.get(*id as usize))
        .copied()
        .ok_or(RegistryError::NotRegistered { type_name: type_name::<T>() })
}

/// Returns the registration record of `tag_id`.
pub fn tag_info(tag_id: TagID) -> Option<TagInfo> {
    read_registry().tags.get(tag_id as usize).copied()
}

/// Returns the registration record of `script_id`.
pub fn script_info(script_id: ScriptID) -> Option<ScriptInfo> {
    read_registry().scripts.get(script_id as usize).copied()
}

/// Resolves a key of the `components` record bag.
pub fn schema_by_key(key: &str) -> Option<SchemaKey> {
    read_registry().by_key.get(key).copied()
}

/// Resolves a tag name of the `tags` record list.
pub fn tag_by_name(name: &str) -> Option<TagID> {
    read_registry().tags_by_name.get(name).copied()
}

/// Creates an empty column for `component_id`.
pub fn make_column(component_id: ComponentID) -> Result<Box<dyn Column>, RegistryError> {
    component_info(component_id)
        .map(|info| (info.new_column)())
        .ok_or(RegistryError::NotRegistered { type_name: "<unknown component id>" })
}

/// `ComponentID` of the built-in [`Unresolved`] component.
pub const UNRESOLVED_ID: ComponentID = 0;
