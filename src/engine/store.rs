//! The entity store: node table, archetype registry and structural changes.
//!
//! This module defines [`EntityStore`], the sole authority for structural
//! changes. It is responsible for:
//!
//! * allocating and recycling entity ids and mapping them to pids,
//! * owning archetypes and resolving signatures to archetypes,
//! * moving entity rows between archetypes when components or tags change,
//! * keeping component indexes consistent with every change,
//! * dispatching change events.
//!
//! Tree operations live in [`tree`](crate::engine::tree), queries in
//! [`query`](crate::engine::query) and the record codec in
//! [`serialize`](crate::engine::serialize); all of them are `impl EntityStore`
//! blocks over the state defined here.
//!
//! ## Structural change protocol
//!
//! 1. Validate the handle (store id, generation) and every argument.
//! 2. Compute the target signature and look up or create its archetype.
//! 3. Move the row with [`Archetype::move_row_to`]; fix the node of the
//!    entity displaced by swap-compaction.
//! 4. Update indexes, then emit the event.
//!
//! ## Concurrency
//!
//! Single writer. Every mutation takes `&mut self`, so iteration (which borrows
//! the store) and structural change cannot overlap. Deferred changes go
//! through a [`CommandBuffer`](crate::engine::commands::CommandBuffer).

use std::any::Any;
use std::collections::HashMap;

use crate::engine::archetype::Archetype;
use crate::engine::component::{
    component_id_of, component_info, component_info_of, script_id_of, tag_id_of, tag_info,
    Component, ComponentInfo, IndexedComponent, Script, ScriptObject, Tag,
};
use crate::engine::config::{PidPolicy, StoreConfig};
use crate::engine::entity::{next_store_id, Entity, Node, NodeFlags};
use crate::engine::error::{
    ArgumentError, ColumnError, InvalidOperationError, RegistryError, StoreResult, UseAfterDeleteError,
};
use crate::engine::events::{
    ChildNodesChanged, ComponentAction, ComponentChanged, HandlerId, StoreEvents, TagsChanged,
};
use crate::engine::index::{ComponentIndex, RangeIndex};
use crate::engine::random::PidGenerator;
use crate::engine::types::{
    ArchetypeID, ComponentID, EntityId, Pid, ScriptID, Signature, StoreId, TagID,
};


/// Archetype holding entities without components and tags.
pub const EMPTY_ARCHETYPE: ArchetypeID = 0;

/// In-memory archetype-based entity-component store.
///
/// ## Invariants
/// * `nodes[id].is_alive()` iff `id` names a live entity; `nodes[0]` is the
///   null node and never alive.
/// * For a live node, `archetypes[node.archetype].entity_at(node.row) == id`.
/// * `signature_map` and `archetypes` agree; archetype ids are dense.
/// * `entity_count` equals the number of live nodes.

pub struct EntityStore {
    pub(crate) store_id: StoreId,
    config: StoreConfig,
    pub(crate) nodes: Vec<Node>,
    free_ids: Vec<EntityId>,
    next_id: EntityId,
    entity_count: usize,
    pub(crate) archetypes: Vec<Archetype>,
    signature_map: HashMap<Signature, ArchetypeID>,
    pid_map: HashMap<Pid, EntityId>,
    pid_generator: PidGenerator,
    indexes: HashMap<ComponentID, Box<dyn ComponentIndex>>,
    pub(crate) graph_origin: EntityId,
    pub(crate) events: StoreEvents,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {

    /// Creates a store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a store assigning pids with `policy`.
    pub fn with_pid_policy(policy: PidPolicy) -> Self {
        Self::with_config(StoreConfig::with_pid_policy(policy))
    }

    /// Creates a store from `config`.

    pub fn with_config(config: StoreConfig) -> Self {
        let reserved = config.node_capacity.min(config.max_id as usize);
        let mut nodes = Vec::with_capacity(reserved.saturating_add(1));
        nodes.push(Node::empty(0));

        let empty = Signature::default();
        let mut signature_map = HashMap::new();
        signature_map.insert(empty, EMPTY_ARCHETYPE);

        let store_id = next_store_id();
        log::debug!("created entity store {store_id} with {:?}", config.pid_policy);

        Self {
            store_id,
            pid_generator: PidGenerator::new(config.random_seed),
            config,
            nodes,
            free_ids: Vec::new(),
            next_id: 1,
            entity_count: 0,
            archetypes: vec![Archetype::empty(EMPTY_ARCHETYPE)],
            signature_map,
            pid_map: HashMap::new(),
            indexes: HashMap::new(),
            graph_origin: 0,
            events: StoreEvents::default(),
        }
    }

    /// Process-unique id of this store.
    #[inline]
    pub fn store_id(&self) -> StoreId { self.store_id }

    /// Configuration the store was created with.
    #[inline]
    pub fn config(&self) -> &StoreConfig { &self.config }

    /// Pid assignment policy.
    #[inline]
    pub fn pid_policy(&self) -> PidPolicy { self.config.pid_policy }

    /// Restarts the random pid sequence from `seed`.
    pub fn set_random_seed(&mut self, seed: u64) {
        self.pid_generator.reseed(seed);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity lifecycle
// ─────────────────────────────────────────────────────────────────────────────

impl EntityStore {

    /// Creates an entity with the next free id.
    ///
    /// Ids are taken from the free list first, then from a sequential counter
    /// that skips ids created explicitly with [`create_entity_with_id`](Self::create_entity_with_id).

    pub fn create_entity(&mut self) -> StoreResult<Entity> {
        let id = self.alloc_id()?;
        let pid = self.assign_pid(id);
        self.spawn(id, pid)
    }

    /// Creates an entity with the given id.
    ///
    /// ## Errors
    /// - `ArgumentError::InvalidId` for `id == 0`.
    /// - `ArgumentError::IdOutOfRange` above the configured `max_id`.
    /// - `ArgumentError::IdInUse` if `id` is live.

    pub fn create_entity_with_id(&mut self, id: EntityId) -> StoreResult<Entity> {
        self.check_new_id(i64::from(id))?;
        let pid = self.assign_pid(id);
        self.spawn(id, pid)
    }

    /// Creates an entity for a record pid, honoring the pid policy.
    pub(crate) fn create_entity_with_pid(&mut self, pid: Pid) -> StoreResult<Entity> {
        let id = self.check_new_pid(pid)?;
        match self.config.pid_policy {
            PidPolicy::UsePidAsId => {
                let pid = self.assign_pid(id);
                self.spawn(id, pid)
            }
            PidPolicy::RandomPids => {
                let id = self.alloc_id()?;
                self.spawn(id, pid)
            }
        }
    }

    /// Validates a pid for a new entity without creating it.
    ///
    /// Returns the id the entity would get under `UsePidAsId`; `0` under
    /// `RandomPids`, where the id is allocated on creation.

    pub(crate) fn check_new_pid(&self, pid: Pid) -> StoreResult<EntityId> {
        match self.config.pid_policy {
            PidPolicy::UsePidAsId => self.check_new_id(pid),
            PidPolicy::RandomPids => {
                if pid <= 0 {
                    return Err(ArgumentError::InvalidId { id: pid }.into());
                }
                if let Some(&id) = self.pid_map.get(&pid) {
                    return Err(ArgumentError::IdInUse { id }.into());
                }
                Ok(0)
            }
        }
    }

    fn check_new_id(&self, id: i64) -> StoreResult<EntityId> {
        if id <= 0 {
            return Err(ArgumentError::InvalidId { id }.into());
        }
        let max = self.config.max_id;
        let id = EntityId::try_from(id)
            .ok()
            .filter(|id| *id <= max)
            .ok_or(ArgumentError::IdOutOfRange { id, max })?;
        if self.is_id_alive(id) {
            return Err(ArgumentError::IdInUse { id }.into());
        }
        Ok(id)
    }

    /// Deletes an entity.
    ///
    /// ## Behavior
    /// - Index entries of its components are retracted.
    /// - It is removed from its parent's child list (one `Remove` event).
    /// - Its children become parentless floating roots (one `Remove` event
    ///   each, last child first).
    /// - Its row is swap-removed; the displaced entity's node is fixed up.
    /// - Scripts are dropped, the id is freed and its generation bumped, so the
    ///   handle and all copies of it fail with `UseAfterDelete` afterwards.

    pub fn delete_entity(&mut self, entity: Entity) -> StoreResult<()> {
        let id = self.check(entity)?.id;
        let (archetype_id, row) = self.location_of_id(id)?;

        let component_ids = self.archetypes[archetype_id as usize].component_ids().to_vec();
        for component_id in component_ids {
            self.index_remove(id, component_id)?;
        }

        self.detach_from_parent(id);
        self.release_children(id);
        if self.graph_origin == id {
            self.graph_origin = 0;
        }

        if let Some(displaced) = self.archetypes[archetype_id as usize].remove_row(row)? {
            self.nodes[displaced as usize].row = row;
        }

        let node = &mut self.nodes[id as usize];
        if self.config.pid_policy == PidPolicy::RandomPids {
            self.pid_map.remove(&node.pid);
        }
        node.release();
        self.free_ids.push(id);
        self.entity_count -= 1;

        log::trace!("deleted entity {id}");
        Ok(())
    }

    fn alloc_id(&mut self) -> StoreResult<EntityId> {
        while let Some(id) = self.free_ids.pop() {
            if !self.is_id_alive(id) {
                return Ok(id);
            }
        }
        loop {
            let id = self.next_id;
            if id == 0 || id > self.config.max_id {
                return Err(InvalidOperationError::IdSpaceExhausted.into());
            }
            self.next_id = id.wrapping_add(1);
            if !self.is_id_alive(id) {
                return Ok(id);
            }
        }
    }

    fn assign_pid(&mut self, id: EntityId) -> Pid {
        match self.config.pid_policy {
            PidPolicy::UsePidAsId => Pid::from(id),
            PidPolicy::RandomPids => self.pid_generator.next_pid(|pid| self.pid_map.contains_key(&pid)),
        }
    }

    fn spawn(&mut self, id: EntityId, pid: Pid) -> StoreResult<Entity> {
        while self.nodes.len() <= id as usize {
            let next = self.nodes.len() as EntityId;
            self.nodes.push(Node::empty(next));
        }
        let row = self.archetypes[EMPTY_ARCHETYPE as usize].push_row(id, Vec::new())?;

        let node = &mut self.nodes[id as usize];
        node.pid = pid;
        node.archetype = Some(EMPTY_ARCHETYPE);
        node.row = row;
        node.parent = 0;
        node.flags = NodeFlags::CREATED;
        let generation = node.generation;

        if self.config.pid_policy == PidPolicy::RandomPids {
            self.pid_map.insert(pid, id);
        }
        self.entity_count += 1;
        Ok(Entity::new(self.store_id, id, generation))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lookup
// ─────────────────────────────────────────────────────────────────────────────

impl EntityStore {

    /// Handle of the live entity `id`.
    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.live_node(id).map(|node| Entity::new(self.store_id, id, node.generation))
    }

    /// Handle of the live entity with persistent id `pid`.
    pub fn entity_by_pid(&self, pid: Pid) -> Option<Entity> {
        self.pid_to_id(pid).and_then(|id| self.entity(id))
    }

    /// Id of the live entity with persistent id `pid`.
    pub fn pid_to_id(&self, pid: Pid) -> Option<EntityId> {
        let id = match self.config.pid_policy {
            PidPolicy::UsePidAsId => EntityId::try_from(pid).ok()?,
            PidPolicy::RandomPids => *self.pid_map.get(&pid)?,
        };
        self.is_id_alive(id).then_some(id)
    }

    /// Persistent id of the live entity `id`.
    pub fn id_to_pid(&self, id: EntityId) -> Option<Pid> {
        self.live_node(id).map(Node::pid)
    }

    /// Number of live entities.
    #[inline]
    pub fn entity_count(&self) -> usize { self.entity_count }

    /// Highest id that has a node slot. Walk `1..=node_max_id()` with
    /// [`entity`](Self::entity) to visit every live entity.
    #[inline]
    pub fn node_max_id(&self) -> EntityId {
        (self.nodes.len() - 1) as EntityId
    }

    /// Read-only node of `id`, live or not.
    pub fn node(&self, id: EntityId) -> Option<&Node> {
        self.nodes.get(id as usize).filter(|_| id != 0)
    }

    /// Live entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.nodes
            .iter()
            .filter(|node| node.is_alive())
            .map(move |node| Entity::new(self.store_id, node.id, node.generation))
    }

    /// Returns `true` if `entity` is a live handle of this store.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.check(entity).is_ok()
    }

    /// Archetype currently holding `entity`.
    pub fn archetype_of(&self, entity: Entity) -> StoreResult<&Archetype> {
        let id = self.check(entity)?.id;
        let (archetype_id, _) = self.location_of_id(id)?;
        Ok(&self.archetypes[archetype_id as usize])
    }

    /// Archetype `archetype_id`.
    pub fn archetype(&self, archetype_id: ArchetypeID) -> Option<&Archetype> {
        self.archetypes.get(archetype_id as usize)
    }

    /// All archetypes in creation order.
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// Number of archetypes, including the empty one.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Validates `entity` and returns its node.
    ///
    /// ## Errors
    /// - `ArgumentError::ForeignEntity` for a handle of another store.
    /// - `UseAfterDelete` if the id was deleted since the handle was issued.

    pub(crate) fn check(&self, entity: Entity) -> StoreResult<&Node> {
        if entity.store_id() != self.store_id {
            return Err(ArgumentError::ForeignEntity.into());
        }
        match self.nodes.get(entity.id() as usize) {
            Some(node) if node.is_alive() && node.generation == entity.generation() => Ok(node),
            _ => Err(UseAfterDeleteError { id: entity.id() }.into()),
        }
    }

    pub(crate) fn live_node(&self, id: EntityId) -> Option<&Node> {
        self.nodes.get(id as usize).filter(|node| node.is_alive())
    }

    #[inline]
    pub(crate) fn is_id_alive(&self, id: EntityId) -> bool {
        self.live_node(id).is_some()
    }

    pub(crate) fn location_of_id(&self, id: EntityId) -> StoreResult<(ArchetypeID, usize)> {
        let node = self.live_node(id).ok_or(UseAfterDeleteError { id })?;
        let archetype_id = node.archetype.ok_or(UseAfterDeleteError { id })?;
        Ok((archetype_id, node.row))
    }

    /// Handle of a live id; callers guarantee liveness.
    #[inline]
    pub(crate) fn handle(&self, id: EntityId) -> Entity {
        let generation = self.nodes.get(id as usize).map(Node::generation).unwrap_or_default();
        Entity::new(self.store_id, id, generation)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Components
// ─────────────────────────────────────────────────────────────────────────────

impl EntityStore {

    /// Adds component `value` to `entity`.
    ///
    /// ## Behavior
    /// - Absent component: the entity moves to the archetype of
    ///   `signature ∪ {T}`, the index (if any) gains the value and an `Added`
    ///   event is emitted. Returns `true`.
    /// - Present component: the value is replaced in place (index retract then
    ///   reinsert, `Updated` event). Returns `false`.

    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> StoreResult<bool> {
        let component_id = component_id_of::<T>()?;
        self.add_component_boxed(entity, component_id, Box::new(value))
    }

    /// Type-erased [`add_component`](Self::add_component).
    ///
    /// ## Errors
    /// `Storage(TypeMismatch)` if `value` is not of the registered type; the
    /// store is unchanged in that case.

    pub fn add_component_boxed(
        &mut self,
        entity: Entity,
        component_id: ComponentID,
        value: Box<dyn Any + Send>,
    ) -> StoreResult<bool> {
        let info = Self::info(component_id)?;
        if (*value).type_id() != info.type_id {
            return Err(ColumnError::TypeMismatch { expected: info.type_name }.into());
        }
        let id = self.check(entity)?.id;
        let (archetype_id, _) = self.location_of_id(id)?;

        if self.archetypes[archetype_id as usize].has(component_id) {
            self.replace_component(id, &info, value)?;
            return Ok(false);
        }

        let mut signature = *self.archetypes[archetype_id as usize].signature();
        signature.components.set(component_id);
        self.move_entity(id, signature, vec![(component_id, value)])?;
        self.index_insert(id, component_id)?;

        self.events.component_changed.emit(&ComponentChanged {
            action: ComponentAction::Added,
            entity_id: id,
            component_id,
        });
        Ok(true)
    }

    /// Replaces the value of a component `entity` already has.
    ///
    /// Returns `false` (and changes nothing) if the component is absent.

    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) -> StoreResult<bool> {
        let info = component_info_of::<T>()?;
        let id = self.check(entity)?.id;
        let (archetype_id, _) = self.location_of_id(id)?;
        if !self.archetypes[archetype_id as usize].has(info.id) {
            return Ok(false);
        }
        self.replace_component(id, &info, Box::new(value))?;
        Ok(true)
    }

    /// Removes component `T` from `entity`. Returns `false` if it was absent.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> StoreResult<bool> {
        let component_id = component_id_of::<T>()?;
        self.remove_component_by_id(entity, component_id)
    }

    /// Type-erased [`remove_component`](Self::remove_component).

    pub fn remove_component_by_id(&mut self, entity: Entity, component_id: ComponentID) -> StoreResult<bool> {
        Self::info(component_id)?;
        let id = self.check(entity)?.id;
        let (archetype_id, _) = self.location_of_id(id)?;
        if !self.archetypes[archetype_id as usize].has(component_id) {
            return Ok(false);
        }

        self.index_remove(id, component_id)?;
        let mut signature = *self.archetypes[archetype_id as usize].signature();
        signature.components.clear(component_id);
        self.move_entity(id, signature, Vec::new())?;

        self.events.component_changed.emit(&ComponentChanged {
            action: ComponentAction::Removed,
            entity_id: id,
            component_id,
        });
        Ok(true)
    }

    /// Returns `true` if `entity` has component `T`.
    pub fn has_component<T: Component>(&self, entity: Entity) -> StoreResult<bool> {
        let component_id = component_id_of::<T>()?;
        Ok(self.archetype_of(entity)?.has(component_id))
    }

    /// Component `T` of `entity`, `None` if absent.

    pub fn get_component<T: Component>(&self, entity: Entity) -> StoreResult<Option<&T>> {
        let component_id = component_id_of::<T>()?;
        let id = self.check(entity)?.id;
        let (archetype_id, row) = self.location_of_id(id)?;
        Ok(self.archetypes[archetype_id as usize]
            .typed_column::<T>(component_id)
            .and_then(|column| column.at(row)))
    }

    /// Mutable component `T` of `entity`, `None` if absent.
    ///
    /// Emits no event.
    ///
    /// ## Errors
    /// `InvalidOperation::IndexedMutation` for indexed components; use
    /// [`set_component`](Self::set_component) for those.

    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> StoreResult<Option<&mut T>> {
        let info = component_info_of::<T>()?;
        if info.is_indexed() {
            return Err(InvalidOperationError::IndexedMutation { key: info.key }.into());
        }
        let id = self.check(entity)?.id;
        let (archetype_id, row) = self.location_of_id(id)?;
        Ok(self.archetypes[archetype_id as usize]
            .typed_column_mut::<T>(info.id)
            .and_then(|column| column.at_mut(row)))
    }

    fn replace_component(
        &mut self,
        id: EntityId,
        info: &ComponentInfo,
        value: Box<dyn Any + Send>,
    ) -> StoreResult<()> {
        let component_id = info.id;
        let (archetype_id, row) = self.location_of_id(id)?;
        self.index_remove(id, component_id)?;
        self.archetypes[archetype_id as usize]
            .column_mut(component_id)
            .ok_or(ColumnError::MissingColumn { component_id })?
            .replace_boxed(row, value)?;
        self.index_insert(id, component_id)?;

        self.events.component_changed.emit(&ComponentChanged {
            action: ComponentAction::Updated,
            entity_id: id,
            component_id,
        });
        Ok(())
    }

    fn info(component_id: ComponentID) -> Result<ComponentInfo, RegistryError> {
        component_info(component_id).ok_or(RegistryError::NotRegistered { type_name: "<unknown component id>" })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tags
// ─────────────────────────────────────────────────────────────────────────────

impl EntityStore {

    /// Adds tag `G` to `entity`. Returns `false` if it was already present.
    pub fn add_tag<G: Tag>(&mut self, entity: Entity) -> StoreResult<bool> {
        let tag_id = tag_id_of::<G>()?;
        self.add_tag_by_id(entity, tag_id)
    }

    /// Removes tag `G` from `entity`. Returns `false` if it was absent.
    pub fn remove_tag<G: Tag>(&mut self, entity: Entity) -> StoreResult<bool> {
        let tag_id = tag_id_of::<G>()?;
        self.remove_tag_by_id(entity, tag_id)
    }

    /// Returns `true` if `entity` has tag `G`.
    pub fn has_tag<G: Tag>(&self, entity: Entity) -> StoreResult<bool> {
        let tag_id = tag_id_of::<G>()?;
        Ok(self.archetype_of(entity)?.signature().tags.has(tag_id))
    }

    /// Tag ids of `entity` in ascending order.
    pub fn tags_of(&self, entity: Entity) -> StoreResult<Vec<TagID>> {
        Ok(self.archetype_of(entity)?.signature().tags.iter().collect())
    }

    /// Type-erased [`add_tag`](Self::add_tag).
    pub fn add_tag_by_id(&mut self, entity: Entity, tag_id: TagID) -> StoreResult<bool> {
        self.toggle_tag(entity, tag_id, true)
    }

    /// Type-erased [`remove_tag`](Self::remove_tag).
    pub fn remove_tag_by_id(&mut self, entity: Entity, tag_id: TagID) -> StoreResult<bool> {
        self.toggle_tag(entity, tag_id, false)
    }

    fn toggle_tag(&mut self, entity: Entity, tag_id: TagID, added: bool) -> StoreResult<bool> {
        if tag_info(tag_id).is_none() {
            return Err(RegistryError::NotRegistered { type_name: "<unknown tag id>" }.into());
        }
        let id = self.check(entity)?.id;
        let (archetype_id, _) = self.location_of_id(id)?;
        let mut signature = *self.archetypes[archetype_id as usize].signature();
        if signature.tags.has(tag_id) == added {
            return Ok(false);
        }
        if added {
            signature.tags.set(tag_id);
        } else {
            signature.tags.clear(tag_id);
        }
        self.move_entity(id, signature, Vec::new())?;

        self.events.tags_changed.emit(&TagsChanged { entity_id: id, tag_id, added });
        Ok(true)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripts
// ─────────────────────────────────────────────────────────────────────────────

impl EntityStore {

    /// Attaches `script` to `entity`, returning the script it replaced.
    pub fn add_script<S: Script>(&mut self, entity: Entity, script: S) -> StoreResult<Option<S>> {
        let script_id = script_id_of::<S>()?;
        let id = self.check(entity)?.id;
        let previous = self.set_script_boxed(id, script_id, Box::new(script));
        Ok(previous.and_then(|previous| previous.into_any().downcast::<S>().ok()).map(|script| *script))
    }

    /// Script `S` of `entity`.
    pub fn get_script<S: Script>(&self, entity: Entity) -> StoreResult<Option<&S>> {
        let script_id = script_id_of::<S>()?;
        let node = self.check(entity)?;
        Ok(node
            .scripts
            .iter()
            .find(|(id, _)| *id == script_id)
            .and_then(|(_, script)| script.as_any().downcast_ref::<S>()))
    }

    /// Mutable script `S` of `entity`.
    pub fn get_script_mut<S: Script>(&mut self, entity: Entity) -> StoreResult<Option<&mut S>> {
        let script_id = script_id_of::<S>()?;
        let id = self.check(entity)?.id;
        Ok(self.nodes[id as usize]
            .scripts
            .iter_mut()
            .find(|(id, _)| *id == script_id)
            .and_then(|(_, script)| script.as_any_mut().downcast_mut::<S>()))
    }

    /// Detaches script `S` from `entity` and returns it.
    pub fn remove_script<S: Script>(&mut self, entity: Entity) -> StoreResult<Option<S>> {
        let script_id = script_id_of::<S>()?;
        let id = self.check(entity)?.id;
        let removed = self.remove_script_by_id(id, script_id);
        Ok(removed.and_then(|script| script.into_any().downcast::<S>().ok()).map(|script| *script))
    }

    /// Number of scripts attached to `entity`.
    pub fn script_count(&self, entity: Entity) -> StoreResult<usize> {
        Ok(self.check(entity)?.scripts.len())
    }

    pub(crate) fn set_script_boxed(
        &mut self,
        id: EntityId,
        script_id: ScriptID,
        script: Box<dyn ScriptObject>,
    ) -> Option<Box<dyn ScriptObject>> {
        let node = &mut self.nodes[id as usize];
        match node.script_position(script_id) {
            Some(position) => Some(std::mem::replace(&mut node.scripts[position].1, script)),
            None => {
                node.scripts.push((script_id, script));
                None
            }
        }
    }

    pub(crate) fn remove_script_by_id(&mut self, id: EntityId, script_id: ScriptID) -> Option<Box<dyn ScriptObject>> {
        let node = &mut self.nodes[id as usize];
        let position = node.script_position(script_id)?;
        Some(node.scripts.remove(position).1)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Indexes
// ─────────────────────────────────────────────────────────────────────────────

impl EntityStore {

    /// Entities whose indexed value `v` of `T` satisfies `min <= v <= max`.
    ///
    /// Ordered by value, then id. Empty when `min > max`.

    pub fn value_in_range<T: IndexedComponent>(&self, min: &T::Value, max: &T::Value) -> StoreResult<Vec<Entity>> {
        Ok(self.index_ids_in_range::<T>(min, max)?.into_iter().map(|id| self.handle(id)).collect())
    }

    /// Entities whose indexed value of `T` equals `value`.
    pub fn entities_with_value<T: IndexedComponent>(&self, value: &T::Value) -> StoreResult<Vec<Entity>> {
        let ids = self
            .index_of::<T>()?
            .map(|index| index.entities_with_value(value))
            .unwrap_or_default();
        Ok(ids.into_iter().map(|id| self.handle(id)).collect())
    }

    /// Index of `T`; `None` until the first value is indexed, or if `T` was
    /// registered without an index.

    pub fn index_of<T: IndexedComponent>(&self) -> StoreResult<Option<&RangeIndex<T>>> {
        let component_id = component_id_of::<T>()?;
        Ok(self
            .indexes
            .get(&component_id)
            .and_then(|index| index.as_any().downcast_ref::<RangeIndex<T>>()))
    }

    pub(crate) fn index_ids_in_range<T: IndexedComponent>(
        &self,
        min: &T::Value,
        max: &T::Value,
    ) -> StoreResult<Vec<EntityId>> {
        Ok(self
            .index_of::<T>()?
            .map(|index| index.value_in_range(min, max))
            .unwrap_or_default())
    }

    fn index_insert(&mut self, id: EntityId, component_id: ComponentID) -> StoreResult<()> {
        let Some(factory) = component_info(component_id).and_then(|info| info.new_index) else {
            return Ok(());
        };
        let (archetype_id, row) = self.location_of_id(id)?;
        let column = self.archetypes[archetype_id as usize]
            .column(component_id)
            .ok_or(ColumnError::MissingColumn { component_id })?;
        let index = self.indexes.entry(component_id).or_insert_with(|| {
            log::debug!("created index for component {component_id}");
            factory()
        });
        index.insert_row(column, row, id)?;
        Ok(())
    }

    fn index_remove(&mut self, id: EntityId, component_id: ComponentID) -> StoreResult<()> {
        let Some(index) = self.indexes.get_mut(&component_id) else {
            return Ok(());
        };
        let node = self.nodes.get(id as usize).ok_or(UseAfterDeleteError { id })?;
        let archetype_id = node.archetype.ok_or(UseAfterDeleteError { id })?;
        let column = self.archetypes[archetype_id as usize]
            .column(component_id)
            .ok_or(ColumnError::MissingColumn { component_id })?;
        index.remove_row(column, node.row, id)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Archetype moves
// ─────────────────────────────────────────────────────────────────────────────

impl EntityStore {

    /// Retrieves the archetype for `signature`, creating it if necessary.
    ///
    /// Archetypes are created lazily and assigned increasing ids.

    pub(crate) fn get_or_create_archetype(&mut self, signature: Signature) -> StoreResult<ArchetypeID> {
        if let Some(&archetype_id) = self.signature_map.get(&signature) {
            return Ok(archetype_id);
        }
        let archetype_id = self.archetypes.len() as ArchetypeID;
        let archetype = Archetype::new(archetype_id, signature)?;
        log::debug!(
            "created archetype {archetype_id} ({} components, {} tags)",
            signature.components.count(),
            signature.tags.count()
        );
        self.archetypes.push(archetype);
        self.signature_map.insert(signature, archetype_id);
        Ok(archetype_id)
    }

    /// Returns mutable references to two distinct archetypes.

    #[inline]
    fn archetype_pair_mut(
        archetypes: &mut [Archetype],
        a: ArchetypeID,
        b: ArchetypeID,
    ) -> (&mut Archetype, &mut Archetype) {
        debug_assert!(a != b);

        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = archetypes.split_at_mut(high as usize);

        let left = &mut head[low as usize];
        let right = &mut tail[0];

        if a < b { (left, right) } else { (right, left) }
    }

    /// Moves entity `id` to the archetype of `signature`.
    ///
    /// `added` must supply every component of `signature` the entity does not
    /// have yet. Components outside `signature` are dropped.

    pub(crate) fn move_entity(
        &mut self,
        id: EntityId,
        signature: Signature,
        added: Vec<(ComponentID, Box<dyn Any + Send>)>,
    ) -> StoreResult<()> {
        let (source_id, row) = self.location_of_id(id)?;
        let destination_id = self.get_or_create_archetype(signature)?;
        if source_id == destination_id {
            return Ok(());
        }

        let (source, destination) = Self::archetype_pair_mut(&mut self.archetypes, source_id, destination_id);
        let moved = source.move_row_to(row, destination, added)?;

        let node = &mut self.nodes[id as usize];
        node.archetype = Some(destination_id);
        node.row = moved.destination_row;
        if let Some(displaced) = moved.displaced {
            self.nodes[displaced as usize].row = row;
        }

        log::trace!("moved entity {id} from archetype {source_id} to {destination_id}");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

impl EntityStore {

    /// Subscribes to child list changes.
    pub fn on_child_nodes_changed<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&ChildNodesChanged) + Send + Sync + 'static,
    {
        self.events.child_nodes_changed.subscribe(handler)
    }

    /// Unsubscribes a child list handler.
    pub fn remove_child_nodes_changed_handler(&mut self, handler: HandlerId) -> bool {
        self.events.child_nodes_changed.unsubscribe(handler)
    }

    /// Subscribes to component changes.
    pub fn on_component_changed<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&ComponentChanged) + Send + Sync + 'static,
    {
        self.events.component_changed.subscribe(handler)
    }

    /// Unsubscribes a component handler.
    pub fn remove_component_changed_handler(&mut self, handler: HandlerId) -> bool {
        self.events.component_changed.unsubscribe(handler)
    }

    /// Subscribes to tag changes.
    pub fn on_tags_changed<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&TagsChanged) + Send + Sync + 'static,
    {
        self.events.tags_changed.subscribe(handler)
    }

    /// Unsubscribes a tag handler.
    pub fn remove_tags_changed_handler(&mut self, handler: HandlerId) -> bool {
        self.events.tags_changed.unsubscribe(handler)
    }
}
