//! Typed query construction and execution.
//!
//! This module provides a *builder-style* API for selecting entities by their
//! component and tag sets, optionally narrowed by a component index range, and
//! for iterating the selected entities archetype by archetype, block by block.
//!
//! ## Design goals
//! * **Static intent:** the fetched components are a tuple type
//!   ([`QueryData`]), further required or excluded components and tags are
//!   declared on the [`QueryBuilder`].
//! * **Runtime efficiency:** matching archetypes are resolved lazily on first
//!   execution and cached; archetypes created later extend the cache, the
//!   scan resumes at the first archetype id not seen yet.
//! * **Safety by construction:** read-only iteration borrows the store
//!   shared, mutable iteration borrows it exclusively, so structural changes
//!   during iteration do not compile.
//!
//! ## Execution model
//! 1. Resolve archetypes whose signature contains every required component
//!    and tag and none of the excluded ones.
//! 2. Without an index filter: walk each matching archetype block by block.
//! 3. With an index filter: walk the index candidates in index order and keep
//!    those whose archetype matches.
//!
//! ## Example
//! ```ignore
//! let mut query = store
//!     .query::<(Position, Velocity)>()
//!     .with_tag::<Enemy>()
//!     .without::<Frozen>()
//!     .build()?;
//!
//! query.for_each(&store, |entity, (position, velocity)| {
//!     println!("{entity}: {} {}", position.x, velocity.x);
//! })?;
//! ```

use std::marker::PhantomData;

use rayon::prelude::*;

use crate::engine::archetype::Archetype;
use crate::engine::component::{
    component_id_of, component_info_of, tag_id_of, Component, IndexedComponent, Tag,
};
use crate::engine::entity::Entity;
use crate::engine::error::{ArgumentError, InvalidOperationError, RegistryError, StoreResult};
use crate::engine::storage::{Chunk, ChunkedColumn};
use crate::engine::store::EntityStore;
use crate::engine::types::{ArchetypeID, ComponentID, EntityId, QuerySignature, StoreId};


/// Component tuple fetched by a query.
///
/// Implemented for `()` and for tuples of one to four [`Component`] types.
/// `Item<'a>` is the matching tuple of shared references.

pub trait QueryData: 'static {
    /// Tuple of references yielded per entity.
    type Item<'a>;

    /// Tuple of typed columns resolved once per archetype.
    type Columns<'a>;

    /// Registered ids of the tuple's component types, in tuple order.
    fn component_ids() -> Result<Vec<ComponentID>, RegistryError>;

    /// Resolves the typed columns of `archetype`.
    fn columns<'a>(archetype: &'a Archetype, ids: &[ComponentID]) -> Option<Self::Columns<'a>>;

    /// Fetches the item at `row`.
    fn fetch<'a>(columns: &Self::Columns<'a>, row: usize) -> Option<Self::Item<'a>>;
}

macro_rules! impl_query_data {
    ($(($name:ident, $index:tt)),*) => {
        impl<$($name: Component),*> QueryData for ($($name,)*) {
            type Item<'a> = ($(&'a $name,)*);
            type Columns<'a> = ($(&'a ChunkedColumn<$name>,)*);

            fn component_ids() -> Result<Vec<ComponentID>, RegistryError> {
                Ok(vec![$(component_id_of::<$name>()?),*])
            }

            #[allow(unused_variables)]
            fn columns<'a>(archetype: &'a Archetype, ids: &[ComponentID]) -> Option<Self::Columns<'a>> {
                Some(($(archetype.typed_column::<$name>(*ids.get($index)?)?,)*))
            }

            #[allow(unused_variables, clippy::unused_unit)]
            fn fetch<'a>(columns: &Self::Columns<'a>, row: usize) -> Option<Self::Item<'a>> {
                Some(($(columns.$index.at(row)?,)*))
            }
        }
    };
}

impl_query_data!();
impl_query_data!((A, 0));
impl_query_data!((A, 0), (B, 1));
impl_query_data!((A, 0), (B, 1), (C, 2));
impl_query_data!((A, 0), (B, 1), (C, 2), (D, 3));

type IndexFilter = Box<dyn Fn(&EntityStore) -> StoreResult<Vec<EntityId>> + Send + Sync>;

/// Builder for a [`Query`].
///
/// Registry lookups are deferred: the first failing lookup is reported by
/// [`build`](Self::build).

pub struct QueryBuilder<D: QueryData> {
    store_id: StoreId,
    signature: QuerySignature,
    component_ids: Vec<ComponentID>,
    filter: Option<IndexFilter>,
    error: Option<RegistryError>,
    _marker: PhantomData<fn() -> D>,
}

impl<D: QueryData> QueryBuilder<D> {
    fn new(store_id: StoreId) -> Self {
        let mut builder = Self {
            store_id,
            signature: QuerySignature::default(),
            component_ids: Vec::new(),
            filter: None,
            error: None,
            _marker: PhantomData,
        };
        match D::component_ids() {
            Ok(ids) => {
                for &component_id in &ids {
                    builder.signature.all.components.set(component_id);
                }
                builder.component_ids = ids;
            }
            Err(error) => builder.error = Some(error),
        }
        builder
    }

    fn record<T>(&mut self, lookup: Result<T, RegistryError>) -> Option<T> {
        match lookup {
            Ok(value) => Some(value),
            Err(error) => {
                self.error.get_or_insert(error);
                None
            }
        }
    }

    /// Requires component `T` without fetching it.
    pub fn with<T: Component>(mut self) -> Self {
        if let Some(component_id) = self.record(component_id_of::<T>()) {
            self.signature.all.components.set(component_id);
        }
        self
    }

    /// Excludes archetypes containing component `T`.
    pub fn without<T: Component>(mut self) -> Self {
        if let Some(component_id) = self.record(component_id_of::<T>()) {
            self.signature.without.components.set(component_id);
        }
        self
    }

    /// Requires tag `G`.
    pub fn with_tag<G: Tag>(mut self) -> Self {
        if let Some(tag_id) = self.record(tag_id_of::<G>()) {
            self.signature.all.tags.set(tag_id);
        }
        self
    }

    /// Excludes archetypes containing tag `G`.
    pub fn without_tag<G: Tag>(mut self) -> Self {
        if let Some(tag_id) = self.record(tag_id_of::<G>()) {
            self.signature.without.tags.set(tag_id);
        }
        self
    }

    /// Restricts results to entities whose indexed value of `T` lies in
    /// `min..=max`. Also requires `T`.
    ///
    /// Iteration then follows index order (value, then id).

    pub fn value_in_range<T: IndexedComponent>(mut self, min: T::Value, max: T::Value) -> Self {
        if let Some(component_id) = self.record(component_id_of::<T>()) {
            self.signature.all.components.set(component_id);
            self.filter = Some(Box::new(move |store: &EntityStore| store.index_ids_in_range::<T>(&min, &max)));
        }
        self
    }

    /// Finishes the query.
    ///
    /// ## Errors
    /// The first registry lookup failure recorded while building.

    pub fn build(self) -> StoreResult<Query<D>> {
        if let Some(error) = self.error {
            return Err(error.into());
        }
        Ok(Query {
            store_id: self.store_id,
            signature: self.signature,
            component_ids: self.component_ids,
            filter: self.filter,
            matched: Vec::new(),
            scanned_upto: 0,
            _marker: PhantomData,
        })
    }
}

/// One block of one matching archetype: entity ids plus one component column.

#[derive(Debug)]
pub struct QueryChunk<'a, T> {
    /// Archetype the block belongs to.
    pub archetype_id: ArchetypeID,
    /// Entity ids, row-aligned with `values`.
    pub entities: Chunk<'a, EntityId>,
    /// Component values.
    pub values: Chunk<'a, T>,
}

impl<'a, T> QueryChunk<'a, T> {
    /// Number of rows in the block.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the block holds no row.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A resolved query bound to the store it was built from.

pub struct Query<D: QueryData> {
    store_id: StoreId,
    signature: QuerySignature,
    component_ids: Vec<ComponentID>,
    filter: Option<IndexFilter>,
    matched: Vec<ArchetypeID>,
    scanned_upto: usize,
    _marker: PhantomData<fn() -> D>,
}

impl<D: QueryData> Query<D> {

    /// Required and excluded sets of this query.
    pub fn signature(&self) -> &QuerySignature {
        &self.signature
    }

    /// Matching archetype ids, in archetype creation order.
    pub fn archetypes(&mut self, store: &EntityStore) -> StoreResult<&[ArchetypeID]> {
        self.refresh(store)?;
        Ok(&self.matched)
    }

    /// Calls `f` for every matching entity with its fetched components.

    pub fn for_each<'s, F>(&mut self, store: &'s EntityStore, mut f: F) -> StoreResult<()>
    where
        F: FnMut(Entity, D::Item<'s>),
    {
        self.refresh(store)?;

        if let Some(filter) = &self.filter {
            for id in filter(store)? {
                if let Some((archetype, row)) = self.candidate(store, id) {
                    if let Some(item) = D::columns(archetype, &self.component_ids).and_then(|c| D::fetch(&c, row)) {
                        f(store.handle(id), item);
                    }
                }
            }
            return Ok(());
        }

        for &archetype_id in &self.matched {
            let archetype = &store.archetypes[archetype_id as usize];
            if archetype.is_empty() {
                continue;
            }
            let Some(columns) = D::columns(archetype, &self.component_ids) else {
                continue;
            };
            for block in 0..archetype.block_count() {
                let entities = archetype.entity_chunk(block);
                let first_row = entities.first_row();
                for (offset, &id) in entities.iter().enumerate() {
                    if let Some(item) = D::fetch(&columns, first_row + offset) {
                        f(store.handle(id), item);
                    }
                }
            }
        }
        Ok(())
    }

    /// Parallel read-only [`for_each`](Self::for_each) over blocks.
    ///
    /// Blocks (or index candidates) are distributed over the rayon pool; the
    /// call order of `f` is unspecified.

    pub fn par_for_each<'s, F>(&mut self, store: &'s EntityStore, f: F) -> StoreResult<()>
    where
        F: Fn(Entity, D::Item<'s>) + Send + Sync,
    {
        self.refresh(store)?;
        let component_ids = &self.component_ids;

        if let Some(filter) = &self.filter {
            let candidates = filter(store)?;
            let this = &*self;
            candidates.par_iter().for_each(|&id| {
                if let Some((archetype, row)) = this.candidate(store, id) {
                    if let Some(item) = D::columns(archetype, component_ids).and_then(|c| D::fetch(&c, row)) {
                        f(store.handle(id), item);
                    }
                }
            });
            return Ok(());
        }

        let jobs: Vec<(ArchetypeID, usize)> = self
            .matched
            .iter()
            .flat_map(|&archetype_id| {
                let blocks = store.archetypes[archetype_id as usize].block_count();
                (0..blocks).map(move |block| (archetype_id, block))
            })
            .collect();

        jobs.par_iter().for_each(|&(archetype_id, block)| {
            let archetype = &store.archetypes[archetype_id as usize];
            let Some(columns) = D::columns(archetype, component_ids) else {
                return;
            };
            let entities = archetype.entity_chunk(block);
            let first_row = entities.first_row();
            for (offset, &id) in entities.iter().enumerate() {
                if let Some(item) = D::fetch(&columns, first_row + offset) {
                    f(store.handle(id), item);
                }
            }
        });
        Ok(())
    }

    /// Calls `f` with mutable access to component `T` of every matching entity.
    ///
    /// ## Errors
    /// - `InvalidOperation::IndexedMutation` if `T` is indexed.
    /// - `ArgumentError::ComponentNotInQuery` if `T` is not required by the query.

    pub fn for_each_mut<T, F>(&mut self, store: &mut EntityStore, mut f: F) -> StoreResult<()>
    where
        T: Component,
        F: FnMut(Entity, &mut T),
    {
        let info = component_info_of::<T>()?;
        if info.is_indexed() {
            return Err(InvalidOperationError::IndexedMutation { key: info.key }.into());
        }
        if !self.signature.all.components.has(info.id) {
            return Err(ArgumentError::ComponentNotInQuery { key: info.key }.into());
        }
        self.refresh(store)?;

        let candidates = match &self.filter {
            Some(filter) => Some(filter(store)?),
            None => None,
        };
        let store_id = store.store_id;
        let nodes = &store.nodes;
        let archetypes = &mut store.archetypes;

        if let Some(candidates) = candidates {
            for id in candidates {
                let Some(node) = nodes.get(id as usize).filter(|node| node.is_alive()) else {
                    continue;
                };
                let Some(archetype) = node.archetype().and_then(|a| archetypes.get_mut(a as usize)) else {
                    continue;
                };
                if !self.signature.matches(archetype.signature()) {
                    continue;
                }
                if let Some(value) = archetype.typed_column_mut::<T>(info.id).and_then(|c| c.at_mut(node.row())) {
                    f(Entity::new(store_id, id, node.generation()), value);
                }
            }
            return Ok(());
        }

        for &archetype_id in &self.matched {
            let Some((entities, column)) = archetypes[archetype_id as usize].entities_and_column_mut::<T>(info.id) else {
                continue;
            };
            for block in 0..entities.block_count() {
                let ids = entities.block(block);
                for (&id, value) in ids.iter().zip(column.block_mut(block).iter_mut()) {
                    let generation = nodes[id as usize].generation();
                    f(Entity::new(store_id, id, generation), value);
                }
            }
        }
        Ok(())
    }

    /// Handles of every matching entity, in iteration order.
    pub fn entities(&mut self, store: &EntityStore) -> StoreResult<Vec<Entity>> {
        let mut entities = Vec::new();
        self.for_each(store, |entity, _| entities.push(entity))?;
        Ok(entities)
    }

    /// Number of matching entities.
    pub fn count(&mut self, store: &EntityStore) -> StoreResult<usize> {
        if self.filter.is_some() {
            return Ok(self.entities(store)?.len());
        }
        self.refresh(store)?;
        Ok(self
            .matched
            .iter()
            .map(|&archetype_id| store.archetypes[archetype_id as usize].len())
            .sum())
    }

    /// Non-empty blocks of component `T` across matching archetypes.
    ///
    /// The index filter, if any, is not applied; blocks are whole.
    ///
    /// ## Errors
    /// `ArgumentError::ComponentNotInQuery` if `T` is not required by the query.

    pub fn chunks<'s, T: Component>(&mut self, store: &'s EntityStore) -> StoreResult<Vec<QueryChunk<'s, T>>> {
        let info = component_info_of::<T>()?;
        if !self.signature.all.components.has(info.id) {
            return Err(ArgumentError::ComponentNotInQuery { key: info.key }.into());
        }
        self.refresh(store)?;

        let mut chunks = Vec::new();
        for &archetype_id in &self.matched {
            let archetype = &store.archetypes[archetype_id as usize];
            let Some(column) = archetype.typed_column::<T>(info.id) else {
                continue;
            };
            for block in 0..archetype.block_count() {
                chunks.push(QueryChunk {
                    archetype_id,
                    entities: archetype.entity_chunk(block),
                    values: column.chunk(block),
                });
            }
        }
        Ok(chunks)
    }

    fn refresh(&mut self, store: &EntityStore) -> StoreResult<()> {
        if store.store_id != self.store_id {
            return Err(ArgumentError::ForeignQuery.into());
        }
        let archetypes = store.archetypes();
        for archetype in &archetypes[self.scanned_upto.min(archetypes.len())..] {
            if self.signature.matches(archetype.signature()) {
                self.matched.push(archetype.archetype_id());
            }
        }
        self.scanned_upto = archetypes.len();
        Ok(())
    }

    fn candidate<'s>(&self, store: &'s EntityStore, id: EntityId) -> Option<(&'s Archetype, usize)> {
        let node = store.live_node(id)?;
        let archetype = store.archetype(node.archetype()?)?;
        self.signature.matches(archetype.signature()).then_some((archetype, node.row()))
    }
}

impl EntityStore {
    /// Starts a query fetching the components of `D`.
    pub fn query<D: QueryData>(&self) -> QueryBuilder<D> {
        QueryBuilder::new(self.store_id)
    }
}
