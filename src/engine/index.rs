//! Secondary indexes over component values.
//!
//! ## Purpose
//! An indexed component (see [`IndexedComponent`]) is mirrored in a
//! [`RangeIndex`] that maps each indexed value to the ids of the entities
//! holding it, independent of which archetype those entities live in.
//!
//! ## Design
//! - `BTreeMap<Value, BTreeSet<EntityId>>` keeps values ordered for range scans
//!   and ids ordered within one value, so results come out in ascending value
//!   then id order.
//! - The store talks to indexes through the type-erased [`ComponentIndex`]
//!   trait. Insert and remove read the value straight from the archetype
//!   column, so the store never needs to know the concrete component type.
//!
//! ## Invariants
//! - `(v, id)` is present iff entity `id` is live and holds a component whose
//!   indexed value is `v`.
//! - `len()` equals the number of `(value, id)` pairs.

use std::any::{Any, type_name};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use crate::engine::component::IndexedComponent;
use crate::engine::error::ColumnError;
use crate::engine::storage::{ChunkedColumn, Column};
use crate::engine::types::EntityId;


/// Type-erased index maintenance interface used by the store.

pub trait ComponentIndex: Any + Send + Sync {
    /// Inserts the value stored at `row` of `column` for entity `id`.
    fn insert_row(&mut self, column: &dyn Column, row: usize, id: EntityId) -> Result<(), ColumnError>;

    /// Retracts the value stored at `row` of `column` for entity `id`.
    fn remove_row(&mut self, column: &dyn Column, row: usize, id: EntityId) -> Result<(), ColumnError>;

    /// Number of `(value, id)` pairs.
    fn len(&self) -> usize;

    /// Returns `true` if the index holds no pair.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Downcasting hook.
    fn as_any(&self) -> &dyn Any;
}

/// Ordered value-to-ids index for one indexed component type.

pub struct RangeIndex<T: IndexedComponent> {
    entries: BTreeMap<T::Value, BTreeSet<EntityId>>,
    count: usize,
}

impl<T: IndexedComponent> Default for RangeIndex<T> {
    fn default() -> Self {
        Self { entries: BTreeMap::new(), count: 0 }
    }
}

impl<T: IndexedComponent> RangeIndex<T> {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `(value, id)`. Returns `false` if the pair was already present.
    pub fn insert(&mut self, value: T::Value, id: EntityId) -> bool {
        let added = self.entries.entry(value).or_default().insert(id);
        if added {
            self.count += 1;
        }
        added
    }

    /// Removes `(value, id)`. Returns `false` if the pair was absent.
    pub fn remove(&mut self, value: &T::Value, id: EntityId) -> bool {
        let Some(ids) = self.entries.get_mut(value) else {
            return false;
        };
        let removed = ids.remove(&id);
        if ids.is_empty() {
            self.entries.remove(value);
        }
        if removed {
            self.count -= 1;
        }
        removed
    }

    /// Ids whose value `v` satisfies `min <= v <= max`.
    ///
    /// Ordered by value, then id. Empty when `min > max`.

    pub fn value_in_range(&self, min: &T::Value, max: &T::Value) -> Vec<EntityId> {
        if min > max {
            return Vec::new();
        }
        self.entries
            .range((Bound::Included(min), Bound::Included(max)))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// Ids whose value equals `value`, in ascending order.
    pub fn entities_with_value(&self, value: &T::Value) -> Vec<EntityId> {
        self.entries
            .get(value)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Distinct indexed values in ascending order.
    pub fn values(&self) -> impl Iterator<Item = &T::Value> + '_ {
        self.entries.keys()
    }

    /// Number of distinct indexed values.
    pub fn distinct_count(&self) -> usize {
        self.entries.len()
    }

    fn value_at(column: &dyn Column, row: usize) -> Result<T::Value, ColumnError> {
        let column = column
            .as_any()
            .downcast_ref::<ChunkedColumn<T>>()
            .ok_or(ColumnError::TypeMismatch { expected: type_name::<T>() })?;
        column
            .at(row)
            .map(T::indexed_value)
            .ok_or(ColumnError::RowOutOfBounds { row, len: column.len() })
    }
}

impl<T: IndexedComponent> ComponentIndex for RangeIndex<T> {
    fn insert_row(&mut self, column: &dyn Column, row: usize, id: EntityId) -> Result<(), ColumnError> {
        let value = Self::value_at(column, row)?;
        self.insert(value, id);
        Ok(())
    }

    fn remove_row(&mut self, column: &dyn Column, row: usize, id: EntityId) -> Result<(), ColumnError> {
        let value = Self::value_at(column, row)?;
        self.remove(&value, id);
        Ok(())
    }

    fn len(&self) -> usize {
        self.count
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
