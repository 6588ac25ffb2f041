//! Chunked column storage and type-erased column access.
//!
//! This module implements the column container used by archetypes,
//! [`ChunkedColumn<T>`], which stores values densely in fixed-capacity blocks of
//! [`CHUNK_CAP`] rows. Growth appends one block at a time, so populated rows are
//! never relocated by a push.
//!
//! # What this module provides
//!
//! - **`ChunkedColumn<T>`**: chunked, dense storage for a single element type.
//! - **`Chunk<'a, T>`**: a bounded read-only view over the used prefix of one
//!   block, with [`Chunk::copy_into`] for callers that want an isolated copy.
//! - **`Column`**: the type-erased interface archetypes hold their columns
//!   behind (`Box<dyn Column>`), used for cross-archetype moves, boxed inserts
//!   and record encoding without knowing `T` at compile time.
//!
//! # Storage model
//!
//! ```text
//! blocks: Vec<Vec<T>>   // every Vec allocated with capacity CHUNK_CAP
//! len:    usize         // populated rows across all blocks
//! ```
//!
//! A linear row maps to `(block, offset)` with [`chunk_position`]. All blocks
//! before the one holding row `len - 1` are full. Blocks emptied by removals
//! stay allocated and are refilled by later pushes.
//!
//! # Core operations
//!
//! - **Append**: `push` writes into the block at `len / CHUNK_CAP`, allocating
//!   that block first if it does not exist yet.
//! - **Remove**: `swap_remove` deletes a row in `O(1)` by moving the last row
//!   into the hole and reports where the moved row came from.
//! - **Transfer**: [`Column::move_row_to`] swap-removes a row here and pushes it
//!   onto another column of the same element type.
//!
//! These operations keep rows dense but do **not** preserve order.

use std::any::{Any, type_name};

use serde::Serialize;
use serde_json::value::RawValue;

use crate::engine::error::ColumnError;
use crate::engine::types::{chunk_position, CHUNK_CAP};


/// Dense chunked storage for one element type.
///
/// ## Invariants
/// - `blocks[b].len() == CHUNK_CAP` for every block below the last used one.
/// - The sum of block lengths equals `len`.
/// - Every block was allocated with capacity `CHUNK_CAP` and never reallocates.

#[derive(Debug)]
pub struct ChunkedColumn<T> {
    blocks: Vec<Vec<T>>,
    len: usize,
}

impl<T> Default for ChunkedColumn<T> {
    fn default() -> Self {
        Self { blocks: Vec::new(), len: 0 }
    }
}

impl<T> ChunkedColumn<T> {
    /// Creates an empty column without allocating.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of populated rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when no row is populated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of blocks that currently hold at least one row.
    #[inline]
    pub fn block_count(&self) -> usize {
        (self.len + CHUNK_CAP - 1) / CHUNK_CAP
    }

    /// Number of allocated blocks, including retained empty ones.
    #[inline]
    pub fn allocated_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Row capacity available without allocating another block.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.blocks.len() * CHUNK_CAP
    }

    /// Appends `value` and returns its row.

    pub fn push(&mut self, value: T) -> usize {
        let row = self.len;
        let (block, _) = chunk_position(row);
        if block == self.blocks.len() {
            self.blocks.push(Vec::with_capacity(CHUNK_CAP));
        }
        self.blocks[block].push(value);
        self.len += 1;
        row
    }

    /// Removes `row` by moving the last row into its place.
    ///
    /// ## Returns
    /// `(removed, moved_from)` where `moved_from` is the old row of the element
    /// that now occupies `row`, or `None` if `row` was the last row.
    ///
    /// ## Errors
    /// `RowOutOfBounds` if `row >= len`.

    pub fn swap_remove(&mut self, row: usize) -> Result<(T, Option<usize>), ColumnError> {
        if row >= self.len {
            return Err(ColumnError::RowOutOfBounds { row, len: self.len });
        }
        let last = self.len - 1;
        let (last_block, _) = chunk_position(last);
        let tail = self.blocks[last_block]
            .pop()
            .ok_or(ColumnError::RowOutOfBounds { row: last, len: self.len })?;
        self.len -= 1;

        if row == last {
            return Ok((tail, None));
        }
        let (block, offset) = chunk_position(row);
        let removed = std::mem::replace(&mut self.blocks[block][offset], tail);
        Ok((removed, Some(last)))
    }

    /// Returns the value at `row`.
    #[inline]
    pub fn at(&self, row: usize) -> Option<&T> {
        let (block, offset) = chunk_position(row);
        self.blocks.get(block).and_then(|b| b.get(offset))
    }

    /// Returns the value at `row` mutably.
    #[inline]
    pub fn at_mut(&mut self, row: usize) -> Option<&mut T> {
        let (block, offset) = chunk_position(row);
        self.blocks.get_mut(block).and_then(|b| b.get_mut(offset))
    }

    /// Replaces the value at `row`, returning the previous one.

    pub fn replace(&mut self, row: usize, value: T) -> Result<T, ColumnError> {
        let len = self.len;
        let slot = self.at_mut(row).ok_or(ColumnError::RowOutOfBounds { row, len })?;
        Ok(std::mem::replace(slot, value))
    }

    /// Used prefix of block `index`; empty for unused or retained blocks.
    #[inline]
    pub fn block(&self, index: usize) -> &[T] {
        self.blocks.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Mutable used prefix of block `index`.
    #[inline]
    pub fn block_mut(&mut self, index: usize) -> &mut [T] {
        match self.blocks.get_mut(index) {
            Some(block) => block.as_mut_slice(),
            None => &mut [],
        }
    }

    /// Read-only view over block `index`.
    #[inline]
    pub fn chunk(&self, index: usize) -> Chunk<'_, T> {
        Chunk { items: self.block(index), block: index }
    }

    /// Iterates over every non-empty block as a [`Chunk`].
    pub fn chunks(&self) -> impl Iterator<Item = Chunk<'_, T>> + '_ {
        (0..self.block_count()).map(move |index| self.chunk(index))
    }

    /// Iterates over every populated row in row order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.blocks.iter().flat_map(|b| b.iter())
    }

    /// Drops every value; allocated blocks are kept.
    pub fn clear(&mut self) {
        for block in &mut self.blocks {
            block.clear();
        }
        self.len = 0;
    }
}

/// Bounded read-only view over the used prefix of one block.
///
/// Row `i` of the chunk is row `block * CHUNK_CAP + i` of the column.

#[derive(Debug)]
pub struct Chunk<'a, T> {
    items: &'a [T],
    block: usize,
}

impl<'a, T> Clone for Chunk<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for Chunk<'a, T> {}

impl<'a, T> Chunk<'a, T> {
    /// Number of rows in this view.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the view is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Index of the block inside its column.
    #[inline]
    pub fn block_index(&self) -> usize {
        self.block
    }

    /// Column row of the first element.
    #[inline]
    pub fn first_row(&self) -> usize {
        self.block * CHUNK_CAP
    }

    /// Underlying slice.
    #[inline]
    pub fn as_slice(&self) -> &'a [T] {
        self.items
    }

    /// Element at `index` inside the chunk.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&'a T> {
        self.items.get(index)
    }

    /// Iterates over the chunk.
    pub fn iter(&self) -> std::slice::Iter<'a, T> {
        self.items.iter()
    }

    /// Replaces the content of `target` with a copy of this chunk.
    pub fn copy_into(&self, target: &mut Vec<T>)
    where
        T: Clone,
    {
        target.clear();
        target.extend_from_slice(self.items);
    }
}

impl<'a, T> IntoIterator for Chunk<'a, T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A type-erased interface over [`ChunkedColumn<T>`].
///
/// Archetypes keep one `Box<dyn Column>` per component type in their signature.
/// Moving an entity between archetypes, inserting decoded values and encoding
/// rows into records all go through this trait.
///
/// # Downcasting
/// Implementers return `self` from `as_any` / `as_any_mut` so callers can
/// `downcast_ref::<ChunkedColumn<T>>()` when the element type is known.
///
/// ## Example
/// ```ignore
/// if let Some(column) = erased.as_any().downcast_ref::<ChunkedColumn<Position>>() {
///     println!("column holds {} positions", column.len());
/// }
/// ```

pub trait Column: Any + Send + Sync {
    /// Number of populated rows.
    fn len(&self) -> usize;

    /// Returns `true` when no row is populated.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type name for diagnostics.
    fn element_type_name(&self) -> &'static str;

    /// Downcasting hook.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcasting hook.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Swap-removes `row` here and pushes it onto `destination`.
    ///
    /// ## Returns
    /// `(destination_row, moved_from)` where `moved_from` is the old row of the
    /// element that filled the hole in this column.
    ///
    /// ## Errors
    /// `TypeMismatch` if `destination` holds another element type, or
    /// `RowOutOfBounds` for an invalid `row`.

    fn move_row_to(
        &mut self,
        row: usize,
        destination: &mut dyn Column,
    ) -> Result<(usize, Option<usize>), ColumnError>;

    /// Swap-removes `row` and drops its value. Returns `moved_from`.
    fn swap_remove_drop(&mut self, row: usize) -> Result<Option<usize>, ColumnError>;

    /// Appends a boxed value of the element type. Returns its row.
    fn push_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<usize, ColumnError>;

    /// Overwrites `row` with a boxed value of the element type.
    fn replace_boxed(&mut self, row: usize, value: Box<dyn Any + Send>) -> Result<(), ColumnError>;

    /// Encodes `row` as a JSON fragment.
    fn encode_json(&self, row: usize) -> Result<Option<Box<RawValue>>, serde_json::Error>;
}

impl<T> Column for ChunkedColumn<T>
where
    T: Serialize + Send + Sync + 'static,
{
    fn len(&self) -> usize { self.len }
    fn element_type_name(&self) -> &'static str { type_name::<T>() }
    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }

    fn move_row_to(
        &mut self,
        row: usize,
        destination: &mut dyn Column,
    ) -> Result<(usize, Option<usize>), ColumnError> {
        let destination = destination
            .as_any_mut()
            .downcast_mut::<ChunkedColumn<T>>()
            .ok_or(ColumnError::TypeMismatch { expected: type_name::<T>() })?;
        let (value, moved_from) = self.swap_remove(row)?;
        Ok((destination.push(value), moved_from))
    }

    fn swap_remove_drop(&mut self, row: usize) -> Result<Option<usize>, ColumnError> {
        self.swap_remove(row).map(|(_, moved_from)| moved_from)
    }

    fn push_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<usize, ColumnError> {
        let value = value
            .downcast::<T>()
            .map_err(|_| ColumnError::TypeMismatch { expected: type_name::<T>() })?;
        Ok(self.push(*value))
    }

    fn replace_boxed(&mut self, row: usize, value: Box<dyn Any + Send>) -> Result<(), ColumnError> {
        let value = value
            .downcast::<T>()
            .map_err(|_| ColumnError::TypeMismatch { expected: type_name::<T>() })?;
        self.replace(row, *value).map(drop)
    }

    fn encode_json(&self, row: usize) -> Result<Option<Box<RawValue>>, serde_json::Error> {
        match self.at(row) {
            Some(value) => serde_json::value::to_raw_value(value).map(Some),
            None => Ok(None),
        }
    }
}
