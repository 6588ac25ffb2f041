//! # Archetypes
//!
//! An archetype owns every entity whose component set **and** tag set equal
//! its [`Signature`] exactly. It stores one [`Column`] per component type of
//! the signature plus a parallel entity-id column, all row-aligned.
//!
//! ## Row protocol
//!
//! * Row `r` addresses the same entity in every column, including the
//!   entity-id column.
//! * Removing a row swaps the archetype's last row into it, across every
//!   column, then shrinks the archetype by one. The entity that was moved is
//!   reported to the caller so the node table can be fixed up.
//! * Moving an entity to another archetype transfers shared components,
//!   appends destination-only components from supplied values and drops
//!   source-only components, in that order.
//!
//! ## Invariants
//!
//! * Every column has exactly `len()` rows.
//! * `columns[c].is_some()` iff bit `c` is set in `signature.components`.
//! * Archetypes are never freed once created; ids are dense indices into the
//!   store's archetype table.

use std::any::Any;

use crate::engine::component::make_column;
use crate::engine::error::{ColumnError, RegistryError};
use crate::engine::storage::{Chunk, ChunkedColumn, Column};
use crate::engine::types::{ArchetypeID, ComponentID, EntityId, Signature, COMPONENT_CAP};


/// Result of moving a row out of an archetype.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowMove {
    /// Row of the moved entity in the destination archetype.
    pub destination_row: usize,
    /// Entity that filled the vacated source row, if any.
    pub displaced: Option<EntityId>,
}

/// Row-aligned storage for all entities sharing one signature.

pub struct Archetype {
    archetype_id: ArchetypeID,
    signature: Signature,
    columns: Vec<Option<Box<dyn Column>>>,
    component_ids: Vec<ComponentID>,
    entities: ChunkedColumn<EntityId>,
}

impl Archetype {

    /// Creates an empty archetype with one column per component in `signature`.
    ///
    /// ## Errors
    /// `NotRegistered` if a component bit has no registry entry.

    pub fn new(archetype_id: ArchetypeID, signature: Signature) -> Result<Self, RegistryError> {
        let mut columns: Vec<Option<Box<dyn Column>>> = Vec::with_capacity(COMPONENT_CAP);
        columns.resize_with(COMPONENT_CAP, || None);

        let component_ids: Vec<ComponentID> = signature.components.iter().collect();
        for &component_id in &component_ids {
            columns[component_id as usize] = Some(make_column(component_id)?);
        }

        Ok(Self {
            archetype_id,
            signature,
            columns,
            component_ids,
            entities: ChunkedColumn::new(),
        })
    }

    /// Creates the archetype of the empty signature.
    pub fn empty(archetype_id: ArchetypeID) -> Self {
        let mut columns: Vec<Option<Box<dyn Column>>> = Vec::with_capacity(COMPONENT_CAP);
        columns.resize_with(COMPONENT_CAP, || None);
        Self {
            archetype_id,
            signature: Signature::default(),
            columns,
            component_ids: Vec::new(),
            entities: ChunkedColumn::new(),
        }
    }

    /// Identifier of this archetype inside its store.
    #[inline]
    pub fn archetype_id(&self) -> ArchetypeID { self.archetype_id }

    /// Exact component and tag set.
    #[inline]
    pub fn signature(&self) -> &Signature { &self.signature }

    /// Component ids of the signature in ascending order.
    #[inline]
    pub fn component_ids(&self) -> &[ComponentID] { &self.component_ids }

    /// Number of entities stored.
    #[inline]
    pub fn len(&self) -> usize { self.entities.len() }

    /// Returns `true` if the archetype holds no entity.
    #[inline]
    pub fn is_empty(&self) -> bool { self.entities.is_empty() }

    /// Number of blocks holding at least one row.
    #[inline]
    pub fn block_count(&self) -> usize { self.entities.block_count() }

    /// Returns `true` if component `component_id` is part of the signature.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        self.signature.components.has(component_id)
    }

    /// Entity id stored at `row`.
    #[inline]
    pub fn entity_at(&self, row: usize) -> Option<EntityId> {
        self.entities.at(row).copied()
    }

    /// The entity-id column.
    #[inline]
    pub fn entities(&self) -> &ChunkedColumn<EntityId> { &self.entities }

    /// Entity ids of block `index`.
    #[inline]
    pub fn entity_chunk(&self, index: usize) -> Chunk<'_, EntityId> {
        self.entities.chunk(index)
    }

    /// Type-erased column of `component_id`.
    #[inline]
    pub fn column(&self, component_id: ComponentID) -> Option<&dyn Column> {
        self.columns.get(component_id as usize)?.as_deref()
    }

    /// Mutable type-erased column of `component_id`.
    #[inline]
    pub fn column_mut(&mut self, component_id: ComponentID) -> Option<&mut (dyn Column + 'static)> {
        self.columns.get_mut(component_id as usize)?.as_deref_mut()
    }

    /// Typed column of `component_id`.
    #[inline]
    pub fn typed_column<T: 'static>(&self, component_id: ComponentID) -> Option<&ChunkedColumn<T>> {
        self.column(component_id)?.as_any().downcast_ref::<ChunkedColumn<T>>()
    }

    /// Mutable typed column of `component_id`.
    #[inline]
    pub fn typed_column_mut<T: 'static>(&mut self, component_id: ComponentID) -> Option<&mut ChunkedColumn<T>> {
        self.column_mut(component_id)?.as_any_mut().downcast_mut::<ChunkedColumn<T>>()
    }

    /// Splits the archetype into its entity column and one mutable typed column.
    pub fn entities_and_column_mut<T: 'static>(
        &mut self,
        component_id: ComponentID,
    ) -> Option<(&ChunkedColumn<EntityId>, &mut ChunkedColumn<T>)> {
        let column = self
            .columns
            .get_mut(component_id as usize)?
            .as_deref_mut()?
            .as_any_mut()
            .downcast_mut::<ChunkedColumn<T>>()?;
        Some((&self.entities, column))
    }

    /// Appends a row for `entity` with one value per signature component.
    ///
    /// ## Errors
    /// - `MissingColumn` if `values` does not cover the signature.
    /// - `TypeMismatch` if a value has the wrong type.
    ///
    /// Values are type-checked before any column is touched.

    pub fn push_row(
        &mut self,
        entity: EntityId,
        mut values: Vec<(ComponentID, Box<dyn Any + Send>)>,
    ) -> Result<usize, ColumnError> {
        if values.len() != self.component_ids.len() {
            return Err(ColumnError::Misaligned);
        }
        values.sort_by_key(|(component_id, _)| *component_id);
        for ((component_id, _), expected) in values.iter().zip(self.component_ids.iter()) {
            if component_id != expected {
                return Err(ColumnError::MissingColumn { component_id: *expected });
            }
        }

        let row = self.entities.len();
        for (component_id, value) in values {
            let column = self
                .column_mut(component_id)
                .ok_or(ColumnError::MissingColumn { component_id })?;
            if column.push_boxed(value)? != row {
                return Err(ColumnError::Misaligned);
            }
        }
        self.entities.push(entity);
        Ok(row)
    }

    /// Removes `row` from every column by swap-with-last.
    ///
    /// ## Returns
    /// The entity that now occupies `row`, if a different row was moved in.

    pub fn remove_row(&mut self, row: usize) -> Result<Option<EntityId>, ColumnError> {
        let mut moved_from: Option<Option<usize>> = None;
        for &component_id in &self.component_ids {
            let column = self.columns[component_id as usize]
                .as_deref_mut()
                .ok_or(ColumnError::MissingColumn { component_id })?;
            let moved = column.swap_remove_drop(row)?;
            Self::check_swap(&mut moved_from, moved)?;
        }
        let (_, moved) = self.entities.swap_remove(row)?;
        Self::check_swap(&mut moved_from, moved)?;

        Ok(match moved {
            Some(_) => self.entities.at(row).copied(),
            None => None,
        })
    }

    /// Moves `row` into `destination`.
    ///
    /// ## Behavior
    /// 1. Components present in both signatures are transferred column to
    ///    column.
    /// 2. Components present only in `destination` are appended from `added`.
    /// 3. Components present only here are dropped.
    /// 4. The entity id follows into `destination`'s entity column.
    ///
    /// ## Errors
    /// - `MissingColumn` if `added` does not supply a destination-only
    ///   component.
    /// - `Misaligned` if columns disagree on row placement.

    pub fn move_row_to(
        &mut self,
        row: usize,
        destination: &mut Archetype,
        mut added: Vec<(ComponentID, Box<dyn Any + Send>)>,
    ) -> Result<RowMove, ColumnError> {
        let mut destination_values = Vec::new();
        for &component_id in &destination.component_ids {
            if self.has(component_id) {
                continue;
            }
            let position = added
                .iter()
                .position(|(id, _)| *id == component_id)
                .ok_or(ColumnError::MissingColumn { component_id })?;
            destination_values.push(added.swap_remove(position));
        }

        let destination_row = destination.entities.len();
        let mut moved_from: Option<Option<usize>> = None;

        for &component_id in &self.component_ids {
            let source = self.columns[component_id as usize]
                .as_deref_mut()
                .ok_or(ColumnError::MissingColumn { component_id })?;
            let moved = match destination.columns[component_id as usize].as_deref_mut() {
                Some(target) => {
                    let (pushed, moved) = source.move_row_to(row, target)?;
                    if pushed != destination_row {
                        return Err(ColumnError::Misaligned);
                    }
                    moved
                }
                None => source.swap_remove_drop(row)?,
            };
            Self::check_swap(&mut moved_from, moved)?;
        }

        for (component_id, value) in destination_values {
            let target = destination
                .column_mut(component_id)
                .ok_or(ColumnError::MissingColumn { component_id })?;
            if target.push_boxed(value)? != destination_row {
                return Err(ColumnError::Misaligned);
            }
        }

        let (entity, moved) = self.entities.swap_remove(row)?;
        Self::check_swap(&mut moved_from, moved)?;
        destination.entities.push(entity);

        let displaced = match moved {
            Some(_) => self.entities.at(row).copied(),
            None => None,
        };
        Ok(RowMove { destination_row, displaced })
    }

    fn check_swap(expected: &mut Option<Option<usize>>, moved: Option<usize>) -> Result<(), ColumnError> {
        match expected {
            Some(previous) if *previous != moved => Err(ColumnError::Misaligned),
            Some(_) => Ok(()),
            None => {
                *expected = Some(moved);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Archetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archetype")
            .field("archetype_id", &self.archetype_id)
            .field("components", &self.component_ids)
            .field("tags", &self.signature.tags.iter().collect::<Vec<_>>())
            .field("len", &self.len())
            .finish()
    }
}
