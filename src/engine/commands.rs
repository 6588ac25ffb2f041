//! # Commands
//!
//! This module defines deferred structural changes to an [`EntityStore`].
//!
//! ## Purpose
//! Iteration borrows the store, so structural changes cannot be made while a
//! query runs. Callbacks record [`Command`] values into a [`CommandBuffer`]
//! instead, and the buffer is applied once iteration has finished.
//!
//! ## Design
//! - Commands are plain data describing *what* change should occur, not *how*.
//!   Recording resolves type ids up front, so a command holds only ids and
//!   type-erased values.
//! - [`CommandBuffer::apply`] replays commands through the regular store
//!   operations; each one validates its handles at that point.
//!
//! ## Invariants
//! - Commands are applied in the order they were recorded.
//! - Application stops at the first failing command. Earlier commands stay
//!   applied, the failing command and every later one are discarded.
//!
//! ## Example
//! ```ignore
//! let mut commands = CommandBuffer::new();
//! query.for_each(&store, |entity, (health,)| {
//!     if health.value <= 0 {
//!         commands.delete(entity);
//!     }
//! })?;
//! commands.apply(&mut store)?;
//! ```

use std::any::Any;

use crate::engine::component::{component_id_of, tag_id_of, Component, Tag};
use crate::engine::entity::Entity;
use crate::engine::error::StoreResult;
use crate::engine::store::EntityStore;
use crate::engine::types::{ComponentID, TagID};


/// A deferred store mutation.
///
/// ## Invariants
/// - Component values match the registered type of `component_id`; this is
///   checked again when the command is applied.

pub enum Command {
    /// Deletes an entity.
    Delete {
        /// Entity to delete.
        entity: Entity,
    },

    /// Adds or replaces a component.
    AddComponent {
        /// Target entity.
        entity: Entity,
        /// Registered id of the component type.
        component_id: ComponentID,
        /// Component value.
        value: Box<dyn Any + Send>,
    },

    /// Removes a component.
    RemoveComponent {
        /// Target entity.
        entity: Entity,
        /// Registered id of the component type.
        component_id: ComponentID,
    },

    /// Adds a tag.
    AddTag {
        /// Target entity.
        entity: Entity,
        /// Registered id of the tag type.
        tag_id: TagID,
    },

    /// Removes a tag.
    RemoveTag {
        /// Target entity.
        entity: Entity,
        /// Registered id of the tag type.
        tag_id: TagID,
    },

    /// Appends a child.
    AddChild {
        /// New parent.
        parent: Entity,
        /// Child to attach.
        child: Entity,
    },

    /// Removes a child.
    RemoveChild {
        /// Current parent.
        parent: Entity,
        /// Child to detach.
        child: Entity,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Delete { entity } => write!(f, "Delete({entity})"),
            Command::AddComponent { entity, component_id, .. } => write!(f, "AddComponent({entity}, {component_id})"),
            Command::RemoveComponent { entity, component_id } => write!(f, "RemoveComponent({entity}, {component_id})"),
            Command::AddTag { entity, tag_id } => write!(f, "AddTag({entity}, {tag_id})"),
            Command::RemoveTag { entity, tag_id } => write!(f, "RemoveTag({entity}, {tag_id})"),
            Command::AddChild { parent, child } => write!(f, "AddChild({parent}, {child})"),
            Command::RemoveChild { parent, child } => write!(f, "RemoveChild({parent}, {child})"),
        }
    }
}

impl Command {
    fn apply(self, store: &mut EntityStore) -> StoreResult<()> {
        match self {
            Command::Delete { entity } => store.delete_entity(entity),
            Command::AddComponent { entity, component_id, value } => {
                store.add_component_boxed(entity, component_id, value).map(drop)
            }
            Command::RemoveComponent { entity, component_id } => {
                store.remove_component_by_id(entity, component_id).map(drop)
            }
            Command::AddTag { entity, tag_id } => store.add_tag_by_id(entity, tag_id).map(drop),
            Command::RemoveTag { entity, tag_id } => store.remove_tag_by_id(entity, tag_id).map(drop),
            Command::AddChild { parent, child } => store.add_child(parent, child).map(drop),
            Command::RemoveChild { parent, child } => store.remove_child(parent, child).map(drop),
        }
    }
}

/// Ordered list of recorded [`Command`]s.

#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded commands.
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing is recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Records a raw command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Records deletion of `entity`.
    pub fn delete(&mut self, entity: Entity) {
        self.push(Command::Delete { entity });
    }

    /// Records adding `value` to `entity`.
    ///
    /// ## Errors
    /// `Registry` if `T` is not registered.

    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> StoreResult<()> {
        let component_id = component_id_of::<T>()?;
        self.push(Command::AddComponent { entity, component_id, value: Box::new(value) });
        Ok(())
    }

    /// Records removal of component `T` from `entity`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> StoreResult<()> {
        let component_id = component_id_of::<T>()?;
        self.push(Command::RemoveComponent { entity, component_id });
        Ok(())
    }

    /// Records adding tag `G` to `entity`.
    pub fn add_tag<G: Tag>(&mut self, entity: Entity) -> StoreResult<()> {
        let tag_id = tag_id_of::<G>()?;
        self.push(Command::AddTag { entity, tag_id });
        Ok(())
    }

    /// Records removal of tag `G` from `entity`.
    pub fn remove_tag<G: Tag>(&mut self, entity: Entity) -> StoreResult<()> {
        let tag_id = tag_id_of::<G>()?;
        self.push(Command::RemoveTag { entity, tag_id });
        Ok(())
    }

    /// Records appending `child` to `parent`.
    pub fn add_child(&mut self, parent: Entity, child: Entity) {
        self.push(Command::AddChild { parent, child });
    }

    /// Records removing `child` from `parent`.
    pub fn remove_child(&mut self, parent: Entity, child: Entity) {
        self.push(Command::RemoveChild { parent, child });
    }

    /// Applies every recorded command in order and empties the buffer.
    ///
    /// ## Returns
    /// Number of commands applied.
    ///
    /// ## Errors
    /// The error of the first failing command. Commands after it are
    /// discarded.

    pub fn apply(&mut self, store: &mut EntityStore) -> StoreResult<usize> {
        let mut applied = 0;
        for command in self.commands.drain(..) {
            if let Err(error) = command.apply(store) {
                log::warn!("command {applied} failed: {error}");
                return Err(error);
            }
            applied += 1;
        }
        Ok(applied)
    }
}
