//! Change notifications emitted by the store.
//!
//! ## Design
//! Each event kind has its own [`Signal`]: an ordered list of callbacks keyed
//! by a [`HandlerId`]. Callbacks run synchronously, in subscription order,
//! after the change they describe has been applied. They receive the event by
//! reference and have no access to the store.

use crate::engine::types::{ComponentID, EntityId, TagID};


/// Handle returned by a subscription; used to unsubscribe.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

type Handler<E> = Box<dyn FnMut(&E) + Send + Sync>;

/// Ordered callback list for one event kind.

pub struct Signal<E> {
    next_id: u64,
    handlers: Vec<(HandlerId, Handler<E>)>,
}

impl<E> Default for Signal<E> {
    fn default() -> Self {
        Self { next_id: 1, handlers: Vec::new() }
    }
}

impl<E> Signal<E> {
    /// Appends `handler` and returns its id.
    pub fn subscribe<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&E) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Removes the handler registered as `id`. Returns `false` if unknown.
    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        self.handlers.len() != before
    }

    /// Invokes every handler in subscription order.
    pub fn emit(&mut self, event: &E) {
        for (_, handler) in &mut self.handlers {
            handler(event);
        }
    }

    /// Number of subscribed handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Kind of change to a parent's child list.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildAction {
    /// Appended at the end.
    Add,
    /// Inserted at an explicit position.
    Insert,
    /// Removed.
    Remove,
}

/// A child was added to, inserted into or removed from a parent.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChildNodesChanged {
    /// What happened.
    pub action: ChildAction,
    /// Parent whose child list changed.
    pub parent_id: EntityId,
    /// Child that was added or removed.
    pub child_id: EntityId,
    /// Position of the child in the list (before removal for `Remove`).
    pub child_index: usize,
}

/// Kind of component change.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentAction {
    /// Component added; the entity changed archetype.
    Added,
    /// Component removed; the entity changed archetype.
    Removed,
    /// Value of a present component replaced in place.
    Updated,
}

/// A component of an entity changed.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentChanged {
    /// What happened.
    pub action: ComponentAction,
    /// Affected entity.
    pub entity_id: EntityId,
    /// Affected component type.
    pub component_id: ComponentID,
}

/// A tag of an entity was added or removed.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TagsChanged {
    /// Affected entity.
    pub entity_id: EntityId,
    /// Affected tag type.
    pub tag_id: TagID,
    /// `true` when added, `false` when removed.
    pub added: bool,
}

/// All signals of one store.

#[derive(Default)]
pub struct StoreEvents {
    /// Child list changes.
    pub child_nodes_changed: Signal<ChildNodesChanged>,
    /// Component changes.
    pub component_changed: Signal<ComponentChanged>,
    /// Tag changes.
    pub tags_changed: Signal<TagsChanged>,
}
