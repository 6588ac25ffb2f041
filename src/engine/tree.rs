//! Parent/child relations layered on the node table.
//!
//! ## Purpose
//! Entities form a forest: every entity has at most one parent and an ordered
//! list of children. The tree shares the store's id space, there is no
//! separate node identity.
//!
//! ## Design
//! - Child ids live in the parent's node, in insertion order; removal shifts
//!   the tail (`O(k)`).
//! - One entity per store may be the **graph origin**. It has no parent and
//!   cannot become a child.
//! - Tree membership is refreshed **eagerly**: every structural tree change
//!   walks the affected subtree and sets or clears `NodeFlags::TREE_NODE`.
//!   [`EntityStore::is_reachable_from_origin`] recomputes the same answer by
//!   walking parent links, for verification.
//!
//! ## Events
//! Every logical change emits exactly one [`ChildNodesChanged`]. A move from
//! parent A to parent B emits `Remove` on A, then `Add` (or `Insert`) on B.
//! Repeating an applied add or remove is a no-op without an event.
//!
//! ## Invariants
//! - `child.parent == p` iff `p.child_ids` contains `child` exactly once.
//! - No entity is its own ancestor.
//! - `TREE_NODE` is set iff the graph origin is the entity or an ancestor.

use crate::engine::entity::{Entity, NodeFlags, TreeMembership};
use crate::engine::error::{ArgumentError, InvalidOperationError, StoreResult};
use crate::engine::events::{ChildAction, ChildNodesChanged};
use crate::engine::store::EntityStore;
use crate::engine::types::EntityId;


impl EntityStore {

    /// Appends `child` to `parent`'s children and returns its index.
    ///
    /// ## Behavior
    /// - Already a child of `parent`: returns the current index, no event.
    /// - Child of another parent: removed there first (`Remove` event).
    /// - Emits `Add` and refreshes the membership of the child's subtree.
    ///
    /// ## Errors
    /// - `ArgumentError::ForeignEntity` if either handle belongs to another store.
    /// - `InvalidOperation::ChildCycle` if `child` is `parent` or one of its ancestors.
    /// - `InvalidOperation::GraphOriginAsChild` if `child` is the graph origin.

    pub fn add_child(&mut self, parent: Entity, child: Entity) -> StoreResult<usize> {
        let (parent_id, child_id) = self.check_edge(parent, child)?;
        if self.nodes[child_id as usize].parent == parent_id {
            if let Some(index) = self.position_in_parent(parent_id, child_id) {
                return Ok(index);
            }
        }
        self.detach_from_parent(child_id);

        let children = &mut self.nodes[parent_id as usize].child_ids;
        children.push(child_id);
        let child_index = children.len() - 1;
        self.attach(parent_id, child_id, child_index, ChildAction::Add);
        Ok(child_index)
    }

    /// Inserts `child` at `index` of `parent`'s children.
    ///
    /// Moving a child inside the same parent emits `Remove` then `Insert`.
    /// Inserting at the position the child already has is a no-op.
    ///
    /// ## Errors
    /// Those of [`add_child`](Self::add_child), plus
    /// `ArgumentError::ChildIndex` if `index` exceeds the child count (not
    /// counting `child` itself).

    pub fn insert_child(&mut self, parent: Entity, index: usize, child: Entity) -> StoreResult<()> {
        let (parent_id, child_id) = self.check_edge(parent, child)?;
        let current = if self.nodes[child_id as usize].parent == parent_id {
            self.position_in_parent(parent_id, child_id)
        } else {
            None
        };
        let child_count = self.nodes[parent_id as usize].child_ids.len() - usize::from(current.is_some());
        if index > child_count {
            return Err(ArgumentError::ChildIndex { index, child_count }.into());
        }
        if current == Some(index) {
            return Ok(());
        }
        self.detach_from_parent(child_id);

        self.nodes[parent_id as usize].child_ids.insert(index, child_id);
        self.attach(parent_id, child_id, index, ChildAction::Insert);
        Ok(())
    }

    /// Removes `child` from `parent`. Returns `false` if it was not a child.
    ///
    /// The child's subtree becomes floating.

    pub fn remove_child(&mut self, parent: Entity, child: Entity) -> StoreResult<bool> {
        let parent_id = self.check(parent)?.id;
        let child_id = self.check(child)?.id;
        if self.nodes[child_id as usize].parent != parent_id {
            return Ok(false);
        }
        Ok(self.detach_from_parent(child_id).is_some())
    }

    /// Parent of `entity`, `None` for roots.
    pub fn parent_of(&self, entity: Entity) -> StoreResult<Option<Entity>> {
        let parent = self.check(entity)?.parent;
        Ok((parent != 0).then(|| self.handle(parent)))
    }

    /// Ordered child ids of `entity`.
    pub fn child_ids(&self, entity: Entity) -> StoreResult<&[EntityId]> {
        Ok(self.check(entity)?.child_ids())
    }

    /// Ordered children of `entity`.
    pub fn children(&self, entity: Entity) -> StoreResult<Vec<Entity>> {
        let node = self.check(entity)?;
        Ok(node.child_ids.iter().map(|&id| self.handle(id)).collect())
    }

    /// Number of children of `entity`.
    pub fn child_count(&self, entity: Entity) -> StoreResult<usize> {
        Ok(self.check(entity)?.child_count())
    }

    /// Makes `entity` the graph origin; its subtree becomes tree nodes.
    ///
    /// ## Errors
    /// - `InvalidOperation::GraphOriginAlreadySet` if another entity is the origin.
    /// - `InvalidOperation::GraphOriginHasParent` if `entity` has a parent.

    pub fn set_graph_origin(&mut self, entity: Entity) -> StoreResult<()> {
        let node = self.check(entity)?;
        let (id, parent) = (node.id, node.parent);
        if self.graph_origin == id {
            return Ok(());
        }
        if self.graph_origin != 0 {
            return Err(InvalidOperationError::GraphOriginAlreadySet { current: self.graph_origin }.into());
        }
        if parent != 0 {
            return Err(InvalidOperationError::GraphOriginHasParent { parent }.into());
        }
        self.graph_origin = id;
        self.refresh_membership(id, true);
        Ok(())
    }

    /// Clears the graph origin; every tree node becomes floating.
    pub fn clear_graph_origin(&mut self) {
        let origin = std::mem::take(&mut self.graph_origin);
        if origin != 0 {
            self.refresh_membership(origin, false);
        }
    }

    /// The graph origin, if set.
    pub fn graph_origin(&self) -> Option<Entity> {
        (self.graph_origin != 0).then(|| self.handle(self.graph_origin))
    }

    /// Cached tree membership of `entity`.
    pub fn tree_membership(&self, entity: Entity) -> StoreResult<TreeMembership> {
        Ok(self.check(entity)?.membership())
    }

    /// Walks parent links from `entity` and reports whether the origin is hit.
    pub fn is_reachable_from_origin(&self, entity: Entity) -> StoreResult<bool> {
        let mut id = self.check(entity)?.id;
        if self.graph_origin == 0 {
            return Ok(false);
        }
        while id != 0 {
            if id == self.graph_origin {
                return Ok(true);
            }
            id = self.nodes[id as usize].parent;
        }
        Ok(false)
    }

    /// Unlinks `child` from its parent, floats its subtree and emits `Remove`.
    ///
    /// Returns the index the child had, `None` if it was a root.

    pub(crate) fn detach_from_parent(&mut self, child_id: EntityId) -> Option<usize> {
        let parent_id = self.nodes[child_id as usize].parent;
        if parent_id == 0 {
            return None;
        }
        let child_index = self.position_in_parent(parent_id, child_id)?;
        self.nodes[parent_id as usize].child_ids.remove(child_index);
        self.nodes[child_id as usize].parent = 0;
        self.refresh_membership(child_id, false);

        self.events.child_nodes_changed.emit(&ChildNodesChanged {
            action: ChildAction::Remove,
            parent_id,
            child_id,
            child_index,
        });
        Some(child_index)
    }

    /// Turns every child of `id` into a floating root, last child first.
    pub(crate) fn release_children(&mut self, id: EntityId) {
        let children = std::mem::take(&mut self.nodes[id as usize].child_ids);
        for (child_index, &child_id) in children.iter().enumerate().rev() {
            self.nodes[child_id as usize].parent = 0;
            self.refresh_membership(child_id, false);
            self.events.child_nodes_changed.emit(&ChildNodesChanged {
                action: ChildAction::Remove,
                parent_id: id,
                child_id,
                child_index,
            });
        }
    }

    fn attach(&mut self, parent_id: EntityId, child_id: EntityId, child_index: usize, action: ChildAction) {
        self.nodes[child_id as usize].parent = parent_id;
        let tree_node = self.nodes[parent_id as usize].flags.contains(NodeFlags::TREE_NODE);
        self.refresh_membership(child_id, tree_node);

        self.events.child_nodes_changed.emit(&ChildNodesChanged {
            action,
            parent_id,
            child_id,
            child_index,
        });
    }

    fn position_in_parent(&self, parent_id: EntityId, child_id: EntityId) -> Option<usize> {
        self.nodes[parent_id as usize].child_ids.iter().position(|&id| id == child_id)
    }

    fn refresh_membership(&mut self, root: EntityId, tree_node: bool) {
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            let node = &mut self.nodes[id as usize];
            node.flags.set(NodeFlags::TREE_NODE, tree_node);
            pending.extend_from_slice(&node.child_ids);
        }
    }

    fn check_edge(&self, parent: Entity, child: Entity) -> StoreResult<(EntityId, EntityId)> {
        if parent.store_id() != self.store_id || child.store_id() != self.store_id {
            return Err(ArgumentError::ForeignEntity.into());
        }
        let parent_id = self.check(parent)?.id;
        let child_id = self.check(child)?.id;
        if child_id == self.graph_origin {
            return Err(InvalidOperationError::GraphOriginAsChild { id: child_id }.into());
        }

        if self.is_self_or_ancestor(child_id, parent_id) {
            return Err(InvalidOperationError::ChildCycle { parent: parent_id, child: child_id }.into());
        }
        Ok((parent_id, child_id))
    }

    /// Returns `true` if `candidate` is `id` or one of its ancestors.
    pub(crate) fn is_self_or_ancestor(&self, candidate: EntityId, id: EntityId) -> bool {
        let mut ancestor = id;
        while ancestor != 0 {
            if ancestor == candidate {
                return true;
            }
            ancestor = self.nodes[ancestor as usize].parent;
        }
        false
    }
}
