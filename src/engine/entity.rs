//! Entity handles and the per-id node table entries.
//!
//! ## Entity handles
//! An [`Entity`] is a small `Copy` handle carrying the id of the store that
//! created it, the dense entity id and the generation of the id at creation
//! time. The store compares all three on every access:
//!
//! * a different store id is an argument error,
//! * a generation mismatch (the id was deleted, and possibly reused) is a
//!   use-after-delete error.
//!
//! ## Nodes
//! A [`Node`] is the store's record for one id: where the entity lives
//! (archetype and row), its pid, its tree links and its status flags. Nodes
//! of deleted ids stay in the table with empty flags and a bumped generation.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

use crate::engine::component::ScriptObject;
use crate::engine::types::{ArchetypeID, EntityId, Generation, Pid, ScriptID, StoreId};


static NEXT_STORE_ID: AtomicU32 = AtomicU32::new(1);

/// Returns a process-unique store id.
pub(crate) fn next_store_id() -> StoreId {
    NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Handle to an entity of one store.

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Entity {
    store: StoreId,
    id: EntityId,
    generation: Generation,
}

impl Entity {
    #[inline]
    pub(crate) fn new(store: StoreId, id: EntityId, generation: Generation) -> Self {
        Self { store, id, generation }
    }

    /// Dense id inside the owning store.
    #[inline] pub fn id(self) -> EntityId { self.id }
    /// Id of the owning store.
    #[inline] pub fn store_id(self) -> StoreId { self.store }
    /// Generation of the id when this handle was issued.
    #[inline] pub fn generation(self) -> Generation { self.generation }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id: {}", self.id)
    }
}

bitflags! {
    /// Status bits of a node.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// The id names a live entity.
        const CREATED = 0b0000_0001;
        /// The entity is reachable from the graph origin.
        const TREE_NODE = 0b0000_0010;
    }
}

impl fmt::Display for NodeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Null");
        }
        let mut first = true;
        for (flag, name) in [(NodeFlags::TREE_NODE, "TreeNode"), (NodeFlags::CREATED, "Created")] {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Position of an entity relative to the store's graph origin.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TreeMembership {
    /// Not reachable from the graph origin (or no origin is set).
    Floating,
    /// The origin itself or one of its descendants.
    TreeNode,
}

/// Per-id record of the node table.

pub struct Node {
    pub(crate) id: EntityId,
    pub(crate) pid: Pid,
    pub(crate) archetype: Option<ArchetypeID>,
    pub(crate) row: usize,
    pub(crate) parent: EntityId,
    pub(crate) child_ids: Vec<EntityId>,
    pub(crate) flags: NodeFlags,
    pub(crate) generation: Generation,
    pub(crate) scripts: Vec<(ScriptID, Box<dyn ScriptObject>)>,
}

impl Node {
    pub(crate) fn empty(id: EntityId) -> Self {
        Self {
            id,
            pid: 0,
            archetype: None,
            row: 0,
            parent: 0,
            child_ids: Vec::new(),
            flags: NodeFlags::empty(),
            generation: 0,
            scripts: Vec::new(),
        }
    }

    /// Resets everything but the id and generation; bumps the generation.
    pub(crate) fn release(&mut self) {
        self.pid = 0;
        self.archetype = None;
        self.row = 0;
        self.parent = 0;
        self.child_ids.clear();
        self.flags = NodeFlags::empty();
        self.scripts.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    /// Id of this node.
    #[inline] pub fn id(&self) -> EntityId { self.id }
    /// Persistent id, `0` for unused nodes.
    #[inline] pub fn pid(&self) -> Pid { self.pid }
    /// Archetype holding the entity, `None` for unused nodes.
    #[inline] pub fn archetype(&self) -> Option<ArchetypeID> { self.archetype }
    /// Row inside the archetype. Valid until the next structural change.
    #[inline] pub fn row(&self) -> usize { self.row }
    /// Parent id, `0` when the node is a root.
    #[inline] pub fn parent_id(&self) -> EntityId { self.parent }
    /// Ordered child ids.
    #[inline] pub fn child_ids(&self) -> &[EntityId] { &self.child_ids }
    /// Number of children.
    #[inline] pub fn child_count(&self) -> usize { self.child_ids.len() }
    /// Status flags.
    #[inline] pub fn flags(&self) -> NodeFlags { self.flags }
    /// Current generation of this id.
    #[inline] pub fn generation(&self) -> Generation { self.generation }

    /// Returns `true` if the id names a live entity.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.flags.contains(NodeFlags::CREATED)
    }

    /// Tree membership derived from the flags.
    #[inline]
    pub fn membership(&self) -> TreeMembership {
        if self.flags.contains(NodeFlags::TREE_NODE) {
            TreeMembership::TreeNode
        } else {
            TreeMembership::Floating
        }
    }

    pub(crate) fn script_position(&self, script_id: ScriptID) -> Option<usize> {
        self.scripts.iter().position(|(id, _)| *id == script_id)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id: {}", self.id)?;
        if !self.child_ids.is_empty() {
            write!(f, "  ChildCount: {}", self.child_ids.len())?;
        }
        write!(f, "  flags: {}", self.flags)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("archetype", &self.archetype)
            .field("row", &self.row)
            .field("parent", &self.parent)
            .field("child_ids", &self.child_ids)
            .field("flags", &self.flags)
            .field("generation", &self.generation)
            .field("scripts", &self.scripts.len())
            .finish()
    }
}
