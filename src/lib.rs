//! # strata
//!
//! In-memory, archetype-based entity-component store for large numbers of
//! records whose component sets change at runtime.
//!
//! ## Design Goals
//! - Archetype-based storage in fixed-size blocks for cache efficiency
//! - Swap-compaction on every structural change, no holes in columns
//! - Parent/child trees and secondary component indexes kept consistent with
//!   every structural change
//! - Safe, explicit data access: iteration borrows the store, deferred changes
//!   go through a command buffer
//!
//! ## Example
//! ```ignore
//! use strata::prelude::*;
//!
//! register_component::<Position>()?;
//!
//! let mut store = EntityStore::new();
//! let entity = store.create_entity()?;
//! store.add_component(entity, Position { x: 1.0, y: 2.0, z: 3.0 })?;
//!
//! let mut query = store.query::<(Position,)>().build()?;
//! query.for_each(&store, |entity, (position,)| println!("{entity}: {}", position.x))?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::store::{EntityStore, EMPTY_ARCHETYPE};

pub use engine::entity::{
    Entity,
    Node,
    NodeFlags,
    TreeMembership,
};

pub use engine::component::{
    Component,
    IndexedComponent,
    Tag,
    Script,
    Unresolved,
    register_component,
    register_indexed_component,
    register_tag,
    register_script,
    freeze_registry,
    component_id_of,
    tag_id_of,
    script_id_of,
};

pub use engine::archetype::Archetype;
pub use engine::storage::{Chunk, ChunkedColumn};
pub use engine::index::RangeIndex;

pub use engine::query::{Query, QueryBuilder, QueryChunk, QueryData};
pub use engine::commands::{Command, CommandBuffer};
pub use engine::serialize::{EntityRecord, ReadResult};
pub use engine::config::{PidPolicy, StoreConfig};

pub use engine::events::{
    ChildAction,
    ChildNodesChanged,
    ComponentAction,
    ComponentChanged,
    HandlerId,
    TagsChanged,
};

pub use engine::error::{
    StoreResult,
    StoreError,
    ArgumentError,
    InvalidOperationError,
    UseAfterDeleteError,
    ParseError,
    ParseErrorKind,
    RegistryError,
    ColumnError,
    ConfigError,
};

pub use engine::types::{
    EntityId,
    Pid,
    ComponentID,
    TagID,
    ScriptID,
    ArchetypeID,
    Signature,
    QuerySignature,
    CHUNK_CAP,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used store types.
///
/// Import with:
/// ```rust
/// use strata::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        EntityStore,
        Entity,
        Component,
        IndexedComponent,
        Tag,
        Script,
        Query,
        QueryBuilder,
        CommandBuffer,
        PidPolicy,
        StoreConfig,
        StoreError,
        StoreResult,
        register_component,
        register_indexed_component,
        register_tag,
        register_script,
    };
}
