//! Error types for the entity store, its tree, indexes and record codec.
//!
//! This module declares focused, composable error types used across the store.
//! Each error carries enough context to make failures actionable while staying
//! small and cheap to pass around or convert into the aggregate [`StoreError`].
//!
//! ## Failure families
//! * [`ArgumentError`]: the caller passed an invalid id, a handle owned by a
//!   different store, an out-of-range child index or a repeated child pid.
//! * [`InvalidOperationError`]: the request is well-formed but violates a
//!   structural rule (second graph origin, child cycle, mutable access to an
//!   indexed component).
//! * [`UseAfterDeleteError`]: the handle refers to a deleted entity.
//! * [`ParseError`]: a textual entity record could not be read. Always carries
//!   a byte position and, where known, a field path.
//! * [`RegistryError`]: a type was not registered, the registry is frozen, a
//!   capacity is exhausted or a key collides.
//! * [`ColumnError`]: internal storage inconsistency. Never expected in a
//!   correct program.
//!
//! ## Typical flow
//! Low-level storage operations return [`ColumnError`]. Store operations use
//! `?` to bubble every family into [`StoreError`], which callers can match on
//! for control flow:
//!
//! ```ignore
//! match store.create_entity_with_id(42) {
//!     Ok(entity) => { /* … */ }
//!     Err(StoreError::Argument(ArgumentError::IdInUse { id })) => {
//!         log::warn!("entity {id} already exists");
//!     }
//!     Err(other) => return Err(other),
//! }
//! ```
//!
//! ## Display vs. Debug
//! * `Display` messages are short and operator-facing.
//! * `Debug` (derived) retains full structure for diagnostics.

use thiserror::Error;

use crate::engine::types::{EntityId, Pid};


/// Returned when a caller-supplied argument is invalid for the target store.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// Entity ids start at 1; `0` is reserved for the null node.
    #[error("invalid entity id <= 0. was: {id}")]
    InvalidId {
        /// Offending id (or pid, when it maps directly to an id).
        id: i64,
    },

    /// The requested id already names a live entity.
    #[error("id already in use in EntityStore. id: {id}")]
    IdInUse {
        /// Live id that was requested again.
        id: EntityId,
    },

    /// The handle was created by another store instance.
    #[error("entity is owned by a different store")]
    ForeignEntity,

    /// The query was built against another store instance.
    #[error("query was created by a different store")]
    ForeignQuery,

    /// A child index lies outside `0..=child_count`.
    #[error("invalid child index {index}. child count: {child_count}")]
    ChildIndex {
        /// Requested insert position.
        index: usize,
        /// Number of children at validation time.
        child_count: usize,
    },

    /// The id (or a pid mapped directly to an id) exceeds the store's `max_id`.
    #[error("entity id out of range. was: {id}, max: {max}")]
    IdOutOfRange {
        /// Offending id or pid.
        id: i64,
        /// Configured maximum.
        max: EntityId,
    },

    /// A record lists the same child pid twice.
    #[error("duplicate child pid in record: {pid}")]
    DuplicateChild {
        /// Repeated pid.
        pid: Pid,
    },

    /// A component requested from a query result is not part of the query.
    #[error("component '{key}' is not part of the query")]
    ComponentNotInQuery {
        /// Registered key of the component.
        key: &'static str,
    },
}

/// Returned when a request is structurally forbidden in the current store state.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidOperationError {
    /// A store has at most one graph origin.
    #[error("EntityStore already has a GraphOrigin entity. current GraphOrigin id: {current}")]
    GraphOriginAlreadySet {
        /// Id of the existing origin.
        current: EntityId,
    },

    /// The graph origin must be a root.
    #[error("entity must not have a parent to be GraphOrigin. current parent id: {parent}")]
    GraphOriginHasParent {
        /// Id of the existing parent.
        parent: EntityId,
    },

    /// The graph origin cannot become a child.
    #[error("GraphOrigin entity cannot be added as a child. id: {id}")]
    GraphOriginAsChild {
        /// Id of the origin.
        id: EntityId,
    },

    /// The edge would make an entity its own ancestor.
    #[error("operation would create a cycle. child id: {child} is an ancestor of parent id: {parent}")]
    ChildCycle {
        /// Requested parent.
        parent: EntityId,
        /// Requested child.
        child: EntityId,
    },

    /// Mutable access would bypass index maintenance.
    #[error("component '{key}' is indexed. update it with set_component()")]
    IndexedMutation {
        /// Registered key of the indexed component.
        key: &'static str,
    },

    /// Every id in `1..=max_id` is live.
    #[error("entity id space exhausted")]
    IdSpaceExhausted,
}

/// Returned when a handle refers to an entity that has been deleted.
///
/// The handle's generation no longer matches the node table, so the id may
/// already be reused by an unrelated entity.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("entity was deleted. id: {id}")]
pub struct UseAfterDeleteError {
    /// Id carried by the stale handle.
    pub id: EntityId,
}

/// Reason a textual record could not be read.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// Input ended before the value was complete.
    #[error("unexpected end of input")]
    UnexpectedEnd,

    /// An object was required at this position.
    #[error("expected object. was: {found}")]
    ExpectedObject {
        /// Short name of the token that was found instead.
        found: &'static str,
    },

    /// An array was required at this position.
    #[error("expected array. was: {found}")]
    ExpectedArray {
        /// Short name of the token that was found instead.
        found: &'static str,
    },

    /// A value has the wrong type for its field.
    #[error("type mismatch: {detail}")]
    TypeMismatch {
        /// Decoder message, without position information.
        detail: String,
    },

    /// Malformed text.
    #[error("{detail}")]
    Syntax {
        /// Decoder message, without position information.
        detail: String,
    },
}

/// Returned when an entity record cannot be decoded.
///
/// ### Fields
/// * `kind`: what went wrong.
/// * `path`: dotted field path such as `components.pos`, if known.
/// * `position`: byte offset into the input text.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} path: '{}' at position: {position}", .path.as_deref().unwrap_or("(root)"))]
pub struct ParseError {
    /// Failure reason.
    pub kind: ParseErrorKind,
    /// Dotted field path, `None` for the record root.
    pub path: Option<String>,
    /// Byte offset into the input.
    pub position: usize,
}

/// Errors related to the process-wide type registry.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The type was never registered.
    #[error("type not registered: {type_name}")]
    NotRegistered {
        /// Rust type name for diagnostics.
        type_name: &'static str,
    },

    /// Registration attempted after [`freeze_registry`](crate::engine::component::freeze_registry).
    #[error("type registry is frozen")]
    Frozen,

    /// Every slot of one registration table is used.
    #[error("{kind} capacity exceeded (max {capacity})")]
    CapacityExceeded {
        /// `component`, `tag` or `script`.
        kind: &'static str,
        /// Configured maximum.
        capacity: usize,
    },

    /// The key or tag name is already taken by a different type.
    #[error("duplicate key '{key}' (registered by {existing})")]
    DuplicateKey {
        /// Colliding key.
        key: &'static str,
        /// Type name of the existing registration.
        existing: &'static str,
    },

    /// An index was requested for a component already registered without one.
    #[error("component already registered without an index: {type_name}")]
    AlreadyRegistered {
        /// Rust type name for diagnostics.
        type_name: &'static str,
    },
}

/// Internal storage inconsistency inside a chunked column or archetype.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColumnError {
    /// A type-erased value did not match the column element type.
    #[error("type mismatch: expected {expected}")]
    TypeMismatch {
        /// Element type name of the column.
        expected: &'static str,
    },

    /// A row index lies outside the populated range.
    #[error("row {row} out of bounds (len {len})")]
    RowOutOfBounds {
        /// Requested row.
        row: usize,
        /// Column length.
        len: usize,
    },

    /// Columns of one archetype disagree on row placement.
    #[error("columns out of alignment")]
    Misaligned,

    /// A component column expected by the signature is missing.
    #[error("missing column for component {component_id}")]
    MissingColumn {
        /// Component id without a column.
        component_id: u16,
    },
}

/// Returned when a store configuration cannot be loaded.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid store configuration: {message}")]
pub struct ConfigError {
    /// Decoder message.
    pub message: String,
}

impl From<toml::de::Error> for ConfigError {
    fn from(error: toml::de::Error) -> Self {
        ConfigError { message: error.message().to_string() }
    }
}

/// Aggregate error returned by store operations.

#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid caller argument.
    #[error(transparent)]
    Argument(#[from] ArgumentError),

    /// Structurally forbidden request.
    #[error(transparent)]
    InvalidOperation(#[from] InvalidOperationError),

    /// Access through a stale handle.
    #[error(transparent)]
    UseAfterDelete(#[from] UseAfterDeleteError),

    /// Malformed entity record.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Registry lookup or registration failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Internal storage inconsistency.
    #[error(transparent)]
    Storage(#[from] ColumnError),

    /// A component or script value could not be encoded.
    #[error("failed to encode '{key}': {source}")]
    Encode {
        /// Registered key of the value.
        key: &'static str,
        /// Encoder failure.
        source: serde_json::Error,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias used by store operations.
pub type StoreResult<T> = Result<T, StoreError>;
