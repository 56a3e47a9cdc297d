//! Error types for the index crate.

use sdb_region::RegionError;
use sdb_types::TypeError;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A create or modify would give two live objects the same value on a
    /// unique key. Nothing was changed.
    #[error("duplicate key on {type_name}.{key}: {value}")]
    DuplicateKey {
        type_name: &'static str,
        key: &'static str,
        value: String,
    },

    /// The identity does not name a live object.
    #[error("{type_name} {id} not found")]
    NotFound { type_name: &'static str, id: u64 },

    /// A constructor or mutator tried to change the object's identity.
    #[error("{type_name} {id}: identity is assigned by the index and cannot change (got {found})")]
    IdentityChanged {
        type_name: &'static str,
        id: u64,
        found: u64,
    },

    /// Lookup by a key the type does not declare.
    #[error("{type_name} has no key named {key:?}")]
    UnknownKey { type_name: &'static str, key: String },

    /// Commit or undo of a session that is not the innermost open one.
    #[error("invalid session order: innermost open session is {expected:?}, requested {requested}")]
    InvalidSessionOrder { expected: Option<u64>, requested: u64 },

    /// The persisted index does not match what the region holds.
    #[error("corrupt {type_name} index: {reason}")]
    Corrupt { type_name: &'static str, reason: String },

    /// Backing region failure.
    #[error("region error: {0}")]
    Region(#[from] RegionError),

    /// Invalid type or key declaration.
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
