//! Error types for the database crate.

use sdb_index::IndexError;
use sdb_region::RegionError;

/// Errors returned by [`Database`](crate::Database) operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A create or modify would duplicate a unique key. Nothing was changed.
    #[error("duplicate key on {type_name}.{key}: {value}")]
    DuplicateKey {
        type_name: &'static str,
        key: &'static str,
        value: String,
    },

    /// The identity does not name a live object.
    #[error("{type_name} {id} not found")]
    NotFound { type_name: &'static str, id: u64 },

    /// Commit or undo of a session that is not the innermost open one.
    #[error("invalid session order: innermost open session is {expected}, requested {requested}")]
    InvalidSessionOrder { expected: u64, requested: u64 },

    /// Commit or undo of a session that is not open.
    #[error("no open session (requested revision {requested})")]
    NoSession { requested: u64 },

    /// The operation needs every session closed first.
    #[error("{depth} undo session(s) still open")]
    SessionActive { depth: usize },

    #[error("no index registered for {type_name}")]
    IndexNotRegistered { type_name: &'static str },

    #[error("an index for {type_name} (type id {type_id}) is already registered")]
    IndexAlreadyRegistered { type_name: &'static str, type_id: u16 },

    /// Indices can only be registered before the first session starts.
    #[error("schema is locked; cannot register {type_name} after sessions have started")]
    SchemaLocked { type_name: &'static str },

    /// The calling thread already holds a read or write guard, typically
    /// from inside a notification callback.
    #[error("reentrant database access: this thread already holds a database lock")]
    ReentrantAccess,

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("region error: {0}")]
    Region(#[from] RegionError),

    #[error("index error: {0}")]
    Index(IndexError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<IndexError> for DbError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DuplicateKey {
                type_name,
                key,
                value,
            } => DbError::DuplicateKey {
                type_name,
                key,
                value,
            },
            IndexError::NotFound { type_name, id } => DbError::NotFound { type_name, id },
            IndexError::Region(e) => DbError::Region(e),
            other => DbError::Index(other),
        }
    }
}

impl DbError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            DbError::DuplicateKey { .. } => "duplicate_key",
            DbError::NotFound { .. } => "not_found",
            DbError::InvalidSessionOrder { .. } => "invalid_session_order",
            DbError::NoSession { .. } => "no_session",
            DbError::SessionActive { .. } => "session_active",
            DbError::IndexNotRegistered { .. } => "index_not_registered",
            DbError::IndexAlreadyRegistered { .. } => "index_already_registered",
            DbError::SchemaLocked { .. } => "schema_locked",
            DbError::ReentrantAccess => "reentrant_access",
            DbError::LockPoisoned(_) => "lock_poisoned",
            DbError::Region(RegionError::RegionFull { .. }) => "region_full",
            DbError::Region(RegionError::GrowFailed { .. }) => "grow_failed",
            DbError::Region(RegionError::IncompatibleFormat { .. }) => "incompatible_format",
            DbError::Region(RegionError::Io(_)) => "io_error",
            DbError::Region(RegionError::Dirty) => "dirty",
            DbError::Region(RegionError::ReadOnly) => "read_only",
            DbError::Region(_) => "region_error",
            DbError::Index(_) => "index_error",
            DbError::Config(_) => "config_error",
        }
    }

    /// Returns `true` for failures the database cannot recover from in
    /// process: region and I/O failures, corrupted indices, poisoned locks.
    /// Constraint violations and misuse are not fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            DbError::Region(e) => e.is_fatal(),
            DbError::Index(IndexError::Region(e)) => e.is_fatal(),
            DbError::Index(IndexError::Corrupt { .. }) => true,
            DbError::LockPoisoned(_) => true,
            _ => false,
        }
    }
}

/// Convenience alias for database results.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_errors_keep_their_identity() {
        let err: DbError = IndexError::DuplicateKey {
            type_name: "account",
            key: "by_name",
            value: "\"x\"".into(),
        }
        .into();
        assert_eq!(err.code(), "duplicate_key");
        assert!(!err.is_fatal());

        let err: DbError = IndexError::NotFound {
            type_name: "account",
            id: 3,
        }
        .into();
        assert!(matches!(err, DbError::NotFound { id: 3, .. }));
    }

    #[test]
    fn region_failures_are_fatal() {
        let err: DbError = IndexError::Region(RegionError::RegionFull {
            requested: 10,
            available: 0,
        })
        .into();
        assert_eq!(err.code(), "region_full");
        assert!(err.is_fatal());

        let err = DbError::Region(RegionError::IncompatibleFormat {
            found: 9,
            expected: 1,
        });
        assert_eq!(err.code(), "incompatible_format");
        assert!(err.is_fatal());
    }

    #[test]
    fn misuse_is_not_fatal() {
        assert!(!DbError::InvalidSessionOrder {
            expected: 2,
            requested: 1
        }
        .is_fatal());
        assert!(!DbError::ReentrantAccess.is_fatal());
        assert_eq!(DbError::ReentrantAccess.code(), "reentrant_access");
    }
}
