use std::io;

use sdb_types::TypeError;

/// Errors produced by the backing region.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// I/O error while opening, growing, or flushing the region file.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The region could not satisfy an allocation and may not grow further.
    #[error("region full: requested {requested} bytes, {available} bytes available")]
    RegionFull { requested: u64, available: u64 },

    /// Growing the region failed or would exceed the configured maximum.
    #[error("cannot grow region from {current} to {requested} bytes (max {max})")]
    GrowFailed { current: u64, requested: u64, max: u64 },

    /// The file does not start with the region magic.
    #[error("invalid region magic: expected {expected:?}, found {actual:?}")]
    InvalidMagic { expected: [u8; 4], actual: [u8; 4] },

    /// The region was written by an incompatible format version.
    #[error("incompatible region format: found version {found}, expected {expected}")]
    IncompatibleFormat { found: u32, expected: u32 },

    /// Header checksum failed.
    #[error("region header checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    HeaderChecksum { stored: u32, computed: u32 },

    /// The region was not flushed after its last mutation.
    #[error("region was not cleanly flushed and must be rebuilt")]
    Dirty,

    /// A write was attempted on a read-only region.
    #[error("region is read-only")]
    ReadOnly,

    /// A block header or payload is malformed.
    #[error("invalid block at offset {offset}: {reason}")]
    InvalidBlock { offset: u64, reason: String },

    /// Encoding or decoding a stored value failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Every type table slot is taken.
    #[error("type table full ({0} slots)")]
    TypeTableFull(usize),

    /// A type id is recorded under a different name than the one registering it.
    #[error("type id {type_id} is recorded as {recorded:?}, not {requested:?}")]
    TypeMismatch {
        type_id: u16,
        recorded: String,
        requested: String,
    },

    /// A type id has no slot in the type table.
    #[error("type id {0} is not registered in the region")]
    UnknownType(u16),

    /// Invalid region configuration.
    #[error("invalid region configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl RegionError {
    /// Returns `true` for failures the caller can only address by
    /// reconfiguring or rebuilding the region.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RegionError::Serialization(_) | RegionError::Config(_))
    }
}

/// Result alias for region operations.
pub type RegionResult<T> = Result<T, RegionError>;
