//! Backing region for the state database (SDB).
//!
//! A [`Region`] is one contiguous address space, file-backed through a
//! shared memory mapping or purely anonymous, from which every stored value
//! is carved:
//!
//! - a fixed [`header`] with magic, format version, dirty flag, revision and
//!   the type table (per-type id counters and index root locations)
//! - back-to-back [`block`]s, each framed with size, kind, owner type and a
//!   payload checksum
//! - a best-fit [`free_list`] rebuilt on open by walking the blocks
//!
//! [`TypedAllocator`]s layer typed encode/decode on top of raw blocks; the
//! container factories in [`alloc`] give every variable-length member of an
//! object an allocation source inside the region.

pub mod alloc;
pub mod block;
pub mod config;
pub mod containers;
pub mod error;
pub mod free_list;
pub mod header;
pub mod region;

pub use alloc::{
    decode, deque_allocator, encode, map_allocator, multimap_allocator, multiset_allocator,
    object_allocator, root_allocator, set_allocator, string_allocator, vec_allocator,
    ContainerKind, Stored, TypedAllocator,
};
pub use block::{BlockHeader, BlockKind, BlockRef};
pub use config::{GrowPolicy, RegionConfig};
pub use containers::{MultiMap, MultiSet};
pub use error::{RegionError, RegionResult};
pub use header::{RegionHeader, TypeSlot, FORMAT_VERSION, HEADER_SIZE, MAGIC};
pub use region::{Region, RegionStats};
