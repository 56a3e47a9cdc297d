//! Typed allocators: typed views over the region's block allocator.
//!
//! A [`TypedAllocator<V>`] encodes values of `V` into region blocks and
//! decodes them back. It holds no borrow of the region; every operation
//! takes the region explicitly, so one allocator can serve many regions and
//! an index can own allocators while also holding `&mut Region` for a call.
//!
//! Index objects keep their members inline: the whole object, strings and
//! collections included, is one bincode block from [`object_allocator`].
//! The container factories are for values kept out of line instead, such
//! as a large or rarely read collection that a record points at through a
//! [`BlockRef`]. They cover strings, sequences, ordered unique and
//! non-unique sets and maps, and deques. Each container kind has a reserved
//! type id so a block walk can tell what it holds.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use sdb_types::{Object, RESERVED_TYPE_ID_START};

use crate::block::{BlockKind, BlockRef};
use crate::containers::{MultiMap, MultiSet};
use crate::error::{RegionError, RegionResult};
use crate::region::Region;

/// Container families with a dedicated allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    String,
    Vec,
    Set,
    MultiSet,
    Map,
    MultiMap,
    Deque,
}

impl ContainerKind {
    pub const ALL: [ContainerKind; 7] = [
        ContainerKind::String,
        ContainerKind::Vec,
        ContainerKind::Set,
        ContainerKind::MultiSet,
        ContainerKind::Map,
        ContainerKind::MultiMap,
        ContainerKind::Deque,
    ];

    /// Reserved type id stamped on blocks of this container kind.
    pub fn type_id(self) -> u16 {
        let offset = match self {
            ContainerKind::String => 1,
            ContainerKind::Vec => 2,
            ContainerKind::Set => 3,
            ContainerKind::MultiSet => 4,
            ContainerKind::Map => 5,
            ContainerKind::MultiMap => 6,
            ContainerKind::Deque => 7,
        };
        RESERVED_TYPE_ID_START + offset
    }

    pub fn from_type_id(type_id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_id() == type_id)
    }

    pub fn name(self) -> &'static str {
        match self {
            ContainerKind::String => "string",
            ContainerKind::Vec => "vec",
            ContainerKind::Set => "set",
            ContainerKind::MultiSet => "multiset",
            ContainerKind::Map => "map",
            ContainerKind::MultiMap => "multimap",
            ContainerKind::Deque => "deque",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed reference to a value stored in the region.
pub struct Stored<V> {
    block: BlockRef,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Stored<V> {
    pub fn block(&self) -> BlockRef {
        self.block
    }

    /// Re-type a persisted block reference.
    pub fn from_block(block: BlockRef) -> Self {
        Self {
            block,
            _marker: PhantomData,
        }
    }
}

impl<V> Clone for Stored<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Stored<V> {}

impl<V> PartialEq for Stored<V> {
    fn eq(&self, other: &Self) -> bool {
        self.block == other.block
    }
}

impl<V> Eq for Stored<V> {}

impl<V> fmt::Debug for Stored<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stored({})", self.block.offset())
    }
}

/// Encodes values of `V` into blocks of one kind and type id.
pub struct TypedAllocator<V> {
    kind: BlockKind,
    type_id: u16,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for TypedAllocator<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for TypedAllocator<V> {}

impl<V> fmt::Debug for TypedAllocator<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedAllocator")
            .field("kind", &self.kind)
            .field("type_id", &self.type_id)
            .finish()
    }
}

impl<V: Serialize + DeserializeOwned> TypedAllocator<V> {
    pub fn new(kind: BlockKind, type_id: u16) -> Self {
        Self {
            kind,
            type_id,
            _marker: PhantomData,
        }
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn type_id(&self) -> u16 {
        self.type_id
    }

    /// Store `value` in a new block.
    pub fn allocate(&self, region: &mut Region, value: &V) -> RegionResult<Stored<V>> {
        let payload = encode(value)?;
        let block = region.allocate(self.kind, self.type_id, &payload)?;
        Ok(Stored::from_block(block))
    }

    /// Decode the value held by `stored`, verifying its checksum and that
    /// the block belongs to this allocator.
    pub fn read(&self, region: &Region, stored: Stored<V>) -> RegionResult<V> {
        self.check_owner(region, stored.block)?;
        decode(region.read_checked(stored.block)?)
    }

    /// Overwrite the value held by `stored`. The block may move.
    pub fn replace(
        &self,
        region: &mut Region,
        stored: Stored<V>,
        value: &V,
    ) -> RegionResult<Stored<V>> {
        self.check_owner(region, stored.block)?;
        let payload = encode(value)?;
        Ok(Stored::from_block(region.rewrite(stored.block, &payload)?))
    }

    pub fn deallocate(&self, region: &mut Region, stored: Stored<V>) -> RegionResult<()> {
        self.check_owner(region, stored.block)?;
        region.free(stored.block)
    }

    fn check_owner(&self, region: &Region, block: BlockRef) -> RegionResult<()> {
        let header = region.block_header(block)?;
        if header.kind != self.kind || header.type_id != self.type_id {
            return Err(RegionError::InvalidBlock {
                offset: block.offset(),
                reason: format!(
                    "expected a {:?} block of type {}, found {:?} of type {}",
                    self.kind, self.type_id, header.kind, header.type_id
                ),
            });
        }
        Ok(())
    }
}

/// Encode a value the way every region block stores it.
pub fn encode<V: Serialize + ?Sized>(value: &V) -> RegionResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| RegionError::Serialization(e.to_string()))
}

/// Decode a region block payload.
pub fn decode<V: DeserializeOwned>(bytes: &[u8]) -> RegionResult<V> {
    bincode::deserialize(bytes).map_err(|e| RegionError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

/// Allocator for whole objects of type `T`.
pub fn object_allocator<T: Object>() -> TypedAllocator<T> {
    TypedAllocator::new(BlockKind::Object, T::TYPE_ID)
}

/// Allocator for the index root of type id `type_id`.
pub fn root_allocator<R: Serialize + DeserializeOwned>(type_id: u16) -> TypedAllocator<R> {
    TypedAllocator::new(BlockKind::Root, type_id)
}

fn container<V: Serialize + DeserializeOwned>(kind: ContainerKind) -> TypedAllocator<V> {
    TypedAllocator::new(BlockKind::Value, kind.type_id())
}

pub fn string_allocator() -> TypedAllocator<String> {
    container(ContainerKind::String)
}

pub fn vec_allocator<T: Serialize + DeserializeOwned>() -> TypedAllocator<Vec<T>> {
    container(ContainerKind::Vec)
}

pub fn set_allocator<T>() -> TypedAllocator<BTreeSet<T>>
where
    T: Ord + Serialize + DeserializeOwned,
{
    container(ContainerKind::Set)
}

pub fn multiset_allocator<T>() -> TypedAllocator<MultiSet<T>>
where
    T: Ord + Serialize + DeserializeOwned,
{
    container(ContainerKind::MultiSet)
}

pub fn map_allocator<K, V>() -> TypedAllocator<BTreeMap<K, V>>
where
    K: Ord + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    container(ContainerKind::Map)
}

pub fn multimap_allocator<K, V>() -> TypedAllocator<MultiMap<K, V>>
where
    K: Ord + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    container(ContainerKind::MultiMap)
}

pub fn deque_allocator<T: Serialize + DeserializeOwned>() -> TypedAllocator<VecDeque<T>> {
    container(ContainerKind::Deque)
}
