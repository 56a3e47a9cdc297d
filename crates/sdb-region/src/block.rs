//! Block framing inside the region.
//!
//! Every byte between `HEADER_SIZE` and the high-water mark belongs to
//! exactly one block. Blocks are laid out back to back, so the whole data
//! area can be walked front to back.
//!
//! Block header layout (little-endian, `BLOCK_HEADER_SIZE` bytes):
//! ```text
//! [0..8)   total block size including this header (u64, multiple of BLOCK_ALIGN)
//! [8..10)  block kind (u16)
//! [10..12) owning type id (u16)
//! [12..16) payload length (u32)
//! [16..20) CRC32 of the payload (u32)
//! [20..24) marker 0x5344_4242 (u32)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{RegionError, RegionResult};

/// Size of a block header.
pub const BLOCK_HEADER_SIZE: u64 = 24;

/// Block sizes and offsets are multiples of this.
pub const BLOCK_ALIGN: u64 = 8;

/// Smallest block worth splitting off as a free remainder.
pub const MIN_BLOCK_SIZE: u64 = BLOCK_HEADER_SIZE + BLOCK_ALIGN;

const BLOCK_MARKER: u32 = 0x5344_4242;

/// What a block holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    /// Unused space, tracked by the free list.
    Free,
    /// One encoded object of a registered type.
    Object,
    /// An index root: the persisted directory of a type's objects.
    Root,
    /// A standalone container value carved by a typed allocator.
    Value,
}

impl BlockKind {
    fn to_u16(self) -> u16 {
        match self {
            BlockKind::Free => 0,
            BlockKind::Object => 1,
            BlockKind::Root => 2,
            BlockKind::Value => 3,
        }
    }

    fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(BlockKind::Free),
            1 => Some(BlockKind::Object),
            2 => Some(BlockKind::Root),
            3 => Some(BlockKind::Value),
            _ => None,
        }
    }
}

/// Stable reference to a block: its offset from the start of the region.
///
/// Offsets stay valid across region growth and remapping. A `BlockRef`
/// is invalidated only by freeing the block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockRef(u64);

impl BlockRef {
    pub(crate) fn new(offset: u64) -> Self {
        Self(offset)
    }

    /// Rebuild a reference from a persisted offset.
    pub fn from_offset(offset: u64) -> Self {
        Self(offset)
    }

    pub fn offset(self) -> u64 {
        self.0
    }

    /// Offset of the first payload byte.
    pub fn payload_offset(self) -> u64 {
        self.0 + BLOCK_HEADER_SIZE
    }
}

/// Decoded block header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub size: u64,
    pub kind: BlockKind,
    pub type_id: u16,
    pub payload_len: u32,
    pub crc: u32,
}

impl BlockHeader {
    pub fn free(size: u64) -> Self {
        Self {
            size,
            kind: BlockKind::Free,
            type_id: 0,
            payload_len: 0,
            crc: 0,
        }
    }

    /// Header for a used block holding `payload`.
    pub fn used(size: u64, kind: BlockKind, type_id: u16, payload: &[u8]) -> Self {
        Self {
            size,
            kind,
            type_id,
            payload_len: payload.len() as u32,
            crc: crc32fast::hash(payload),
        }
    }

    /// Payload bytes the block can hold without reallocation.
    pub fn capacity(&self) -> u64 {
        self.size - BLOCK_HEADER_SIZE
    }

    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_SIZE as usize] {
        let mut buf = [0u8; BLOCK_HEADER_SIZE as usize];
        buf[0..8].copy_from_slice(&self.size.to_le_bytes());
        buf[8..10].copy_from_slice(&self.kind.to_u16().to_le_bytes());
        buf[10..12].copy_from_slice(&self.type_id.to_le_bytes());
        buf[12..16].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[16..20].copy_from_slice(&self.crc.to_le_bytes());
        buf[20..24].copy_from_slice(&BLOCK_MARKER.to_le_bytes());
        buf
    }

    /// Decode the header of the block starting at `offset`.
    pub fn from_bytes(bytes: &[u8], offset: u64) -> RegionResult<Self> {
        let invalid = |reason: String| RegionError::InvalidBlock { offset, reason };

        if bytes.len() < BLOCK_HEADER_SIZE as usize {
            return Err(invalid("truncated block header".into()));
        }
        let marker = u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        if marker != BLOCK_MARKER {
            return Err(invalid(format!("bad block marker {marker:#010x}")));
        }

        let mut size = [0u8; 8];
        size.copy_from_slice(&bytes[0..8]);
        let size = u64::from_le_bytes(size);
        if size < BLOCK_HEADER_SIZE || size % BLOCK_ALIGN != 0 {
            return Err(invalid(format!("bad block size {size}")));
        }

        let raw_kind = u16::from_le_bytes([bytes[8], bytes[9]]);
        let kind = BlockKind::from_u16(raw_kind)
            .ok_or_else(|| invalid(format!("unknown block kind {raw_kind}")))?;
        let payload_len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        if u64::from(payload_len) > size - BLOCK_HEADER_SIZE {
            return Err(invalid(format!(
                "payload length {payload_len} exceeds block size {size}"
            )));
        }

        Ok(Self {
            size,
            kind,
            type_id: u16::from_le_bytes([bytes[10], bytes[11]]),
            payload_len,
            crc: u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
        })
    }
}

/// Total block size needed for a payload of `payload_len` bytes.
pub fn block_size_for(payload_len: usize) -> u64 {
    align_up(BLOCK_HEADER_SIZE + payload_len as u64)
}

/// Round up to the next multiple of `BLOCK_ALIGN`.
pub fn align_up(n: u64) -> u64 {
    (n + BLOCK_ALIGN - 1) / BLOCK_ALIGN * BLOCK_ALIGN
}

/// Round down to the previous multiple of `BLOCK_ALIGN`.
pub fn align_down(n: u64) -> u64 {
    n / BLOCK_ALIGN * BLOCK_ALIGN
}
