use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut, MmapOptions};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::block::{align_down, align_up, block_size_for, BlockHeader, BlockKind, BlockRef, BLOCK_HEADER_SIZE};
use crate::config::RegionConfig;
use crate::error::{RegionError, RegionResult};
use crate::free_list::FreeList;
use crate::header::{RegionHeader, TypeSlot, HEADER_SIZE};

/// The memory mapping behind a region.
enum Mapping {
    /// Pure in-memory region (anonymous mapping, nothing persisted).
    Anonymous(MmapMut),
    /// Writable file-backed region.
    File { file: File, map: MmapMut },
    /// Read-only file-backed region.
    ReadOnly { _file: File, map: Mmap },
}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        match self {
            Mapping::Anonymous(map) => &map[..],
            Mapping::File { map, .. } => &map[..],
            Mapping::ReadOnly { map, .. } => &map[..],
        }
    }

    fn bytes_mut(&mut self) -> RegionResult<&mut [u8]> {
        match self {
            Mapping::Anonymous(map) => Ok(&mut map[..]),
            Mapping::File { map, .. } => Ok(&mut map[..]),
            Mapping::ReadOnly { .. } => Err(RegionError::ReadOnly),
        }
    }

    fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    fn flush(&self) -> io::Result<()> {
        match self {
            Mapping::File { map, .. } => map.flush(),
            Mapping::Anonymous(_) | Mapping::ReadOnly { .. } => Ok(()),
        }
    }

    fn flush_range(&self, offset: usize, len: usize) -> io::Result<()> {
        match self {
            Mapping::File { map, .. } => map.flush_range(offset, len),
            Mapping::Anonymous(_) | Mapping::ReadOnly { .. } => Ok(()),
        }
    }
}

/// Point-in-time usage figures of a region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RegionStats {
    /// Current mapped size in bytes.
    pub size: u64,
    /// Configured upper bound.
    pub max_size: u64,
    /// Bytes held by live blocks (headers included).
    pub used: u64,
    /// Bytes available without growing: free extents plus the untouched tail.
    pub free: u64,
    /// End of the last block.
    pub high_water: u64,
    /// Number of free extents below the high-water mark.
    pub free_blocks: usize,
    /// Number of live blocks.
    pub live_blocks: u64,
    /// Largest single free extent below the high-water mark.
    pub largest_free: u64,
}

/// A single growable, memory-mappable address space from which every
/// stored value is carved.
///
/// The region is either file-backed (shared mapping, persisted by
/// [`Region::flush`]) or anonymous (pure in-memory). Allocations are
/// addressed by [`BlockRef`] offsets, never by pointers, so growing the
/// region (which may remap it at a new address) keeps every reference valid.
///
/// The header's dirty flag is raised by the first mutation after open or
/// flush and cleared by `flush`. A region whose dirty flag is set on disk
/// was not flushed after its last change and refuses to open.
pub struct Region {
    path: Option<PathBuf>,
    mapping: Mapping,
    header: RegionHeader,
    free: FreeList,
    config: RegionConfig,
    live_blocks: u64,
}

impl Region {
    /// Open a region.
    ///
    /// - `None` creates a pure in-memory region of `initial_size` bytes.
    /// - A path to a missing or empty file creates and initializes it.
    /// - A path to an existing region validates its header and attaches.
    pub fn open(path: Option<&Path>, config: RegionConfig) -> RegionResult<Self> {
        config.validate()?;
        match path {
            None => {
                if config.read_only {
                    return Err(RegionError::Config(
                        "an in-memory region cannot be read-only".into(),
                    ));
                }
                Self::create_anonymous(config)
            }
            Some(path) if path.exists() && fs::metadata(path)?.len() > 0 => {
                Self::open_existing(path, config)
            }
            Some(path) => {
                if config.read_only {
                    return Err(RegionError::Io(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("region file {} does not exist", path.display()),
                    )));
                }
                Self::create_file(path, config)
            }
        }
    }

    fn create_anonymous(config: RegionConfig) -> RegionResult<Self> {
        let map = MmapMut::map_anon(config.initial_size as usize)?;
        let mut region = Self {
            path: None,
            mapping: Mapping::Anonymous(map),
            header: RegionHeader::new(config.initial_size),
            free: FreeList::new(),
            config,
            live_blocks: 0,
        };
        region.write_header()?;
        debug!(size = region.len(), "in-memory region created");
        Ok(region)
    }

    fn create_file(path: &Path, config: RegionConfig) -> RegionResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(config.initial_size)?;

        // SAFETY: the file is owned by this region for as long as the mapping lives.
        let map = unsafe { MmapOptions::new().map_mut(&file)? };
        let mut region = Self {
            path: Some(path.to_path_buf()),
            mapping: Mapping::File { file, map },
            header: RegionHeader::new(config.initial_size),
            free: FreeList::new(),
            config,
            live_blocks: 0,
        };
        region.write_header()?;
        region.mapping.flush()?;
        info!(path = %path.display(), size = region.len(), "region created");
        Ok(region)
    }

    fn open_existing(path: &Path, mut config: RegionConfig) -> RegionResult<Self> {
        let mapping = if config.read_only {
            let file = File::open(path)?;
            // SAFETY: see create_file.
            let map = unsafe { Mmap::map(&file)? };
            Mapping::ReadOnly { _file: file, map }
        } else {
            let file = OpenOptions::new().read(true).write(true).open(path)?;
            // SAFETY: see create_file.
            let map = unsafe { MmapOptions::new().map_mut(&file)? };
            Mapping::File { file, map }
        };

        let header = RegionHeader::from_bytes(mapping.bytes())?;
        if header.dirty {
            return Err(RegionError::Dirty);
        }
        if header.high_water < HEADER_SIZE || header.high_water > mapping.len() {
            return Err(RegionError::InvalidBlock {
                offset: 0,
                reason: format!(
                    "high-water mark {} outside region of {} bytes",
                    header.high_water,
                    mapping.len()
                ),
            });
        }
        if mapping.len() > config.max_size {
            warn!(
                size = mapping.len(),
                max_size = config.max_size,
                "existing region exceeds configured max_size; raising the limit"
            );
            config.max_size = mapping.len();
        }

        let mut region = Self {
            path: Some(path.to_path_buf()),
            mapping,
            header,
            free: FreeList::new(),
            config,
            live_blocks: 0,
        };
        region.rebuild_free_list()?;

        info!(
            path = %path.display(),
            size = region.len(),
            types = region.header.types.len(),
            revision = region.header.revision,
            read_only = region.is_read_only(),
            "region opened"
        );
        Ok(region)
    }

    fn rebuild_free_list(&mut self) -> RegionResult<()> {
        let blocks = self.walk()?;
        for (block, header) in blocks {
            if header.kind == BlockKind::Free {
                self.free.release(block.offset(), header.size);
            } else {
                self.live_blocks += 1;
            }
        }
        Ok(())
    }

    // -- Accessors -------------------------------------------------------------

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current mapped size in bytes.
    pub fn len(&self) -> u64 {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live_blocks == 0
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.mapping, Mapping::ReadOnly { .. })
    }

    pub fn is_dirty(&self) -> bool {
        self.header.dirty
    }

    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    /// The in-memory copy of the header.
    pub fn header(&self) -> &RegionHeader {
        &self.header
    }

    pub fn revision(&self) -> u64 {
        self.header.revision
    }

    /// Record a new revision; persisted by the next flush.
    pub fn set_revision(&mut self, revision: u64) -> RegionResult<()> {
        if self.header.revision != revision {
            self.mark_dirty()?;
            self.header.revision = revision;
        }
        Ok(())
    }

    pub fn stats(&self) -> RegionStats {
        let tail = self.len() - self.header.high_water;
        RegionStats {
            size: self.len(),
            max_size: self.config.max_size,
            used: self.header.high_water - HEADER_SIZE - self.free.total(),
            free: tail + self.free.total(),
            high_water: self.header.high_water,
            free_blocks: self.free.len(),
            live_blocks: self.live_blocks,
            largest_free: self.free.largest(),
        }
    }

    // -- Type table --------------------------------------------------------------

    /// All type slots.
    pub fn types(&self) -> &[TypeSlot] {
        &self.header.types
    }

    pub fn type_slot(&self, type_id: u16) -> Option<&TypeSlot> {
        self.header.type_slot(type_id)
    }

    /// Claim (or re-attach to) the type table slot for `type_id`.
    pub fn register_type(&mut self, type_id: u16, name: &str) -> RegionResult<TypeSlot> {
        if let Some(slot) = self.header.type_slot(type_id) {
            if slot.name == name {
                return Ok(slot.clone());
            }
        }
        if self.header.type_slot(type_id).is_none() {
            self.mark_dirty()?;
        }
        self.header.register_type(type_id, name).cloned()
    }

    /// Record a type's identity counter and index root location.
    pub fn update_type(
        &mut self,
        type_id: u16,
        next_id: u64,
        root: Option<BlockRef>,
    ) -> RegionResult<()> {
        self.mark_dirty()?;
        let slot = self
            .header
            .type_slot_mut(type_id)
            .ok_or(RegionError::UnknownType(type_id))?;
        slot.next_id = next_id;
        slot.root_offset = root.map(BlockRef::offset);
        Ok(())
    }

    // -- Block operations --------------------------------------------------------

    /// Carve a new block holding `payload`.
    pub fn allocate(
        &mut self,
        kind: BlockKind,
        type_id: u16,
        payload: &[u8],
    ) -> RegionResult<BlockRef> {
        if kind == BlockKind::Free {
            return Err(RegionError::InvalidBlock {
                offset: 0,
                reason: "cannot allocate a free block".into(),
            });
        }
        self.mark_dirty()?;

        let size = block_size_for(payload.len());
        let (offset, granted) = match self.free.take(size) {
            Some((offset, granted, remainder)) => {
                if let Some((rem_offset, rem_len)) = remainder {
                    self.write_block_header(rem_offset, &BlockHeader::free(rem_len))?;
                }
                (offset, granted)
            }
            None => (self.bump(size)?, size),
        };

        let header = BlockHeader::used(granted, kind, type_id, payload);
        self.write_block_header(offset, &header)?;
        self.write_at(offset + BLOCK_HEADER_SIZE, payload)?;
        self.live_blocks += 1;
        Ok(BlockRef::new(offset))
    }

    /// Replace a block's payload, in place when it fits.
    ///
    /// Returns the (possibly new) block reference. When the payload does not
    /// fit, the new block is allocated before the old one is released, so a
    /// failed allocation leaves the old payload untouched.
    pub fn rewrite(&mut self, block: BlockRef, payload: &[u8]) -> RegionResult<BlockRef> {
        let current = self.block_header(block)?;
        if current.kind == BlockKind::Free {
            return Err(RegionError::InvalidBlock {
                offset: block.offset(),
                reason: "rewrite of a free block".into(),
            });
        }

        if payload.len() as u64 <= current.capacity() {
            self.mark_dirty()?;
            let header = BlockHeader::used(current.size, current.kind, current.type_id, payload);
            self.write_block_header(block.offset(), &header)?;
            self.write_at(block.payload_offset(), payload)?;
            return Ok(block);
        }

        let moved = self.allocate(current.kind, current.type_id, payload)?;
        self.free(block)?;
        Ok(moved)
    }

    /// Release a block.
    pub fn free(&mut self, block: BlockRef) -> RegionResult<()> {
        let current = self.block_header(block)?;
        if current.kind == BlockKind::Free {
            return Err(RegionError::InvalidBlock {
                offset: block.offset(),
                reason: "double free".into(),
            });
        }
        self.mark_dirty()?;

        let (offset, size) = self.free.release(block.offset(), current.size);
        self.write_block_header(offset, &BlockHeader::free(size))?;
        self.live_blocks -= 1;

        if let Some(high_water) = self.free.trim_tail(self.header.high_water) {
            self.header.high_water = high_water;
        }
        Ok(())
    }

    /// Header of the block at `block`.
    pub fn block_header(&self, block: BlockRef) -> RegionResult<BlockHeader> {
        let offset = block.offset();
        if offset < HEADER_SIZE
            || offset % crate::block::BLOCK_ALIGN != 0
            || offset + BLOCK_HEADER_SIZE > self.header.high_water
        {
            return Err(RegionError::InvalidBlock {
                offset,
                reason: "offset outside the data area".into(),
            });
        }
        let start = offset as usize;
        let header = BlockHeader::from_bytes(
            &self.mapping.bytes()[start..start + BLOCK_HEADER_SIZE as usize],
            offset,
        )?;
        if offset + header.size > self.header.high_water {
            return Err(RegionError::InvalidBlock {
                offset,
                reason: format!("block of {} bytes runs past the high-water mark", header.size),
            });
        }
        Ok(header)
    }

    /// Payload of a used block.
    pub fn read(&self, block: BlockRef) -> RegionResult<&[u8]> {
        let header = self.block_header(block)?;
        if header.kind == BlockKind::Free {
            return Err(RegionError::InvalidBlock {
                offset: block.offset(),
                reason: "read of a free block".into(),
            });
        }
        let start = block.payload_offset() as usize;
        Ok(&self.mapping.bytes()[start..start + header.payload_len as usize])
    }

    /// Payload of a used block, verified against its checksum.
    pub fn read_checked(&self, block: BlockRef) -> RegionResult<&[u8]> {
        let header = self.block_header(block)?;
        let payload = self.read(block)?;
        let computed = crc32fast::hash(payload);
        if computed != header.crc {
            return Err(RegionError::InvalidBlock {
                offset: block.offset(),
                reason: format!(
                    "payload checksum mismatch: stored {:#010x}, computed {computed:#010x}",
                    header.crc
                ),
            });
        }
        Ok(payload)
    }

    /// Walk every block between the header and the high-water mark.
    pub fn walk(&self) -> RegionResult<Vec<(BlockRef, BlockHeader)>> {
        let mut blocks = Vec::new();
        let mut offset = HEADER_SIZE;
        while offset < self.header.high_water {
            let block = BlockRef::new(offset);
            let header = self.block_header(block)?;
            blocks.push((block, header));
            offset += header.size;
        }
        Ok(blocks)
    }

    // -- Lifecycle ---------------------------------------------------------------

    /// Grow the region by at least `additional` bytes.
    ///
    /// Existing blocks keep their offsets. A file-backed region is flushed,
    /// extended, and remapped; an in-memory region is copied into a larger
    /// anonymous mapping.
    pub fn grow(&mut self, additional: u64) -> RegionResult<()> {
        let current = self.len();
        let requested = current
            .checked_add(additional)
            .map(align_up)
            .unwrap_or(u64::MAX);
        if requested > self.config.max_size {
            return Err(RegionError::GrowFailed {
                current,
                requested,
                max: self.config.max_size,
            });
        }

        match &mut self.mapping {
            Mapping::ReadOnly { .. } => return Err(RegionError::ReadOnly),
            Mapping::Anonymous(map) => {
                let mut larger = MmapMut::map_anon(requested as usize)?;
                larger[..current as usize].copy_from_slice(&map[..]);
                *map = larger;
            }
            Mapping::File { file, map } => {
                map.flush()?;
                file.set_len(requested)?;
                // SAFETY: see create_file.
                *map = unsafe { MmapOptions::new().map_mut(&*file)? };
            }
        }

        self.header.size = requested;
        self.write_header()?;
        info!(from = current, to = requested, "region grown");
        Ok(())
    }

    /// Persist the header and every mapped page, and clear the dirty flag.
    pub fn flush(&mut self) -> RegionResult<()> {
        if self.is_read_only() {
            return Ok(());
        }
        self.header.dirty = false;
        self.write_header()?;
        self.mapping.flush()?;
        debug!(
            high_water = self.header.high_water,
            revision = self.header.revision,
            "region flushed"
        );
        Ok(())
    }

    /// Flush (unless read-only) and unmap.
    pub fn close(mut self) -> RegionResult<()> {
        self.flush()?;
        info!(
            path = ?self.path,
            live_blocks = self.live_blocks,
            "region closed"
        );
        Ok(())
    }

    // -- Internals ---------------------------------------------------------------

    fn mark_dirty(&mut self) -> RegionResult<()> {
        if self.is_read_only() {
            return Err(RegionError::ReadOnly);
        }
        if !self.header.dirty {
            self.header.dirty = true;
            self.write_header()?;
            self.mapping.flush_range(0, HEADER_SIZE as usize)?;
        }
        Ok(())
    }

    /// Reserve `size` bytes at the high-water mark, growing if allowed.
    fn bump(&mut self, size: u64) -> RegionResult<u64> {
        let available = self.len() - self.header.high_water;
        if size > available {
            self.ensure_capacity(size, size - available)?;
        }
        let offset = self.header.high_water;
        self.header.high_water += size;
        Ok(offset)
    }

    fn ensure_capacity(&mut self, requested: u64, shortfall: u64) -> RegionResult<()> {
        let current = self.len();
        let available = current - self.header.high_water;
        // `grow` rounds the new length up, so only aligned room is usable.
        let room = align_down(self.config.max_size).saturating_sub(current);
        if !self.config.grow.auto_grow || room < shortfall {
            return Err(RegionError::RegionFull {
                requested,
                available,
            });
        }
        let increment = self.config.grow.increment(current, shortfall).min(room);
        debug!(current, increment, shortfall, "auto-growing region");
        self.grow(increment)
    }

    fn write_header(&mut self) -> RegionResult<()> {
        self.header.size = self.len();
        let bytes = self.header.to_bytes();
        self.write_at(0, &bytes)
    }

    fn write_block_header(&mut self, offset: u64, header: &BlockHeader) -> RegionResult<()> {
        self.write_at(offset, &header.to_bytes())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> RegionResult<()> {
        let bytes = self.mapping.bytes_mut()?;
        let start = offset as usize;
        let end = start + data.len();
        if end > bytes.len() {
            return Err(RegionError::InvalidBlock {
                offset,
                reason: format!("write of {} bytes past the end of the region", data.len()),
            });
        }
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("path", &self.path)
            .field("size", &self.len())
            .field("high_water", &self.header.high_water)
            .field("live_blocks", &self.live_blocks)
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GrowPolicy;

    const KIB: u64 = 1024;

    fn small_config() -> RegionConfig {
        RegionConfig::with_sizes(64 * KIB, 1024 * KIB)
    }

    fn memory_region() -> Region {
        Region::open(None, small_config()).unwrap()
    }

    // -----------------------------------------------------------------------
    // Allocation
    // -----------------------------------------------------------------------

    #[test]
    fn allocate_and_read_back() {
        let mut region = memory_region();
        let block = region.allocate(BlockKind::Value, 0, b"hello region").unwrap();
        assert_eq!(block.offset(), HEADER_SIZE);
        assert_eq!(region.read(block).unwrap(), b"hello region");
        assert_eq!(region.read_checked(block).unwrap(), b"hello region");
        assert_eq!(region.stats().live_blocks, 1);
    }

    #[test]
    fn freed_space_is_reused() {
        let mut region = memory_region();
        let a = region.allocate(BlockKind::Value, 0, &[1u8; 100]).unwrap();
        let _b = region.allocate(BlockKind::Value, 0, &[2u8; 100]).unwrap();
        region.free(a).unwrap();
        let c = region.allocate(BlockKind::Value, 0, &[3u8; 80]).unwrap();
        assert_eq!(c, a);
        assert_eq!(region.read(c).unwrap(), &[3u8; 80][..]);
    }

    #[test]
    fn freeing_tail_lowers_high_water() {
        let mut region = memory_region();
        let a = region.allocate(BlockKind::Value, 0, &[1u8; 10]).unwrap();
        let b = region.allocate(BlockKind::Value, 0, &[2u8; 10]).unwrap();
        region.free(b).unwrap();
        assert_eq!(region.stats().high_water, a.offset() + block_size_for(10));
        region.free(a).unwrap();
        assert_eq!(region.stats().high_water, HEADER_SIZE);
        assert_eq!(region.stats().used, 0);
    }

    #[test]
    fn double_free_rejected() {
        let mut region = memory_region();
        let a = region.allocate(BlockKind::Value, 0, b"x").unwrap();
        let _keep = region.allocate(BlockKind::Value, 0, b"y").unwrap();
        region.free(a).unwrap();
        assert!(matches!(region.free(a), Err(RegionError::InvalidBlock { .. })));
    }

    #[test]
    fn rewrite_in_place_when_it_fits() {
        let mut region = memory_region();
        let a = region.allocate(BlockKind::Object, 3, &[0u8; 64]).unwrap();
        let same = region.rewrite(a, &[9u8; 32]).unwrap();
        assert_eq!(same, a);
        assert_eq!(region.read(a).unwrap(), &[9u8; 32][..]);
        assert_eq!(region.block_header(a).unwrap().type_id, 3);
    }

    #[test]
    fn rewrite_moves_when_it_grows() {
        let mut region = memory_region();
        let a = region.allocate(BlockKind::Object, 3, &[0u8; 8]).unwrap();
        let _b = region.allocate(BlockKind::Object, 3, &[0u8; 8]).unwrap();
        let moved = region.rewrite(a, &[7u8; 500]).unwrap();
        assert_ne!(moved, a);
        assert_eq!(region.read(moved).unwrap(), &[7u8; 500][..]);
        assert!(region.read(a).is_err());
    }

    // -----------------------------------------------------------------------
    // Growth
    // -----------------------------------------------------------------------

    #[test]
    fn auto_grow_preserves_content() {
        let mut region = memory_region();
        let first = region.allocate(BlockKind::Value, 0, b"survives growth").unwrap();
        for _ in 0..100 {
            region.allocate(BlockKind::Value, 0, &[0xaa; 1000]).unwrap();
        }
        assert!(region.len() > 64 * KIB);
        assert_eq!(region.read(first).unwrap(), b"survives growth");
    }

    #[test]
    fn fixed_region_reports_full() {
        let config = RegionConfig {
            grow: GrowPolicy::fixed(),
            ..RegionConfig::with_sizes(16 * KIB, 1024 * KIB)
        };
        let mut region = Region::open(None, config).unwrap();
        let err = region
            .allocate(BlockKind::Value, 0, &[0u8; 20 * 1024])
            .unwrap_err();
        assert!(matches!(err, RegionError::RegionFull { .. }));
        assert_eq!(region.stats().live_blocks, 0);
    }

    #[test]
    fn growth_capped_by_max_size() {
        let mut region = Region::open(None, RegionConfig::with_sizes(16 * KIB, 32 * KIB)).unwrap();
        assert!(matches!(
            region.grow(64 * KIB),
            Err(RegionError::GrowFailed { .. })
        ));
        assert!(matches!(
            region.allocate(BlockKind::Value, 0, &[0u8; 40 * 1024]),
            Err(RegionError::RegionFull { .. })
        ));
    }

    #[test]
    fn growth_fills_unaligned_max_size() {
        let mut region = Region::open(None, RegionConfig::with_sizes(16 * KIB, 20 * KIB + 4)).unwrap();
        let block = region.allocate(BlockKind::Value, 0, &[7u8; 15_000]).unwrap();
        assert!(region.len() > 16 * KIB && region.len() <= 20 * KIB);
        assert_eq!(region.read(block).unwrap(), &[7u8; 15_000][..]);

        // Past the last aligned byte below the cap the region is full.
        assert!(matches!(
            region.allocate(BlockKind::Value, 0, &[0u8; 4 * 1024]),
            Err(RegionError::RegionFull { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    #[test]
    fn file_region_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sdb");

        let block = {
            let mut region = Region::open(Some(&path), small_config()).unwrap();
            region.register_type(1, "account").unwrap();
            let block = region.allocate(BlockKind::Object, 1, b"persisted").unwrap();
            region.update_type(1, 5, Some(block)).unwrap();
            region.set_revision(12).unwrap();
            region.close().unwrap();
            block
        };

        let region = Region::open(Some(&path), small_config()).unwrap();
        assert_eq!(region.read_checked(block).unwrap(), b"persisted");
        assert_eq!(region.revision(), 12);
        let slot = region.type_slot(1).unwrap();
        assert_eq!(slot.name, "account");
        assert_eq!(slot.next_id, 5);
        assert_eq!(slot.root_offset, Some(block.offset()));
        assert_eq!(region.stats().live_blocks, 1);
    }

    #[test]
    fn free_list_rebuilt_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sdb");
        let freed = {
            let mut region = Region::open(Some(&path), small_config()).unwrap();
            let a = region.allocate(BlockKind::Value, 0, &[1u8; 200]).unwrap();
            region.allocate(BlockKind::Value, 0, &[2u8; 200]).unwrap();
            region.free(a).unwrap();
            region.close().unwrap();
            a
        };

        let mut region = Region::open(Some(&path), small_config()).unwrap();
        assert_eq!(region.stats().free_blocks, 1);
        let reused = region.allocate(BlockKind::Value, 0, &[3u8; 150]).unwrap();
        assert_eq!(reused, freed);
    }

    #[test]
    fn unflushed_region_is_dirty_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sdb");
        {
            let mut region = Region::open(Some(&path), small_config()).unwrap();
            region.allocate(BlockKind::Value, 0, b"never flushed").unwrap();
            // dropped without flush
        }
        assert!(matches!(
            Region::open(Some(&path), small_config()),
            Err(RegionError::Dirty)
        ));
    }

    #[test]
    fn file_growth_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grow.sdb");
        let block = {
            let mut region = Region::open(Some(&path), RegionConfig::with_sizes(16 * KIB, 1024 * KIB)).unwrap();
            let block = region.allocate(BlockKind::Value, 0, b"before").unwrap();
            region.grow(100 * KIB).unwrap();
            region.allocate(BlockKind::Value, 0, &[5u8; 50 * 1024]).unwrap();
            region.close().unwrap();
            block
        };
        let region = Region::open(Some(&path), small_config()).unwrap();
        assert!(region.len() >= 116 * KIB);
        assert_eq!(region.read(block).unwrap(), b"before");
    }

    #[test]
    fn read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.sdb");
        Region::open(Some(&path), small_config()).unwrap().close().unwrap();

        let config = RegionConfig {
            read_only: true,
            ..small_config()
        };
        let mut region = Region::open(Some(&path), config).unwrap();
        assert!(region.is_read_only());
        assert!(matches!(
            region.allocate(BlockKind::Value, 0, b"x"),
            Err(RegionError::ReadOnly)
        ));
        assert!(matches!(region.grow(KIB), Err(RegionError::ReadOnly)));
    }

    #[test]
    fn read_only_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = RegionConfig {
            read_only: true,
            ..small_config()
        };
        assert!(matches!(
            Region::open(Some(&dir.path().join("missing.sdb")), config),
            Err(RegionError::Io(_))
        ));
    }

    #[test]
    fn foreign_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foreign.bin");
        std::fs::write(&path, vec![0x42u8; 8192]).unwrap();
        assert!(matches!(
            Region::open(Some(&path), small_config()),
            Err(RegionError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn walk_covers_data_area() {
        let mut region = memory_region();
        let a = region.allocate(BlockKind::Value, 0, &[0u8; 40]).unwrap();
        region.allocate(BlockKind::Object, 2, &[0u8; 40]).unwrap();
        region.allocate(BlockKind::Root, 2, &[0u8; 40]).unwrap();
        region.free(a).unwrap();

        let blocks = region.walk().unwrap();
        let kinds: Vec<BlockKind> = blocks.iter().map(|(_, h)| h.kind).collect();
        assert_eq!(kinds, vec![BlockKind::Free, BlockKind::Object, BlockKind::Root]);
        let covered: u64 = blocks.iter().map(|(_, h)| h.size).sum();
        assert_eq!(HEADER_SIZE + covered, region.stats().high_water);
    }
}
