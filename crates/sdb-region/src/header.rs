//! Fixed-size region header.
//!
//! On-disk layout (little-endian), `HEADER_SIZE` bytes at offset 0:
//! ```text
//! [0..4)    magic "SDBR"
//! [4..8)    format version (u32)
//! [8..12)   flags (u32, bit 0 = dirty)
//! [12..16)  type slot count (u32)
//! [16..24)  region size at last header write (u64)
//! [24..32)  high-water mark: end of the last block (u64)
//! [32..40)  revision (u64)
//! [40..44)  CRC32 of the header with this field zeroed (u32)
//! [44..64)  reserved
//! [64..)    type table: MAX_TYPES slots of TYPE_SLOT_SIZE bytes
//! ```
//! Type slot layout:
//! ```text
//! [0..2)   type id (u16)
//! [2..3)   name length (u8)
//! [3..8)   reserved
//! [8..16)  next id (u64)
//! [16..24) root block offset (u64, 0 = no root yet)
//! [24..64) type name (ASCII, zero padded)
//! ```

use sdb_types::{validate_type_name, MAX_TYPE_NAME_LEN};

use crate::error::{RegionError, RegionResult};

/// Region file magic.
pub const MAGIC: [u8; 4] = *b"SDBR";

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the header; the first block starts here.
pub const HEADER_SIZE: u64 = 4096;

/// Number of type table slots.
pub const MAX_TYPES: usize = 48;

/// Size of one type table slot.
pub const TYPE_SLOT_SIZE: usize = 64;

const TYPE_TABLE_OFFSET: usize = 64;
const CRC_OFFSET: usize = 40;
const FLAG_DIRTY: u32 = 1;

/// One entry of the type table: where a type's index lives and how far
/// its identity counter has advanced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeSlot {
    pub type_id: u16,
    pub name: String,
    pub next_id: u64,
    /// Offset of the index root block, if the index was ever persisted.
    pub root_offset: Option<u64>,
}

/// Decoded region header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionHeader {
    pub format_version: u32,
    pub dirty: bool,
    pub size: u64,
    pub high_water: u64,
    pub revision: u64,
    pub types: Vec<TypeSlot>,
}

impl RegionHeader {
    /// Header of a freshly created, empty region.
    pub fn new(size: u64) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            dirty: false,
            size,
            high_water: HEADER_SIZE,
            revision: 0,
            types: Vec::new(),
        }
    }

    /// Look up a type slot by id.
    pub fn type_slot(&self, type_id: u16) -> Option<&TypeSlot> {
        self.types.iter().find(|slot| slot.type_id == type_id)
    }

    pub(crate) fn type_slot_mut(&mut self, type_id: u16) -> Option<&mut TypeSlot> {
        self.types.iter_mut().find(|slot| slot.type_id == type_id)
    }

    /// Encode into exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        let flags = if self.dirty { FLAG_DIRTY } else { 0 };
        buf[8..12].copy_from_slice(&flags.to_le_bytes());
        buf[12..16].copy_from_slice(&(self.types.len() as u32).to_le_bytes());
        buf[16..24].copy_from_slice(&self.size.to_le_bytes());
        buf[24..32].copy_from_slice(&self.high_water.to_le_bytes());
        buf[32..40].copy_from_slice(&self.revision.to_le_bytes());

        for (i, slot) in self.types.iter().enumerate() {
            let base = TYPE_TABLE_OFFSET + i * TYPE_SLOT_SIZE;
            let raw = &mut buf[base..base + TYPE_SLOT_SIZE];
            raw[0..2].copy_from_slice(&slot.type_id.to_le_bytes());
            raw[2] = slot.name.len() as u8;
            raw[8..16].copy_from_slice(&slot.next_id.to_le_bytes());
            raw[16..24].copy_from_slice(&slot.root_offset.unwrap_or(0).to_le_bytes());
            raw[24..24 + slot.name.len()].copy_from_slice(slot.name.as_bytes());
        }

        let crc = crc32fast::hash(&buf);
        buf[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode and validate a header.
    ///
    /// Checks, in order: length, magic, format version, checksum, and the
    /// type table contents.
    pub fn from_bytes(bytes: &[u8]) -> RegionResult<Self> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(RegionError::InvalidBlock {
                offset: 0,
                reason: format!("header truncated to {} bytes", bytes.len()),
            });
        }
        let bytes = &bytes[..HEADER_SIZE as usize];

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        if magic != MAGIC {
            return Err(RegionError::InvalidMagic {
                expected: MAGIC,
                actual: magic,
            });
        }

        let format_version = read_u32(bytes, 4);
        if format_version != FORMAT_VERSION {
            return Err(RegionError::IncompatibleFormat {
                found: format_version,
                expected: FORMAT_VERSION,
            });
        }

        let stored_crc = read_u32(bytes, CRC_OFFSET);
        let mut zeroed = bytes.to_vec();
        zeroed[CRC_OFFSET..CRC_OFFSET + 4].fill(0);
        let computed_crc = crc32fast::hash(&zeroed);
        if stored_crc != computed_crc {
            return Err(RegionError::HeaderChecksum {
                stored: stored_crc,
                computed: computed_crc,
            });
        }

        let flags = read_u32(bytes, 8);
        let type_count = read_u32(bytes, 12) as usize;
        if type_count > MAX_TYPES {
            return Err(RegionError::InvalidBlock {
                offset: 12,
                reason: format!("type count {type_count} exceeds {MAX_TYPES}"),
            });
        }

        let mut types = Vec::with_capacity(type_count);
        for i in 0..type_count {
            let base = TYPE_TABLE_OFFSET + i * TYPE_SLOT_SIZE;
            let raw = &bytes[base..base + TYPE_SLOT_SIZE];
            let name_len = raw[2] as usize;
            if name_len > MAX_TYPE_NAME_LEN {
                return Err(RegionError::InvalidBlock {
                    offset: base as u64,
                    reason: format!("type name length {name_len}"),
                });
            }
            let name = std::str::from_utf8(&raw[24..24 + name_len])
                .map_err(|e| RegionError::InvalidBlock {
                    offset: base as u64,
                    reason: format!("type name is not UTF-8: {e}"),
                })?
                .to_string();
            let root = read_u64(raw, 16);
            types.push(TypeSlot {
                type_id: u16::from_le_bytes([raw[0], raw[1]]),
                name,
                next_id: read_u64(raw, 8),
                root_offset: (root != 0).then_some(root),
            });
        }

        Ok(Self {
            format_version,
            dirty: flags & FLAG_DIRTY != 0,
            size: read_u64(bytes, 16),
            high_water: read_u64(bytes, 24),
            revision: read_u64(bytes, 32),
            types,
        })
    }

    /// Add a type slot, or return the existing one if the name matches.
    pub(crate) fn register_type(&mut self, type_id: u16, name: &str) -> RegionResult<&TypeSlot> {
        validate_type_name(name)?;

        if let Some(index) = self.types.iter().position(|s| s.type_id == type_id) {
            let slot = &self.types[index];
            if slot.name != name {
                return Err(RegionError::TypeMismatch {
                    type_id,
                    recorded: slot.name.clone(),
                    requested: name.to_string(),
                });
            }
            return Ok(&self.types[index]);
        }

        if self.types.len() >= MAX_TYPES {
            return Err(RegionError::TypeTableFull(MAX_TYPES));
        }
        self.types.push(TypeSlot {
            type_id,
            name: name.to_string(),
            next_id: 0,
            root_offset: None,
        });
        Ok(&self.types[self.types.len() - 1])
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RegionHeader {
        let mut header = RegionHeader::new(1 << 20);
        header.high_water = 8192;
        header.revision = 17;
        header.register_type(1, "account").unwrap();
        header.register_type(2, "witness").unwrap();
        let slot = header.type_slot_mut(1).unwrap();
        slot.next_id = 99;
        slot.root_offset = Some(4096);
        header
    }

    #[test]
    fn encode_decode_preserves_fields() {
        let header = sample();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE as usize);
        assert_eq!(RegionHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn table_fits_in_header() {
        assert!(TYPE_TABLE_OFFSET + MAX_TYPES * TYPE_SLOT_SIZE <= HEADER_SIZE as usize);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            RegionHeader::from_bytes(&bytes),
            Err(RegionError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn version_mismatch_is_incompatible_format() {
        let mut bytes = sample().to_bytes();
        bytes[4..8].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        assert!(matches!(
            RegionHeader::from_bytes(&bytes),
            Err(RegionError::IncompatibleFormat { found, expected })
                if found == FORMAT_VERSION + 1 && expected == FORMAT_VERSION
        ));
    }

    #[test]
    fn corruption_detected_by_checksum() {
        let mut bytes = sample().to_bytes();
        bytes[33] ^= 0xff;
        assert!(matches!(
            RegionHeader::from_bytes(&bytes),
            Err(RegionError::HeaderChecksum { .. })
        ));
    }

    #[test]
    fn dirty_flag_roundtrips() {
        let mut header = sample();
        header.dirty = true;
        let decoded = RegionHeader::from_bytes(&header.to_bytes()).unwrap();
        assert!(decoded.dirty);
    }

    #[test]
    fn reregistering_same_name_is_idempotent() {
        let mut header = sample();
        let slot = header.register_type(1, "account").unwrap();
        assert_eq!(slot.next_id, 99);
        assert_eq!(header.types.len(), 2);
    }

    #[test]
    fn reregistering_other_name_is_mismatch() {
        let mut header = sample();
        assert!(matches!(
            header.register_type(1, "balance"),
            Err(RegionError::TypeMismatch { type_id: 1, .. })
        ));
    }

    #[test]
    fn table_full() {
        let mut header = RegionHeader::new(1 << 20);
        for i in 0..MAX_TYPES {
            header.register_type(i as u16, &format!("t{i}")).unwrap();
        }
        assert!(matches!(
            header.register_type(500, "overflow"),
            Err(RegionError::TypeTableFull(MAX_TYPES))
        ));
    }
}
