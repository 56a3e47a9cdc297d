use std::collections::{BTreeMap, BTreeSet};

use crate::block::MIN_BLOCK_SIZE;

/// Free extents of the data area, with best-fit lookup and coalescing.
///
/// Extents are kept twice: by offset (to find neighbours when coalescing)
/// and by `(size, offset)` (to find the smallest extent that fits).
#[derive(Debug, Default)]
pub struct FreeList {
    by_offset: BTreeMap<u64, u64>,
    by_size: BTreeSet<(u64, u64)>,
    total: u64,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of free extents.
    pub fn len(&self) -> usize {
        self.by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
    }

    /// Total free bytes.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Size of the largest free extent.
    pub fn largest(&self) -> u64 {
        self.by_size.iter().next_back().map(|&(size, _)| size).unwrap_or(0)
    }

    /// Return an extent to the list, merging it with adjacent free extents.
    ///
    /// Returns the merged extent `(offset, size)`.
    pub fn release(&mut self, offset: u64, size: u64) -> (u64, u64) {
        let mut start = offset;
        let mut len = size;

        if let Some((&prev_off, &prev_len)) = self.by_offset.range(..offset).next_back() {
            if prev_off + prev_len == offset {
                self.remove(prev_off, prev_len);
                start = prev_off;
                len += prev_len;
            }
        }
        if let Some(&next_len) = self.by_offset.get(&(offset + size)) {
            self.remove(offset + size, next_len);
            len += next_len;
        }

        self.insert(start, len);
        (start, len)
    }

    /// Take the smallest extent of at least `size` bytes.
    ///
    /// Returns `(offset, granted, remainder)`: the granted extent starts at
    /// `offset`; if the extent was large enough to split, `remainder` is the
    /// `(offset, size)` of the leftover extent, which stays on the list.
    pub fn take(&mut self, size: u64) -> Option<(u64, u64, Option<(u64, u64)>)> {
        let &(found_len, found_off) = self.by_size.range((size, 0)..).next()?;
        self.remove(found_off, found_len);

        let leftover = found_len - size;
        if leftover >= MIN_BLOCK_SIZE {
            self.insert(found_off + size, leftover);
            Some((found_off, size, Some((found_off + size, leftover))))
        } else {
            Some((found_off, found_len, None))
        }
    }

    /// If a free extent ends exactly at `high_water`, remove it and return
    /// the lowered high-water mark.
    pub fn trim_tail(&mut self, high_water: u64) -> Option<u64> {
        let (&off, &len) = self.by_offset.iter().next_back()?;
        if off + len != high_water {
            return None;
        }
        self.remove(off, len);
        Some(off)
    }

    /// Iterate extents in offset order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.by_offset.iter().map(|(&off, &len)| (off, len))
    }

    fn insert(&mut self, offset: u64, size: u64) {
        self.by_offset.insert(offset, size);
        self.by_size.insert((size, offset));
        self.total += size;
    }

    fn remove(&mut self, offset: u64, size: u64) {
        self.by_offset.remove(&offset);
        self.by_size.remove(&(size, offset));
        self.total -= size;
    }
}
