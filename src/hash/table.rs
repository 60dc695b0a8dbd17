// Hash tables for delta matching.
//
// Two tables:
//   - **Block table** (`BlockTable`): source blocks at multiples of the
//     block size, keyed by rolling checksum.  Open addressing with linear
//     probing; the first block with given content wins.
//   - **Quadgram index** (`QuadgramIndex`): every position of a buffer
//     keyed by the 4 bytes starting there.  Buckets keep insertion order.

use std::collections::HashMap;

use foldhash::fast::RandomState;

use super::rolling;

// ---------------------------------------------------------------------------
// Block table (source matching)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Slot {
    checksum: u32,
    pos: usize,
}

const EMPTY: Slot = Slot {
    checksum: 0,
    pos: usize::MAX,
};

/// Checksums of the source's aligned blocks.
pub struct BlockTable<'a> {
    data: &'a [u8],
    block_size: usize,
    mask: usize,
    slots: Vec<Slot>,
}

#[inline(always)]
fn hash_checksum(checksum: u32) -> usize {
    (checksum ^ (checksum >> 12)) as usize
}

impl<'a> BlockTable<'a> {
    /// Index every full `block_size` block of `data`.
    pub fn new(data: &'a [u8], block_size: usize) -> Self {
        debug_assert!(block_size > 0);
        let nblocks = data.len() / block_size;
        // At most half full.
        let size = (nblocks * 2).next_power_of_two().max(2);
        let mut table = Self {
            data,
            block_size,
            mask: size - 1,
            slots: vec![EMPTY; size],
        };
        let mut pos = 0;
        while pos + block_size <= data.len() {
            table.add_block(pos);
            pos += block_size;
        }
        table
    }

    fn add_block(&mut self, pos: usize) {
        let block = &self.data[pos..pos + self.block_size];
        let checksum = rolling::checksum(block);
        let mut h = hash_checksum(checksum) & self.mask;
        loop {
            let slot = self.slots[h];
            if slot.pos == usize::MAX {
                self.slots[h] = Slot { checksum, pos };
                return;
            }
            if slot.checksum == checksum
                && self.data[slot.pos..slot.pos + self.block_size] == *block
            {
                return;
            }
            h = (h + 1) & self.mask;
        }
    }

    /// Find a source block equal to `window` (exactly `block_size` bytes)
    /// whose checksum is `checksum`.  Checksums collide, so candidates are
    /// verified byte by byte.
    pub fn find(&self, checksum: u32, window: &[u8]) -> Option<usize> {
        debug_assert_eq!(window.len(), self.block_size);
        let mut h = hash_checksum(checksum) & self.mask;
        loop {
            let slot = self.slots[h];
            if slot.pos == usize::MAX {
                return None;
            }
            if slot.checksum == checksum
                && self.data[slot.pos..slot.pos + self.block_size] == *window
            {
                return Some(slot.pos);
            }
            h = (h + 1) & self.mask;
        }
    }

    /// Number of buckets.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

// ---------------------------------------------------------------------------
// Quadgram index (source ++ target matching)
// ---------------------------------------------------------------------------

/// Read the 4-byte key at `data[pos..pos + 4]`.
#[inline(always)]
pub fn quadgram(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

/// Multimap from 4-byte keys to the positions where they occur.
pub struct QuadgramIndex {
    buckets: HashMap<u32, Vec<usize>, RandomState>,
}

impl QuadgramIndex {
    pub fn with_capacity(positions: usize) -> Self {
        Self {
            buckets: HashMap::with_capacity_and_hasher(positions, RandomState::default()),
        }
    }

    /// Record that the key starting at `data[pos]` occurs at `pos`.
    /// Positions without four following bytes are ignored.
    #[inline]
    pub fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + 4 <= data.len() {
            self.buckets
                .entry(quadgram(data, pos))
                .or_default()
                .push(pos);
        }
    }

    /// Positions recorded for `key`, in insertion order.
    #[inline]
    pub fn candidates(&self, key: u32) -> &[usize] {
        self.buckets.get(&key).map_or(&[], Vec::as_slice)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_table_finds_aligned_blocks() {
        let data: Vec<u8> = (0..=255u8).cycle().take(64 * 4).collect();
        let table = BlockTable::new(&data, 16);
        for blk in 0..16 {
            let pos = blk * 16;
            let window = &data[pos..pos + 16];
            let found = table.find(rolling::checksum(window), window).unwrap();
            assert_eq!(&data[found..found + 16], window);
        }
        let miss = [7u8; 16];
        assert_eq!(table.find(rolling::checksum(&miss), &miss), None);
    }

    #[test]
    fn block_table_keeps_first_duplicate() {
        let data = vec![b'x'; 64];
        let table = BlockTable::new(&data, 16);
        let window = &data[..16];
        assert_eq!(table.find(rolling::checksum(window), window), Some(0));
    }

    #[test]
    fn block_table_rejects_checksum_collision() {
        // "ac", "bb" and "ca" share s1.
        let data = b"acbb".to_vec();
        let table = BlockTable::new(&data, 2);
        assert_eq!(table.find(rolling::checksum(b"ac"), b"ac"), Some(0));
        assert_eq!(table.find(rolling::checksum(b"bb"), b"bb"), Some(2));
        assert_eq!(table.find(rolling::checksum(b"ca"), b"ca"), None);
    }

    #[test]
    fn block_table_small_input() {
        let table = BlockTable::new(b"abc", 64);
        assert_eq!(table.size(), 2);
        assert_eq!(table.block_size(), 64);
    }

    #[test]
    fn quadgram_index_preserves_order() {
        let data = b"abcdXabcdYabcd";
        let mut idx = QuadgramIndex::with_capacity(data.len());
        for pos in 0..data.len() {
            idx.insert(data, pos);
        }
        assert_eq!(idx.candidates(quadgram(data, 0)), &[0, 5, 10]);
        assert!(idx.candidates(u32::from_le_bytes(*b"zzzz")).is_empty());
        assert!(!idx.is_empty());
    }
}
