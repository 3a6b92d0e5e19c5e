//! Superblock — block count, volume bitmap, and free-block counter.
//!
//! Lives immediately after the header, inside the encrypted region.
//!
//! ```text
//! Offset (relative)  Size       Field
//!   0                 8         block_count N
//!   8                 ceil(N/8) volume bitmap, bit b set <=> block b in use
//!   8+ceil(N/8)        8         free-block counter (cached)
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub const BLOCK_COUNT_FIELD_SIZE: usize = 8;
pub const FREE_COUNTER_FIELD_SIZE: usize = 8;

pub fn bitmap_bytes(block_count: u64) -> usize {
    ((block_count + 7) / 8) as usize
}

pub fn superblock_size(block_count: u64) -> usize {
    BLOCK_COUNT_FIELD_SIZE + bitmap_bytes(block_count) + FREE_COUNTER_FIELD_SIZE
}

#[derive(Debug, Clone)]
pub struct Superblock {
    pub block_count: u64,
    pub bitmap: Vec<u8>,
    pub free_blocks: u64,
}

impl Superblock {
    /// Create a fresh superblock for `block_count` blocks with block 0
    /// (the root folder's first block) pre-allocated.
    pub fn new(block_count: u64) -> Self {
        let mut sb = Superblock {
            block_count,
            bitmap: vec![0u8; bitmap_bytes(block_count)],
            free_blocks: block_count,
        };
        sb.set_allocated(0, true);
        sb
    }

    pub fn is_allocated(&self, block: u64) -> bool {
        let byte = (block / 8) as usize;
        let bit = (block % 8) as u8;
        (self.bitmap[byte] >> bit) & 1 == 1
    }

    /// Set or clear the in-use bit for `block`, keeping `free_blocks` in
    /// sync. Does not itself validate idempotence — callers own that
    /// invariant (see `allocator.rs`).
    pub fn set_allocated(&mut self, block: u64, allocated: bool) {
        let byte = (block / 8) as usize;
        let bit = (block % 8) as u8;
        let was = (self.bitmap[byte] >> bit) & 1 == 1;
        if allocated {
            self.bitmap[byte] |= 1 << bit;
            if !was {
                self.free_blocks -= 1;
            }
        } else {
            self.bitmap[byte] &= !(1 << bit);
            if was {
                self.free_blocks += 1;
            }
        }
    }

    /// Recount allocated blocks by iterating the bitmap directly, rather
    /// than trusting the cached `free_blocks` counter — lets callers (e.g.
    /// `fsck`) corroborate the counter instead of assuming it.
    pub fn count_allocated(&self) -> u64 {
        let set_bits: u64 = self.bitmap.iter().map(|b| b.count_ones() as u64).sum();
        set_bits
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_u64::<BigEndian>(self.block_count)?;
        w.write_all(&self.bitmap)?;
        w.write_u64::<BigEndian>(self.free_blocks)?;
        Ok(())
    }

    pub fn read<R: Read>(mut r: R) -> io::Result<Self> {
        let block_count = r.read_u64::<BigEndian>()?;
        let mut bitmap = vec![0u8; bitmap_bytes(block_count)];
        r.read_exact(&mut bitmap)?;
        let free_blocks = r.read_u64::<BigEndian>()?;
        Ok(Superblock {
            block_count,
            bitmap,
            free_blocks,
        })
    }
}
