//! Fixed-size block format.
//!
//! Every block is `bytes_used (4B) || next (8B) || payload (B-12 bytes)`,
//! big-endian. `next == self index` marks the terminal block of a chain.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io;

/// Size in bytes of the per-block metadata prefix (`bytes_used` + `next`).
pub const BLOCK_META_SIZE: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMeta {
    pub bytes_used: u32,
    pub next: u64,
}

impl BlockMeta {
    pub fn encode(&self) -> [u8; BLOCK_META_SIZE as usize] {
        let mut buf = [0u8; BLOCK_META_SIZE as usize];
        (&mut buf[0..4])
            .write_u32::<BigEndian>(self.bytes_used)
            .expect("fixed-size buffer write cannot fail");
        (&mut buf[4..12])
            .write_u64::<BigEndian>(self.next)
            .expect("fixed-size buffer write cannot fail");
        buf
    }

    pub fn decode(buf: &[u8; BLOCK_META_SIZE as usize]) -> io::Result<Self> {
        let mut bytes_used_r = &buf[0..4];
        let mut next_r = &buf[4..12];
        Ok(BlockMeta {
            bytes_used: bytes_used_r.read_u32::<BigEndian>()?,
            next: next_r.read_u64::<BigEndian>()?,
        })
    }
}

/// Absolute byte offset (within the *encrypted region*, i.e. relative to
/// the first byte after the header) of block `index`, given the
/// superblock's on-disk size and the configured block size.
pub fn block_offset(superblock_size: u64, block_size: u32, index: u64) -> u64 {
    superblock_size + index * block_size as u64
}
