//! Shared on-disk state for one open image: the host file descriptor, the
//! keyed cipher, and the superblock. `File` and `Folder` both borrow this
//! rather than owning a file descriptor each — mirroring the single
//! reader/writer-owns-the-descriptor shape the teacher used for its
//! archive readers and writers, generalized to read+write over one shared
//! mutable image instead of a write-once/read-once split.

use std::fs::File as HostFile;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::allocator::Allocator;
use crate::block::{block_offset, BlockMeta, BLOCK_META_SIZE};
use crate::cipher::CipherStream;
use crate::error::Result;
use crate::header::HEADER_SIZE;
use crate::superblock::{superblock_size, Superblock};

pub struct Volume {
    pub host: HostFile,
    pub cipher: CipherStream,
    pub superblock: Superblock,
    pub block_size: u32,
    superblock_size: u64,
}

impl Volume {
    pub fn new(host: HostFile, cipher: CipherStream, superblock: Superblock, block_size: u32) -> Self {
        let superblock_size = superblock_size(superblock.block_count) as u64;
        Volume {
            host,
            cipher,
            superblock,
            block_size,
            superblock_size,
        }
    }

    pub fn payload_size(&self) -> u32 {
        self.block_size - BLOCK_META_SIZE
    }

    fn region_offset(&self) -> u64 {
        HEADER_SIZE as u64
    }

    fn read_raw(&mut self, abs_offset: u64, buf: &mut [u8]) -> Result<()> {
        self.host.seek(SeekFrom::Start(abs_offset))?;
        self.host.read_exact(buf)?;
        self.cipher.apply_at(abs_offset, buf);
        Ok(())
    }

    fn write_raw(&mut self, abs_offset: u64, buf: &[u8]) -> Result<()> {
        let mut tmp = buf.to_vec();
        self.cipher.apply_at(abs_offset, &mut tmp);
        self.host.seek(SeekFrom::Start(abs_offset))?;
        self.host.write_all(&tmp)?;
        Ok(())
    }

    pub fn flush_superblock(&mut self) -> Result<()> {
        let mut body = Vec::with_capacity(self.superblock_size as usize);
        self.superblock.write(&mut body)?;
        let offset = self.region_offset();
        self.write_raw(offset, &body)
    }

    fn block_byte_offset(&self, index: u64) -> u64 {
        self.region_offset() + block_offset(self.superblock_size, self.block_size, index)
    }

    pub fn read_block_meta(&mut self, index: u64) -> Result<BlockMeta> {
        let offset = self.block_byte_offset(index);
        let mut buf = [0u8; BLOCK_META_SIZE as usize];
        self.read_raw(offset, &mut buf)?;
        Ok(BlockMeta::decode(&buf)?)
    }

    pub fn write_block_meta(&mut self, index: u64, meta: BlockMeta) -> Result<()> {
        let offset = self.block_byte_offset(index);
        self.write_raw(offset, &meta.encode())
    }

    /// Read `buf.len()` payload bytes of block `index`, starting
    /// `offset_in_payload` bytes into it.
    pub fn read_payload(&mut self, index: u64, offset_in_payload: u32, buf: &mut [u8]) -> Result<()> {
        let offset = self.block_byte_offset(index) + BLOCK_META_SIZE as u64 + offset_in_payload as u64;
        self.read_raw(offset, buf)
    }

    pub fn write_payload(&mut self, index: u64, offset_in_payload: u32, buf: &[u8]) -> Result<()> {
        let offset = self.block_byte_offset(index) + BLOCK_META_SIZE as u64 + offset_in_payload as u64;
        self.write_raw(offset, buf)
    }

    /// Zero an entire freshly-allocated block's payload on disk. Keeps the
    /// allocator's "free blocks read as all-zero" assumption intact without
    /// requiring the host file to have been pre-zeroed at create time.
    pub fn zero_block(&mut self, index: u64) -> Result<()> {
        let zeros = vec![0u8; self.payload_size() as usize];
        self.write_payload(index, 0, &zeros)
    }

    pub fn allocator(&mut self) -> Allocator<'_> {
        Allocator::new(&mut self.superblock)
    }

    pub fn flush_host(&mut self) -> Result<()> {
        self.host.flush()?;
        Ok(())
    }
}
