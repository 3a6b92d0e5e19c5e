//! `File` — the chain-of-blocks engine: a random-access byte stream backed
//! by an ordered chain of fixed-size blocks.
//!
//! Mirrors the reader/writer-owns-the-descriptor shape of the teacher's
//! `SixCyReader`/`SixCyWriter` (`io_stream/mod.rs`), generalized from a
//! write-once/read-once archive stream to one handle that can read, write,
//! seek, truncate and unlink a mutable chain — the `FileEntry` role in
//! `original_source/teasafe/FileEntry.hpp`, reworked onto `std::io::{Read,
//! Write, Seek}` rather than a C++ stream-device adapter (see DESIGN.md's
//! "Stream I/O adapters" note).

use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use crate::block::BlockMeta;
use crate::error::{Error, Result};
use crate::volume::Volume;

/// Combines the three axes the spec's `OpenDisposition` requires: what
/// directions are allowed, whether writes always extend the logical end
/// (append) or may land inside existing data (overwrite), and whether the
/// chain should be cleared to a single empty block on open.
///
/// Resolution of spec.md's own open question ("seeks ignored for
/// writes?"): in append mode, writes always target the logical end
/// regardless of the read cursor, matching POSIX `O_APPEND` — the read
/// cursor and the append write position are independent. See DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenDisposition {
    pub readable: bool,
    pub writable: bool,
    pub append: bool,
    pub truncate: bool,
    /// Informational only — `File::create`/`File::open` already commit to
    /// create-vs-open-existing; callers above (`Folder`, `Image`) consult
    /// this flag to decide *which* of the two to call.
    pub create: bool,
}

impl OpenDisposition {
    pub const fn read_only() -> Self {
        OpenDisposition { readable: true, writable: false, append: false, truncate: false, create: false }
    }

    /// Write-only, append, create-if-missing — the common "new file" mode.
    pub const fn write_append() -> Self {
        OpenDisposition { readable: false, writable: true, append: true, truncate: false, create: true }
    }

    pub const fn read_write_append() -> Self {
        OpenDisposition { readable: true, writable: true, append: true, truncate: false, create: true }
    }

    /// Read+write, random-access. Used internally for folder payloads,
    /// which need interior writes (tombstoning, renaming) as well as
    /// appends (new slots) — the latter falls back to the append path
    /// automatically (see `write_overwrite`).
    pub const fn overwrite() -> Self {
        OpenDisposition { readable: true, writable: true, append: false, truncate: false, create: false }
    }

    pub const fn truncate_write() -> Self {
        OpenDisposition { readable: true, writable: true, append: true, truncate: true, create: true }
    }
}

/// Result of a write that may have been cut short by `OutOfSpace`: the
/// allocator's failure is reported together with how many bytes actually
/// made it to disk, per spec.md §7's "short write" propagation rule.
/// `std::io::Write::write` cannot carry both at once, so this is exposed
/// as a separate method (`File::write_tracked`) alongside the trait impl.
#[derive(Debug)]
pub struct WriteOutcome {
    pub written: usize,
    pub err: Option<Error>,
}

/// One open handle onto a chain of blocks, addressed by its first-block
/// index. Two handles on the same first-block must not both be open for
/// writing at once (§4.6.8) — enforced by caller discipline (the image's
/// coarse lock), not by this type.
pub struct File {
    volume: Arc<Mutex<Volume>>,
    chain: Vec<u64>,
    file_size: u64,
    cursor: u64,
    disposition: OpenDisposition,
}

impl File {
    /// Allocate a fresh first block and start a new, empty chain.
    pub fn create(volume: Arc<Mutex<Volume>>, disposition: OpenDisposition) -> Result<Self> {
        let first_block = {
            let mut vol = volume.lock().unwrap();
            let block = vol.allocator().allocate_one()?;
            vol.write_block_meta(block, BlockMeta { bytes_used: 0, next: block })?;
            block
        };
        Ok(File { volume, chain: vec![first_block], file_size: 0, cursor: 0, disposition })
    }

    /// Load an existing chain starting at `first_block` (§4.6.2).
    pub fn open(volume: Arc<Mutex<Volume>>, first_block: u64, disposition: OpenDisposition) -> Result<Self> {
        let (chain, file_size) = Self::load_chain(&volume, first_block)?;
        let mut file = File { volume, chain, file_size, cursor: 0, disposition };
        if disposition.truncate {
            file.truncate(0)?;
        }
        Ok(file)
    }

    fn load_chain(volume: &Arc<Mutex<Volume>>, first_block: u64) -> Result<(Vec<u64>, u64)> {
        let mut vol = volume.lock().unwrap();
        let block_count = vol.superblock.block_count;
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut size = 0u64;
        let mut cur = first_block;
        loop {
            if cur >= block_count || !seen.insert(cur) {
                return Err(Error::CorruptChain);
            }
            if chain.len() as u64 >= block_count {
                return Err(Error::CorruptChain);
            }
            let meta = vol.read_block_meta(cur)?;
            size += meta.bytes_used as u64;
            chain.push(cur);
            if meta.next == cur {
                break;
            }
            cur = meta.next;
        }
        Ok((chain, size))
    }

    pub fn first_block(&self) -> u64 {
        self.chain[0]
    }

    pub fn size(&self) -> u64 {
        self.file_size
    }

    pub fn block_count(&self) -> usize {
        self.chain.len()
    }

    pub fn chain(&self) -> &[u64] {
        &self.chain
    }

    /// Clone of the shared volume handle — used by `Folder` to open a
    /// child's chain transiently (e.g. to compute its size for `stat`).
    pub fn volume(&self) -> Arc<Mutex<Volume>> {
        self.volume.clone()
    }

    fn payload_size(&self) -> u64 {
        self.volume.lock().unwrap().payload_size() as u64
    }

    /// Free every block in the chain (§4.6.7). Consumes the handle — the
    /// caller must have already invalidated any directory entry pointing
    /// at this chain (see DESIGN.md's resolution of the
    /// tombstone-vs-unlink ordering question).
    pub fn unlink(self) -> Result<()> {
        let mut vol = self.volume.lock().unwrap();
        for block in &self.chain {
            vol.allocator().free(*block);
        }
        Ok(())
    }

    fn read_logical(&mut self, buf: &mut [u8]) -> Result<usize> {
        let payload = self.payload_size();
        let mut done = 0usize;
        while done < buf.len() && self.cursor < self.file_size {
            let block_idx = (self.cursor / payload) as usize;
            let offset_in_payload = (self.cursor % payload) as u32;
            if block_idx >= self.chain.len() {
                break;
            }
            let block = self.chain[block_idx];
            let mut vol = self.volume.lock().unwrap();
            let meta = vol.read_block_meta(block)?;
            let available = meta.bytes_used.saturating_sub(offset_in_payload);
            if available == 0 {
                break;
            }
            let want = (buf.len() - done).min(available as usize);
            vol.read_payload(block, offset_in_payload, &mut buf[done..done + want])?;
            drop(vol);
            done += want;
            self.cursor += want as u64;
        }
        Ok(done)
    }

    /// Fill the current terminal block, allocating new tail blocks as
    /// needed (§4.6.5 Append). Returns bytes written and, if the
    /// allocator ran out of space partway through, the error — with
    /// everything written so far left intact.
    fn write_append(&mut self, buf: &[u8]) -> (usize, Option<Error>) {
        let payload = self.payload_size();
        let mut done = 0usize;
        while done < buf.len() {
            let terminal = *self.chain.last().expect("chain is never empty");
            let meta = {
                let mut vol = self.volume.lock().unwrap();
                match vol.read_block_meta(terminal) {
                    Ok(m) => m,
                    Err(e) => return (done, Some(e)),
                }
            };
            let space = payload as u32 - meta.bytes_used;
            if space == 0 {
                let mut vol = self.volume.lock().unwrap();
                let new_block = match vol.allocator().allocate_one() {
                    Ok(b) => b,
                    Err(e) => return (done, Some(e)),
                };
                if let Err(e) = vol.write_block_meta(new_block, BlockMeta { bytes_used: 0, next: new_block }) {
                    return (done, Some(e));
                }
                if let Err(e) = vol.write_block_meta(terminal, BlockMeta { bytes_used: meta.bytes_used, next: new_block }) {
                    return (done, Some(e));
                }
                drop(vol);
                self.chain.push(new_block);
                continue;
            }
            let n = (space as usize).min(buf.len() - done);
            let mut vol = self.volume.lock().unwrap();
            if let Err(e) = vol.write_payload(terminal, meta.bytes_used, &buf[done..done + n]) {
                return (done, Some(e));
            }
            let new_used = meta.bytes_used + n as u32;
            if let Err(e) = vol.write_block_meta(terminal, BlockMeta { bytes_used: new_used, next: terminal }) {
                return (done, Some(e));
            }
            drop(vol);
            done += n;
            self.cursor += n as u64;
            self.file_size += n as u64;
        }
        (done, None)
    }

    /// Write starting at the current cursor, which may land anywhere
    /// inside the existing chain (§4.6.5 Overwrite). Falls back to the
    /// append path once the cursor runs past the existing chain.
    fn write_overwrite(&mut self, buf: &[u8]) -> (usize, Option<Error>) {
        let payload = self.payload_size();
        let mut done = 0usize;
        while done < buf.len() {
            let block_idx = (self.cursor / payload) as usize;
            if block_idx >= self.chain.len() {
                let (n, err) = self.write_append(&buf[done..]);
                return (done + n, err);
            }
            let offset_in_payload = (self.cursor % payload) as u32;
            let block = self.chain[block_idx];
            let is_terminal = block_idx == self.chain.len() - 1;
            let space = payload as u32 - offset_in_payload;
            let n = (space as usize).min(buf.len() - done);

            let mut vol = self.volume.lock().unwrap();
            if let Err(e) = vol.write_payload(block, offset_in_payload, &buf[done..done + n]) {
                return (done, Some(e));
            }
            if is_terminal {
                let meta = match vol.read_block_meta(block) {
                    Ok(m) => m,
                    Err(e) => return (done, Some(e)),
                };
                let new_used = meta.bytes_used.max(offset_in_payload + n as u32);
                if let Err(e) = vol.write_block_meta(block, BlockMeta { bytes_used: new_used, next: block }) {
                    return (done, Some(e));
                }
                let new_file_size = block_idx as u64 * payload + new_used as u64;
                if new_file_size > self.file_size {
                    self.file_size = new_file_size;
                }
            }
            drop(vol);
            done += n;
            self.cursor += n as u64;
        }
        (done, None)
    }

    fn write_logical(&mut self, buf: &[u8]) -> (usize, Option<Error>) {
        if self.disposition.append {
            self.write_append(buf)
        } else {
            self.write_overwrite(buf)
        }
    }

    /// Write with explicit short-write reporting (§7): the allocator's
    /// `OutOfSpace` is surfaced alongside the count of bytes actually
    /// written, rather than forcing an all-or-nothing trait call.
    pub fn write_tracked(&mut self, buf: &[u8]) -> WriteOutcome {
        if !self.disposition.writable {
            return WriteOutcome { written: 0, err: Some(Error::NotWritable) };
        }
        let (written, err) = self.write_logical(buf);
        WriteOutcome { written, err }
    }

    /// Shrink the chain to `s` bytes (§4.6.6). `s` must not exceed the
    /// current size — growth happens only by writing.
    pub fn truncate(&mut self, s: u64) -> Result<()> {
        if s > self.file_size {
            return Err(Error::OutOfRange);
        }
        let payload = self.payload_size();
        let mut target_idx = (s / payload) as usize;
        let mut new_used = (s % payload) as u32;
        if s > 0 && new_used == 0 {
            // `s` lands exactly on a block boundary: the terminal is the
            // previous (full) block, not an empty one past it.
            target_idx -= 1;
            new_used = payload as u32;
        }

        let mut vol = self.volume.lock().unwrap();
        for &block in &self.chain[target_idx + 1..] {
            vol.allocator().free(block);
        }
        self.chain.truncate(target_idx + 1);
        let terminal = self.chain[target_idx];
        vol.write_block_meta(terminal, BlockMeta { bytes_used: new_used, next: terminal })?;
        drop(vol);

        self.file_size = s;
        if self.cursor > s {
            self.cursor = s;
        }
        Ok(())
    }
}

impl Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.disposition.readable {
            return Err(Error::NotReadable.into());
        }
        Ok(self.read_logical(buf)?)
    }
}

impl Write for File {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.disposition.writable {
            return Err(Error::NotWritable.into());
        }
        let (written, err) = self.write_logical(buf);
        if written == 0 {
            if let Some(e) = err {
                return Err(e.into());
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.volume.lock().unwrap().flush_host()?;
        Ok(())
    }
}

impl Seek for File {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target: i128 = match pos {
            SeekFrom::Start(p) => p as i128,
            SeekFrom::Current(delta) => self.cursor as i128 + delta as i128,
            SeekFrom::End(delta) => self.file_size as i128 + delta as i128,
        };
        if target < 0 {
            return Err(Error::OutOfRange.into());
        }
        let target = target as u64;
        if target > self.file_size && !self.disposition.writable {
            return Err(Error::OutOfRange.into());
        }
        self.cursor = target;
        Ok(self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{CipherId, CipherStream};
    use crate::superblock::Superblock;

    fn test_volume(block_count: u64) -> Arc<Mutex<Volume>> {
        let host = tempfile::tempfile().unwrap();
        let key = [7u8; 32];
        let iv = [9u8; crate::cipher::IV_LEN];
        let cipher = CipherStream::new(CipherId::Aes256Ctr, &key, &iv).unwrap();
        let superblock = Superblock::new(block_count);
        Arc::new(Mutex::new(Volume::new(host, cipher, superblock, 4096)))
    }

    #[test]
    fn create_then_read_back() {
        let vol = test_volume(64);
        let mut f = File::create(vol.clone(), OpenDisposition::read_write_append()).unwrap();
        f.write_all(b"Hello, world!").unwrap();
        assert_eq!(f.size(), 13);
        f.seek(SeekFrom::Start(0)).unwrap();
        let mut out = [0u8; 13];
        f.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"Hello, world!");
    }

    #[test]
    fn spans_multiple_blocks() {
        let vol = test_volume(64);
        let mut f = File::create(vol.clone(), OpenDisposition::read_write_append()).unwrap();
        let pattern = b"Hello, World!".repeat(5000);
        f.write_all(&pattern).unwrap();
        assert_eq!(f.size(), pattern.len() as u64);
        let first_block = f.first_block();
        drop(f);

        let mut f = File::open(vol, first_block, OpenDisposition::read_only()).unwrap();
        let mut out = Vec::new();
        f.read_to_end(&mut out).unwrap();
        assert_eq!(out, pattern);
        assert_eq!(f.block_count(), (pattern.len() as u64).div_ceil(4096 - 12) as usize);
    }

    #[test]
    fn seek_and_partial_read() {
        let vol = test_volume(64);
        let mut f = File::create(vol, OpenDisposition::read_write_append()).unwrap();
        f.write_all(&b"Hello, World!".repeat(5000)).unwrap();
        f.seek(SeekFrom::Start(10)).unwrap();
        let mut out = [0u8; 8];
        f.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"lo, Worl");
    }

    #[test]
    fn truncate_to_zero_keeps_first_block() {
        let vol = test_volume(64);
        let mut f = File::create(vol, OpenDisposition::read_write_append()).unwrap();
        f.write_all(b"some data").unwrap();
        let fb = f.first_block();
        f.truncate(0).unwrap();
        assert_eq!(f.size(), 0);
        assert_eq!(f.block_count(), 1);
        assert_eq!(f.first_block(), fb);
    }

    #[test]
    fn truncate_on_block_boundary() {
        let vol = test_volume(64);
        let mut f = File::create(vol, OpenDisposition::read_write_append()).unwrap();
        let payload = 4096 - 12;
        f.write_all(&vec![0xAAu8; payload * 2]).unwrap();
        assert_eq!(f.block_count(), 2);
        f.truncate(payload as u64).unwrap();
        assert_eq!(f.block_count(), 1);
        assert_eq!(f.size(), payload as u64);
    }

    #[test]
    fn overwrite_interior_bytes() {
        let vol = test_volume(64);
        let mut f = File::create(vol, OpenDisposition::overwrite()).unwrap();
        f.write_all(b"0123456789").unwrap();
        f.seek(SeekFrom::Start(2)).unwrap();
        f.write_all(b"XY").unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        let mut out = [0u8; 10];
        f.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"01XY456789");
    }

    #[test]
    fn out_of_space_reports_partial_write() {
        let vol = test_volume(3); // block 0 root-reserved, 2 free
        let mut f = File::create(vol, OpenDisposition::read_write_append()).unwrap();
        let payload = 4096 - 12;
        let data = vec![0x11u8; payload * 3];
        let outcome = f.write_tracked(&data);
        assert_eq!(outcome.written, payload * 2);
        assert!(matches!(outcome.err, Some(Error::OutOfSpace)));
    }
}
