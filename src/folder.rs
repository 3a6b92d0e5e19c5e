//! `Folder` — a `File` whose payload is a dense, append-mostly entry table.
//!
//! Grounded in `original_source/include/teasafe/ContentFolder.hpp` and
//! `FolderEntry.hpp`'s fixed-width slot table with tombstoning and O(1)
//! cross-folder rename, reworked onto this crate's `File` instead of a
//! bespoke block-reading loop — the folder payload is read and written
//! exactly like any other file's bytes.

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use crate::entry::EntryInfo;
use crate::error::{Error, Result};
use crate::file::{File, OpenDisposition};
use crate::volume::Volume;

/// Maximum entry name length (spec.md §3: `L = 255`).
pub const MAX_NAME_LEN: usize = 255;

const SLOT_WIDTH: usize = 1 + MAX_NAME_LEN + 8;
const FLAG_IN_USE: u8 = 0b01;
const FLAG_IS_FILE: u8 = 0b10;

struct Slot {
    in_use: bool,
    is_file: bool,
    name: [u8; MAX_NAME_LEN],
    first_block: u64,
}

impl Slot {
    fn encode(&self) -> [u8; SLOT_WIDTH] {
        let mut buf = [0u8; SLOT_WIDTH];
        let mut flags = 0u8;
        if self.in_use {
            flags |= FLAG_IN_USE;
        }
        if self.is_file {
            flags |= FLAG_IS_FILE;
        }
        buf[0] = flags;
        buf[1..1 + MAX_NAME_LEN].copy_from_slice(&self.name);
        buf[1 + MAX_NAME_LEN..SLOT_WIDTH].copy_from_slice(&self.first_block.to_be_bytes());
        buf
    }

    fn decode(buf: &[u8; SLOT_WIDTH]) -> Self {
        let flags = buf[0];
        let mut name = [0u8; MAX_NAME_LEN];
        name.copy_from_slice(&buf[1..1 + MAX_NAME_LEN]);
        let mut fb_bytes = [0u8; 8];
        fb_bytes.copy_from_slice(&buf[1 + MAX_NAME_LEN..SLOT_WIDTH]);
        Slot {
            in_use: flags & FLAG_IN_USE != 0,
            is_file: flags & FLAG_IS_FILE != 0,
            name,
            first_block: u64::from_be_bytes(fb_bytes),
        }
    }

    fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    fn name_bytes(name: &str) -> [u8; MAX_NAME_LEN] {
        let mut arr = [0u8; MAX_NAME_LEN];
        let bytes = name.as_bytes();
        arr[..bytes.len()].copy_from_slice(bytes);
        arr
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() >= MAX_NAME_LEN || name.contains('/') {
        return Err(Error::IllegalFilename);
    }
    Ok(())
}

/// A folder: its own backing `File` (holding `entryCount` + the slot
/// table) plus the cached slot count. No name→slot cache is kept across
/// calls here — each `Folder` handle is short-lived (opened fresh by
/// `Image` per path-walk step), so the per-`Folder` cache the spec
/// describes collapses to nothing extra to invalidate.
pub struct Folder {
    file: File,
    entry_count: u64,
}

impl Folder {
    /// Create a brand new, empty folder (payload `entryCount = 0`).
    pub fn create(volume: Arc<Mutex<Volume>>) -> Result<Self> {
        let mut file = File::create(volume, OpenDisposition::overwrite())?;
        file.write_all(&0u64.to_be_bytes())?;
        Ok(Folder { file, entry_count: 0 })
    }

    /// Open an existing folder at `first_block`.
    pub fn open(volume: Arc<Mutex<Volume>>, first_block: u64) -> Result<Self> {
        let mut file = File::open(volume, first_block, OpenDisposition::overwrite())?;
        file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; 8];
        file.read_exact(&mut buf)?;
        Ok(Folder { file, entry_count: u64::from_be_bytes(buf) })
    }

    pub fn first_block(&self) -> u64 {
        self.file.first_block()
    }

    /// Hand back the backing `File` so the caller can `unlink` it once
    /// every entry has been removed. Consumes the folder.
    pub fn into_file(self) -> File {
        self.file
    }

    fn slot_offset(k: u64) -> u64 {
        8 + k * SLOT_WIDTH as u64
    }

    fn read_slot(&mut self, k: u64) -> Result<Slot> {
        self.file.seek(SeekFrom::Start(Self::slot_offset(k)))?;
        let mut buf = [0u8; SLOT_WIDTH];
        self.file.read_exact(&mut buf)?;
        Ok(Slot::decode(&buf))
    }

    fn write_slot(&mut self, k: u64, slot: &Slot) -> Result<()> {
        self.file.seek(SeekFrom::Start(Self::slot_offset(k)))?;
        self.file.write_all(&slot.encode())?;
        Ok(())
    }

    fn persist_entry_count(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.entry_count.to_be_bytes())?;
        Ok(())
    }

    /// Size of a child entry, computed by transiently opening its chain
    /// read-only (§4.7.2).
    fn child_size(&self, first_block: u64) -> Result<u64> {
        let f = File::open(self.file.volume(), first_block, OpenDisposition::read_only())?;
        Ok(f.size())
    }

    /// Linear scan for `name`, skipping tombstones (§4.7.2).
    pub fn lookup(&mut self, name: &str) -> Result<Option<EntryInfo>> {
        for k in 0..self.entry_count {
            let slot = self.read_slot(k)?;
            if slot.in_use && slot.name_str() == name {
                let size = self.child_size(slot.first_block)?;
                return Ok(Some(EntryInfo {
                    name: slot.name_str(),
                    first_block: slot.first_block,
                    is_file: slot.is_file,
                    size,
                    slot_index: k,
                }));
            }
        }
        Ok(None)
    }

    /// Add a child entry pointing at `first_block` (§4.7.1). Reuses the
    /// first tombstoned slot before extending the table.
    pub fn add_child(&mut self, name: &str, is_file: bool, first_block: u64) -> Result<u64> {
        validate_name(name)?;
        if self.lookup(name)?.is_some() {
            return Err(Error::AlreadyExists);
        }

        let mut target = None;
        for k in 0..self.entry_count {
            if !self.read_slot(k)?.in_use {
                target = Some(k);
                break;
            }
        }
        let k = match target {
            Some(k) => k,
            None => {
                let k = self.entry_count;
                self.entry_count += 1;
                self.persist_entry_count()?;
                k
            }
        };

        let slot = Slot { in_use: true, is_file, name: Slot::name_bytes(name), first_block };
        self.write_slot(k, &slot)?;
        self.file.flush()?;
        Ok(k)
    }

    /// Rename a slot in place (same folder) — overwrites only the name
    /// bytes (§4.7.3).
    pub fn rename_in_place(&mut self, slot_index: u64, new_name: &str) -> Result<()> {
        validate_name(new_name)?;
        if self.lookup(new_name)?.is_some() {
            return Err(Error::AlreadyExists);
        }
        let mut slot = self.read_slot(slot_index)?;
        slot.name = Slot::name_bytes(new_name);
        self.write_slot(slot_index, &slot)?;
        self.file.flush()
    }

    /// Clear the in-use bit of a slot, leaving it eligible for reuse
    /// (§4.7.4/tombstone). Does not touch the entry's backing chain —
    /// callers are responsible for unlinking it (see DESIGN.md's
    /// tombstone-before-unlink ordering resolution).
    pub fn tombstone(&mut self, slot_index: u64) -> Result<()> {
        let mut slot = self.read_slot(slot_index)?;
        slot.in_use = false;
        self.write_slot(slot_index, &slot)?;
        self.file.flush()
    }

    /// All alive entries, in slot order (§4.7.5). Materialized into a
    /// `Vec` rather than a lazy iterator — any mutation of the folder
    /// invalidates positions anyway, so there is nothing a streaming
    /// iterator would buy a caller here.
    pub fn iter(&mut self) -> Result<Vec<EntryInfo>> {
        let mut out = Vec::new();
        for k in 0..self.entry_count {
            let slot = self.read_slot(k)?;
            if slot.in_use {
                let size = self.child_size(slot.first_block)?;
                out.push(EntryInfo {
                    name: slot.name_str(),
                    first_block: slot.first_block,
                    is_file: slot.is_file,
                    size,
                    slot_index: k,
                });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{CipherId, CipherStream};
    use crate::superblock::Superblock;

    fn test_volume(block_count: u64) -> Arc<Mutex<Volume>> {
        let host = tempfile::tempfile().unwrap();
        let key = [3u8; 32];
        let iv = [5u8; crate::cipher::IV_LEN];
        let cipher = CipherStream::new(CipherId::Aes256Ctr, &key, &iv).unwrap();
        let superblock = Superblock::new(block_count);
        Arc::new(Mutex::new(Volume::new(host, cipher, superblock, 4096)))
    }

    #[test]
    fn add_and_lookup() {
        let vol = test_volume(64);
        let mut folder = Folder::create(vol.clone()).unwrap();
        folder.add_child("hello.txt", true, 5).unwrap();
        let found = folder.lookup("hello.txt").unwrap().unwrap();
        assert_eq!(found.first_block, 5);
        assert!(found.is_file);
    }

    #[test]
    fn rejects_duplicate_names() {
        let vol = test_volume(64);
        let mut folder = Folder::create(vol).unwrap();
        folder.add_child("a", true, 1).unwrap();
        assert!(matches!(folder.add_child("a", true, 2), Err(Error::AlreadyExists)));
    }

    #[test]
    fn rejects_illegal_names() {
        let vol = test_volume(64);
        let mut folder = Folder::create(vol).unwrap();
        assert!(matches!(folder.add_child("", true, 1), Err(Error::IllegalFilename)));
        assert!(matches!(folder.add_child("a/b", true, 1), Err(Error::IllegalFilename)));
    }

    #[test]
    fn tombstone_reuse_does_not_grow_entry_count() {
        let vol = test_volume(64);
        let mut folder = Folder::create(vol).unwrap();
        let slot = folder.add_child("a", true, 1).unwrap();
        folder.tombstone(slot).unwrap();
        folder.add_child("b", true, 2).unwrap();
        assert_eq!(folder.entry_count, 1);
    }

    #[test]
    fn iter_skips_tombstones() {
        let vol = test_volume(64);
        let mut folder = Folder::create(vol).unwrap();
        let slot_a = folder.add_child("a", true, 1).unwrap();
        folder.add_child("b", true, 2).unwrap();
        folder.tombstone(slot_a).unwrap();
        let names: Vec<String> = folder.iter().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["b".to_string()]);
    }
}
