//! `Image` — the top-level facade: owns the host file (through a shared,
//! mutex-guarded `Volume`) and exposes the path-based filesystem API of
//! §11. Grounded in the teacher's `Archive` (`archive.rs`): open/create,
//! add-entry, list/stat, and an explicit mode enum, generalized from a
//! write-once archive to a mutable image.
//!
//! Path walking here is the minimum '/'-delimited traversal needed to
//! reach §11's `addFile(path)`/`stat(path)`/etc. surface — it is not the
//! richer "higher-level path resolver" spec.md §1 places out of scope
//! (no symlinks, no working directory, no globbing).

use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::cipher::{self, CipherStream};
use crate::config::{ImageConfig, DEFAULT_BLOCK_SIZE};
use crate::entry::EntryInfo;
use crate::error::{Error, Result};
use crate::file::{File, OpenDisposition};
use crate::folder::{Folder, MAX_NAME_LEN};
use crate::header::{Header, HEADER_SIZE};
use crate::superblock::{superblock_size, Superblock};
use crate::volume::Volume;

/// First-block index of the root folder — fixed for every image.
pub const ROOT_BLOCK: u64 = 0;

/// `statvfs()`-equivalent summary of the image's capacity.
#[derive(Debug, Clone, Copy)]
pub struct VfsStats {
    pub block_size: u32,
    pub block_count: u64,
    pub free_blocks: u64,
    pub max_name_len: usize,
}

/// An open file, returned by `Image::open_file`. Implements
/// `std::io::{Read, Write, Seek}`; dropping it simply drops the handle —
/// every write already lands on the host file synchronously, so there is
/// no separate buffered "close".
pub struct FileHandle {
    inner: File,
}

impl FileHandle {
    pub fn stream_position(&mut self) -> io::Result<u64> {
        self.inner.seek(SeekFrom::Current(0))
    }

    pub fn size(&self) -> u64 {
        self.inner.size()
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

pub struct Image {
    volume: Arc<Mutex<Volume>>,
    config: ImageConfig,
    /// The coarse lock of §5: "the container image is a shared resource
    /// guarded by one coarse lock owned by the top-level filesystem
    /// facade ... All mutating operations on Files, Folders, and the
    /// Allocator acquire this lock for their duration." Distinct from
    /// `volume`'s own `Mutex` (which only serializes individual block
    /// accesses) — every public mutating method below holds this guard
    /// for its *entire* body, so a multi-step operation like "look up a
    /// name, then add a slot for it" (`Folder::add_child`) can't
    /// interleave with another thread's call to the same method.
    op_lock: Mutex<()>,
}

impl Image {
    /// Create a brand new container at `path`: writes the header, an
    /// empty superblock sized for `block_count` blocks, and an empty root
    /// folder at block 0. Fails if `path` already exists.
    pub fn create<P: AsRef<Path>>(path: P, block_count: u64, config: ImageConfig, password: &str) -> Result<Image> {
        let mut host = OpenOptions::new().read(true).write(true).create_new(true).open(path.as_ref())?;

        let header = Header::create(password, config.cipher, config.kdf_rounds)?;
        let key = cipher::derive_key(password, &header.iv, header.rounds)?;
        let cipher_stream = CipherStream::new(config.cipher, &key, &header.iv)?;

        host.seek(SeekFrom::Start(0))?;
        header.write(&mut host)?;

        let superblock = Superblock::new(block_count);
        let mut volume = Volume::new(host, cipher_stream, superblock, config.block_size);
        volume.flush_superblock()?;
        volume.write_block_meta(ROOT_BLOCK, crate::block::BlockMeta { bytes_used: 0, next: ROOT_BLOCK })?;
        volume.zero_block(ROOT_BLOCK)?;

        let volume = Arc::new(Mutex::new(volume));
        {
            // Initialize the root folder's entryCount without going
            // through Folder::create, which would allocate a *new* first
            // block — block 0 is already reserved by Superblock::new.
            let mut root_file = File::open(volume.clone(), ROOT_BLOCK, OpenDisposition::overwrite())?;
            root_file.write_all(&0u64.to_be_bytes())?;
        }

        Ok(Image { volume, config, op_lock: Mutex::new(()) })
    }

    /// Open an existing container, authenticating `password` against the
    /// header before any payload byte is decrypted (§4.2).
    ///
    /// Block size is not a persisted field (see §6's byte-exact layout)
    /// — this build always assumes `config::DEFAULT_BLOCK_SIZE`, matching
    /// the lineage's single hardcoded block-size constant rather than a
    /// per-image field (see DESIGN.md).
    pub fn open<P: AsRef<Path>>(path: P, password: &str) -> Result<Image> {
        let mut host = OpenOptions::new().read(true).write(true).open(path.as_ref())?;

        host.seek(SeekFrom::Start(0))?;
        let header = Header::read(&mut host)?;
        let key = header.authenticate(password)?;
        let mut cipher_stream = CipherStream::new(header.cipher_id, &key, &header.iv)?;

        let mut count_buf = [0u8; 8];
        host.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        host.read_exact(&mut count_buf)?;
        cipher_stream.apply_at(HEADER_SIZE as u64, &mut count_buf);
        let block_count = u64::from_be_bytes(count_buf);

        let mut sb_buf = vec![0u8; superblock_size(block_count)];
        host.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        host.read_exact(&mut sb_buf)?;
        cipher_stream.apply_at(HEADER_SIZE as u64, &mut sb_buf);
        let superblock = Superblock::read(&sb_buf[..])?;

        let block_size = DEFAULT_BLOCK_SIZE;
        let config = ImageConfig { block_size, cipher: header.cipher_id, kdf_rounds: header.rounds };
        let volume = Volume::new(host, cipher_stream, superblock, block_size);
        Ok(Image { volume: Arc::new(Mutex::new(volume)), config, op_lock: Mutex::new(()) })
    }

    /// Flush the host file. Consumes the image — callers drop the
    /// returned `()` result and the image goes out of scope.
    pub fn close(self) -> Result<()> {
        self.volume.lock().unwrap().flush_host()
    }

    pub fn config(&self) -> ImageConfig {
        self.config
    }

    fn split_path(path: &str) -> Vec<&str> {
        path.split('/').filter(|s| !s.is_empty()).collect()
    }

    fn root_folder(&self) -> Result<Folder> {
        Folder::open(self.volume.clone(), ROOT_BLOCK)
    }

    /// Walk every path component, returning the `Folder` it resolves to.
    /// Every intermediate (and the final, for this helper) component must
    /// exist and be a folder.
    fn resolve_folder(&self, path: &str) -> Result<Folder> {
        let mut folder = self.root_folder()?;
        for seg in Self::split_path(path) {
            let entry = folder.lookup(seg)?.ok_or(Error::NotFound)?;
            if entry.is_file {
                return Err(Error::NotFound);
            }
            folder = Folder::open(self.volume.clone(), entry.first_block)?;
        }
        Ok(folder)
    }

    /// Walk every path component but the last, returning the parent
    /// `Folder` and the final component's name (which may or may not
    /// exist yet in that folder).
    fn resolve_parent(&self, path: &str) -> Result<(Folder, String)> {
        let mut segs = Self::split_path(path);
        let name = segs.pop().ok_or(Error::IllegalFilename)?.to_string();
        let mut folder = self.root_folder()?;
        for seg in segs {
            let entry = folder.lookup(seg)?.ok_or(Error::NotFound)?;
            if entry.is_file {
                return Err(Error::NotFound);
            }
            folder = Folder::open(self.volume.clone(), entry.first_block)?;
        }
        Ok((folder, name))
    }

    pub fn add_file(&self, path: &str) -> Result<()> {
        let _op = self.op_lock.lock().unwrap();
        let (mut parent, name) = self.resolve_parent(path)?;
        let child = File::create(self.volume.clone(), OpenDisposition::write_append())?;
        let first_block = child.first_block();
        drop(child);
        parent.add_child(&name, true, first_block)
    }

    pub fn add_folder(&self, path: &str) -> Result<()> {
        let _op = self.op_lock.lock().unwrap();
        let (mut parent, name) = self.resolve_parent(path)?;
        let child = Folder::create(self.volume.clone())?;
        let first_block = child.first_block();
        parent.add_child(&name, false, first_block)
    }

    /// Remove a file or folder. Folders require `recursive = true` unless
    /// empty. Per §4.7.4/§4.6.7: the directory slot is tombstoned *before*
    /// the backing chain is unlinked, so a crash mid-operation leaks
    /// blocks (recoverable via `fsck`) rather than leaving a dangling
    /// slot pointing at freed blocks — see DESIGN.md.
    pub fn remove(&self, path: &str, recursive: bool) -> Result<()> {
        let _op = self.op_lock.lock().unwrap();
        let (mut parent, name) = self.resolve_parent(path)?;
        let entry = parent.lookup(&name)?.ok_or(Error::NotFound)?;

        if entry.is_file {
            parent.tombstone(entry.slot_index)?;
            let file = File::open(self.volume.clone(), entry.first_block, OpenDisposition::overwrite())?;
            file.unlink()?;
        } else {
            let mut child_folder = Folder::open(self.volume.clone(), entry.first_block)?;
            let children = child_folder.iter()?;
            if !children.is_empty() && !recursive {
                return Err(Error::FolderNotEmpty);
            }
            if recursive {
                self.remove_folder_contents(&mut child_folder)?;
            }
            parent.tombstone(entry.slot_index)?;
            child_folder.into_file().unlink()?;
        }
        Ok(())
    }

    fn remove_folder_contents(&self, folder: &mut Folder) -> Result<()> {
        for child in folder.iter()? {
            if child.is_file {
                folder.tombstone(child.slot_index)?;
                let file = File::open(self.volume.clone(), child.first_block, OpenDisposition::overwrite())?;
                file.unlink()?;
            } else {
                let mut sub = Folder::open(self.volume.clone(), child.first_block)?;
                self.remove_folder_contents(&mut sub)?;
                folder.tombstone(child.slot_index)?;
                sub.into_file().unlink()?;
            }
        }
        Ok(())
    }

    /// Rename/move an entry. Same-folder renames overwrite only the name
    /// bytes; cross-folder renames tombstone the source slot and add a
    /// new slot in the destination pointing at the same first-block index
    /// — O(1) in the entry's data regardless of size (§4.7.3).
    pub fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let _op = self.op_lock.lock().unwrap();
        let (mut src_parent, src_name) = self.resolve_parent(src)?;
        let (mut dst_parent, dst_name) = self.resolve_parent(dst)?;
        let entry = src_parent.lookup(&src_name)?.ok_or(Error::NotFound)?;

        if src_parent.first_block() == dst_parent.first_block() {
            src_parent.rename_in_place(entry.slot_index, &dst_name)?;
        } else {
            dst_parent.add_child(&dst_name, entry.is_file, entry.first_block)?;
            src_parent.tombstone(entry.slot_index)?;
        }
        Ok(())
    }

    pub fn open_file(&self, path: &str, disposition: OpenDisposition) -> Result<FileHandle> {
        let _op = self.op_lock.lock().unwrap();
        let (mut parent, name) = self.resolve_parent(path)?;
        let entry = parent.lookup(&name)?;
        let first_block = match entry {
            Some(e) => {
                if !e.is_file {
                    return Err(Error::IllegalFilename);
                }
                e.first_block
            }
            None => {
                if !disposition.create {
                    return Err(Error::NotFound);
                }
                let child = File::create(self.volume.clone(), disposition)?;
                let fb = child.first_block();
                drop(child);
                parent.add_child(&name, true, fb)?;
                fb
            }
        };
        let inner = File::open(self.volume.clone(), first_block, disposition)?;
        Ok(FileHandle { inner })
    }

    pub fn truncate(&self, path: &str, size: u64) -> Result<()> {
        let _op = self.op_lock.lock().unwrap();
        let (mut parent, name) = self.resolve_parent(path)?;
        let entry = parent.lookup(&name)?.ok_or(Error::NotFound)?;
        if !entry.is_file {
            return Err(Error::IllegalFilename);
        }
        let mut file = File::open(self.volume.clone(), entry.first_block, OpenDisposition::overwrite())?;
        file.truncate(size)
    }

    pub fn stat(&self, path: &str) -> Result<EntryInfo> {
        let (mut parent, name) = self.resolve_parent(path)?;
        parent.lookup(&name)?.ok_or(Error::NotFound)
    }

    pub fn list(&self, folder_path: &str) -> Result<Vec<EntryInfo>> {
        self.resolve_folder(folder_path)?.iter()
    }

    pub fn statvfs(&self) -> VfsStats {
        let vol = self.volume.lock().unwrap();
        VfsStats {
            block_size: vol.block_size,
            block_count: vol.superblock.block_count,
            free_blocks: vol.superblock.free_blocks,
            max_name_len: MAX_NAME_LEN,
        }
    }

    /// Shared volume handle — used by `fsck`/`compound` to build
    /// read-only diagnostics on top of the same public primitives
    /// (`File`/`Folder`) rather than a privileged back door.
    pub fn volume_handle(&self) -> Arc<Mutex<Volume>> {
        self.volume.clone()
    }

    /// The ordered block indices backing the chain starting at
    /// `first_block` — used by `fsck`'s reachability walk.
    pub fn chain_blocks(&self, first_block: u64) -> Result<Vec<u64>> {
        let f = File::open(self.volume.clone(), first_block, OpenDisposition::read_only())?;
        Ok(f.chain().to_vec())
    }
}
