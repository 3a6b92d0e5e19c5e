//! # cryptvfs — single-file encrypted virtual filesystem
//!
//! An entire hierarchical filesystem — files and nested folders, with
//! create/rename/delete/truncate/random-access I/O — lives inside one
//! encrypted container image on the host disk. Every byte on disk passes
//! through a seekable stream cipher keyed by a user password; an attacker
//! holding the raw image sees only ciphertext.
//!
//! Layering (leaves first): [`cipher`] → [`header`] → [`superblock`] →
//! [`allocator`] → [`block`]/[`volume`] → [`file`] → [`folder`] →
//! [`image`], the public facade. [`compound`] and [`fsck`] are optional
//! clients built entirely on the public [`folder`]/[`image`] API and add
//! no on-disk format of their own.
//!
//! Out of scope: the FUSE/OS mount layer, any GUI, and any path resolver
//! richer than plain '/'-delimited walking (symlinks, working directory,
//! globbing) — see `image.rs`.

pub mod allocator;
pub mod block;
pub mod cipher;
pub mod compound;
pub mod config;
pub mod entry;
pub mod error;
pub mod file;
pub mod folder;
pub mod fsck;
pub mod header;
pub mod image;
pub mod perf;
pub mod superblock;
pub mod volume;

pub use cipher::CipherId;
pub use compound::CompoundFolder;
pub use config::ImageConfig;
pub use entry::EntryInfo;
pub use error::{Error, Result};
pub use file::{File, OpenDisposition, WriteOutcome};
pub use folder::Folder;
pub use fsck::{check as fsck_check, FsckReport};
pub use image::{FileHandle, Image, VfsStats};
