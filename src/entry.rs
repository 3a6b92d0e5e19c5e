//! `EntryInfo` — a value snapshot of one directory entry.
//!
//! Returned by `Folder::lookup`/`Folder::iter` and the `Image` facade's
//! `stat`/`list`. Never owns blocks; it is a read at one point in time and
//! is not invalidated or kept in sync with later mutations of the folder.

/// One directory entry, as observed at lookup time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    /// First-block index of the entry's backing chain — its durable handle.
    pub first_block: u64,
    pub is_file: bool,
    /// Sum of `bytesUsed` over the entry's chain.
    pub size: u64,
    /// Slot index within the parent folder's entry table.
    pub slot_index: u64,
}
