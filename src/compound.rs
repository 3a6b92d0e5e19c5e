//! `CompoundFolder` — an optional bucket/compound folder client layer
//! (spec.md §9 "Bucket/compound folder"; SPEC_FULL.md §13).
//!
//! Grounded in `original_source/include/knoxcrypt/CompoundFolderEntryIterator.hpp`:
//! hashes each child name into one of `k` backing folders (ordinary
//! children of one umbrella folder, used purely as hash buckets) to bound
//! the cost of a large flat folder's O(n) linear scan. Built entirely on
//! the public `Image` path API — it adds no on-disk format of its own and
//! changes no core `Folder` semantics; the plain `Folder` scan remains
//! correct and sufficient on its own (this is a client optimization, not
//! a replacement).

use crate::entry::EntryInfo;
use crate::error::Result;
use crate::image::Image;

/// A compound (bucketed) folder layered on an ordinary umbrella folder
/// plus `bucket_count` ordinary sub-folders named `0000`..`{bucket_count-1:04x}`.
pub struct CompoundFolder<'a> {
    image: &'a Image,
    umbrella_path: String,
    bucket_count: usize,
}

impl<'a> CompoundFolder<'a> {
    /// Create the umbrella folder and all of its buckets.
    pub fn create(image: &'a Image, umbrella_path: &str, bucket_count: usize) -> Result<Self> {
        image.add_folder(umbrella_path)?;
        let compound = CompoundFolder { image, umbrella_path: umbrella_path.to_string(), bucket_count };
        for i in 0..bucket_count {
            image.add_folder(&compound.bucket_path(i))?;
        }
        Ok(compound)
    }

    /// Attach to an already-created compound folder.
    pub fn open(image: &'a Image, umbrella_path: &str, bucket_count: usize) -> Self {
        CompoundFolder { image, umbrella_path: umbrella_path.to_string(), bucket_count }
    }

    fn bucket_path(&self, index: usize) -> String {
        format!("{}/{:04x}", self.umbrella_path.trim_end_matches('/'), index)
    }

    fn bucket_for(&self, name: &str) -> String {
        let hash = blake3::hash(name.as_bytes());
        let index = (hash.as_bytes()[0] as usize) % self.bucket_count;
        self.bucket_path(index)
    }

    pub fn add_file(&self, name: &str) -> Result<()> {
        let bucket = self.bucket_for(name);
        self.image.add_file(&format!("{bucket}/{name}"))
    }

    pub fn add_folder(&self, name: &str) -> Result<()> {
        let bucket = self.bucket_for(name);
        self.image.add_folder(&format!("{bucket}/{name}"))
    }

    pub fn lookup(&self, name: &str) -> Result<Option<EntryInfo>> {
        let bucket = self.bucket_for(name);
        Ok(self.image.list(&bucket)?.into_iter().find(|e| e.name == name))
    }

    pub fn remove(&self, name: &str, recursive: bool) -> Result<()> {
        let bucket = self.bucket_for(name);
        self.image.remove(&format!("{bucket}/{name}"), recursive)
    }

    /// All entries across every bucket, bucket order then slot order.
    pub fn iter(&self) -> Result<Vec<EntryInfo>> {
        let mut out = Vec::new();
        for i in 0..self.bucket_count {
            out.extend(self.image.list(&self.bucket_path(i))?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageConfig;
    use tempfile::tempdir;

    #[test]
    fn distributes_and_finds_entries() {
        let dir = tempdir().unwrap();
        let image = Image::create(dir.path().join("compound.cvfs"), 256, ImageConfig::default(), "pw").unwrap();
        let compound = CompoundFolder::create(&image, "/big", 8).unwrap();

        for i in 0..40 {
            compound.add_file(&format!("file-{i}")).unwrap();
        }

        let all = compound.iter().unwrap();
        assert_eq!(all.len(), 40);
        assert!(compound.lookup("file-7").unwrap().is_some());
        assert!(compound.lookup("does-not-exist").unwrap().is_none());
    }
}
