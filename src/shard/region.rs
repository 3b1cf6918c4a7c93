//! File mapping for a shard.
//!
//! A [`Region`] owns the memory-mapped shard file and exposes the three
//! typed views over it: the hash table and search index as slices of
//! atomic 64-bit words, and the data arena through a single
//! bounds-checked slicing primitive. Nothing outside this module does
//! offset arithmetic against the raw mapping.

use std::fs;
use std::path::Path;
use std::slice;
use std::sync::atomic::AtomicU64;

use memmap2::MmapMut;

use super::layout::{
    DATA_OFFSET, DATA_SIZE, FILE_SIZE, HASH_TABLE_ENTRIES, HASH_TABLE_OFFSET,
    SEARCH_INDEX_ENTRIES, SEARCH_INDEX_OFFSET,
};
use crate::error::{Error, Result};

/// The mapped shard file.
pub struct Region {
    ptr: *mut u8,
    map: MmapMut,
}

// Safety: the mapping is owned for the life of the Region. Index words
// are only accessed through the AtomicU64 views. Data-arena bytes are
// written once, at offsets no reader has been handed yet (writers hold
// the shard write lock and publish offsets with release stores), and are
// immutable afterwards.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Create a freshly zeroed shard file at `dir/filename`, overwriting
    /// any existing file there, and map it read-write shared.
    ///
    /// On any failure the partially created file is unlinked; no shard
    /// file is ever observable in a half-constructed state.
    pub fn create(dir: &Path, filename: &Path) -> Result<Self> {
        let path = dir.join(filename);

        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::DropFailed(format!("create {}: {e}", path.display())))?;

        if let Err(e) = file.set_len(FILE_SIZE as u64) {
            return Err(Self::unlink(&path, Error::DropFailed(format!("truncate: {e}"))));
        }

        // Safety: the file was just created and truncated; nothing else
        // maps it yet.
        let mut map = match unsafe { MmapMut::map_mut(&file) } {
            Ok(map) => map,
            Err(e) => return Err(Self::unlink(&path, Error::DropFailed(format!("mmap: {e}")))),
        };

        map.fill(0);
        if let Err(e) = map.flush() {
            return Err(Self::unlink(&path, Error::SyncFailed(e.to_string())));
        }

        let ptr = map.as_mut_ptr();
        Ok(Region { ptr, map })
    }

    fn unlink(path: &Path, error: Error) -> Error {
        let _ = fs::remove_file(path);
        error
    }

    /// The hash-table region: `HASH_TABLE_ENTRIES` 64-bit words.
    pub fn hash_table(&self) -> &[AtomicU64] {
        // Safety: the region is 8-byte aligned (page-aligned mapping,
        // word-multiple offset) and lives as long as `self`.
        unsafe {
            slice::from_raw_parts(
                self.ptr.add(HASH_TABLE_OFFSET) as *const AtomicU64,
                HASH_TABLE_ENTRIES,
            )
        }
    }

    /// The search-index region: two 64-bit words per entry.
    pub fn search_index(&self) -> &[AtomicU64] {
        // Safety: as for `hash_table`.
        unsafe {
            slice::from_raw_parts(
                self.ptr.add(SEARCH_INDEX_OFFSET) as *const AtomicU64,
                2 * SEARCH_INDEX_ENTRIES,
            )
        }
    }

    /// A view of `len` bytes of the data arena starting at `offset`.
    ///
    /// This is the only way to read mapped data-region storage; it never
    /// yields bytes outside the arena.
    pub fn data(&self, offset: usize, len: usize) -> &[u8] {
        assert!(
            offset + len <= DATA_SIZE,
            "data region read out of bounds: {offset}+{len}"
        );
        // Safety: bounds checked above; published record bytes are
        // immutable (see the Send/Sync note).
        unsafe { slice::from_raw_parts(self.ptr.add(DATA_OFFSET + offset), len) }
    }

    /// Copy `bytes` into the data arena at `offset`.
    ///
    /// Callers must hold the shard write lock and must only target
    /// offsets at or beyond the data cursor, i.e. bytes no reader can
    /// have been handed yet.
    pub fn write_data(&self, offset: usize, bytes: &[u8]) {
        assert!(
            offset + bytes.len() <= DATA_SIZE,
            "data region write out of bounds: {offset}+{}",
            bytes.len()
        );
        // Safety: bounds checked above; the target bytes are unpublished.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.ptr.add(DATA_OFFSET + offset),
                bytes.len(),
            );
        }
    }

    /// Synchronously flush the whole mapping to disk.
    pub fn flush(&self) -> Result<()> {
        self.map.flush().map_err(|e| Error::SyncFailed(e.to_string()))
    }

    /// Request an asynchronous flush of the whole mapping.
    pub fn flush_async(&self) -> Result<()> {
        self.map
            .flush_async()
            .map_err(|e| Error::SyncFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tempfile::TempDir;

    use super::*;

    fn create_temp_region() -> (TempDir, Region) {
        let dir = TempDir::new().expect("Failed to create temporary directory");
        let region =
            Region::create(dir.path(), Path::new("0.shard")).expect("Failed to create region");
        (dir, region)
    }

    #[test]
    fn test_create_sizes_and_zeroes_the_file() {
        let (dir, region) = create_temp_region();

        let len = fs::metadata(dir.path().join("0.shard"))
            .expect("Failed to stat shard file")
            .len();
        assert_eq!(len, FILE_SIZE as u64);

        assert_eq!(region.hash_table().len(), HASH_TABLE_ENTRIES);
        assert_eq!(region.search_index().len(), 2 * SEARCH_INDEX_ENTRIES);
        assert!(region.hash_table()[0].load(Ordering::Acquire) == 0);
        assert!(region.data(0, 64).iter().all(|&b| b == 0));
        assert!(region.data(DATA_SIZE - 64, 64).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_create_overwrites_existing_file() {
        let dir = TempDir::new().expect("Failed to create temporary directory");
        let path = dir.path().join("0.shard");
        fs::write(&path, b"stale contents").expect("Failed to seed file");

        let region =
            Region::create(dir.path(), Path::new("0.shard")).expect("Failed to create region");
        assert!(region.data(0, 16).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_create_in_missing_directory_fails_clean() {
        let dir = TempDir::new().expect("Failed to create temporary directory");
        let missing = dir.path().join("no-such-dir");

        let result = Region::create(&missing, Path::new("0.shard"));
        assert!(matches!(result, Err(Error::DropFailed(_))));
        assert!(!missing.join("0.shard").exists());
    }

    #[test]
    fn test_data_write_read_round_trip() {
        let (_dir, region) = create_temp_region();

        region.write_data(8, b"cinder");
        assert_eq!(region.data(8, 6), b"cinder");
        // Neighboring bytes stay untouched.
        assert_eq!(region.data(7, 1), &[0]);
        assert_eq!(region.data(14, 1), &[0]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_data_read_past_arena_panics() {
        let (_dir, region) = create_temp_region();
        region.data(DATA_SIZE - 4, 8);
    }

    #[test]
    fn test_flush_variants() {
        let (_dir, region) = create_temp_region();
        region.write_data(8, b"durable");
        region.flush_async().expect("Failed to flush async");
        region.flush().expect("Failed to flush");
    }
}
