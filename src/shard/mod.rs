//! The shard: one memory-mapped file acting as an append-only log of
//! versioned key-value records, indexed by an in-file hash table and an
//! append-only search index.

pub mod hash_table;
pub mod layout;
pub mod record;
pub mod region;
pub mod search_index;
pub mod snapshot;

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::coordinate::Coordinate;
use crate::error::{Error, Result};
use self::layout::{DATA_BASE, DATA_SIZE, HASH_TABLE_ENTRIES, SEARCH_INDEX_ENTRIES};
use self::region::Region;

pub use self::snapshot::{Snapshot, SnapshotEntry};

/// One shard of the store: a fixed-size mapped file holding an
/// append-only data log, a hash table resolving primary hashes to data
/// offsets, and a search index recording every record ever appended.
///
/// Synchronization contract:
///  - GET takes no lock. It may race a PUT or DEL on the same key and
///    observe the hash slot mid-transition, reporting a spurious
///    `NotFound`; the disk layer patches those by retrying elsewhere.
///    Do not add locking here to close that window.
///  - PUT and DEL exclude each other and snapshots.
///  - `make_snapshot` excludes writers only while it captures the two
///    cursors; iteration afterwards runs concurrently with anything.
///  - `used_space` and `stale_space` read the cursors with acquire
///    semantics and tolerate skew.
///  - `flush` and `flush_async` take no lock at all.
///
/// Shards are shared through [`Arc`]; snapshots hold a strong reference,
/// so the mapping stays open until the last holder is gone.
pub struct Shard {
    region: Region,
    /// Data-region write cursor. Only grows; records are never moved.
    data_offset: AtomicU32,
    /// Search-index write cursor, in entries. Only grows.
    search_offset: AtomicU32,
    /// Realizes the PUT/DEL/snapshot exclusion above. GET ignores it.
    write_lock: RwLock<()>,
}

impl Shard {
    /// Create a freshly initialized shard at `dir/filename`, overwriting
    /// whatever file may already be there.
    pub fn create(dir: impl AsRef<Path>, filename: impl AsRef<Path>) -> Result<Arc<Shard>> {
        let region = Region::create(dir.as_ref(), filename.as_ref())?;
        tracing::debug!(file = ?filename.as_ref(), "created shard");
        Ok(Arc::new(Shard {
            region,
            data_offset: AtomicU32::new(DATA_BASE),
            search_offset: AtomicU32::new(0),
            write_lock: RwLock::new(()),
        }))
    }

    /// Look up `key`, returning its values and version.
    pub fn get(&self, primary_hash: u32, key: &[u8]) -> Result<(Vec<Vec<u8>>, u64)> {
        let probe = hash_table::find_bucket(self.region.hash_table(), &self.region, primary_hash, key);
        if !probe.matched {
            return Err(Error::NotFound);
        }

        let key_size = record::key_size_at(&self.region, probe.offset);
        let values = record::values_at(&self.region, probe.offset, key_size);
        let version = record::version_at(&self.region, probe.offset);
        Ok((values, version))
    }

    /// Insert or update `key`.
    ///
    /// Fails with one of the three capacity errors without consuming any
    /// space. On success the write order is: record bytes, search-index
    /// entry, hash-table slot, then invalidation of the superseded
    /// search-index entries, so a concurrent GET finds either the old
    /// record or the new one, never neither.
    pub fn put(
        &self,
        primary_hash: u32,
        secondary_hash: u32,
        key: &[u8],
        values: &[Vec<u8>],
        version: u64,
    ) -> Result<()> {
        debug_assert!(version != 0, "version 0 is reserved for tombstones");
        let _guard = self.write_lock.write();

        let record_size = record::size(key, values);
        let data_offset = self.data_offset.load(Ordering::Relaxed);
        if data_offset as usize + record_size > DATA_SIZE {
            return Err(Error::DataFull);
        }

        let search_slot = self.search_offset.load(Ordering::Relaxed);
        if search_slot as usize == SEARCH_INDEX_ENTRIES {
            return Err(Error::SearchFull);
        }

        let probe =
            hash_table::find_bucket(self.region.hash_table(), &self.region, primary_hash, key);
        if probe.entry == HASH_TABLE_ENTRIES {
            return Err(Error::HashFull);
        }

        self.region
            .write_data(data_offset as usize, &record::encode(version, key, values));
        self.data_offset
            .store(data_offset + record_size as u32, Ordering::Release);

        search_index::append(
            self.region.search_index(),
            search_slot as usize,
            primary_hash,
            secondary_hash,
            data_offset,
        );
        self.search_offset.store(search_slot + 1, Ordering::Release);

        hash_table::install(self.region.hash_table(), probe.entry, primary_hash, data_offset);

        if probe.matched {
            search_index::invalidate(
                self.region.search_index(),
                search_slot as usize,
                probe.offset,
                data_offset,
            );
        }

        Ok(())
    }

    /// Delete `key`, spending one tombstone's worth of data space.
    pub fn del(&self, primary_hash: u32, key: &[u8]) -> Result<()> {
        let _guard = self.write_lock.write();

        let probe =
            hash_table::find_bucket(self.region.hash_table(), &self.region, primary_hash, key);
        if !probe.matched {
            return Err(Error::NotFound);
        }

        let data_offset = self.data_offset.load(Ordering::Relaxed);
        if data_offset as usize + record::TOMBSTONE_SIZE > DATA_SIZE {
            return Err(Error::DataFull);
        }

        self.region
            .write_data(data_offset as usize, &record::encode_tombstone());
        self.data_offset
            .store(data_offset + record::TOMBSTONE_SIZE as u32, Ordering::Release);

        search_index::invalidate(
            self.region.search_index(),
            self.search_offset.load(Ordering::Relaxed) as usize,
            probe.offset,
            data_offset,
        );
        hash_table::kill(self.region.hash_table(), probe.entry);

        Ok(())
    }

    /// Percentage of the data region consumed by current or stale data.
    pub fn used_space(&self) -> u32 {
        let data_offset = self.data_offset.load(Ordering::Acquire);
        (100 * data_offset as u64 / DATA_SIZE as u64) as u32
    }

    /// Percentage of the data region that cleaning could reclaim:
    /// space held by records whose search-index entry is invalidated.
    pub fn stale_space(&self) -> u32 {
        let search_offset = self.search_offset.load(Ordering::Acquire);
        let si = self.region.search_index();

        let mut stale = 0usize;
        for slot in 0..search_offset as usize {
            let entry = search_index::read(si, slot);
            if entry.invalidation_offset != 0 {
                stale += record::size_at(&self.region, entry.data_offset);
            }
        }
        (100 * stale as u64 / DATA_SIZE as u64) as u32
    }

    /// Synchronously flush the mapping to disk.
    pub fn flush(&self) -> Result<()> {
        self.region.flush().map_err(|e| {
            tracing::warn!(error = %e, "shard flush failed");
            e
        })
    }

    /// Request an asynchronous flush of the mapping.
    pub fn flush_async(&self) -> Result<()> {
        self.region.flush_async().map_err(|e| {
            tracing::warn!(error = %e, "shard async flush failed");
            e
        })
    }

    /// Capture a stable view of the shard for iteration.
    pub fn make_snapshot(self: &Arc<Self>) -> Snapshot {
        let _guard = self.write_lock.read();
        let data_offset = self.data_offset.load(Ordering::Acquire);
        let search_offset = self.search_offset.load(Ordering::Acquire);
        Snapshot::new(Arc::clone(self), data_offset, search_offset)
    }

    /// Copy every record that is live as of a snapshot of `self` and
    /// matches `coordinate` into the freshly created shard `dst`.
    ///
    /// The destination ends up with no stale space and no dead slots:
    /// exactly the records cleaning decided to keep, all of their
    /// search-index entries live.
    pub fn copy_to<C: Coordinate>(self: &Arc<Self>, coordinate: &C, dst: &Shard) -> Result<()> {
        let snapshot = self.make_snapshot();
        let _guard = dst.write_lock.write();
        debug_assert!(
            dst.search_offset.load(Ordering::Relaxed) == 0,
            "cleaning requires a fresh destination"
        );

        let mut copied = 0usize;
        let mut skipped = 0usize;
        for entry in snapshot.live() {
            if !coordinate.contains(entry.primary_hash, entry.secondary_hash, &entry.key, &entry.values)
            {
                skipped += 1;
                continue;
            }

            let size = record::size_at(&self.region, entry.data_offset);
            let dst_offset = dst.data_offset.load(Ordering::Relaxed);
            if dst_offset as usize + size > DATA_SIZE {
                return Err(Error::DataFull);
            }
            let dst_slot = dst.search_offset.load(Ordering::Relaxed);
            if dst_slot as usize == SEARCH_INDEX_ENTRIES {
                return Err(Error::SearchFull);
            }
            // Each source key has at most one live record, so the
            // destination probe needs no key resolution.
            let bucket = hash_table::find_empty_bucket(dst.region.hash_table(), entry.primary_hash)
                .ok_or(Error::HashFull)?;

            dst.region
                .write_data(dst_offset as usize, self.region.data(entry.data_offset as usize, size));
            dst.data_offset
                .store(dst_offset + size as u32, Ordering::Release);

            search_index::append(
                dst.region.search_index(),
                dst_slot as usize,
                entry.primary_hash,
                entry.secondary_hash,
                dst_offset,
            );
            dst.search_offset.store(dst_slot + 1, Ordering::Release);

            hash_table::install(
                dst.region.hash_table(),
                bucket,
                entry.primary_hash,
                dst_offset,
            );
            copied += 1;
        }

        tracing::debug!(copied, skipped, "cleaned shard into fresh destination");
        Ok(())
    }
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard")
            .field("data_offset", &self.data_offset.load(Ordering::Acquire))
            .field("search_offset", &self.search_offset.load(Ordering::Acquire))
            .finish()
    }
}
