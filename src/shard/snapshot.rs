//! Consistent iteration over a shard.
//!
//! A snapshot is just the pair of cursors captured while writers were
//! excluded. Entries below the captured search cursor are never moved
//! or rewritten (only their invalidation offsets can change, and the
//! liveness rule discounts invalidations that happened after the
//! capture), so iteration is stable no matter how many PUT and DEL
//! operations land afterwards.

use std::sync::Arc;

use super::record;
use super::search_index;
use super::Shard;

/// A stable view of a shard at a point in time.
///
/// Holds a strong reference to the shard; the backing file stays mapped
/// for as long as any snapshot of it is alive.
pub struct Snapshot {
    shard: Arc<Shard>,
    data_offset: u32,
    search_offset: u32,
}

/// One search-index entry, decoded together with its record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub primary_hash: u32,
    pub secondary_hash: u32,
    pub data_offset: u32,
    pub invalidation_offset: u32,
    pub version: u64,
    pub key: Vec<u8>,
    pub values: Vec<Vec<u8>>,
}

impl Snapshot {
    pub(super) fn new(shard: Arc<Shard>, data_offset: u32, search_offset: u32) -> Self {
        Snapshot {
            shard,
            data_offset,
            search_offset,
        }
    }

    /// The captured data cursor.
    pub fn data_offset(&self) -> u32 {
        self.data_offset
    }

    /// Number of search-index entries the snapshot covers.
    pub fn len(&self) -> usize {
        self.search_offset as usize
    }

    pub fn is_empty(&self) -> bool {
        self.search_offset == 0
    }

    /// Whether `entry` was live when the snapshot was taken: either it
    /// has not been invalidated at all, or it was invalidated by a
    /// record written after the capture.
    pub fn is_live(&self, entry: &SnapshotEntry) -> bool {
        entry.invalidation_offset == 0 || entry.invalidation_offset >= self.data_offset
    }

    /// All captured entries, in append order.
    pub fn iter(&self) -> Entries<'_> {
        Entries {
            snapshot: self,
            slot: 0,
        }
    }

    /// The captured entries that are live as of the snapshot.
    pub fn live(&self) -> impl Iterator<Item = SnapshotEntry> + '_ {
        self.iter().filter(|entry| self.is_live(entry))
    }
}

/// Iterator over every entry a snapshot covers.
pub struct Entries<'a> {
    snapshot: &'a Snapshot,
    slot: usize,
}

impl Iterator for Entries<'_> {
    type Item = SnapshotEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.slot >= self.snapshot.search_offset as usize {
            return None;
        }

        let region = &self.snapshot.shard.region;
        let entry = search_index::read(region.search_index(), self.slot);
        self.slot += 1;

        let key_size = record::key_size_at(region, entry.data_offset);
        Some(SnapshotEntry {
            primary_hash: entry.primary_hash,
            secondary_hash: entry.secondary_hash,
            data_offset: entry.data_offset,
            invalidation_offset: entry.invalidation_offset,
            version: record::version_at(region, entry.data_offset),
            key: record::key_at(region, entry.data_offset, key_size).to_vec(),
            values: record::values_at(region, entry.data_offset, key_size),
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn create_temp_shard() -> (TempDir, Arc<Shard>) {
        let dir = TempDir::new().expect("Failed to create temporary directory");
        let shard = Shard::create(dir.path(), "0.shard").expect("Failed to create shard");
        (dir, shard)
    }

    #[test]
    fn test_empty_shard_snapshot() {
        let (_dir, shard) = create_temp_shard();
        let snapshot = shard.make_snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.iter().count(), 0);
    }

    #[test]
    fn test_snapshot_exposes_entries_and_records() {
        let (_dir, shard) = create_temp_shard();
        shard
            .put(7, 11, b"alpha", &[b"A".to_vec()], 1)
            .expect("Failed to put");
        shard
            .put(8, 12, b"beta", &[b"B".to_vec(), b"B2".to_vec()], 2)
            .expect("Failed to put");

        let snapshot = shard.make_snapshot();
        let entries: Vec<_> = snapshot.iter().collect();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].primary_hash, 7);
        assert_eq!(entries[0].secondary_hash, 11);
        assert_eq!(entries[0].key, b"alpha");
        assert_eq!(entries[0].values, vec![b"A".to_vec()]);
        assert_eq!(entries[0].version, 1);
        assert_eq!(entries[0].invalidation_offset, 0);

        assert_eq!(entries[1].key, b"beta");
        assert_eq!(entries[1].values, vec![b"B".to_vec(), b"B2".to_vec()]);
    }

    #[test]
    fn test_liveness_judges_invalidations_against_capture() {
        let (_dir, shard) = create_temp_shard();
        shard
            .put(7, 11, b"alpha", &[b"old".to_vec()], 1)
            .expect("Failed to put");
        shard
            .put(7, 11, b"alpha", &[b"mid".to_vec()], 2)
            .expect("Failed to put");

        let snapshot = shard.make_snapshot();
        // Invalidate the mid record after the capture.
        shard
            .put(7, 11, b"alpha", &[b"new".to_vec()], 3)
            .expect("Failed to put");

        let entries: Vec<_> = snapshot.iter().collect();
        assert_eq!(entries.len(), 2);
        // The pre-snapshot supersede is stale; the post-snapshot one is
        // still live as of the capture.
        assert!(!snapshot.is_live(&entries[0]));
        assert!(snapshot.is_live(&entries[1]));

        let live: Vec<_> = snapshot.live().collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].values, vec![b"mid".to_vec()]);
        assert_eq!(live[0].version, 2);
    }

    #[test]
    fn test_snapshot_keeps_shard_alive() {
        let (_dir, shard) = create_temp_shard();
        shard
            .put(1, 2, b"pinned", &[b"v".to_vec()], 1)
            .expect("Failed to put");

        let snapshot = shard.make_snapshot();
        drop(shard);

        let entries: Vec<_> = snapshot.iter().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, b"pinned");
    }
}
