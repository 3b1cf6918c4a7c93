//! The secondary index: an append-only array of 128-bit entries.
//!
//! Each entry is two 64-bit words. The first packs the primary hash
//! (low) and secondary hash (high); the second packs the record's data
//! offset (low) and its invalidation offset (high). An invalidation
//! offset of 0 means the record is live; otherwise it is the data
//! offset of the record or tombstone that superseded it. Snapshots walk
//! this array, so entries are never moved or reclaimed in place.

use std::sync::atomic::{AtomicU64, Ordering};

use super::layout;

/// One decoded search-index entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    pub primary_hash: u32,
    pub secondary_hash: u32,
    pub data_offset: u32,
    pub invalidation_offset: u32,
}

/// Write a live entry for the record at `data_offset` into `slot`.
pub fn append(si: &[AtomicU64], slot: usize, primary_hash: u32, secondary_hash: u32, data_offset: u32) {
    si[2 * slot].store(
        layout::pack_words(primary_hash, secondary_hash),
        Ordering::Release,
    );
    si[2 * slot + 1].store(layout::pack_words(data_offset, 0), Ordering::Release);
}

/// Decode the entry in `slot`.
pub fn read(si: &[AtomicU64], slot: usize) -> Entry {
    let hashes = si[2 * slot].load(Ordering::Acquire);
    let offsets = si[2 * slot + 1].load(Ordering::Acquire);
    Entry {
        primary_hash: layout::low_word(hashes),
        secondary_hash: layout::high_word(hashes),
        data_offset: layout::low_word(offsets),
        invalidation_offset: layout::high_word(offsets),
    }
}

/// Invalidate every live entry pointing at `old_offset`, recording
/// `new_offset` as the superseding record.
///
/// Scans all `upto` entries without early exit: at most one entry per
/// offset should be live, but racing snapshot readers make a defensive
/// full scan the safe choice.
pub fn invalidate(si: &[AtomicU64], upto: usize, old_offset: u32, new_offset: u32) {
    for slot in 0..upto {
        let word = si[2 * slot + 1].load(Ordering::Acquire);
        if layout::low_word(word) == old_offset && layout::high_word(word) == 0 {
            si[2 * slot + 1].store(
                layout::pack_words(old_offset, new_offset),
                Ordering::Release,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use super::*;
    use crate::shard::layout::SEARCH_INDEX_ENTRIES;

    fn make_index() -> Vec<AtomicU64> {
        (0..2 * SEARCH_INDEX_ENTRIES).map(|_| AtomicU64::new(0)).collect()
    }

    #[test]
    fn test_append_read_round_trip() {
        let si = make_index();

        append(&si, 0, 7, 11, 8);
        append(&si, 1, u32::MAX, 0, 64);

        assert_eq!(
            read(&si, 0),
            Entry {
                primary_hash: 7,
                secondary_hash: 11,
                data_offset: 8,
                invalidation_offset: 0,
            }
        );
        assert_eq!(read(&si, 1).primary_hash, u32::MAX);
        assert_eq!(read(&si, 1).data_offset, 64);
    }

    #[test]
    fn test_invalidate_flips_only_live_matches() {
        let si = make_index();

        append(&si, 0, 1, 1, 8); // will be invalidated
        append(&si, 1, 2, 2, 40); // different offset, stays live
        append(&si, 2, 1, 1, 72); // superseding record, stays live

        invalidate(&si, 3, 8, 72);

        assert_eq!(read(&si, 0).invalidation_offset, 72);
        assert_eq!(read(&si, 1).invalidation_offset, 0);
        assert_eq!(read(&si, 2).invalidation_offset, 0);
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let si = make_index();

        append(&si, 0, 1, 1, 8);
        invalidate(&si, 1, 8, 40);
        // A second invalidation of the same offset must not overwrite
        // the recorded superseder.
        invalidate(&si, 1, 8, 96);

        assert_eq!(read(&si, 0).invalidation_offset, 40);
    }

    #[test]
    fn test_invalidate_respects_upto_bound() {
        let si = make_index();

        append(&si, 0, 1, 1, 8);
        append(&si, 1, 1, 1, 8); // beyond the scanned prefix

        invalidate(&si, 1, 8, 40);

        assert_eq!(read(&si, 0).invalidation_offset, 40);
        assert_eq!(read(&si, 1).invalidation_offset, 0);
    }
}
