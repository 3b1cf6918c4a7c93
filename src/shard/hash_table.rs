//! The primary index: an open-addressed hash table with linear probing.
//!
//! Each slot is one 64-bit word, primary hash in the low half and data
//! offset in the high half. A slot is live when its offset is non-zero;
//! with a zero offset, hash 0 means never used and hash 1 means dead
//! (deleted). Dead slots do not terminate a lookup probe, but they are
//! the first choice for reinsertion.

use std::sync::atomic::{AtomicU64, Ordering};

use super::layout::{self, DEAD_HASH, HASH_TABLE_ENTRIES};
use super::record;
use super::region::Region;

/// Outcome of a resolving probe.
pub struct Probe {
    /// Slot to operate on: the matched slot, the first reusable slot, or
    /// `HASH_TABLE_ENTRIES` when the table has no slot to offer.
    pub entry: usize,
    /// Data offset of the matched record, 0 when not matched.
    pub offset: u32,
    /// Whether a live record with an equal key was found.
    pub matched: bool,
}

/// Probe for `key`, resolving hash collisions by comparing key bytes.
///
/// Scans forward from `primary_hash % HASH_TABLE_ENTRIES`, wrapping. An
/// empty slot proves the key absent and ends the scan; a full cycle
/// without an empty slot or a match ends it too, yielding the first
/// dead slot seen (if any) as the insertion point.
pub fn find_bucket(ht: &[AtomicU64], region: &Region, primary_hash: u32, key: &[u8]) -> Probe {
    let start = primary_hash as usize % HASH_TABLE_ENTRIES;
    let mut first_reusable = None;

    for i in 0..HASH_TABLE_ENTRIES {
        let entry = (start + i) % HASH_TABLE_ENTRIES;
        let word = ht[entry].load(Ordering::Acquire);
        let hash = layout::low_word(word);
        let offset = layout::high_word(word);

        if offset != 0 {
            if hash == primary_hash {
                let key_size = record::key_size_at(region, offset);
                if record::key_at(region, offset, key_size) == key {
                    return Probe {
                        entry,
                        offset,
                        matched: true,
                    };
                }
            }
        } else if hash == DEAD_HASH {
            if first_reusable.is_none() {
                first_reusable = Some(entry);
            }
        } else {
            // Empty slot: the key is absent.
            return Probe {
                entry: first_reusable.unwrap_or(entry),
                offset: 0,
                matched: false,
            };
        }
    }

    Probe {
        entry: first_reusable.unwrap_or(HASH_TABLE_ENTRIES),
        offset: 0,
        matched: false,
    }
}

/// Probe for the first empty slot, without key resolution.
///
/// Only valid while cleaning into a fresh shard: the destination must
/// have no dead slots, spare capacity, and no two inserted records may
/// share a key.
pub fn find_empty_bucket(ht: &[AtomicU64], primary_hash: u32) -> Option<usize> {
    let start = primary_hash as usize % HASH_TABLE_ENTRIES;
    for i in 0..HASH_TABLE_ENTRIES {
        let entry = (start + i) % HASH_TABLE_ENTRIES;
        if ht[entry].load(Ordering::Acquire) == 0 {
            return Some(entry);
        }
    }
    None
}

/// Point `entry` at the record at `offset`.
pub fn install(ht: &[AtomicU64], entry: usize, primary_hash: u32, offset: u32) {
    ht[entry].store(layout::pack_words(primary_hash, offset), Ordering::Release);
}

/// Mark `entry` dead. The slot stops resolving but stays reusable.
pub fn kill(ht: &[AtomicU64], entry: usize) {
    ht[entry].store(layout::pack_words(DEAD_HASH, 0), Ordering::Release);
}
