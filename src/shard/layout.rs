//! On-disk geometry of a shard file.
//!
//! A shard is one fixed-size file split into three regions at constant
//! offsets: the hash table, the search index, and the data arena. The
//! constants here are file-format-binding: a shard file is only valid
//! when read with the constants that created it.
//!
//! Index entries are read and written as 64-bit words; the helpers at
//! the bottom do the bit packing. A hash-table entry is one word: the
//! primary hash in the low half, the data offset in the high half. A
//! search-index entry is two words: hashes (primary low, secondary high)
//! and offsets (data offset low, invalidation offset high).

/// Number of 8-byte slots in the hash table.
#[cfg(not(test))]
pub const HASH_TABLE_ENTRIES: usize = 262_144;
/// Number of 16-byte slots in the search index. Larger than the hash
/// table so updates and deletes, which consume search slots but reuse
/// hash slots, do not exhaust the shard before cleaning kicks in.
#[cfg(not(test))]
pub const SEARCH_INDEX_ENTRIES: usize = 327_680;
/// Byte length of the append-only data arena.
#[cfg(not(test))]
pub const DATA_SIZE: usize = 64 * 1024 * 1024;

// Test builds shrink the geometry so the capacity paths (DATAFULL,
// HASHFULL, SEARCHFULL) can be exercised in milliseconds.
#[cfg(test)]
pub const HASH_TABLE_ENTRIES: usize = 4_096;
#[cfg(test)]
pub const SEARCH_INDEX_ENTRIES: usize = 5_120;
#[cfg(test)]
pub const DATA_SIZE: usize = 1024 * 1024;

pub const HASH_TABLE_BYTES: usize = HASH_TABLE_ENTRIES * 8;
pub const SEARCH_INDEX_BYTES: usize = SEARCH_INDEX_ENTRIES * 16;

pub const HASH_TABLE_OFFSET: usize = 0;
pub const SEARCH_INDEX_OFFSET: usize = HASH_TABLE_BYTES;
pub const DATA_OFFSET: usize = HASH_TABLE_BYTES + SEARCH_INDEX_BYTES;

/// Total byte length of a shard file.
pub const FILE_SIZE: usize = HASH_TABLE_BYTES + SEARCH_INDEX_BYTES + DATA_SIZE;

/// First writable offset in the data arena. Data offset 0 is the
/// empty/live sentinel in hash-table slots and invalidation fields, so
/// no record may ever live there; the first 8 bytes stay zero for the
/// life of the shard.
pub const DATA_BASE: u32 = 8;

/// Hash value marking a hash-table slot that has never been used.
pub const EMPTY_HASH: u32 = 0;
/// Hash value marking a dead (deleted) hash-table slot.
pub const DEAD_HASH: u32 = 1;

// Index words must stay 8-byte aligned within the page-aligned mapping,
// and the data arena must stay addressable by the 32-bit offsets stored
// in the index words.
const _: () = assert!(HASH_TABLE_BYTES % 8 == 0);
const _: () = assert!(SEARCH_INDEX_OFFSET % 8 == 0);
const _: () = assert!(DATA_SIZE <= u32::MAX as usize);
const _: () = assert!(SEARCH_INDEX_ENTRIES > HASH_TABLE_ENTRIES);

/// Pack two 32-bit halves into one index word.
pub fn pack_words(low: u32, high: u32) -> u64 {
    ((high as u64) << 32) | low as u64
}

/// Low 32 bits of an index word.
pub fn low_word(word: u64) -> u32 {
    word as u32
}

/// High 32 bits of an index word.
pub fn high_word(word: u64) -> u32 {
    (word >> 32) as u32
}
