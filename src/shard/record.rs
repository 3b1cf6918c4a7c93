//! Codec for data-region records.
//!
//! A record is laid out as
//!
//! ```text
//! u64 version | u32 key_size | key bytes | u32 value_count |
//!     (u32 value_size | value bytes)*
//! ```
//!
//! with all integers little-endian and byte-packed. Version 0 is
//! reserved to mean "no record"; a delete writes the 16-byte tombstone
//! `version=0, key_size=0, value_count=0` so the invalidation offset of
//! superseded search-index entries can point at a real data offset.
//!
//! Readers decode in place from the mapping and only copy bytes that
//! are returned to the caller.

use byteorder::{ByteOrder, LittleEndian};

use super::region::Region;

const VERSION_SIZE: usize = 8;
const LEN_SIZE: usize = 4;
const KEY_OFFSET: usize = VERSION_SIZE + LEN_SIZE;

/// Byte length of a delete tombstone.
pub const TOMBSTONE_SIZE: usize = VERSION_SIZE + LEN_SIZE + LEN_SIZE;

/// Encoded byte length of a record with the given key and values.
pub fn size(key: &[u8], values: &[Vec<u8>]) -> usize {
    KEY_OFFSET + key.len() + LEN_SIZE + values.iter().map(|v| LEN_SIZE + v.len()).sum::<usize>()
}

/// Encode a record into a fresh buffer.
pub fn encode(version: u64, key: &[u8], values: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = vec![0u8; size(key, values)];
    let mut off = 0;

    LittleEndian::write_u64(&mut buf[off..off + VERSION_SIZE], version);
    off += VERSION_SIZE;
    LittleEndian::write_u32(&mut buf[off..off + LEN_SIZE], key.len() as u32);
    off += LEN_SIZE;
    buf[off..off + key.len()].copy_from_slice(key);
    off += key.len();
    LittleEndian::write_u32(&mut buf[off..off + LEN_SIZE], values.len() as u32);
    off += LEN_SIZE;

    for value in values {
        LittleEndian::write_u32(&mut buf[off..off + LEN_SIZE], value.len() as u32);
        off += LEN_SIZE;
        buf[off..off + value.len()].copy_from_slice(value);
        off += value.len();
    }

    buf
}

/// The 16-byte tombstone a DEL appends to the data region.
pub fn encode_tombstone() -> [u8; TOMBSTONE_SIZE] {
    [0; TOMBSTONE_SIZE]
}

/// Version of the record at `offset`. Zero means tombstone/no record.
pub fn version_at(region: &Region, offset: u32) -> u64 {
    LittleEndian::read_u64(region.data(offset as usize, VERSION_SIZE))
}

/// Key length of the record at `offset`.
pub fn key_size_at(region: &Region, offset: u32) -> usize {
    LittleEndian::read_u32(region.data(offset as usize + VERSION_SIZE, LEN_SIZE)) as usize
}

/// Key bytes of the record at `offset`, borrowed from the mapping.
pub fn key_at(region: &Region, offset: u32, key_size: usize) -> &[u8] {
    region.data(offset as usize + KEY_OFFSET, key_size)
}

/// Values of the record at `offset`, copied out of the mapping.
pub fn values_at(region: &Region, offset: u32, key_size: usize) -> Vec<Vec<u8>> {
    let mut off = offset as usize + KEY_OFFSET + key_size;
    let count = LittleEndian::read_u32(region.data(off, LEN_SIZE)) as usize;
    off += LEN_SIZE;

    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let len = LittleEndian::read_u32(region.data(off, LEN_SIZE)) as usize;
        off += LEN_SIZE;
        values.push(region.data(off, len).to_vec());
        off += len;
    }
    values
}

/// Total encoded length of the record at `offset`.
pub fn size_at(region: &Region, offset: u32) -> usize {
    let key_size = key_size_at(region, offset);
    let mut off = offset as usize + KEY_OFFSET + key_size;
    let count = LittleEndian::read_u32(region.data(off, LEN_SIZE)) as usize;
    off += LEN_SIZE;

    for _ in 0..count {
        let len = LittleEndian::read_u32(region.data(off, LEN_SIZE)) as usize;
        off += LEN_SIZE + len;
    }
    off - offset as usize
}
