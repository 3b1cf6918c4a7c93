//! The predicate a cleaning pass uses to decide which records to keep.
//!
//! Region mapping lives in a higher layer; the shard only ever asks
//! "does this record belong to the space being cleaned into?".

/// A pure predicate over a record and its hashes.
pub trait Coordinate {
    fn contains(&self, primary_hash: u32, secondary_hash: u32, key: &[u8], values: &[Vec<u8>])
        -> bool;
}

impl<F> Coordinate for F
where
    F: Fn(u32, u32, &[u8], &[Vec<u8>]) -> bool,
{
    fn contains(
        &self,
        primary_hash: u32,
        secondary_hash: u32,
        key: &[u8],
        values: &[Vec<u8>],
    ) -> bool {
        self(primary_hash, secondary_hash, key, values)
    }
}

/// The coordinate that keeps everything.
pub struct EntireSpace;

impl Coordinate for EntireSpace {
    fn contains(&self, _: u32, _: u32, _: &[u8], _: &[Vec<u8>]) -> bool {
        true
    }
}
