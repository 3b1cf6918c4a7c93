use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Cinderdisk errors.
///
/// Every failure a shard can report maps to exactly one variant; the
/// disk layer dispatches on them to decide between retry, rerouting, and
/// cleaning. Success is the `Ok` arm of [`Result`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    /// The key is not present. A GET racing a PUT or DEL on the same key
    /// may report this spuriously; the disk layer patches that by
    /// retrying against other shards.
    NotFound,
    /// The data region cannot hold the record (or tombstone).
    DataFull,
    /// No hash-table slot is available for a new key.
    HashFull,
    /// The search index has no free slots.
    SearchFull,
    /// The OS refused to flush the mapping; carries the OS error text.
    SyncFailed(String),
    /// The shard file could not be created, truncated, or mapped. No
    /// shard object exists when this is returned.
    DropFailed(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::NotFound => write!(f, "not found"),
            Error::DataFull => write!(f, "data region full"),
            Error::HashFull => write!(f, "hash table full"),
            Error::SearchFull => write!(f, "search index full"),
            Error::SyncFailed(msg) => write!(f, "sync failed: {msg}"),
            Error::DropFailed(msg) => write!(f, "shard creation failed: {msg}"),
        }
    }
}

/// A cinderdisk Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}
