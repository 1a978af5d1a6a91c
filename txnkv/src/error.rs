use serde_derive::{Deserialize, Serialize};

/// A crate-wide result type, returned by all fallible operations.
pub type CResult<T> = Result<T, Error>;

/// All errors the storage and transaction layers can surface.
///
/// The transactional variants carry enough context for a client to decide
/// whether to back off, resolve a lock, or retry with a new timestamp:
///
/// * `KeyIsLocked` is recoverable once the owning transaction is resolved.
/// * `WriteConflict` and `Retryable` mean the transaction must restart with
///   a fresh start timestamp.
/// * `AlreadyCommitted` tells a rollback attempt that the transaction went
///   the other way; the caller must treat it as committed.
///
/// Everything else (`InvalidEncodedKey`, `Internal`) indicates store
/// corruption or an environment failure and is not recoverable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// A read or prewrite ran into another transaction's lock.
    KeyIsLocked { key: Vec<u8>, primary: Vec<u8>, ts: u64, ttl: u64 },

    /// Prewrite found a committed version at or above its start timestamp.
    WriteConflict { start_ts: u64, conflict_ts: u64, key: Vec<u8> },

    /// The operation may succeed when retried with a new timestamp.
    Retryable(String),

    /// A rollback discovered the transaction already committed.
    AlreadyCommitted { commit_ts: u64 },

    /// A physical key did not decode as (user key, version).
    InvalidEncodedKey,

    /// The operation is not supported by this store.
    Unimplemented(String),

    /// Store corruption, I/O failure or poisoned lock.
    Internal(String),
}

impl Error {
    /// Whether the client may retry the transaction with a new timestamp.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::WriteConflict { .. } | Error::Retryable(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::KeyIsLocked { key, primary, ts, ttl } => write!(
                f,
                "key {:?} is locked by primary {:?} @{} ttl {}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(primary),
                ts,
                ttl
            ),
            Error::WriteConflict { start_ts, conflict_ts, key } => write!(
                f,
                "write conflict on key {:?}, start_ts {} <= conflict commit_ts {}",
                String::from_utf8_lossy(key),
                start_ts,
                conflict_ts
            ),
            Error::Retryable(reason) => write!(f, "retryable: {}", reason),
            Error::AlreadyCommitted { commit_ts } => {
                write!(f, "txn already committed @{}", commit_ts)
            }
            Error::InvalidEncodedKey => write!(f, "invalid encoded mvcc key"),
            Error::Unimplemented(what) => write!(f, "unimplemented: {}", what),
            Error::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Internal(err.to_string())
    }
}
