pub mod key;
pub mod lock;
pub mod mvcc;
pub mod reader;
pub mod transaction;
pub mod write;


pub use self::lock::{Lock, LockType};
pub use self::mvcc::MvccStore;
pub use self::reader::Entry;
pub use self::write::{Write, WriteType};

use crate::error::CResult;

/// An MVCC version represents a logical timestamp. A transaction is
/// identified by the version it started at, and its writes become visible at
/// its strictly larger commit version.
pub type Version = u64;

/// The reserved version at which a key's lock record is stored. Versions are
/// encoded descending in physical keys, so the lock sorts before every
/// committed version of the same user key.
pub const LOCK_VER: Version = Version::MAX;

/// The isolation level of a read.
///
/// Snapshot isolation sees all commits with `commit_ts <= read_ts` and is
/// blocked by locks at or below its read timestamp. Read committed sees the
/// latest committed value and ignores outstanding locks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IsolationLevel {
    Si,
    Rc,
}

/// A buffered client write, handed to prewrite.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
    Lock(Vec<u8>),
}

impl Mutation {
    pub fn key(&self) -> &[u8] {
        match self {
            Mutation::Put(key, _) => key,
            Mutation::Delete(key) => key,
            Mutation::Lock(key) => key,
        }
    }

    pub fn value(&self) -> &[u8] {
        match self {
            Mutation::Put(_, value) => value,
            Mutation::Delete(_) | Mutation::Lock(_) => &[],
        }
    }
}

/// One result of a multi-key read. The value is either the visible bytes or
/// the per-key error (typically a lock conflict) that prevented the read.
#[derive(Clone, Debug, PartialEq)]
pub struct Pair {
    pub key: Vec<u8>,
    pub value: CResult<Vec<u8>>,
}

/// An outstanding lock reported by scan_lock.
#[derive(Clone, Debug, PartialEq)]
pub struct LockInfo {
    pub primary: Vec<u8>,
    pub version: Version,
    pub key: Vec<u8>,
}
