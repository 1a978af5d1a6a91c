use serde_derive::{Deserialize, Serialize};

use crate::error::{CResult, Error};
use crate::mvcc::{Mutation, Version};

/// What the lock will turn into when its transaction commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockType {
    Put,
    Delete,
    /// A read lock taken on the key; commits without writing a version.
    Lock,
}

impl From<&Mutation> for LockType {
    fn from(mutation: &Mutation) -> Self {
        match mutation {
            Mutation::Put(..) => LockType::Put,
            Mutation::Delete(_) => LockType::Delete,
            Mutation::Lock(_) => LockType::Lock,
        }
    }
}

/// A pending write intent, stored at `(key, LOCK_VER)`. At most one lock
/// exists per user key; it carries the prewritten value so commit does not
/// have to find it elsewhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub start_ts: Version,
    #[serde(with = "serde_bytes")]
    pub primary: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
    pub op: LockType,
    pub ttl: u64,
}

impl Lock {
    pub fn encode(&self) -> CResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(data: &[u8]) -> CResult<Self> {
        bincode::deserialize(data).map_err(|err| Error::Internal(format!("bad format lock: {}", err)))
    }

    /// Errors with the lock's coordinates if it blocks a read at `ts`.
    pub fn check(&self, ts: u64, key: &[u8]) -> CResult<()> {
        if self.start_ts <= ts {
            return Err(Error::KeyIsLocked {
                key: key.to_vec(),
                primary: self.primary.clone(),
                ts: self.start_ts,
                ttl: self.ttl,
            });
        }
        Ok(())
    }
}
