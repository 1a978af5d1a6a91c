use serde_derive::{Deserialize, Serialize};

use crate::error::{CResult, Error};
use crate::mvcc::Version;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteType {
    Put,
    Delete,
    /// A tombstone recording that the transaction at `start_ts` rolled back,
    /// so a late prewrite at the same timestamp cannot succeed.
    Rollback,
}

/// A committed version of a user key, stored at `(key, commit_ts)`. Rollback
/// markers reuse the same record with `commit_ts == start_ts` and an empty
/// value; the value is also empty for deletes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Write {
    pub write_type: WriteType,
    pub start_ts: Version,
    pub commit_ts: Version,
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

impl Write {
    /// The rollback marker for the transaction at `start_ts`.
    pub fn rollback(start_ts: Version) -> Self {
        Write { write_type: WriteType::Rollback, start_ts, commit_ts: start_ts, value: vec![] }
    }

    pub fn encode(&self) -> CResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(data: &[u8]) -> CResult<Self> {
        bincode::deserialize(data)
            .map_err(|err| Error::Internal(format!("bad format write: {}", err)))
    }
}
