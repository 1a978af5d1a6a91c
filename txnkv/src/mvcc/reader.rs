//! The read path: a peekable wrapper over a raw engine scan, plus a small
//! set of decoders that each consume exactly one logical record.
//!
//! Every decoder matches the record at the current position against an
//! expected user key and advances the iterator only on a match; a
//! non-matching record is left in place for the next decoder. This is what
//! lets one forward scan serve a whole read: lock first (versions are
//! encoded descending, so the lock sorts before every value record), then
//! value records newest first, then the next user key.

use crate::error::CResult;
use crate::mvcc::key::mvcc_decode;
use crate::mvcc::{IsolationLevel, Lock, Write, WriteType, LOCK_VER};

/// A single-record lookahead over a raw engine scan iterator.
pub struct MvccIter<I: Iterator<Item = CResult<(Vec<u8>, Vec<u8>)>>> {
    inner: std::iter::Peekable<I>,
}

impl<I: Iterator<Item = CResult<(Vec<u8>, Vec<u8>)>>> MvccIter<I> {
    pub fn new(inner: I) -> Self {
        Self { inner: inner.peekable() }
    }

    /// The physical record at the current position, without consuming it.
    pub(crate) fn peek(&mut self) -> CResult<Option<(&[u8], &[u8])>> {
        match self.inner.peek() {
            None => Ok(None),
            Some(Err(err)) => Err(err.clone()),
            Some(Ok((key, value))) => Ok(Some((key.as_slice(), value.as_slice()))),
        }
    }

    /// Consumes the record at the current position.
    pub(crate) fn advance(&mut self) {
        self.inner.next();
    }
}

/// Consumes and returns the lock record of `expect_key`, if the iterator is
/// positioned on one.
pub fn next_lock<I>(iter: &mut MvccIter<I>, expect_key: &[u8]) -> CResult<Option<Lock>>
where
    I: Iterator<Item = CResult<(Vec<u8>, Vec<u8>)>>,
{
    let lock = match iter.peek()? {
        None => return Ok(None),
        Some((pkey, pvalue)) => {
            let (key, ver) = mvcc_decode(pkey)?;
            if key != expect_key || ver != LOCK_VER {
                return Ok(None);
            }
            Lock::decode(pvalue)?
        }
    };
    iter.advance();
    Ok(Some(lock))
}

/// Consumes and returns the next value record of `expect_key`, if the
/// iterator is positioned on one.
pub fn next_write<I>(iter: &mut MvccIter<I>, expect_key: &[u8]) -> CResult<Option<Write>>
where
    I: Iterator<Item = CResult<(Vec<u8>, Vec<u8>)>>,
{
    let write = match iter.peek()? {
        None => return Ok(None),
        Some((pkey, pvalue)) => {
            let (key, ver) = mvcc_decode(pkey)?;
            if key != expect_key || ver == LOCK_VER {
                return Ok(None);
            }
            Write::decode(pvalue)?
        }
    };
    iter.advance();
    Ok(Some(write))
}

/// Consumes every remaining record of `curr_key` and returns the next user
/// key, without consuming any of its records.
pub fn skip_to_next_key<I>(iter: &mut MvccIter<I>, curr_key: &[u8]) -> CResult<Option<Vec<u8>>>
where
    I: Iterator<Item = CResult<(Vec<u8>, Vec<u8>)>>,
{
    loop {
        let next = match iter.peek()? {
            None => return Ok(None),
            Some((pkey, _)) => {
                let (key, _) = mvcc_decode(pkey)?;
                if key != curr_key {
                    Some(key)
                } else {
                    None
                }
            }
        };
        match next {
            Some(key) => return Ok(Some(key)),
            None => iter.advance(),
        }
    }
}

/// Every record of one user key: the lock, if any, and all value records
/// newest first.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub lock: Option<Lock>,
    pub writes: Vec<Write>,
}

/// Consumes all records of `expect_key` into an [`Entry`].
pub fn next_entry<I>(iter: &mut MvccIter<I>, expect_key: &[u8]) -> CResult<Entry>
where
    I: Iterator<Item = CResult<(Vec<u8>, Vec<u8>)>>,
{
    let lock = next_lock(iter, expect_key)?;
    let mut writes = Vec::new();
    while let Some(write) = next_write(iter, expect_key)? {
        writes.push(write);
    }
    Ok(Entry { key: expect_key.to_vec(), lock, writes })
}

/// Resolves the value of `key` visible at `read_ts`.
///
/// Under snapshot isolation a lock at or below the read timestamp fails the
/// read; under read committed outstanding locks are ignored. Rollback
/// markers are never visible. The first record with `commit_ts <= read_ts`
/// decides: a Put yields its value, a Delete yields nothing.
pub fn get_value<I>(
    iter: &mut MvccIter<I>,
    key: &[u8],
    read_ts: u64,
    iso: IsolationLevel,
) -> CResult<Option<Vec<u8>>>
where
    I: Iterator<Item = CResult<(Vec<u8>, Vec<u8>)>>,
{
    if let Some(lock) = next_lock(iter, key)? {
        if iso == IsolationLevel::Si {
            lock.check(read_ts, key)?;
        }
    }
    while let Some(write) = next_write(iter, key)? {
        if write.write_type == WriteType::Rollback {
            continue;
        }
        if write.commit_ts <= read_ts {
            return match write.write_type {
                WriteType::Put => Ok(Some(write.value)),
                _ => Ok(None),
            };
        }
    }
    Ok(None)
}

/// Walks the value records of `key` looking for the one written by the
/// transaction that started at `start_ts`, to learn how that transaction
/// ended (committed, or rolled back).
pub fn get_txn_commit_info<I>(
    iter: &mut MvccIter<I>,
    key: &[u8],
    start_ts: u64,
) -> CResult<Option<Write>>
where
    I: Iterator<Item = CResult<(Vec<u8>, Vec<u8>)>>,
{
    while let Some(write) = next_write(iter, key)? {
        if write.start_ts == start_ts {
            return Ok(Some(write));
        }
    }
    Ok(None)
}
