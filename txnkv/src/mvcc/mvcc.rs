//! This mod implements the transactional MVCC store, the storage half of a
//! Percolator-style two-phase commit protocol.
//! It allows multiple concurrent transactions to access and modify the same
//! dataset, isolates them from each other, detects and handles conflicts,
//! and commits their writes atomically as a single unit.
//! It uses an underlying storage engine to store raw keys and values.
//!
//!
//! VERSIONS
//! ========
//! Every committed write adds a new version of its key at the transaction's
//! commit timestamp, with deletes having a special tombstone record. A key
//! may also carry a lock, a pending intent of a transaction that prewrote
//! the key but has not yet committed or rolled back.
//!
//! For example, the keys a,b,c,d may have the following records at various
//! timestamps (x is a delete tombstone, ! is a lock):
//!
//! Time
//! 50          (!)
//! 40  a40
//! 30      b30     x
//! 20
//! 10  a10     c10 d10
//!     a   b   c   d   Keys
//!
//! * A transaction that started at 5 and committed at 10 wrote a=a10,
//!   c=c10, d=d10.
//! * A later transaction committed b=b30 and deleted d at 30.
//! * A read at timestamp 35 sees a=a10, b=b30, c=c10 and no d.
//! * The lock on b belongs to a transaction that started at 50 and is still
//!   in flight; until it resolves, snapshot reads at 50 or later block on b.
//!
//! All records live in one ordered keyspace: the physical key is the
//! memcomparable user key followed by the version encoded descending, and
//! locks are stored at the reserved maximum version. A forward scan from a
//! key's lock position therefore yields the lock first, then versions newest
//! first, then the next user key, which is the shape every operation here
//! relies on.
//!
//!
//! TWO-PHASE COMMIT
//! ================
//! A transaction first prewrites all of its mutations at its start
//! timestamp, locking every key with a reference to one primary key. Locks
//! from other transactions and committed versions at or above the start
//! timestamp are conflicts, reported per mutation. Once every key is locked,
//! commit flips each lock into a committed version at the commit timestamp.
//! Rollback replaces the lock with a rollback marker, which also blocks a
//! late prewrite from recreating the transaction.
//!
//! The commit point of the whole transaction is committing the primary key;
//! crashed transactions are resolved by other clients through scan_lock and
//! resolve_lock, using the primary's fate as the decision.
//!
//! mvcc:
//!   Readers don't block readers, writers batch their effects atomically.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::codec::bytes::encode_bytes;
use crate::error::{CResult, Error};
use crate::mvcc::key::{mvcc_decode, mvcc_encode};
use crate::mvcc::reader::{
    get_value, next_entry, next_lock, skip_to_next_key, Entry, MvccIter,
};
use crate::mvcc::transaction::{
    commit_key, commit_lock, prewrite_mutation, rollback_key, rollback_lock,
};
use crate::mvcc::{IsolationLevel, LockInfo, Mutation, Pair, LOCK_VER};
use crate::storage::engine::Engine;
use crate::storage::log_cask::LogCask;
use crate::storage::memory::Memory;
use crate::storage::{Modify, Status};

/// A transactional MVCC key-value store over an ordered storage engine.
///
/// One store-wide reader-writer lock guards the engine: reads (get,
/// batch_get, scan, scan_lock) share it, writers (prewrite, commit,
/// rollback, cleanup, resolve_lock) hold it exclusively for the whole call
/// and submit their effects as a single atomic batch, so readers never
/// observe a half-applied commit or rollback.
pub struct MvccStore<E: Engine> {
    engine: Arc<RwLock<E>>,
}

impl MvccStore<Memory> {
    /// Creates a store over the in-memory engine, used when no path is given.
    pub fn new_in_memory() -> Self {
        Self::new(Memory::new())
    }
}

impl MvccStore<LogCask> {
    /// Opens or creates a file-backed store with the default read cache.
    pub fn open(path: PathBuf) -> CResult<Self> {
        Ok(Self::new(LogCask::new(path)?))
    }

    /// Opens or creates a file-backed store with a read cache of the given
    /// capacity in bytes.
    pub fn open_with_cache(path: PathBuf, cache_capacity: usize) -> CResult<Self> {
        Ok(Self::new(LogCask::new_with_cache(path, cache_capacity)?))
    }
}

impl<E: Engine> MvccStore<E> {
    pub fn new(engine: E) -> Self {
        Self { engine: Arc::new(RwLock::new(engine)) }
    }

    /// Returns the value of `key` visible at `read_ts`, or a lock conflict
    /// under snapshot isolation. An absent or deleted key is `None`, not an
    /// error.
    pub fn get(&self, key: &[u8], read_ts: u64, iso: IsolationLevel) -> CResult<Option<Vec<u8>>> {
        let engine = self.engine.read()?;
        let mut iter = MvccIter::new(engine.scan(mvcc_encode(key, LOCK_VER)..));
        get_value(&mut iter, key, read_ts, iso)
    }

    /// Reads several keys at `read_ts`. The result holds one pair per key
    /// that had a visible value or failed, in input order; clean misses are
    /// left out.
    pub fn batch_get(
        &self,
        keys: &[Vec<u8>],
        read_ts: u64,
        iso: IsolationLevel,
    ) -> CResult<Vec<Pair>> {
        let engine = self.engine.read()?;
        let mut pairs = Vec::new();
        for key in keys {
            let mut iter = MvccIter::new(engine.scan(mvcc_encode(key, LOCK_VER)..));
            match get_value(&mut iter, key, read_ts, iso) {
                Ok(None) => {}
                Ok(Some(value)) => pairs.push(Pair { key: key.clone(), value: Ok(value) }),
                Err(err) => pairs.push(Pair { key: key.clone(), value: Err(err) }),
            }
        }
        Ok(pairs)
    }

    /// Scans user keys in `[start, end)` ascending and resolves each at
    /// `read_ts`, until `limit` pairs are produced or the range ends. An
    /// empty `start` begins at the first key in the store; an empty `end` is
    /// unbounded. Keys whose read fails (typically a lock conflict) produce
    /// a pair carrying the error, and the scan keeps going.
    pub fn scan(
        &self,
        start: &[u8],
        end: &[u8],
        limit: usize,
        read_ts: u64,
        iso: IsolationLevel,
    ) -> CResult<Vec<Pair>> {
        if range_is_empty(start, end) {
            return Ok(vec![]);
        }
        let engine = self.engine.read()?;
        let mut iter = MvccIter::new(engine.scan(scan_bounds(start, end)));

        let mut pairs = Vec::new();
        let Some(mut curr_key) = first_key(&mut iter, start)? else {
            return Ok(pairs);
        };
        while pairs.len() < limit {
            match get_value(&mut iter, &curr_key, read_ts, iso) {
                Ok(Some(value)) => pairs.push(Pair { key: curr_key.clone(), value: Ok(value) }),
                Ok(None) => {}
                Err(err) => pairs.push(Pair { key: curr_key.clone(), value: Err(err) }),
            }
            match skip_to_next_key(&mut iter, &curr_key)? {
                Some(next) => curr_key = next,
                None => break,
            }
        }
        Ok(pairs)
    }

    /// Descending scans are not supported by this store.
    pub fn reverse_scan(
        &self,
        _start: &[u8],
        _end: &[u8],
        _limit: usize,
        _read_ts: u64,
        _iso: IsolationLevel,
    ) -> CResult<Vec<Pair>> {
        Err(Error::Unimplemented("reverse scan".to_string()))
    }

    /// Returns every record of one user key, the lock and all value records
    /// newest first. A debugging aid; does not check locks or visibility.
    pub fn mvcc_get_by_key(&self, key: &[u8]) -> CResult<Entry> {
        let engine = self.engine.read()?;
        let mut iter = MvccIter::new(engine.scan(mvcc_encode(key, LOCK_VER)..));
        next_entry(&mut iter, key)
    }

    /// Locks every mutated key at `start_ts`, the first phase of two-phase
    /// commit. Returns one result per mutation, position-aligned with the
    /// input; the locks are written only if every mutation succeeded.
    pub fn prewrite(
        &self,
        mutations: &[Mutation],
        primary: &[u8],
        start_ts: u64,
        ttl: u64,
    ) -> CResult<Vec<CResult<()>>> {
        log::debug!("prewrite {} mutations @{}", mutations.len(), start_ts);
        let mut engine = self.engine.write()?;
        let mut batch = Vec::new();
        let mut results = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            results.push(prewrite_mutation(&*engine, &mut batch, mutation, primary, start_ts, ttl));
        }
        if results.iter().all(|r| r.is_ok()) {
            engine.write_batch(batch)?;
        }
        Ok(results)
    }

    /// Commits the given keys of the transaction that started at `start_ts`,
    /// making its writes visible at `commit_ts`. All keys commit in one
    /// batch, or the first error is returned and nothing is written.
    pub fn commit(&self, keys: &[Vec<u8>], start_ts: u64, commit_ts: u64) -> CResult<()> {
        log::debug!("commit {} keys @{} -> @{}", keys.len(), start_ts, commit_ts);
        let mut engine = self.engine.write()?;
        let mut batch = Vec::new();
        for key in keys {
            commit_key(&*engine, &mut batch, key, start_ts, commit_ts)?;
        }
        engine.write_batch(batch)
    }

    /// Rolls back the given keys of the transaction that started at
    /// `start_ts`. All keys roll back in one batch, or the first error is
    /// returned and nothing is written.
    pub fn rollback(&self, keys: &[Vec<u8>], start_ts: u64) -> CResult<()> {
        log::debug!("rollback {} keys @{}", keys.len(), start_ts);
        let mut engine = self.engine.write()?;
        let mut batch = Vec::new();
        for key in keys {
            rollback_key(&*engine, &mut batch, key, start_ts)?;
        }
        engine.write_batch(batch)
    }

    /// Rolls back a single key, used by clients to clear a crashed
    /// transaction's lock once its TTL has lapsed.
    pub fn cleanup(&self, key: &[u8], start_ts: u64) -> CResult<()> {
        log::debug!("cleanup key @{}", start_ts);
        let mut engine = self.engine.write()?;
        let mut batch = Vec::new();
        rollback_key(&*engine, &mut batch, key, start_ts)?;
        engine.write_batch(batch)
    }

    /// Reports every lock in `[start, end)` with `start_ts <= max_ts`, in
    /// ascending key order.
    pub fn scan_lock(&self, start: &[u8], end: &[u8], max_ts: u64) -> CResult<Vec<LockInfo>> {
        if range_is_empty(start, end) {
            return Ok(vec![]);
        }
        let engine = self.engine.read()?;
        let mut iter = MvccIter::new(engine.scan(scan_bounds(start, end)));

        let mut locks = Vec::new();
        let Some(mut curr_key) = first_key(&mut iter, start)? else {
            return Ok(locks);
        };
        loop {
            if let Some(lock) = next_lock(&mut iter, &curr_key)? {
                if lock.start_ts <= max_ts {
                    locks.push(LockInfo {
                        primary: lock.primary,
                        version: lock.start_ts,
                        key: curr_key.clone(),
                    });
                }
            }
            match skip_to_next_key(&mut iter, &curr_key)? {
                Some(next) => curr_key = next,
                None => break,
            }
        }
        Ok(locks)
    }

    /// Resolves every lock of the transaction at `start_ts` within
    /// `[start, end)`: commits them at `commit_ts`, or rolls them back when
    /// `commit_ts` is 0. The whole range resolves in one batch.
    pub fn resolve_lock(
        &self,
        start: &[u8],
        end: &[u8],
        start_ts: u64,
        commit_ts: u64,
    ) -> CResult<()> {
        if range_is_empty(start, end) {
            return Ok(());
        }
        log::debug!("resolve locks @{} -> @{}", start_ts, commit_ts);
        let mut engine = self.engine.write()?;
        let mut batch = Vec::new();
        {
            let mut iter = MvccIter::new(engine.scan(scan_bounds(start, end)));
            if let Some(mut curr_key) = first_key(&mut iter, start)? {
                loop {
                    if let Some(lock) = next_lock(&mut iter, &curr_key)? {
                        if lock.start_ts == start_ts {
                            if commit_ts > 0 {
                                commit_lock(&mut batch, &lock, &curr_key, start_ts, commit_ts)?;
                            } else {
                                rollback_lock(&mut batch, &curr_key, start_ts)?;
                            }
                        }
                    }
                    match skip_to_next_key(&mut iter, &curr_key)? {
                        Some(next) => curr_key = next,
                        None => break,
                    }
                }
            }
        }
        engine.write_batch(batch)
    }

    /// Removes every physical record of the user keys in `[start, end)`,
    /// locks included. Not a transactional delete; used to drop a keyspace
    /// wholesale.
    pub fn delete_range(&self, start: &[u8], end: &[u8]) -> CResult<()> {
        if range_is_empty(start, end) {
            return Ok(());
        }
        let mut engine = self.engine.write()?;
        let mut batch = Vec::new();
        {
            let lower = {
                let mut buf = Vec::new();
                encode_bytes(&mut buf, start);
                std::ops::Bound::Included(buf)
            };
            let upper = if end.is_empty() {
                std::ops::Bound::Unbounded
            } else {
                let mut buf = Vec::new();
                encode_bytes(&mut buf, end);
                std::ops::Bound::Excluded(buf)
            };
            for item in engine.scan((lower, upper)) {
                let (key, _) = item?;
                batch.push(Modify::Delete(key));
            }
        }
        engine.write_batch(batch)
    }

    /// Flushes the underlying engine.
    pub fn flush(&self) -> CResult<()> {
        self.engine.write()?.flush()
    }

    /// Returns the status of the underlying engine.
    pub fn status(&self) -> CResult<Status> {
        self.engine.read()?.status()
    }
}

impl<E: Engine> Clone for MvccStore<E> {
    fn clone(&self) -> Self {
        MvccStore { engine: self.engine.clone() }
    }
}

/// Whether `[start, end)` contains no user keys at all. An empty `end` is
/// unbounded.
fn range_is_empty(start: &[u8], end: &[u8]) -> bool {
    !end.is_empty() && start >= end
}

/// The physical bounds of a user-key range scan: from the lock position of
/// `start` up to (but excluding) the lock position of `end`, or unbounded
/// when `end` is empty.
fn scan_bounds(start: &[u8], end: &[u8]) -> (std::ops::Bound<Vec<u8>>, std::ops::Bound<Vec<u8>>) {
    let lower = std::ops::Bound::Included(mvcc_encode(start, LOCK_VER));
    let upper = if end.is_empty() {
        std::ops::Bound::Unbounded
    } else {
        std::ops::Bound::Excluded(mvcc_encode(end, LOCK_VER))
    };
    (lower, upper)
}

/// The first user key a range operation should visit: `start` itself, or
/// when `start` is empty, the user key of the first record in range.
fn first_key<I>(iter: &mut MvccIter<I>, start: &[u8]) -> CResult<Option<Vec<u8>>>
where
    I: Iterator<Item = CResult<(Vec<u8>, Vec<u8>)>>,
{
    if !start.is_empty() {
        return Ok(Some(start.to_vec()));
    }
    match iter.peek()? {
        None => Ok(None),
        Some((pkey, _)) => Ok(Some(mvcc_decode(pkey)?.0)),
    }
}
