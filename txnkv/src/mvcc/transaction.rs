//! The write path of two-phase commit: per-key actions that read the
//! current state through [`crate::mvcc::reader`] and push their effects onto
//! a shared batch. The caller applies the batch atomically once every key
//! succeeded.

use crate::error::{CResult, Error};
use crate::mvcc::key::mvcc_encode;
use crate::mvcc::reader::{get_txn_commit_info, next_lock, next_write, MvccIter};
use crate::mvcc::{Lock, LockType, Mutation, Write, WriteType, LOCK_VER};
use crate::storage::engine::Engine;
use crate::storage::Modify;

/// Prewrites one mutation at `start_ts`, locking its key.
///
/// Another transaction's lock fails with `KeyIsLocked`; our own lock means
/// the mutation was already prewritten and succeeds without re-writing it.
/// Any value record at or above `start_ts` is a write conflict, and that
/// includes rollback markers: a transaction that rolled back at this
/// timestamp must not be able to sneak a lock back in.
pub(crate) fn prewrite_mutation<E: Engine>(
    engine: &E,
    batch: &mut Vec<Modify>,
    mutation: &Mutation,
    primary: &[u8],
    start_ts: u64,
    ttl: u64,
) -> CResult<()> {
    let key = mutation.key();
    let mut iter = MvccIter::new(engine.scan(mvcc_encode(key, LOCK_VER)..));

    if let Some(lock) = next_lock(&mut iter, key)? {
        if lock.start_ts != start_ts {
            return Err(Error::KeyIsLocked {
                key: key.to_vec(),
                primary: lock.primary,
                ts: lock.start_ts,
                ttl: lock.ttl,
            });
        }
        return Ok(());
    }

    if let Some(write) = next_write(&mut iter, key)? {
        if write.commit_ts >= start_ts {
            return Err(Error::WriteConflict {
                start_ts,
                conflict_ts: write.commit_ts,
                key: key.to_vec(),
            });
        }
    }

    let lock = Lock {
        start_ts,
        primary: primary.to_vec(),
        value: mutation.value().to_vec(),
        op: LockType::from(mutation),
        ttl,
    };
    batch.push(Modify::Put(mvcc_encode(key, LOCK_VER), lock.encode()?));
    Ok(())
}

/// Commits one key of the transaction that started at `start_ts`.
///
/// Without a matching lock the key's value records decide: a committed
/// record from this transaction makes the commit an idempotent no-op, and
/// anything else (rolled back, or never prewritten) is a retryable error.
pub(crate) fn commit_key<E: Engine>(
    engine: &E,
    batch: &mut Vec<Modify>,
    key: &[u8],
    start_ts: u64,
    commit_ts: u64,
) -> CResult<()> {
    let mut iter = MvccIter::new(engine.scan(mvcc_encode(key, LOCK_VER)..));

    match next_lock(&mut iter, key)? {
        Some(lock) if lock.start_ts == start_ts => {
            commit_lock(batch, &lock, key, start_ts, commit_ts)
        }
        _ => match get_txn_commit_info(&mut iter, key, start_ts)? {
            Some(write) if write.write_type != WriteType::Rollback => Ok(()),
            _ => Err(Error::Retryable("txn not found".to_string())),
        },
    }
}

/// Turns a lock into a committed version at `commit_ts` and releases it.
/// Read-only locks release without writing a version.
pub(crate) fn commit_lock(
    batch: &mut Vec<Modify>,
    lock: &Lock,
    key: &[u8],
    start_ts: u64,
    commit_ts: u64,
) -> CResult<()> {
    if lock.op != LockType::Lock {
        let write_type =
            if lock.op == LockType::Put { WriteType::Put } else { WriteType::Delete };
        let write = Write { write_type, start_ts, commit_ts, value: lock.value.clone() };
        batch.push(Modify::Put(mvcc_encode(key, commit_ts), write.encode()?));
    }
    batch.push(Modify::Delete(mvcc_encode(key, LOCK_VER)));
    Ok(())
}

/// Rolls back one key of the transaction that started at `start_ts`.
///
/// A matching lock is released and replaced by a rollback marker. Without
/// one, an existing commit from this transaction fails with
/// `AlreadyCommitted`, an existing rollback is a no-op, and a key the
/// transaction never touched still gets a marker so a late prewrite at this
/// timestamp is shut out.
pub(crate) fn rollback_key<E: Engine>(
    engine: &E,
    batch: &mut Vec<Modify>,
    key: &[u8],
    start_ts: u64,
) -> CResult<()> {
    let mut iter = MvccIter::new(engine.scan(mvcc_encode(key, LOCK_VER)..));

    if let Some(lock) = next_lock(&mut iter, key)? {
        if lock.start_ts == start_ts {
            return rollback_lock(batch, key, start_ts);
        }
    }

    match get_txn_commit_info(&mut iter, key, start_ts)? {
        Some(write) if write.write_type != WriteType::Rollback => {
            Err(Error::AlreadyCommitted { commit_ts: write.commit_ts })
        }
        Some(_) => Ok(()),
        None => {
            batch.push(Modify::Put(mvcc_encode(key, start_ts), Write::rollback(start_ts).encode()?));
            Ok(())
        }
    }
}

/// Releases a lock and leaves a rollback marker at its `start_ts`.
pub(crate) fn rollback_lock(batch: &mut Vec<Modify>, key: &[u8], start_ts: u64) -> CResult<()> {
    batch.push(Modify::Put(mvcc_encode(key, start_ts), Write::rollback(start_ts).encode()?));
    batch.push(Modify::Delete(mvcc_encode(key, LOCK_VER)));
    Ok(())
}
