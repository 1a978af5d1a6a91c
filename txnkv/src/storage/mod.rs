pub mod engine;
pub mod log;
pub mod log_cask;
pub mod memory;

use serde_derive::{Deserialize, Serialize};

use crate::error::CResult;

/// Maps each key to the position and length of its latest value in the log
/// file. The whole map must fit in memory. A BTreeMap keeps the keys in
/// order, which serves ranged scans and lets compaction rewrite the log in
/// key order.
pub type KeyDir = std::collections::BTreeMap<Vec<u8>, (u64, u32)>;

/// A single write in a batch, applied to the engine via
/// [`engine::Engine::write_batch`].
#[derive(Clone, Debug, PartialEq)]
pub enum Modify {
    /// Sets a key to a value, replacing any existing value.
    Put(Vec<u8>, Vec<u8>),
    /// Removes a key, doing nothing if it does not exist.
    Delete(Vec<u8>),
}

/// A point-in-time summary of an engine's contents and disk usage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// The name of the storage engine.
    pub name: String,

    /// The number of live keys in the engine.
    pub keys: u64,

    /// The logical size of live key/value pairs.
    pub size: u64,

    /// The on-disk size of all data, live and garbage.
    pub total_disk_size: u64,

    /// The on-disk size of live data.
    pub live_disk_size: u64,

    /// The on-disk size of garbage data.
    pub garbage_disk_size: u64,
}

/// A scan iterator, with a blanket implementation (in lieu of trait aliases).
pub trait ScanIteratorT: DoubleEndedIterator<Item = CResult<(Vec<u8>, Vec<u8>)>> {}

impl<I: DoubleEndedIterator<Item = CResult<(Vec<u8>, Vec<u8>)>>> ScanIteratorT for I {}

#[cfg(test)]
mod tests {

    /// Shared contract tests for Engine implementations, exercised over the
    /// physical records the transactional layer actually stores:
    /// memcomparable user keys with descending versions, lock records at the
    /// reserved version, and commit-shaped batches.
    macro_rules! test_engine {
        ($setup:expr) => {
            #[track_caller]
            /// Collects a scan and compares it against the expected records.
            fn assert_scan<I>(iter: I, expect: &[(Vec<u8>, Vec<u8>)]) -> CResult<()>
            where
                I: Iterator<Item = CResult<(Vec<u8>, Vec<u8>)>>,
            {
                assert_eq!(iter.collect::<CResult<Vec<_>>>()?, expect.to_vec());
                Ok(())
            }

            #[test]
            /// Lock and write records survive the engine byte-for-byte, and
            /// point operations behave: overwrites replace, deletes remove,
            /// re-deletes are no-ops and never disturb neighbors.
            fn point_ops_on_versioned_records() -> CResult<()> {
                use crate::mvcc::key::mvcc_encode;
                use crate::mvcc::{Lock, LockType, Write, WriteType, LOCK_VER};

                let mut engine = $setup;
                let lock_key = mvcc_encode(b"acct", LOCK_VER);
                let write_key = mvcc_encode(b"acct", 20);

                assert_eq!(engine.get(&lock_key)?, None);

                // Store what prewrite and commit would: a lock record at the
                // reserved version and a committed write at its commit_ts.
                let lock = Lock {
                    start_ts: 10,
                    primary: b"acct".to_vec(),
                    value: b"99".to_vec(),
                    op: LockType::Put,
                    ttl: 0,
                };
                engine.set(&lock_key, lock.encode()?)?;
                let write = Write {
                    write_type: WriteType::Put,
                    start_ts: 10,
                    commit_ts: 20,
                    value: b"99".to_vec(),
                };
                engine.set(&write_key, write.encode()?)?;

                assert_eq!(engine.get(&lock_key)?, Some(lock.encode()?));
                assert_eq!(Write::decode(&engine.get(&write_key)?.unwrap())?, write);

                // Overwrite the write record with a rollback marker.
                let rolled = Write::rollback(10);
                engine.set(&write_key, rolled.encode()?)?;
                assert_eq!(engine.get(&write_key)?, Some(rolled.encode()?));

                // Dropping the lock leaves the write record alone, twice.
                engine.delete(&lock_key)?;
                assert_eq!(engine.get(&lock_key)?, None);
                engine.delete(&lock_key)?;
                assert_eq!(engine.get(&lock_key)?, None);
                assert_eq!(engine.get(&write_key)?, Some(rolled.encode()?));

                Ok(())
            }

            #[test]
            /// The engine itself puts no constraints on keys or values; the
            /// empty key and the empty value are both legal.
            fn empty_keys_and_values_are_valid() -> CResult<()> {
                let mut engine = $setup;
                assert_eq!(engine.get(b"")?, None);
                engine.set(b"", vec![])?;
                assert_eq!(engine.get(b"")?, Some(vec![]));
                engine.delete(b"")?;
                assert_eq!(engine.get(b"")?, None);
                Ok(())
            }

            #[test]
            /// Values from a few bytes up to a megabyte round-trip intact.
            fn values_up_to_a_megabyte() -> CResult<()> {
                use crate::mvcc::key::mvcc_encode;

                let mut engine = $setup;
                for shift in [4, 10, 16, 20] {
                    let value = vec![0xab; 1 << shift];
                    let key = mvcc_encode(format!("blob{}", shift).as_bytes(), 5);
                    engine.set(&key, value.clone())?;
                    assert_eq!(engine.get(&key)?, Some(value));
                    engine.delete(&key)?;
                    assert_eq!(engine.get(&key)?, None);
                }
                Ok(())
            }

            #[test]
            /// write_batch applies every put and delete it is handed. The
            /// batch here is the shape commit emits: install the committed
            /// version, release the lock.
            fn write_batch_applies_commit_shaped_batches() -> CResult<()> {
                use crate::mvcc::key::mvcc_encode;
                use crate::mvcc::LOCK_VER;

                let mut engine = $setup;
                engine.set(&mvcc_encode(b"acct", LOCK_VER), b"acct-lock".to_vec())?;

                engine.write_batch(vec![
                    Modify::Put(mvcc_encode(b"acct", 20), b"acct@20".to_vec()),
                    Modify::Delete(mvcc_encode(b"acct", LOCK_VER)),
                    Modify::Delete(mvcc_encode(b"gone", LOCK_VER)),
                ])?;

                assert_scan(
                    engine.scan(..),
                    &[(mvcc_encode(b"acct", 20), b"acct@20".to_vec())],
                )?;
                Ok(())
            }

            #[test]
            /// The ordering every MVCC read depends on: within one user key
            /// the lock position comes first and versions run newest to
            /// oldest, and one [lock(k), lock(next)) range isolates exactly
            /// that user key's records.
            fn versioned_keys_scan_lock_first_newest_first() -> CResult<()> {
                use crate::mvcc::key::mvcc_encode;
                use crate::mvcc::LOCK_VER;

                let mut engine = $setup;

                // Written out of key order on purpose.
                engine.set(&mvcc_encode(b"acct", 30), b"acct@30".to_vec())?;
                engine.set(&mvcc_encode(b"acct", LOCK_VER), b"acct-lock".to_vec())?;
                engine.set(&mvcc_encode(b"bill", 25), b"bill@25".to_vec())?;
                engine.set(&mvcc_encode(b"acct", 10), b"acct@10".to_vec())?;

                let expect = vec![
                    (mvcc_encode(b"acct", LOCK_VER), b"acct-lock".to_vec()),
                    (mvcc_encode(b"acct", 30), b"acct@30".to_vec()),
                    (mvcc_encode(b"acct", 10), b"acct@10".to_vec()),
                    (mvcc_encode(b"bill", 25), b"bill@25".to_vec()),
                ];
                assert_scan(engine.scan(..), &expect)?;

                // Reverse iteration walks the same records back to front.
                let mut reversed = expect.clone();
                reversed.reverse();
                assert_scan(engine.scan(..).rev(), &reversed)?;

                // The range from acct's lock up to bill's lock is all of
                // acct and nothing else.
                assert_scan(
                    engine.scan(
                        mvcc_encode(b"acct", LOCK_VER)..mvcc_encode(b"bill", LOCK_VER),
                    ),
                    &expect[..3],
                )?;

                // Dynamic dispatch sees the same records.
                assert_scan(
                    engine.scan_dyn((
                        std::ops::Bound::Included(mvcc_encode(b"bill", LOCK_VER)),
                        std::ops::Bound::Unbounded,
                    )),
                    &expect[3..],
                )?;
                Ok(())
            }

            #[test]
            /// The encoded user key is a shared prefix of all of its
            /// versioned records and of no other user key's, so a prefix
            /// scan selects exactly one user key.
            fn prefix_scan_selects_one_user_key() -> CResult<()> {
                use crate::codec::bytes::encode_bytes;
                use crate::mvcc::key::mvcc_encode;
                use crate::mvcc::LOCK_VER;

                let mut engine = $setup;
                engine.set(&mvcc_encode(b"k", LOCK_VER), b"k-lock".to_vec())?;
                engine.set(&mvcc_encode(b"k", 7), b"k@7".to_vec())?;
                engine.set(&mvcc_encode(b"kk", 7), b"kk@7".to_vec())?;

                let mut prefix = Vec::new();
                encode_bytes(&mut prefix, b"k");
                assert_scan(
                    engine.scan_prefix(&prefix),
                    &[
                        (mvcc_encode(b"k", LOCK_VER), b"k-lock".to_vec()),
                        (mvcc_encode(b"k", 7), b"k@7".to_vec()),
                    ],
                )?;

                // An 8-byte user key fills its group, so the encoded form
                // ends the first group with the 0xff marker; a prefix cut
                // there still terminates correctly.
                let full_group = mvcc_encode(b"balances", 3);
                engine.set(&full_group, b"balances@3".to_vec())?;
                assert_scan(
                    engine.scan_prefix(&full_group[..9]),
                    &[(full_group.clone(), b"balances@3".to_vec())],
                )?;
                Ok(())
            }

            #[test]
            /// Randomized sets, deletes, gets and scans over a pool of
            /// versioned keys, checked against a BTreeMap model.
            fn random_ops_match_btreemap() -> CResult<()> {
                use rand::{Rng, RngCore, SeedableRng};

                let seed: u64 = rand::thread_rng().gen();
                let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
                println!("seed = {}", seed);

                let mut engine = $setup;
                let mut model = std::collections::BTreeMap::<Vec<u8>, Vec<u8>>::new();

                // A small pool of user keys and versions, so overwrites and
                // deletes hit existing records often.
                let users: Vec<Vec<u8>> =
                    (0..12).map(|i| format!("user{}", i).into_bytes()).collect();
                let random_key = |rng: &mut rand::rngs::StdRng| -> Vec<u8> {
                    let user = &users[rng.gen_range(0..users.len())];
                    crate::mvcc::key::mvcc_encode(user, rng.gen_range(0..8u64) * 10)
                };

                for _ in 0..1000 {
                    match rng.gen_range(0..4) {
                        // Sets twice as often as deletes, so the store grows.
                        0 | 1 => {
                            let key = random_key(&mut rng);
                            let mut value = vec![0; rng.gen_range(0..=24)];
                            rng.fill_bytes(&mut value);
                            engine.set(&key, value.clone())?;
                            model.insert(key, value);
                        }
                        2 => {
                            let key = random_key(&mut rng);
                            engine.delete(&key)?;
                            model.remove(&key);
                        }
                        _ => {
                            let key = random_key(&mut rng);
                            assert_eq!(engine.get(&key)?, model.get(&key).cloned());
                        }
                    }
                }

                // A ranged scan and the final full state agree with the model.
                let (a, b) = (random_key(&mut rng), random_key(&mut rng));
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                assert_eq!(
                    engine.scan(lo.clone()..hi.clone()).collect::<CResult<Vec<_>>>()?,
                    model
                        .range(lo..hi)
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect::<Vec<_>>()
                );
                assert_eq!(
                    engine.scan(..).collect::<CResult<Vec<_>>>()?,
                    model.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Vec<_>>()
                );
                Ok(())
            }

            #[test]
            /// status() counts only live records: released locks and
            /// replaced versions no longer contribute to keys or size.
            fn status_reflects_live_records() -> CResult<()> {
                use crate::mvcc::key::mvcc_encode;
                use crate::mvcc::LOCK_VER;

                let mut engine = $setup;
                let mut live = std::collections::BTreeMap::new();

                let records: [(&[u8], u64, &[u8]); 3] = [
                    (b"acct", 20, b"acct@20"),
                    (b"acct", 10, b"acct@10"),
                    (b"bill", 25, b"bill@25"),
                ];
                for (user, ver, value) in records {
                    let key = mvcc_encode(user, ver);
                    engine.set(&key, value.to_vec())?;
                    live.insert(key, value.to_vec());
                }

                // A lock that was taken and released, and a version that was
                // replaced by a newer record under the same physical key.
                engine.set(&mvcc_encode(b"bill", LOCK_VER), b"bill-lock".to_vec())?;
                engine.delete(&mvcc_encode(b"bill", LOCK_VER))?;
                let replaced = mvcc_encode(b"acct", 10);
                engine.set(&replaced, b"acct@10+".to_vec())?;
                live.insert(replaced, b"acct@10+".to_vec());

                let status = engine.status()?;
                assert!(!status.name.is_empty());
                assert_eq!(status.keys, live.len() as u64);
                assert_eq!(
                    status.size,
                    live.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum::<u64>()
                );
                Ok(())
            }
        };
    }

    pub(super) use test_engine; // export for use in submodules
}
