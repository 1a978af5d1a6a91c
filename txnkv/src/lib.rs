//! `txnkv` is a single-node transactional key-value store. It layers a
//! Percolator-style two-phase commit protocol on top of an ordered,
//! byte-keyed storage engine: clients prewrite, commit, roll back and
//! resolve transactions against an embedded store, and reads resolve a
//! consistent snapshot at their timestamp. [Author fengyang]
//!
//! Keys, versions, locks and commit markers all live in one sorted keyspace,
//! so a single forward scan serves every operation. The storage engine is
//! pluggable: a BTreeMap engine for tests and development, and an
//! append-only log file engine for persistence.
//!
//! ## Getting started
//!
//! ```rust
//! use txnkv::error::CResult;
//! use txnkv::mvcc::{IsolationLevel, Mutation, MvccStore};
//!
//! fn main() -> CResult<()> {
//!     let store = MvccStore::new_in_memory();
//!
//!     // First phase: lock every key at the transaction's start timestamp.
//!     let mutations = vec![Mutation::Put(b"k".to_vec(), b"v".to_vec())];
//!     for result in store.prewrite(&mutations, b"k", 10, 3000)? {
//!         result?;
//!     }
//!
//!     // Second phase: make the writes visible at the commit timestamp.
//!     store.commit(&[b"k".to_vec()], 10, 20)?;
//!
//!     // Reads see the committed value only at or after the commit timestamp.
//!     assert_eq!(store.get(b"k", 25, IsolationLevel::Si)?, Some(b"v".to_vec()));
//!     assert_eq!(store.get(b"k", 15, IsolationLevel::Si)?, None);
//!
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod mvcc;
pub mod storage;
