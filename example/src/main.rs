use txnkv::error::Error;
use txnkv::mvcc::{IsolationLevel, Mutation, MvccStore};

fn main() {
    println!("Hello, txnkv!");

    run().unwrap();

    println!("Bye~");
}

fn run() -> Result<(), Error> {
    let dir = tempdir::TempDir::new("txnkv")?;
    let store = MvccStore::open(dir.path().join("kvdb"))?;

    // Two-phase commit: lock both keys at the start timestamp, then make
    // them visible at the commit timestamp.
    let mutations = vec![
        Mutation::Put(b"a".to_vec(), b"1".to_vec()),
        Mutation::Put(b"b".to_vec(), b"2".to_vec()),
    ];
    for result in store.prewrite(&mutations, b"a", 10, 3000)? {
        result?;
    }
    store.commit(&[b"a".to_vec(), b"b".to_vec()], 10, 20)?;

    // A snapshot after the commit sees both keys, a snapshot before sees
    // neither.
    println!("a @25 = {:?}", store.get(b"a", 25, IsolationLevel::Si)?);
    assert_eq!(store.get(b"a", 15, IsolationLevel::Si)?, None);

    let pairs = store.scan(b"", b"", 10, 25, IsolationLevel::Si)?;
    for pair in &pairs {
        println!("{} = {:?}", String::from_utf8_lossy(&pair.key), pair.value);
    }
    assert_eq!(pairs.len(), 2);

    // A rolled-back transaction leaves nothing behind.
    for result in store.prewrite(&[Mutation::Put(b"c".to_vec(), b"3".to_vec())], b"c", 30, 3000)? {
        result?;
    }
    store.rollback(&[b"c".to_vec()], 30)?;
    assert_eq!(store.get(b"c", 40, IsolationLevel::Si)?, None);

    store.flush()?;

    Ok(())
}
