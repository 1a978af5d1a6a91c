use crate::codec::{bytes, number};
use crate::error::{CResult, Error};
use crate::mvcc::Version;

/// Builds the physical key for (user key, version): the memcomparable
/// encoding of the user key followed by the descending version.
///
/// The encoding gives a forward scan from `mvcc_encode(key, LOCK_VER)` the
/// shape every read relies on: the lock record first (if any), then value
/// records newest first, then the next user key.
pub fn mvcc_encode(key: &[u8], ver: Version) -> Vec<u8> {
    let mut buf = Vec::with_capacity(bytes::encoded_size(key.len()) + 8);
    bytes::encode_bytes(&mut buf, key);
    number::encode_u64_desc(&mut buf, ver);
    buf
}

/// Splits a physical key back into (user key, version).
///
/// A key with nothing after the user-key part decodes with version 0 (the
/// meta-key form used as a scan bound); a key with exactly 8 remaining bytes
/// decodes the descending version; anything else is corruption.
pub fn mvcc_decode(data: &[u8]) -> CResult<(Vec<u8>, Version)> {
    let mut remain = data;
    let key = bytes::decode_bytes(&mut remain).map_err(|_| Error::InvalidEncodedKey)?;
    if remain.is_empty() {
        return Ok((key, 0));
    }
    if remain.len() != 8 {
        return Err(Error::InvalidEncodedKey);
    }
    let ver = number::decode_u64_desc(&mut remain).map_err(|_| Error::InvalidEncodedKey)?;
    Ok((key, ver))
}

#[cfg(test)]
mod tests {
    use crate::mvcc::LOCK_VER;

    use super::*;

    #[test]
    fn roundtrip() -> CResult<()> {
        let keys: Vec<&[u8]> = vec![b"", b"a", b"abcdefgh", b"abcdefghi", b"\x00\xff"];
        for key in keys {
            for ver in [0, 1, 7, 1 << 33, LOCK_VER - 1, LOCK_VER] {
                assert_eq!(mvcc_decode(&mvcc_encode(key, ver))?, (key.to_vec(), ver));
            }
        }
        Ok(())
    }

    #[test]
    fn meta_key_form() -> CResult<()> {
        let mut buf = Vec::new();
        crate::codec::bytes::encode_bytes(&mut buf, b"meta");
        assert_eq!(mvcc_decode(&buf)?, (b"meta".to_vec(), 0));
        Ok(())
    }

    #[test]
    fn invalid_remainder() {
        // A truncated or over-long version suffix is corruption.
        let mut buf = mvcc_encode(b"k", 7);
        buf.pop();
        assert_eq!(mvcc_decode(&buf), Err(Error::InvalidEncodedKey));
        let mut buf = mvcc_encode(b"k", 7);
        buf.push(0);
        assert_eq!(mvcc_decode(&buf), Err(Error::InvalidEncodedKey));
        assert_eq!(mvcc_decode(b"\x01\x02"), Err(Error::InvalidEncodedKey));
    }

    #[test]
    fn ordering() {
        // All physical keys of a smaller user key precede all physical keys
        // of a larger one, regardless of version.
        assert!(mvcc_encode(b"a", 0) < mvcc_encode(b"b", LOCK_VER));
        assert!(mvcc_encode(b"a", LOCK_VER) < mvcc_encode(b"aa", 0));
        assert!(mvcc_encode(b"", 0) < mvcc_encode(b"\x00", LOCK_VER));

        // Within one user key, versions sort descending: the lock first,
        // then newer commits before older ones.
        assert!(mvcc_encode(b"k", LOCK_VER) < mvcc_encode(b"k", 20));
        assert!(mvcc_encode(b"k", 20) < mvcc_encode(b"k", 10));
        assert!(mvcc_encode(b"k", 10) < mvcc_encode(b"k", 0));
    }
}
