use bytes::BufMut;

use crate::error::{CResult, Error};

// Keys are encoded in groups of 8 bytes. Each group is followed by a marker
// byte recording how many pad bytes the group carries; a full group takes the
// plain marker and the encoding continues with the next group. The final
// group is padded with zeros, so the terminator is always present even for
// keys whose length is a multiple of the group size.
const ENC_GROUP_SIZE: usize = 8;
const ENC_MARKER: u8 = 0xff;
const ENC_PAD: u8 = 0x00;

/// The size of `data` once encoded with [`encode_bytes`].
pub fn encoded_size(data_len: usize) -> usize {
    (data_len / ENC_GROUP_SIZE + 1) * (ENC_GROUP_SIZE + 1)
}

/// Appends a memcomparable encoding of `data`.
///
/// The encoded form compares bytewise exactly like the raw form, but is
/// self-terminating: more bytes may be appended after it (e.g. a version
/// suffix) without disturbing the ordering of the key part.
pub fn encode_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    let mut idx = 0;
    buf.reserve(encoded_size(len));
    while idx <= len {
        let remain = len - idx;
        if remain >= ENC_GROUP_SIZE {
            buf.put_slice(&data[idx..idx + ENC_GROUP_SIZE]);
            buf.put_u8(ENC_MARKER);
        } else {
            buf.put_slice(&data[idx..]);
            for _ in 0..ENC_GROUP_SIZE - remain {
                buf.put_u8(ENC_PAD);
            }
            buf.put_u8(ENC_MARKER - (ENC_GROUP_SIZE - remain) as u8);
        }
        idx += ENC_GROUP_SIZE;
    }
}

/// Consumes one encoded byte string from the front of `data` and returns the
/// decoded form. Fails on truncated groups, out-of-range markers, and
/// non-zero padding.
pub fn decode_bytes(data: &mut &[u8]) -> CResult<Vec<u8>> {
    let mut key = Vec::with_capacity(data.len() / (ENC_GROUP_SIZE + 1) * ENC_GROUP_SIZE);
    loop {
        if data.len() < ENC_GROUP_SIZE + 1 {
            return Err(Error::Internal("insufficient bytes to decode key".to_string()));
        }
        let (group, marker) = (&data[..ENC_GROUP_SIZE], data[ENC_GROUP_SIZE]);
        let pad = (ENC_MARKER - marker) as usize;
        if pad > ENC_GROUP_SIZE {
            return Err(Error::Internal(format!("invalid key group marker {:#04x}", marker)));
        }
        key.extend_from_slice(&group[..ENC_GROUP_SIZE - pad]);
        if group[ENC_GROUP_SIZE - pad..].iter().any(|&b| b != ENC_PAD) {
            return Err(Error::Internal("invalid key padding".to_string()));
        }
        *data = &data[ENC_GROUP_SIZE + 1..];
        if pad > 0 {
            return Ok(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_bytes(&mut buf, data);
        buf
    }

    #[test]
    fn group_layout() {
        // One group with 7 pad bytes, marker 0xff - 7.
        assert_eq!(hex::encode(encode(b"a")), "6100000000000000f8");
        // Empty keys take a full pad group.
        assert_eq!(hex::encode(encode(b"")), "0000000000000000f7");
        // An 8-byte key continues into a terminator group.
        assert_eq!(hex::encode(encode(b"abcdefgh")), "6162636465666768ff0000000000000000f7");
    }

    #[test]
    fn roundtrip() -> CResult<()> {
        let cases: Vec<&[u8]> = vec![
            b"",
            b"a",
            b"1234567",
            b"12345678",
            b"123456789",
            b"0123456789abcdef",
            b"\x00",
            b"\x00\x00",
            b"\xff\xff\xff\xff\xff\xff\xff\xff\xff",
        ];
        for case in cases {
            let mut buf = encode(case);
            // A version suffix after the key must survive decoding.
            buf.extend_from_slice(&[1, 2, 3]);
            let mut data = buf.as_slice();
            assert_eq!(decode_bytes(&mut data)?, case);
            assert_eq!(data, &[1, 2, 3]);
            assert_eq!(encode(case).len(), encoded_size(case.len()));
        }
        Ok(())
    }

    #[test]
    fn ordering() {
        // Bytewise order of encoded keys matches the raw order, even when
        // one key is a prefix of the other.
        let cases: Vec<(&[u8], &[u8])> = vec![
            (b"", b"\x00"),
            (b"a", b"b"),
            (b"a", b"aa"),
            (b"abcdefgh", b"abcdefgh\x00"),
            (b"abcdefgh", b"abcdefg\xff"),
            (b"\x00", b"\x00\x00"),
        ];
        for (a, b) in cases {
            assert!(a < b);
            assert!(encode(a) < encode(b), "{:?} vs {:?}", a, b);
        }
    }

    #[test]
    fn corrupt_input() {
        // Truncated group.
        let mut data = &encode(b"abc")[..5];
        assert!(decode_bytes(&mut data).is_err());
        // Marker below the valid range.
        let mut buf = encode(b"abc");
        let last = buf.len() - 1;
        buf[last] = 0xf0;
        let mut data = buf.as_slice();
        assert!(decode_bytes(&mut data).is_err());
        // Non-zero padding.
        let mut buf = encode(b"abc");
        buf[6] = 1;
        let mut data = buf.as_slice();
        assert!(decode_bytes(&mut data).is_err());
    }
}
