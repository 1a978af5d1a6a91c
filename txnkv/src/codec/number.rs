use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;

use crate::error::{CResult, Error};

/// Appends a u64 in big-endian order, comparing ascending.
pub fn encode_u64(buf: &mut Vec<u8>, v: u64) {
    buf.put_u64(v);
}

/// Appends the bitwise complement of a u64 in big-endian order, so that
/// larger values sort first.
pub fn encode_u64_desc(buf: &mut Vec<u8>, v: u64) {
    buf.put_u64(!v);
}

/// Consumes 8 bytes from the front of `data` and decodes an ascending u64.
pub fn decode_u64(data: &mut &[u8]) -> CResult<u64> {
    data.read_u64::<BigEndian>()
        .map_err(|_| Error::Internal("insufficient bytes to decode u64".to_string()))
}

/// Consumes 8 bytes from the front of `data` and decodes a descending u64.
pub fn decode_u64_desc(data: &mut &[u8]) -> CResult<u64> {
    Ok(!decode_u64(data)?)
}
