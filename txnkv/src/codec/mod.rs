//! Order-preserving byte codecs for physical keys.
//!
//! `bytes` encodes arbitrary byte strings so that the encoded form compares
//! the same as the raw form even when more data is appended after it;
//! `number` encodes u64 values in ascending or descending order.

pub mod bytes;
pub mod number;
