//! BER length and integer primitives
//!
//! | Item     | Encoding emitted                          | Accepted on decode            |
//! |----------|-------------------------------------------|-------------------------------|
//! | length   | short form below 128, else minimal long   | short or long form, ≤ 4 octets|
//! | INTEGER  | minimal two's complement, big-endian      | 1..=8 content octets          |
//! | BOOLEAN  | 0xff / 0x00                               | any non-zero is true          |
//!
//! Decoding accepts non-minimal long-form lengths because several directory
//! servers always emit four length octets.

use crate::error::{BerError, Result};
use bytes::BufMut;

/// Maximum number of long-form length octets accepted
pub const MAX_LENGTH_OCTETS: usize = 4;

/// Write a definite length in minimal form
pub fn put_length<B: BufMut>(buf: &mut B, length: usize) {
    if length < 0x80 {
        buf.put_u8(length as u8);
        return;
    }
    let bytes = (length as u64).to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    buf.put_u8(0x80 | significant.len() as u8);
    buf.put_slice(significant);
}

/// Number of octets `put_length` emits for `length`
pub fn length_size(length: usize) -> usize {
    if length < 0x80 {
        1
    } else {
        let bits = usize::BITS - length.leading_zeros();
        1 + bits.div_ceil(8) as usize
    }
}

/// Read a definite length starting at `data[0]`.
///
/// Returns `(length, octets consumed)`. `offset` is the absolute position of
/// `data[0]`, used for error reporting only.
pub fn read_length(data: &[u8], offset: usize) -> Result<(usize, usize)> {
    let first = *data.first().ok_or(BerError::Truncated {
        offset,
        needed: 1,
        have: 0,
    })?;
    if first < 0x80 {
        return Ok((first as usize, 1));
    }
    let count = (first & 0x7f) as usize;
    if count == 0 || count > MAX_LENGTH_OCTETS {
        // 0x80 is the indefinite form, which LDAP forbids
        return Err(BerError::InvalidLength { offset });
    }
    if data.len() < 1 + count {
        return Err(BerError::Truncated {
            offset,
            needed: 1 + count,
            have: data.len(),
        });
    }
    let length = data[1..=count]
        .iter()
        .fold(0usize, |acc, b| (acc << 8) | *b as usize);
    Ok((length, 1 + count))
}

/// Minimal two's-complement big-endian content octets for `value`
pub fn integer_octets(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Decode two's-complement big-endian content octets
pub fn read_integer(content: &[u8], offset: usize) -> Result<i64> {
    if content.is_empty() {
        return Err(BerError::InvalidValue {
            offset,
            reason: "zero-length INTEGER".to_string(),
        });
    }
    if content.len() > 8 {
        return Err(BerError::IntegerOverflow { offset });
    }
    let negative = content[0] & 0x80 != 0;
    let mut value: i64 = if negative { -1 } else { 0 };
    for b in content {
        value = (value << 8) | *b as i64;
    }
    Ok(value)
}

/// Inspect the start of a buffer and report the total size of the first
/// complete TLV element.
///
/// Returns `Ok(None)` when the identifier or length octets are not complete
/// yet; the returned size may exceed `data.len()`, in which case the caller
/// must keep reading.
pub fn frame_length(data: &[u8]) -> Result<Option<usize>> {
    if data.len() < 2 {
        return Ok(None);
    }
    match read_length(&data[1..], 1) {
        Ok((length, consumed)) => Ok(Some(1 + consumed + length)),
        Err(BerError::Truncated { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}
