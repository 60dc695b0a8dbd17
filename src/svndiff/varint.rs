// svndiff variable-length integer encoding.
//
// Big-endian groups of 7 bits, most-significant group first.  Every byte
// except the last has bit 7 set.  Values are sizes and offsets, so the
// codec works on `u64` throughout and narrows at the call site.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Maximum encoded length for a 64-bit value (ceil(64/7) = 10).
pub const MAX_VARINT_LEN: usize = 10;

/// Overflow guard: if these bits are set before a shift, the next `<< 7`
/// would lose data.
const U64_OVERFLOW_MASK: u64 = 0xFE00_0000_0000_0000;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VarIntError {
    /// The input ended before a terminating (high-bit-clear) byte.
    #[error("varint underflow (truncated input)")]
    Underflow,
    /// The value does not fit in 64 bits.
    #[error("varint overflow")]
    Overflow,
}

impl From<VarIntError> for io::Error {
    fn from(e: VarIntError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `num` into the tail of `buf`.  Returns the number of bytes used;
/// the encoding is `buf[MAX_VARINT_LEN - len..]`.
#[inline]
pub fn encode_u64(mut num: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = MAX_VARINT_LEN;
    loop {
        i -= 1;
        buf[i] = (num as u8 & 0x7F) | 0x80;
        num >>= 7;
        if num == 0 {
            break;
        }
    }
    buf[MAX_VARINT_LEN - 1] &= 0x7F; // clear MSB on last byte
    MAX_VARINT_LEN - i
}

/// Encode `value` into a fresh byte vector.
pub fn encode(value: u64) -> Vec<u8> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(value, &mut buf);
    buf[MAX_VARINT_LEN - len..].to_vec()
}

/// Append the encoding of `num` to `out`.
#[inline]
pub fn push_u64(out: &mut Vec<u8>, num: u64) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(num, &mut buf);
    out.extend_from_slice(&buf[MAX_VARINT_LEN - len..]);
}

/// Encode a `u64` and write it to a `Write` sink.
pub fn write_u64<W: Write>(w: &mut W, num: u64) -> io::Result<()> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(num, &mut buf);
    w.write_all(&buf[MAX_VARINT_LEN - len..])
}

// ---------------------------------------------------------------------------
// Decoding from byte slices
// ---------------------------------------------------------------------------

/// Decode a `u64` from the start of `data`.
/// Returns `(value, bytes_consumed)`.
pub fn read_u64(data: &[u8]) -> Result<(u64, usize), VarIntError> {
    try_read_u64(data)?.ok_or(VarIntError::Underflow)
}

/// Like [`read_u64`], but a truncated integer yields `Ok(None)` so that
/// incremental parsers can wait for more input.
pub fn try_read_u64(data: &[u8]) -> Result<Option<(u64, usize)>, VarIntError> {
    let mut val: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if val & U64_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok(Some((val, i + 1)));
        }
    }
    Ok(None)
}

/// Decode the integer starting at `bytes[start]`.
/// Returns `(value, bytes_consumed)`.
pub fn decode(bytes: &[u8], start: usize) -> Result<(u64, usize), VarIntError> {
    read_u64(bytes.get(start..).unwrap_or(&[]))
}

/// Decode a `usize`, rejecting values that do not fit the platform width.
pub fn read_usize(data: &[u8]) -> Result<(usize, usize), VarIntError> {
    let (val, len) = read_u64(data)?;
    let val = usize::try_from(val).map_err(|_| VarIntError::Overflow)?;
    Ok((val, len))
}

// ---------------------------------------------------------------------------
// Decoding from `Read` (blocking)
// ---------------------------------------------------------------------------

/// Read a `u64` varint from a blocking source.
pub fn stream_read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut val: u64 = 0;
    let mut buf = [0u8; 1];
    loop {
        r.read_exact(&mut buf)?;
        let byte = buf[0];
        if val & U64_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow.into());
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok(val);
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Encoded byte-length of `num`.
#[inline]
pub fn sizeof_u64(num: u64) -> usize {
    let bits = 64 - num.leading_zeros();
    (bits.max(1).div_ceil(7) as usize).min(MAX_VARINT_LEN)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_boundaries() {
        let cases: &[u64] = &[
            0,
            1,
            127,
            128,
            129,
            (1 << 14) - 1,
            1 << 14,
            1 << 21,
            u32::MAX as u64,
            u64::MAX,
        ];
        for &val in cases {
            let bytes = encode(val);
            let (decoded, consumed) = decode(&bytes, 0).unwrap();
            assert_eq!(decoded, val, "roundtrip failed for {val}");
            assert_eq!(consumed, bytes.len(), "length mismatch for {val}");
            assert_eq!(sizeof_u64(val), bytes.len(), "sizeof mismatch for {val}");
        }
    }

    #[test]
    fn encoding_is_big_endian() {
        // 300 = 0b100101100 = two groups: (10) (0101100) = 0x82 0x2C
        assert_eq!(encode(300), vec![0x82, 0x2C]);
        assert_eq!(encode(128), vec![0x81, 0x00]);
        assert_eq!(encode(1 << 14), vec![0x81, 0x80, 0x00]);
    }

    #[test]
    fn single_byte_values() {
        for val in 0..=127u64 {
            assert_eq!(encode(val), vec![val as u8]);
        }
    }

    #[test]
    fn decode_at_offset() {
        let mut data = vec![0xFF, 0xFF];
        data.extend(encode(1 << 21));
        let (val, used) = decode(&data, 2).unwrap();
        assert_eq!(val, 1 << 21);
        assert_eq!(used, 4);
    }

    #[test]
    fn underflow_detection() {
        let data = [0x80, 0x80, 0x80];
        assert_eq!(read_u64(&data), Err(VarIntError::Underflow));
        assert_eq!(try_read_u64(&data), Ok(None));
        assert_eq!(decode(&data, 10), Err(VarIntError::Underflow));
        assert_eq!(decode(&[], 0), Err(VarIntError::Underflow));
    }

    #[test]
    fn overflow_detection() {
        let data = [0xFF; 11];
        assert_eq!(read_u64(&data), Err(VarIntError::Overflow));
    }

    #[test]
    fn streaming_roundtrip() {
        let bytes = encode(123_456_789);
        let mut cursor = std::io::Cursor::new(bytes);
        assert_eq!(stream_read_u64(&mut cursor).unwrap(), 123_456_789);
    }

    #[test]
    fn write_read_roundtrip() {
        let mut out = Vec::new();
        write_u64(&mut out, 999_999).unwrap();
        push_u64(&mut out, 5);
        let (val, len) = read_u64(&out).unwrap();
        assert_eq!(val, 999_999);
        assert_eq!(read_usize(&out[len..]).unwrap(), (5, 1));
    }
}
