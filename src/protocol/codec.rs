//! Fixed-width field decoding.
//!
//! All multi-byte integers on the band are little-endian. Every function
//! checks the length up front and reports `DecodeError::Truncated` instead
//! of indexing past the end of the payload.

use bytes::Buf;

use crate::data::TimeReading;
use crate::error::DecodeError;

/// Size of an encoded timestamp: year (u16) + month, day, hour, minute, second.
pub const TIMESTAMP_LEN: usize = 7;

/// Borrow `len` bytes starting at `offset`.
pub fn field(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], DecodeError> {
    let end = offset + len;
    bytes.get(offset..end).ok_or(DecodeError::Truncated {
        needed: end,
        actual: bytes.len(),
    })
}

/// Read a single byte at `offset`.
pub fn decode_u8(bytes: &[u8], offset: usize) -> Result<u8, DecodeError> {
    field(bytes, offset, 1).map(|b| b[0])
}

/// Decode a little-endian u16 from the first 2 bytes.
pub fn decode_u16_le(bytes: &[u8]) -> Result<u16, DecodeError> {
    let mut buf = field(bytes, 0, 2)?;
    Ok(buf.get_u16_le())
}

/// Decode a little-endian u32 from the first 4 bytes.
pub fn decode_u32_le(bytes: &[u8]) -> Result<u32, DecodeError> {
    let mut buf = field(bytes, 0, 4)?;
    Ok(buf.get_u32_le())
}

/// Decode a timestamp from the first 7 bytes.
///
/// Layout:
/// - Bytes 0-1: Year (u16 little-endian)
/// - Byte 2: Month (1-12)
/// - Byte 3: Day (1-31)
/// - Byte 4: Hour
/// - Byte 5: Minute
/// - Byte 6: Second
pub fn decode_timestamp(bytes: &[u8]) -> Result<TimeReading, DecodeError> {
    let mut buf = field(bytes, 0, TIMESTAMP_LEN)?;

    let year = buf.get_u16_le();
    let month = buf.get_u8();
    let day = buf.get_u8();
    let hour = buf.get_u8();
    let minute = buf.get_u8();
    let second = buf.get_u8();

    Ok(TimeReading::new(year, month, day, hour, minute, second))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_u32_le() {
        assert_eq!(decode_u32_le(&[0x0A, 0x00, 0x00, 0x00]), Ok(10));
        assert_eq!(decode_u32_le(&[0x78, 0x56, 0x34, 0x12, 0xFF]), Ok(0x1234_5678));
    }

    #[test]
    fn test_decode_u32_le_truncated() {
        assert_eq!(
            decode_u32_le(&[0x01, 0x02, 0x03]),
            Err(DecodeError::Truncated {
                needed: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_decode_u16_le() {
        assert_eq!(decode_u16_le(&[0xE1, 0x07]), Ok(2017));
        assert!(decode_u16_le(&[0xE1]).is_err());
    }

    #[test]
    fn test_field_bounds() {
        let data = [1, 2, 3, 4, 5];
        assert_eq!(field(&data, 1, 3), Ok(&data[1..4]));
        assert_eq!(
            field(&data, 3, 3),
            Err(DecodeError::Truncated {
                needed: 6,
                actual: 5
            })
        );
        assert_eq!(decode_u8(&data, 4), Ok(5));
        assert!(decode_u8(&data, 5).is_err());
    }

    #[test]
    fn test_decode_timestamp() {
        // 2017-11-28 14:05:09
        let data = [0xE1, 0x07, 11, 28, 14, 5, 9];
        let time = decode_timestamp(&data).unwrap();

        assert_eq!(time.year, 2017);
        assert_eq!(time.month, 11);
        assert_eq!(time.day, 28);
        assert_eq!(time.hour, 14);
        assert_eq!(time.minute, 5);
        assert_eq!(time.second, 9);
        assert_eq!(time.weekday, Some(Weekday::Tue));
    }

    #[test]
    fn test_decode_timestamp_truncated() {
        assert_eq!(
            decode_timestamp(&[0xE1, 0x07, 11, 28, 14, 5]),
            Err(DecodeError::Truncated {
                needed: 7,
                actual: 6
            })
        );
    }
}
