//! Primitive MQTT data representations: variable byte integers, UTF-8 strings
//! and binary data, each length-prefixed as the v5.0 wire format requires.

use crate::constants::MAX_REMAINING_LENGTH;
use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut, Bytes};

pub fn encode_variable_int<B: BufMut>(buf: &mut B, mut value: u32) -> Result<()> {
    if value > MAX_REMAINING_LENGTH {
        return Err(MqttError::MalformedPacket(format!(
            "Variable byte integer {value} exceeds maximum {MAX_REMAINING_LENGTH}"
        )));
    }

    loop {
        #[allow(clippy::cast_possible_truncation)]
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            return Ok(());
        }
    }
}

pub fn decode_variable_int<B: Buf>(buf: &mut B) -> Result<u32> {
    let mut value = 0u32;
    let mut shift = 0u32;

    for _ in 0..4 {
        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "Truncated variable byte integer".to_string(),
            ));
        }
        let byte = buf.get_u8();
        value |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }

    Err(MqttError::MalformedPacket(
        "Variable byte integer longer than 4 bytes".to_string(),
    ))
}

/// Peeks a variable byte integer at the start of `bytes` without consuming.
///
/// `Ok(None)` means the encoding is incomplete; `Ok(Some((value, len)))` returns the
/// value and the number of bytes it occupied.
pub fn peek_variable_int(bytes: &[u8]) -> Result<Option<(u32, usize)>> {
    let mut value = 0u32;

    for (i, &byte) in bytes.iter().take(4).enumerate() {
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }

    if bytes.len() >= 4 {
        return Err(MqttError::MalformedPacket(
            "Variable byte integer longer than 4 bytes".to_string(),
        ));
    }
    Ok(None)
}

#[must_use]
pub fn variable_int_len(value: u32) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

pub fn encode_string<B: BufMut>(buf: &mut B, value: &str) -> Result<()> {
    encode_binary(buf, value.as_bytes())
}

pub fn decode_string<B: Buf>(buf: &mut B) -> Result<String> {
    let raw = decode_binary(buf)?;
    let value = String::from_utf8(raw.to_vec())
        .map_err(|e| MqttError::MalformedPacket(format!("Invalid UTF-8 string: {e}")))?;
    if value.contains('\0') {
        return Err(MqttError::MalformedPacket(
            "UTF-8 string contains null character".to_string(),
        ));
    }
    Ok(value)
}

#[must_use]
pub fn string_len(value: &str) -> usize {
    2 + value.len()
}

pub fn encode_binary<B: BufMut>(buf: &mut B, value: &[u8]) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| MqttError::StringTooLong(value.len()))?;
    buf.put_u16(len);
    buf.put_slice(value);
    Ok(())
}

pub fn decode_binary<B: Buf>(buf: &mut B) -> Result<Bytes> {
    if buf.remaining() < 2 {
        return Err(MqttError::MalformedPacket(
            "Missing length prefix".to_string(),
        ));
    }
    let len = usize::from(buf.get_u16());
    if buf.remaining() < len {
        return Err(MqttError::MalformedPacket(format!(
            "Length prefix {len} exceeds remaining {} bytes",
            buf.remaining()
        )));
    }
    Ok(buf.copy_to_bytes(len))
}

#[must_use]
pub fn binary_len(value: &[u8]) -> usize {
    2 + value.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;

    #[test]
    fn test_variable_int_boundaries() {
        for (value, expected) in [
            (0u32, vec![0x00]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (16_383, vec![0xFF, 0x7F]),
            (16_384, vec![0x80, 0x80, 0x01]),
            (2_097_151, vec![0xFF, 0xFF, 0x7F]),
            (2_097_152, vec![0x80, 0x80, 0x80, 0x01]),
            (268_435_455, vec![0xFF, 0xFF, 0xFF, 0x7F]),
        ] {
            let mut buf = BytesMut::new();
            encode_variable_int(&mut buf, value).unwrap();
            assert_eq!(buf.as_ref(), expected.as_slice(), "encoding {value}");
            assert_eq!(variable_int_len(value), expected.len());
            assert_eq!(decode_variable_int(&mut buf.freeze()).unwrap(), value);
        }
    }

    #[test]
    fn test_variable_int_too_large() {
        let mut buf = BytesMut::new();
        assert!(encode_variable_int(&mut buf, MAX_REMAINING_LENGTH + 1).is_err());
    }

    #[test]
    fn test_variable_int_five_bytes_rejected() {
        let mut buf = Bytes::from_static(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert!(decode_variable_int(&mut buf).is_err());
        assert!(peek_variable_int(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]).is_err());
    }

    #[test]
    fn test_peek_incomplete() {
        assert_eq!(peek_variable_int(&[]).unwrap(), None);
        assert_eq!(peek_variable_int(&[0x80]).unwrap(), None);
        assert_eq!(peek_variable_int(&[0x80, 0x80, 0x80]).unwrap(), None);
        assert_eq!(peek_variable_int(&[0x80, 0x01, 0xAA]).unwrap(), Some((128, 2)));
    }

    #[test]
    fn test_string_roundtrip_and_errors() {
        let mut buf = BytesMut::new();
        encode_string(&mut buf, "sensors/temp").unwrap();
        assert_eq!(buf.len(), string_len("sensors/temp"));
        assert_eq!(decode_string(&mut buf.freeze()).unwrap(), "sensors/temp");

        let mut truncated = Bytes::from_static(&[0x00, 0x05, b'a', b'b']);
        assert!(decode_string(&mut truncated).is_err());

        let mut invalid = Bytes::from_static(&[0x00, 0x02, 0xC3, 0x28]);
        assert!(decode_string(&mut invalid).is_err());

        let long = "x".repeat(70_000);
        assert!(matches!(
            encode_string(&mut BytesMut::new(), &long),
            Err(MqttError::StringTooLong(70_000))
        ));
    }

    proptest! {
        #[test]
        fn prop_variable_int_peek_matches_decode(value in 0u32..=MAX_REMAINING_LENGTH) {
            let mut buf = BytesMut::new();
            encode_variable_int(&mut buf, value).unwrap();
            let peeked = peek_variable_int(&buf).unwrap();
            prop_assert_eq!(peeked, Some((value, buf.len())));
        }
    }
}
