use super::{Properties, PropertyId, PropertyValue, PropertyValueType};
use crate::encoding::{
    binary_len, decode_binary, decode_string, decode_variable_int, encode_binary, encode_string,
    encode_variable_int, string_len, variable_int_len,
};
use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut};

fn need<B: Buf>(buf: &B, bytes: usize, what: &str) -> Result<()> {
    if buf.remaining() < bytes {
        return Err(MqttError::MalformedPacket(format!(
            "Truncated {what} property value"
        )));
    }
    Ok(())
}

impl PropertyValue {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Self::Byte(v) => buf.put_u8(*v),
            Self::TwoByteInteger(v) => buf.put_u16(*v),
            Self::FourByteInteger(v) => buf.put_u32(*v),
            Self::VariableByteInteger(v) => encode_variable_int(buf, *v)?,
            Self::BinaryData(v) => encode_binary(buf, v)?,
            Self::Utf8String(v) => encode_string(buf, v)?,
            Self::Utf8StringPair(k, v) => {
                encode_string(buf, k)?;
                encode_string(buf, v)?;
            }
        }
        Ok(())
    }

    fn decode<B: Buf>(kind: PropertyValueType, buf: &mut B) -> Result<Self> {
        let value = match kind {
            PropertyValueType::Byte => {
                need(buf, 1, "byte")?;
                Self::Byte(buf.get_u8())
            }
            PropertyValueType::TwoByteInteger => {
                need(buf, 2, "two-byte integer")?;
                Self::TwoByteInteger(buf.get_u16())
            }
            PropertyValueType::FourByteInteger => {
                need(buf, 4, "four-byte integer")?;
                Self::FourByteInteger(buf.get_u32())
            }
            PropertyValueType::VariableByteInteger => {
                Self::VariableByteInteger(decode_variable_int(buf)?)
            }
            PropertyValueType::BinaryData => Self::BinaryData(decode_binary(buf)?),
            PropertyValueType::Utf8String => Self::Utf8String(decode_string(buf)?),
            PropertyValueType::Utf8StringPair => {
                let key = decode_string(buf)?;
                Self::Utf8StringPair(key, decode_string(buf)?)
            }
        };
        Ok(value)
    }

    fn len(&self) -> usize {
        match self {
            Self::Byte(_) => 1,
            Self::TwoByteInteger(_) => 2,
            Self::FourByteInteger(_) => 4,
            Self::VariableByteInteger(v) => variable_int_len(*v),
            Self::BinaryData(v) => binary_len(v),
            Self::Utf8String(v) => string_len(v),
            Self::Utf8StringPair(k, v) => string_len(k) + string_len(v),
        }
    }
}

impl Properties {
    /// Writes the property length prefix followed by every entry.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let body_len = self.body_len();
        let prefix = u32::try_from(body_len).map_err(|_| MqttError::PacketTooLarge {
            size: body_len,
            max: u32::MAX as usize,
        })?;
        encode_variable_int(buf, prefix)?;
        for (id, value) in self.iter() {
            buf.put_u8(id as u8);
            value.encode(buf)?;
        }
        Ok(())
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let len = decode_variable_int(buf)? as usize;
        if buf.remaining() < len {
            return Err(MqttError::MalformedPacket(format!(
                "Property length {len} exceeds remaining {} bytes",
                buf.remaining()
            )));
        }

        let mut section = buf.copy_to_bytes(len);
        let mut properties = Self::new();
        while section.has_remaining() {
            let raw = decode_variable_int(&mut section)?;
            let byte = u8::try_from(raw).map_err(|_| MqttError::InvalidPropertyId(u8::MAX))?;
            let id = PropertyId::from_u8(byte).ok_or(MqttError::InvalidPropertyId(byte))?;
            let value = PropertyValue::decode(id.value_type(), &mut section)?;
            properties.add(id, value)?;
        }
        Ok(properties)
    }

    /// Encoded size including the length prefix.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let body = self.body_len();
        variable_int_len(u32::try_from(body).unwrap_or(u32::MAX)) + body
    }

    fn body_len(&self) -> usize {
        self.iter().map(|(_, value)| 1 + value.len()).sum()
    }
}
