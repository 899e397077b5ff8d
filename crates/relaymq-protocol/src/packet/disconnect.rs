use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::types::ReasonCode;
use bytes::{Buf, BufMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectPacket {
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl Default for DisconnectPacket {
    fn default() -> Self {
        Self::new(ReasonCode::Success)
    }
}

impl DisconnectPacket {
    #[must_use]
    pub fn new(reason_code: ReasonCode) -> Self {
        Self {
            reason_code,
            properties: Properties::default(),
        }
    }
}

impl MqttPacket for DisconnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Disconnect
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.reason_code == ReasonCode::Success && self.properties.is_empty() {
            return Ok(());
        }
        buf.put_u8(u8::from(self.reason_code));
        self.properties.encode(buf)
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        if !buf.has_remaining() {
            return Ok(Self::default());
        }
        let raw = buf.get_u8();
        let reason_code = ReasonCode::from_u8(raw)
            .filter(|code| {
                matches!(
                    code,
                    ReasonCode::Success | ReasonCode::DisconnectWithWillMessage
                ) || code.is_error()
            })
            .ok_or_else(|| {
                MqttError::MalformedPacket(format!("Invalid DISCONNECT reason code: 0x{raw:02X}"))
            })?;
        let properties = if buf.has_remaining() {
            Properties::decode(buf)?
        } else {
            Properties::default()
        };
        Ok(Self {
            reason_code,
            properties,
        })
    }
}
