use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::types::ReasonCode;
use bytes::{Buf, BufMut, Bytes};

/// AUTH, the enhanced authentication exchange packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPacket {
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl AuthPacket {
    #[must_use]
    pub fn new(reason_code: ReasonCode) -> Self {
        Self {
            reason_code,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn continue_with(method: impl Into<String>, data: Bytes) -> Self {
        let mut packet = Self::new(ReasonCode::ContinueAuthentication);
        packet.properties.set_authentication_method(method);
        packet.properties.set_authentication_data(data);
        packet
    }

    #[must_use]
    pub fn authentication_method(&self) -> Option<&str> {
        self.properties.get_authentication_method()
    }

    #[must_use]
    pub fn authentication_data(&self) -> Option<&Bytes> {
        self.properties.get_authentication_data()
    }
}

impl MqttPacket for AuthPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Auth
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
            return Ok(Self::new(ReasonCode::Success));
        }
        let raw = buf.get_u8();
        let reason_code = match ReasonCode::from_u8(raw) {
            Some(
                code @ (ReasonCode::Success
                | ReasonCode::ContinueAuthentication
                | ReasonCode::ReAuthenticate),
            ) => code,
            _ => {
                return Err(MqttError::MalformedPacket(format!(
                    "Invalid AUTH reason code: 0x{raw:02X}"
                )))
            }
        };
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
