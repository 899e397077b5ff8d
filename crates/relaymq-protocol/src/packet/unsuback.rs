use crate::error::{MqttError, Result};
use crate::packet::{decode_packet_id, FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::types::ReasonCode;
use bytes::{Buf, BufMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubAckPacket {
    pub packet_id: u16,
    pub properties: Properties,
    pub reason_codes: Vec<ReasonCode>,
}

impl UnsubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16, reason_codes: Vec<ReasonCode>) -> Self {
        Self {
            packet_id,
            properties: Properties::default(),
            reason_codes,
        }
    }

    #[must_use]
    pub fn all_failed(&self) -> bool {
        !self.reason_codes.is_empty() && self.reason_codes.iter().all(ReasonCode::is_error)
    }
}

fn is_valid_unsuback_reason_code(code: ReasonCode) -> bool {
    matches!(
        code,
        ReasonCode::Success
            | ReasonCode::NoSubscriptionExisted
            | ReasonCode::UnspecifiedError
            | ReasonCode::ImplementationSpecificError
            | ReasonCode::NotAuthorized
            | ReasonCode::TopicFilterInvalid
            | ReasonCode::PacketIdentifierInUse
    )
}

impl MqttPacket for UnsubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::UnsubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16(self.packet_id);
        self.properties.encode(buf)?;
        for code in &self.reason_codes {
            buf.put_u8(u8::from(*code));
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        let packet_id = decode_packet_id(buf)?;
        let properties = Properties::decode(buf)?;
        let mut reason_codes = Vec::with_capacity(buf.remaining());
        while buf.has_remaining() {
            let raw = buf.get_u8();
            reason_codes.push(
                ReasonCode::from_u8(raw)
                    .filter(|code| is_valid_unsuback_reason_code(*code))
                    .ok_or_else(|| {
                        MqttError::MalformedPacket(format!(
                            "Invalid UNSUBACK reason code: 0x{raw:02X}"
                        ))
                    })?,
            );
        }
        Ok(Self {
            packet_id,
            properties,
            reason_codes,
        })
    }
}
