use crate::error::{MqttError, Result};
use crate::packet::{decode_packet_id, FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::types::ReasonCode;
use bytes::{Buf, BufMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub properties: Properties,
    pub reason_codes: Vec<ReasonCode>,
}

impl SubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16, reason_codes: Vec<ReasonCode>) -> Self {
        Self {
            packet_id,
            properties: Properties::default(),
            reason_codes,
        }
    }

    /// True when the broker rejected every requested filter.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        !self.reason_codes.is_empty() && self.reason_codes.iter().all(ReasonCode::is_error)
    }
}

fn is_valid_suback_reason_code(code: ReasonCode) -> bool {
    matches!(
        code,
        ReasonCode::Success
            | ReasonCode::GrantedQoS1
            | ReasonCode::GrantedQoS2
            | ReasonCode::UnspecifiedError
            | ReasonCode::ImplementationSpecificError
            | ReasonCode::NotAuthorized
            | ReasonCode::TopicFilterInvalid
            | ReasonCode::PacketIdentifierInUse
            | ReasonCode::QuotaExceeded
            | ReasonCode::SharedSubscriptionsNotSupported
            | ReasonCode::SubscriptionIdentifiersNotSupported
            | ReasonCode::WildcardSubscriptionsNotSupported
    )
}

impl MqttPacket for SubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::SubAck
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
            let code = ReasonCode::from_u8(raw)
                .filter(|code| is_valid_suback_reason_code(*code))
                .ok_or_else(|| {
                    MqttError::MalformedPacket(format!("Invalid SUBACK reason code: 0x{raw:02X}"))
                })?;
            reason_codes.push(code);
        }
        Ok(Self {
            packet_id,
            properties,
            reason_codes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use bytes::Bytes;

    #[test]
    fn test_suback_mixed_results() {
        let mut frame = Bytes::from_static(&[0x90, 0x05, 0x00, 0x0A, 0x00, 0x01, 0x87]);
        match Packet::decode(&mut frame).unwrap() {
            Packet::SubAck(ack) => {
                assert_eq!(ack.packet_id, 10);
                assert_eq!(
                    ack.reason_codes,
                    vec![ReasonCode::GrantedQoS1, ReasonCode::NotAuthorized]
                );
                assert!(!ack.all_failed());
            }
            other => panic!("expected SUBACK, got {other:?}"),
        }
    }

    #[test]
    fn test_all_failed() {
        let ack = SubAckPacket::new(
            1,
            vec![ReasonCode::NotAuthorized, ReasonCode::TopicFilterInvalid],
        );
        assert!(ack.all_failed());
        assert!(!SubAckPacket::new(1, vec![]).all_failed());
    }

    #[test]
    fn test_suback_rejects_foreign_codes() {
        let mut frame = Bytes::from_static(&[0x90, 0x04, 0x00, 0x0A, 0x00, 0x8E]);
        assert!(Packet::decode(&mut frame).is_err());
    }
}
