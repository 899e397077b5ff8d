use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::types::ReasonCode;
use bytes::{Buf, BufMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl ConnAckPacket {
    #[must_use]
    pub fn new(session_present: bool, reason_code: ReasonCode) -> Self {
        Self {
            session_present,
            reason_code,
            properties: Properties::default(),
        }
    }
}

fn is_valid_connack_reason_code(code: ReasonCode) -> bool {
    code == ReasonCode::Success
        || (code.is_error()
            && !matches!(
                code,
                ReasonCode::SessionTakenOver
                    | ReasonCode::TopicFilterInvalid
                    | ReasonCode::PacketIdentifierInUse
                    | ReasonCode::PacketIdentifierNotFound
                    | ReasonCode::ReceiveMaximumExceeded
                    | ReasonCode::TopicAliasInvalid
                    | ReasonCode::MessageRateTooHigh
                    | ReasonCode::AdministrativeAction
                    | ReasonCode::SharedSubscriptionsNotSupported
                    | ReasonCode::MaximumConnectTime
                    | ReasonCode::SubscriptionIdentifiersNotSupported
                    | ReasonCode::WildcardSubscriptionsNotSupported
            ))
}

impl MqttPacket for ConnAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::ConnAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(u8::from(self.session_present));
        buf.put_u8(u8::from(self.reason_code));
        self.properties.encode(buf)
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "CONNACK shorter than two bytes".to_string(),
            ));
        }
        let ack_flags = buf.get_u8();
        if ack_flags & 0xFE != 0 {
            return Err(MqttError::MalformedPacket(format!(
                "CONNACK reserved flags set: 0x{ack_flags:02X}"
            )));
        }
        let raw = buf.get_u8();
        let reason_code = ReasonCode::from_u8(raw)
            .filter(|code| is_valid_connack_reason_code(*code))
            .ok_or_else(|| {
                MqttError::MalformedPacket(format!("Invalid CONNACK reason code: 0x{raw:02X}"))
            })?;
        let properties = if buf.has_remaining() {
            Properties::decode(buf)?
        } else {
            Properties::default()
        };
        let session_present = ack_flags & 0x01 != 0;
        if session_present && reason_code.is_error() {
            return Err(MqttError::ProtocolError(
                "Session present set on a failed CONNACK".to_string(),
            ));
        }

        Ok(Self {
            session_present,
            reason_code,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use bytes::Bytes;

    #[test]
    fn test_connack_with_capabilities() {
        let mut ack = ConnAckPacket::new(true, ReasonCode::Success);
        ack.properties.set_receive_maximum(10);
        ack.properties.set_assigned_client_identifier("auto-1");
        ack.properties.set_wildcard_subscription_available(false);

        let mut bytes = Packet::ConnAck(ack.clone()).to_bytes().unwrap();
        assert_eq!(Packet::decode(&mut bytes).unwrap(), Packet::ConnAck(ack));
    }

    #[test]
    fn test_connack_refused() {
        let mut frame = Bytes::from_static(&[0x20, 0x03, 0x00, 0x86, 0x00]);
        match Packet::decode(&mut frame).unwrap() {
            Packet::ConnAck(ack) => {
                assert!(!ack.session_present);
                assert_eq!(ack.reason_code, ReasonCode::BadUsernameOrPassword);
            }
            other => panic!("expected CONNACK, got {other:?}"),
        }
    }

    #[test]
    fn test_connack_invalid_flags_and_codes() {
        let mut flags = Bytes::from_static(&[0x20, 0x03, 0x02, 0x00, 0x00]);
        assert!(Packet::decode(&mut flags).is_err());

        let mut code = Bytes::from_static(&[0x20, 0x03, 0x00, 0x8E, 0x00]);
        assert!(Packet::decode(&mut code).is_err());

        let mut present_on_error = Bytes::from_static(&[0x20, 0x03, 0x01, 0x87, 0x00]);
        assert!(Packet::decode(&mut present_on_error).is_err());
    }
}
