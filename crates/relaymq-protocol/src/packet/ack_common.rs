use crate::types::ReasonCode;

pub fn is_valid_publish_ack_reason_code(code: ReasonCode) -> bool {
    matches!(
        code,
        ReasonCode::Success
            | ReasonCode::NoMatchingSubscribers
            | ReasonCode::UnspecifiedError
            | ReasonCode::ImplementationSpecificError
            | ReasonCode::NotAuthorized
            | ReasonCode::TopicNameInvalid
            | ReasonCode::PacketIdentifierInUse
            | ReasonCode::QuotaExceeded
            | ReasonCode::PayloadFormatInvalid
    )
}

pub fn is_valid_release_reason_code(code: ReasonCode) -> bool {
    matches!(
        code,
        ReasonCode::Success | ReasonCode::PacketIdentifierNotFound
    )
}

/// Declares a packet made of a packet identifier, a reason code and
/// properties: PUBACK, PUBREC, PUBREL and PUBCOMP.
///
/// A success reason with no properties encodes as the two-byte short form.
macro_rules! define_ack_packet {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
        packet_type = $packet_type:expr;
        validator = $validator:path;
        label = $label:literal;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub packet_id: u16,
            pub reason_code: $crate::types::ReasonCode,
            pub properties: $crate::protocol::v5::properties::Properties,
        }

        impl $name {
            #[must_use]
            pub fn new(packet_id: u16) -> Self {
                Self::new_with_reason(packet_id, $crate::types::ReasonCode::Success)
            }

            #[must_use]
            pub fn new_with_reason(packet_id: u16, reason_code: $crate::types::ReasonCode) -> Self {
                Self {
                    packet_id,
                    reason_code,
                    properties: $crate::protocol::v5::properties::Properties::default(),
                }
            }

            #[must_use]
            pub fn with_reason_string(mut self, reason: impl Into<String>) -> Self {
                self.properties.set_reason_string(reason);
                self
            }

            #[must_use]
            pub fn with_user_property(
                mut self,
                key: impl Into<String>,
                value: impl Into<String>,
            ) -> Self {
                self.properties.add_user_property(key, value);
                self
            }
        }

        impl $crate::packet::MqttPacket for $name {
            fn packet_type(&self) -> $crate::packet::PacketType {
                $packet_type
            }

            fn encode_body<B: bytes::BufMut>(&self, buf: &mut B) -> $crate::error::Result<()> {
                buf.put_u16(self.packet_id);
                let short_form = self.reason_code == $crate::types::ReasonCode::Success
                    && self.properties.is_empty();
                if !short_form {
                    buf.put_u8(u8::from(self.reason_code));
                    self.properties.encode(buf)?;
                }
                Ok(())
            }

            fn decode_body<B: bytes::Buf>(
                buf: &mut B,
                _fixed_header: &$crate::packet::FixedHeader,
            ) -> $crate::error::Result<Self> {
                let packet_id = $crate::packet::decode_packet_id(buf)?;
                if !buf.has_remaining() {
                    return Ok(Self::new(packet_id));
                }

                let raw = buf.get_u8();
                let reason_code = $crate::types::ReasonCode::from_u8(raw)
                    .filter(|code| $validator(*code))
                    .ok_or_else(|| {
                        $crate::error::MqttError::MalformedPacket(format!(
                            "Invalid {} reason code: 0x{raw:02X}",
                            $label
                        ))
                    })?;
                let properties = if buf.has_remaining() {
                    $crate::protocol::v5::properties::Properties::decode(buf)?
                } else {
                    $crate::protocol::v5::properties::Properties::default()
                };

                Ok(Self {
                    packet_id,
                    reason_code,
                    properties,
                })
            }
        }
    };
}

pub(crate) use define_ack_packet;
