use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{decode_packet_id, FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::types::QoS;
use bytes::{Buf, BufMut, Bytes};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub topic_name: String,
    pub packet_id: Option<u16>,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub properties: Properties,
    pub payload: Bytes,
}

impl PublishPacket {
    #[must_use]
    pub fn new(topic_name: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic_name: topic_name.into(),
            packet_id: None,
            qos,
            retain: false,
            dup: false,
            properties: Properties::default(),
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn with_packet_id(mut self, packet_id: u16) -> Self {
        self.packet_id = Some(packet_id);
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

impl MqttPacket for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        (u8::from(self.dup) << 3) | (u8::from(self.qos) << 1) | u8::from(self.retain)
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, &self.topic_name)?;
        match (self.qos, self.packet_id) {
            (QoS::AtMostOnce, _) => {}
            (_, Some(id)) if id != 0 => buf.put_u16(id),
            (qos, _) => {
                return Err(MqttError::ProtocolError(format!(
                    "{qos:?} PUBLISH requires a non-zero packet identifier"
                )))
            }
        }
        self.properties.encode(buf)?;
        buf.put_slice(&self.payload);
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        let qos = QoS::from_wire((fixed_header.flags >> 1) & 0x03)?;
        let dup = fixed_header.flags & 0x08 != 0;
        if dup && qos == QoS::AtMostOnce {
            return Err(MqttError::MalformedPacket(
                "DUP flag set on a QoS 0 PUBLISH".to_string(),
            ));
        }

        let topic_name = decode_string(buf)?;
        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            Some(decode_packet_id(buf)?)
        };
        let properties = Properties::decode(buf)?;
        let payload = buf.copy_to_bytes(buf.remaining());

        Ok(Self {
            topic_name,
            packet_id,
            qos,
            retain: fixed_header.flags & 0x01 != 0,
            dup,
            properties,
            payload,
        })
    }
}
