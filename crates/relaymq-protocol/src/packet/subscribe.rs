use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{decode_packet_id, FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::types::{QoS, SubscribeOptions};
use bytes::{Buf, BufMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    pub filter: String,
    pub options: SubscribeOptions,
}

impl TopicFilter {
    #[must_use]
    pub fn new(filter: impl Into<String>, options: SubscribeOptions) -> Self {
        Self {
            filter: filter.into(),
            options,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<TopicFilter>,
    pub properties: Properties,
}

impl SubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            filters: Vec::new(),
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn add_filter(mut self, filter: impl Into<String>, qos: QoS) -> Self {
        self.filters
            .push(TopicFilter::new(filter, SubscribeOptions::new(qos)));
        self
    }

    #[must_use]
    pub fn with_subscription_identifier(mut self, id: u32) -> Self {
        self.properties.remove(crate::PropertyId::SubscriptionIdentifier);
        self.properties.add_subscription_identifier(id);
        self
    }

    #[must_use]
    pub fn subscription_identifier(&self) -> Option<u32> {
        self.properties.subscription_identifiers().next()
    }
}

impl MqttPacket for SubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.filters.is_empty() {
            return Err(MqttError::ProtocolError(
                "SUBSCRIBE requires at least one topic filter".to_string(),
            ));
        }
        buf.put_u16(self.packet_id);
        self.properties.encode(buf)?;
        for entry in &self.filters {
            encode_string(buf, &entry.filter)?;
            buf.put_u8(entry.options.encode());
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        let packet_id = decode_packet_id(buf)?;
        let properties = Properties::decode(buf)?;
        let mut filters = Vec::new();
        while buf.has_remaining() {
            let filter = decode_string(buf)?;
            if !buf.has_remaining() {
                return Err(MqttError::MalformedPacket(format!(
                    "Missing subscription options for {filter:?}"
                )));
            }
            filters.push(TopicFilter::new(filter, SubscribeOptions::decode(buf.get_u8())?));
        }
        if filters.is_empty() {
            return Err(MqttError::ProtocolError(
                "SUBSCRIBE without topic filters".to_string(),
            ));
        }
        Ok(Self {
            packet_id,
            filters,
            properties,
        })
    }
}
