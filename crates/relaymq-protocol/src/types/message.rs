use super::QoS;
use crate::packet::publish::PublishPacket;
use crate::protocol::v5::properties::Properties;
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WillMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub properties: WillProperties,
}

impl WillMessage {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
            properties: WillProperties::default(),
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_delay_interval(mut self, seconds: u32) -> Self {
        self.properties.will_delay_interval = Some(seconds);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WillProperties {
    pub will_delay_interval: Option<u32>,
    pub payload_format_indicator: Option<bool>,
    pub message_expiry_interval: Option<u32>,
    pub content_type: Option<String>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Vec<u8>>,
    pub user_properties: Vec<(String, String)>,
}

impl From<&WillProperties> for Properties {
    fn from(will: &WillProperties) -> Self {
        let mut props = Properties::new();
        if let Some(delay) = will.will_delay_interval {
            props.set_will_delay_interval(delay);
        }
        if let Some(utf8) = will.payload_format_indicator {
            props.set_payload_format_indicator(utf8);
        }
        if let Some(expiry) = will.message_expiry_interval {
            props.set_message_expiry_interval(expiry);
        }
        if let Some(ref content_type) = will.content_type {
            props.set_content_type(content_type.clone());
        }
        if let Some(ref topic) = will.response_topic {
            props.set_response_topic(topic.clone());
        }
        if let Some(ref data) = will.correlation_data {
            props.set_correlation_data(Bytes::copy_from_slice(data));
        }
        for (key, value) in &will.user_properties {
            props.add_user_property(key.clone(), value.clone());
        }
        props
    }
}

impl From<&Properties> for WillProperties {
    fn from(props: &Properties) -> Self {
        Self {
            will_delay_interval: props.get_will_delay_interval(),
            payload_format_indicator: props.get_payload_format_indicator(),
            message_expiry_interval: props.get_message_expiry_interval(),
            content_type: props.get_content_type().map(str::to_string),
            response_topic: props.get_response_topic().map(str::to_string),
            correlation_data: props.get_correlation_data().map(|d| d.to_vec()),
            user_properties: props
                .user_properties()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// An application message delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub packet_id: Option<u16>,
    pub properties: MessageProperties,
}

impl From<PublishPacket> for Message {
    fn from(packet: PublishPacket) -> Self {
        Self {
            properties: MessageProperties::from(&packet.properties),
            topic: packet.topic_name,
            payload: packet.payload,
            qos: packet.qos,
            retain: packet.retain,
            dup: packet.dup,
            packet_id: packet.packet_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    pub payload_format_indicator: Option<bool>,
    pub message_expiry_interval: Option<u32>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Bytes>,
    pub content_type: Option<String>,
    pub subscription_identifiers: Vec<u32>,
    pub user_properties: Vec<(String, String)>,
}

impl From<&Properties> for MessageProperties {
    fn from(props: &Properties) -> Self {
        Self {
            payload_format_indicator: props.get_payload_format_indicator(),
            message_expiry_interval: props.get_message_expiry_interval(),
            response_topic: props.get_response_topic().map(str::to_string),
            correlation_data: props.get_correlation_data().cloned(),
            content_type: props.get_content_type().map(str::to_string),
            subscription_identifiers: props.subscription_identifiers().collect(),
            user_properties: props
                .user_properties()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}
