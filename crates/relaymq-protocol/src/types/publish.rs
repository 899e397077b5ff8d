use super::QoS;
use crate::protocol::v5::properties::Properties;
use bytes::Bytes;

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub qos: QoS,
    pub retain: bool,
    pub properties: PublishProperties,
}

impl PublishOptions {
    #[must_use]
    pub fn new(qos: QoS) -> Self {
        Self {
            qos,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: PublishProperties) -> Self {
        self.properties = properties;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishProperties {
    pub payload_format_indicator: Option<bool>,
    pub message_expiry_interval: Option<u32>,
    pub topic_alias: Option<u16>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Bytes>,
    pub content_type: Option<String>,
    pub user_properties: Vec<(String, String)>,
}

impl From<&PublishProperties> for Properties {
    fn from(publish: &PublishProperties) -> Self {
        let mut props = Properties::new();
        if let Some(utf8) = publish.payload_format_indicator {
            props.set_payload_format_indicator(utf8);
        }
        if let Some(expiry) = publish.message_expiry_interval {
            props.set_message_expiry_interval(expiry);
        }
        if let Some(alias) = publish.topic_alias {
            props.set_topic_alias(alias);
        }
        if let Some(ref topic) = publish.response_topic {
            props.set_response_topic(topic.clone());
        }
        if let Some(ref data) = publish.correlation_data {
            props.set_correlation_data(data.clone());
        }
        if let Some(ref content_type) = publish.content_type {
            props.set_content_type(content_type.clone());
        }
        for (key, value) in &publish.user_properties {
            props.add_user_property(key.clone(), value.clone());
        }
        props
    }
}
