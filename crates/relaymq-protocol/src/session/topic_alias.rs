use crate::error::{MqttError, Result};
use crate::packet::PublishPacket;
use std::collections::HashMap;

/// Topic aliases the broker establishes on inbound PUBLISH packets.
///
/// The mapping lives for one network connection.
#[derive(Debug, Default)]
pub struct InboundTopicAliases {
    maximum: u16,
    topics: HashMap<u16, String>,
}

impl InboundTopicAliases {
    #[must_use]
    pub fn new(maximum: u16) -> Self {
        Self {
            maximum,
            topics: HashMap::new(),
        }
    }

    /// Registers or applies the alias carried by `publish`, filling in its
    /// topic name when the broker sent only the alias.
    pub fn resolve(&mut self, publish: &mut PublishPacket) -> Result<()> {
        let Some(alias) = publish.properties.get_topic_alias() else {
            return Ok(());
        };
        if alias == 0 || alias > self.maximum {
            return Err(MqttError::TopicAliasInvalid(alias));
        }

        if publish.topic_name.is_empty() {
            let topic = self
                .topics
                .get(&alias)
                .ok_or(MqttError::TopicAliasInvalid(alias))?;
            publish.topic_name.clone_from(topic);
        } else {
            self.topics.insert(alias, publish.topic_name.clone());
        }
        Ok(())
    }

    #[must_use]
    pub fn topic(&self, alias: u16) -> Option<&str> {
        self.topics.get(&alias).map(String::as_str)
    }

    pub fn reset(&mut self, maximum: u16) {
        self.maximum = maximum;
        self.topics.clear();
    }
}
