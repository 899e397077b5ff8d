use super::WillMessage;
use crate::constants::defaults;
use crate::protocol::v5::properties::Properties;
use bytes::Bytes;
use std::time::Duration;

/// Fields of the CONNECT packet the application controls.
#[derive(Clone)]
pub struct ConnectOptions {
    pub client_id: String,
    pub keep_alive: Duration,
    pub clean_start: bool,
    pub username: Option<String>,
    pub password: Option<Bytes>,
    pub will: Option<WillMessage>,
    pub properties: ConnectProperties,
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("client_id", &self.client_id)
            .field("keep_alive", &self.keep_alive)
            .field("clean_start", &self.clean_start)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("will", &self.will)
            .field("properties", &self.properties)
            .finish()
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl ConnectOptions {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive: defaults::KEEP_ALIVE,
            clean_start: true,
            username: None,
            password: None,
            will: None,
            properties: ConnectProperties::default(),
        }
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub fn with_clean_start(mut self, clean_start: bool) -> Self {
        self.clean_start = clean_start;
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl AsRef<[u8]>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(Bytes::copy_from_slice(password.as_ref()));
        self
    }

    #[must_use]
    pub fn with_will(mut self, will: WillMessage) -> Self {
        self.will = Some(will);
        self
    }

    #[must_use]
    pub fn with_session_expiry_interval(mut self, seconds: u32) -> Self {
        self.properties.session_expiry_interval = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_receive_maximum(mut self, receive_maximum: u16) -> Self {
        self.properties.receive_maximum = Some(receive_maximum);
        self
    }

    #[must_use]
    pub fn with_maximum_packet_size(mut self, size: u32) -> Self {
        self.properties.maximum_packet_size = Some(size);
        self
    }

    #[must_use]
    pub fn with_topic_alias_maximum(mut self, maximum: u16) -> Self {
        self.properties.topic_alias_maximum = Some(maximum);
        self
    }

    #[must_use]
    pub fn with_authentication_method(mut self, method: impl Into<String>) -> Self {
        self.properties.authentication_method = Some(method.into());
        self
    }

    #[must_use]
    pub fn with_authentication_data(mut self, data: impl AsRef<[u8]>) -> Self {
        self.properties.authentication_data = Some(Bytes::copy_from_slice(data.as_ref()));
        self
    }

    #[must_use]
    pub fn with_user_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .user_properties
            .push((key.into(), value.into()));
        self
    }

    /// Keep alive in whole seconds as carried by CONNECT, saturating at `u16::MAX`.
    #[must_use]
    pub fn keep_alive_secs(&self) -> u16 {
        u16::try_from(self.keep_alive.as_secs()).unwrap_or(u16::MAX)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectProperties {
    pub session_expiry_interval: Option<u32>,
    pub receive_maximum: Option<u16>,
    pub maximum_packet_size: Option<u32>,
    pub topic_alias_maximum: Option<u16>,
    pub request_response_information: Option<bool>,
    pub request_problem_information: Option<bool>,
    pub user_properties: Vec<(String, String)>,
    pub authentication_method: Option<String>,
    pub authentication_data: Option<Bytes>,
}

impl From<&ConnectProperties> for Properties {
    fn from(connect: &ConnectProperties) -> Self {
        let mut props = Properties::new();
        if let Some(v) = connect.session_expiry_interval {
            props.set_session_expiry_interval(v);
        }
        if let Some(v) = connect.receive_maximum {
            props.set_receive_maximum(v);
        }
        if let Some(v) = connect.maximum_packet_size {
            props.set_maximum_packet_size(v);
        }
        if let Some(v) = connect.topic_alias_maximum {
            props.set_topic_alias_maximum(v);
        }
        if let Some(v) = connect.request_response_information {
            props.set_request_response_information(v);
        }
        if let Some(v) = connect.request_problem_information {
            props.set_request_problem_information(v);
        }
        if let Some(ref method) = connect.authentication_method {
            props.set_authentication_method(method.clone());
        }
        if let Some(ref data) = connect.authentication_data {
            props.set_authentication_data(data.clone());
        }
        for (key, value) in &connect.user_properties {
            props.add_user_property(key.clone(), value.clone());
        }
        props
    }
}

impl From<&Properties> for ConnectProperties {
    fn from(props: &Properties) -> Self {
        Self {
            session_expiry_interval: props.get_session_expiry_interval(),
            receive_maximum: props.get_receive_maximum(),
            maximum_packet_size: props.get_maximum_packet_size(),
            topic_alias_maximum: props.get_topic_alias_maximum(),
            request_response_information: props.get_request_response_information(),
            request_problem_information: props.get_request_problem_information(),
            user_properties: props
                .user_properties()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            authentication_method: props.get_authentication_method().map(str::to_string),
            authentication_data: props.get_authentication_data().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let opts = ConnectOptions::new("dev-1").with_credentials("alice", "hunter2");
        let rendered = format!("{opts:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_builder_fills_properties() {
        let opts = ConnectOptions::new("dev-1")
            .with_clean_start(false)
            .with_session_expiry_interval(600)
            .with_receive_maximum(32)
            .with_authentication_method("SCRAM-SHA-1");

        assert!(!opts.clean_start);
        let props = Properties::from(&opts.properties);
        assert_eq!(props.get_session_expiry_interval(), Some(600));
        assert_eq!(props.get_receive_maximum(), Some(32));
        assert_eq!(props.get_authentication_method(), Some("SCRAM-SHA-1"));
        assert_eq!(ConnectProperties::from(&props), opts.properties);
    }

    #[test]
    fn test_keep_alive_secs_saturates() {
        let opts = ConnectOptions::new("x").with_keep_alive(Duration::from_secs(1_000_000));
        assert_eq!(opts.keep_alive_secs(), u16::MAX);
        assert_eq!(ConnectOptions::default().keep_alive_secs(), 60);
    }
}
