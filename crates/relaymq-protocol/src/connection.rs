use crate::constants::defaults;
use crate::packet::ConnAckPacket;
use crate::types::{QoS, ReasonCode};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientInitiated,
    ServerDisconnect(ReasonCode),
    NetworkError(String),
    ProtocolError(String),
    KeepAliveTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected {
        session_present: bool,
        reconnect: bool,
        server_uri: String,
    },
    ConnectionLost {
        reason: DisconnectReason,
    },
    Disconnected,
    ReconnectScheduled {
        attempt: u32,
        delay: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_delay: defaults::RECONNECT_MIN_DELAY,
            max_delay: defaults::RECONNECT_MAX_DELAY,
        }
    }
}

impl ReconnectConfig {
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delays(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay.max(min_delay);
        self
    }
}

/// Doubling reconnect delay owned by one client.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    min_delay: Duration,
    max_delay: Duration,
    next: Duration,
    attempt: u32,
}

impl ReconnectBackoff {
    #[must_use]
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            min_delay: config.min_delay,
            max_delay: config.max_delay.max(config.min_delay),
            next: config.min_delay,
            attempt: 0,
        }
    }

    /// Delay to wait before the next attempt; doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = delay.saturating_mul(2).min(self.max_delay);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.next = self.min_delay;
        self.attempt = 0;
    }
}

/// Limits the broker announced in CONNACK. Absent properties take their
/// protocol defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCapabilities {
    pub session_present: bool,
    pub receive_maximum: u16,
    pub maximum_qos: QoS,
    pub retain_available: bool,
    pub maximum_packet_size: Option<u32>,
    pub topic_alias_maximum: u16,
    pub wildcard_subscription_available: bool,
    pub subscription_identifiers_available: bool,
    pub shared_subscription_available: bool,
    pub server_keep_alive: Option<u16>,
    pub assigned_client_id: Option<String>,
    pub response_information: Option<String>,
    pub server_reference: Option<String>,
}

impl Default for ConnectionCapabilities {
    fn default() -> Self {
        Self {
            session_present: false,
            receive_maximum: defaults::RECEIVE_MAXIMUM,
            maximum_qos: QoS::ExactlyOnce,
            retain_available: true,
            maximum_packet_size: None,
            topic_alias_maximum: 0,
            wildcard_subscription_available: true,
            subscription_identifiers_available: true,
            shared_subscription_available: true,
            server_keep_alive: None,
            assigned_client_id: None,
            response_information: None,
            server_reference: None,
        }
    }
}

impl From<&ConnAckPacket> for ConnectionCapabilities {
    fn from(connack: &ConnAckPacket) -> Self {
        let props = &connack.properties;
        let fallback = Self::default();
        Self {
            session_present: connack.session_present,
            receive_maximum: props
                .get_receive_maximum()
                .filter(|max| *max > 0)
                .unwrap_or(fallback.receive_maximum),
            maximum_qos: props.get_maximum_qos().map_or(fallback.maximum_qos, QoS::from),
            retain_available: props
                .get_retain_available()
                .unwrap_or(fallback.retain_available),
            maximum_packet_size: props.get_maximum_packet_size(),
            topic_alias_maximum: props.get_topic_alias_maximum().unwrap_or(0),
            wildcard_subscription_available: props
                .get_wildcard_subscription_available()
                .unwrap_or(true),
            subscription_identifiers_available: props
                .get_subscription_identifier_available()
                .unwrap_or(true),
            shared_subscription_available: props
                .get_shared_subscription_available()
                .unwrap_or(true),
            server_keep_alive: props.get_server_keep_alive(),
            assigned_client_id: props.get_assigned_client_identifier().map(str::to_string),
            response_information: props.get_response_information().map(str::to_string),
            server_reference: props.get_server_reference().map(str::to_string),
        }
    }
}

impl ConnectionCapabilities {
    /// The keep alive in force: the broker's override when present.
    #[must_use]
    pub fn effective_keep_alive(&self, requested: Duration) -> Duration {
        self.server_keep_alive
            .map_or(requested, |secs| Duration::from_secs(u64::from(secs)))
    }

    /// Highest QoS the broker accepts, capping `requested`.
    #[must_use]
    pub fn downgrade_qos(&self, requested: QoS) -> QoS {
        requested.min(self.maximum_qos)
    }
}
