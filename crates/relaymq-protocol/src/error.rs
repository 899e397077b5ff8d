use crate::protocol::v5::reason_codes::ReasonCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqttError>;

#[derive(Debug, Clone, Error)]
pub enum MqttError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid topic name: {0}")]
    InvalidTopicName(String),

    #[error("Invalid topic filter: {0}")]
    InvalidTopicFilter(String),

    #[error("Invalid client ID: {0}")]
    InvalidClientId(String),

    #[error("Invalid server URI: {0}")]
    InvalidServerUri(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Connection refused: {0:?}")]
    ConnectionRefused(ReasonCode),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Packet too large: size {size} exceeds maximum {max}")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Timeout")]
    Timeout,

    #[error("Subscription failed: {0:?}")]
    SubscriptionFailed(ReasonCode),

    #[error("Unsubscription failed: {0:?}")]
    UnsubscriptionFailed(ReasonCode),

    #[error("Publish failed: {0:?}")]
    PublishFailed(ReasonCode),

    #[error("Packet identifier not found: {0}")]
    PacketIdNotFound(u16),

    #[error("Packet identifier already in use: {0}")]
    PacketIdInUse(u16),

    #[error("Packet ID exhausted")]
    PacketIdExhausted,

    #[error("Invalid QoS: {0}")]
    InvalidQoS(u8),

    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("Invalid reason code: {0}")]
    InvalidReasonCode(u8),

    #[error("Invalid property ID: {0}")]
    InvalidPropertyId(u8),

    #[error("Duplicate property ID: {0}")]
    DuplicatePropertyId(u8),

    #[error("Topic alias invalid: {0}")]
    TopicAliasInvalid(u16),

    #[error("Retain not supported")]
    RetainNotSupported,

    #[error("Shared subscriptions not supported")]
    SharedSubscriptionsNotSupported,

    #[error("Subscription identifiers not supported")]
    SubscriptionIdentifiersNotSupported,

    #[error("Wildcard subscriptions not supported")]
    WildcardSubscriptionsNotSupported,

    #[error("Offline buffer full")]
    BufferFull,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Client closed")]
    ClientClosed,

    #[error("Session discarded by the server")]
    SessionDiscarded,

    #[error("Connection closed by peer")]
    ConnectionClosedByPeer,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("String too long: {0} bytes exceeds maximum of 65535")]
    StringTooLong(usize),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MqttError {
    #[must_use]
    pub fn is_normal_disconnect(&self) -> bool {
        match self {
            Self::ClientClosed | Self::ConnectionClosedByPeer => true,
            Self::Io(msg) => {
                msg.contains("stream has been shut down") || msg.contains("Connection reset")
            }
            _ => false,
        }
    }

    /// Errors that mean the byte stream itself can no longer be trusted.
    #[must_use]
    pub fn is_link_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::MalformedPacket(_)
                | Self::PacketTooLarge { .. }
                | Self::ProtocolError(_)
                | Self::ConnectionClosedByPeer
                | Self::TopicAliasInvalid(_)
        )
    }
}

impl From<std::io::Error> for MqttError {
    fn from(err: std::io::Error) -> Self {
        MqttError::Io(err.to_string())
    }
}

impl From<String> for MqttError {
    fn from(msg: String) -> Self {
        MqttError::MalformedPacket(msg)
    }
}

impl From<&str> for MqttError {
    fn from(msg: &str) -> Self {
        MqttError::MalformedPacket(msg.to_string())
    }
}
