//! Sans-io core of the relaymq MQTT v5.0 client.
//!
//! Everything in this crate is pure state and codec logic: no sockets, no timers,
//! no tasks. The `relaymq` crate drives these types from a tokio event loop.
//!
//! - [`packet`]: the v5.0 control packets as a single [`Packet`] sum type
//! - [`framer`]: splits an arbitrary byte stream into complete packet frames
//! - [`packet_id`]: in-flight message identifier allocation
//! - [`session`]: the durable persistence key scheme and inbound topic aliases
//! - [`qos2`]: the exactly-once acknowledgment decisions
//! - [`connection`], [`keepalive`]: lifecycle state, negotiated capabilities,
//!   reconnect backoff and keepalive bookkeeping

#![warn(clippy::pedantic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_lossless)]

pub mod connection;
pub mod constants;
pub mod encoding;
pub mod error;
pub mod framer;
pub mod keepalive;
pub mod packet;
pub mod packet_id;
pub mod protocol;
pub mod qos2;
pub mod session;
pub mod types;
pub mod validation;

pub use connection::{
    ConnectionCapabilities, ConnectionEvent, ConnectionState, DisconnectReason, ReconnectBackoff,
    ReconnectConfig,
};
pub use error::{MqttError, Result};
pub use framer::PacketFramer;
pub use keepalive::{KeepaliveAction, KeepaliveTracker};
pub use packet::{FixedHeader, MqttPacket, Packet, PacketType};
pub use packet_id::PacketIdAllocator;
pub use protocol::v5::properties::{Properties, PropertyId, PropertyValue, PropertyValueType};
pub use protocol::v5::reason_codes::ReasonCode;
pub use session::{InboundTopicAliases, StoreKey};
pub use types::{
    ConnectOptions, ConnectProperties, Message, MessageProperties, PublishOptions,
    PublishProperties, QoS, RetainHandling, SubscribeOptions, WillMessage, WillProperties,
};
pub use validation::{
    has_wildcards, is_shared_subscription, is_valid_topic_filter, is_valid_topic_name,
    parse_shared_subscription, strip_shared_subscription_prefix, topic_matches_filter,
    validate_client_id, validate_topic_filter, validate_topic_name,
};
