mod connect;
mod message;
mod publish;
mod subscribe;

pub use crate::protocol::v5::reason_codes::ReasonCode;
pub use connect::{ConnectOptions, ConnectProperties};
pub use message::{Message, MessageProperties, WillMessage, WillProperties};
pub use publish::{PublishOptions, PublishProperties};
pub use subscribe::{RetainHandling, SubscribeOptions};

use crate::error::{MqttError, Result};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    /// Strict conversion used when decoding wire bytes.
    pub fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(MqttError::InvalidQoS(other)),
        }
    }
}

impl From<u8> for QoS {
    fn from(value: u8) -> Self {
        match value {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}
