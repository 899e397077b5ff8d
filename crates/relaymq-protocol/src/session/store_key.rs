//! Keys of the durable session store.
//!
//! The textual form is a fixed prefix followed by the decimal packet identifier.
//! Existing stores depend on it, so it must not change.

use std::fmt;
use std::str::FromStr;

use crate::error::MqttError;

const SENT: &str = "sent-";
const SENT_BUFFERED: &str = "sent-buffered-";
const CONFIRMED: &str = "confirmed-";
const RECEIVED: &str = "received-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    /// Outbound PUBLISH awaiting PUBACK or PUBREC.
    Sent(u16),
    /// Outbound PUBLISH queued while offline, never transmitted.
    SentBuffered(u16),
    /// PUBREL awaiting PUBCOMP.
    Confirmed(u16),
    /// Inbound QoS 2 PUBLISH awaiting PUBREL.
    Received(u16),
}

impl StoreKey {
    #[must_use]
    pub fn packet_id(&self) -> u16 {
        match *self {
            Self::Sent(id) | Self::SentBuffered(id) | Self::Confirmed(id) | Self::Received(id) => {
                id
            }
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Sent(_) => SENT,
            Self::SentBuffered(_) => SENT_BUFFERED,
            Self::Confirmed(_) => CONFIRMED,
            Self::Received(_) => RECEIVED,
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix(), self.packet_id())
    }
}

impl FromStr for StoreKey {
    type Err = MqttError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        // "sent-buffered-" must be tried before "sent-".
        let (make, digits): (fn(u16) -> Self, &str) =
            if let Some(rest) = key.strip_prefix(SENT_BUFFERED) {
                (Self::SentBuffered, rest)
            } else if let Some(rest) = key.strip_prefix(SENT) {
                (Self::Sent, rest)
            } else if let Some(rest) = key.strip_prefix(CONFIRMED) {
                (Self::Confirmed, rest)
            } else if let Some(rest) = key.strip_prefix(RECEIVED) {
                (Self::Received, rest)
            } else {
                return Err(MqttError::Persistence(format!("Unknown store key {key:?}")));
            };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MqttError::Persistence(format!(
                "Store key {key:?} has no decimal packet identifier"
            )));
        }
        match digits.parse::<u16>() {
            Ok(id) if id != 0 => Ok(make(id)),
            _ => Err(MqttError::Persistence(format!(
                "Store key {key:?} has an out of range packet identifier"
            ))),
        }
    }
}
