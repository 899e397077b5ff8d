/// Largest value the variable byte integer can carry (four bytes, 7 bits each).
pub const MAX_REMAINING_LENGTH: u32 = 268_435_455;

/// Largest encoded size of a packet: fixed header byte, 4 length bytes, body.
pub const MAX_PACKET_SIZE: u32 = MAX_REMAINING_LENGTH + 5;

pub const MAX_STRING_LENGTH: usize = 65_535;

pub const MAX_PACKET_ID: u16 = u16::MAX;

pub const MAX_SUBSCRIPTION_IDENTIFIER: u32 = MAX_REMAINING_LENGTH;

pub const PROTOCOL_NAME: &str = "MQTT";

pub const PROTOCOL_LEVEL_V5: u8 = 5;

pub mod defaults {
    use std::time::Duration;

    pub const KEEP_ALIVE: Duration = Duration::from_secs(60);
    pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
    pub const RECONNECT_MIN_DELAY: Duration = Duration::from_secs(1);
    pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(120);
    pub const QUIESCE_TIMEOUT: Duration = Duration::from_secs(30);
    pub const RECEIVE_MAXIMUM: u16 = 65_535;
    pub const OFFLINE_BUFFER_SIZE: usize = 5_000;
}
