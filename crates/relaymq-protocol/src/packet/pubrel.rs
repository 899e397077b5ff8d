use super::ack_common::{define_ack_packet, is_valid_release_reason_code};
use crate::packet::PacketType;

define_ack_packet! {
    /// PUBREL, the release step of the QoS 2 exchange. Fixed header flags are 0x02.
    pub struct PubRelPacket;
    packet_type = PacketType::PubRel;
    validator = is_valid_release_reason_code;
    label = "PUBREL";
}
