use super::ack_common::{define_ack_packet, is_valid_release_reason_code};
use crate::packet::PacketType;

define_ack_packet! {
    /// PUBCOMP, completing a QoS 2 exchange.
    pub struct PubCompPacket;
    packet_type = PacketType::PubComp;
    validator = is_valid_release_reason_code;
    label = "PUBCOMP";
}
