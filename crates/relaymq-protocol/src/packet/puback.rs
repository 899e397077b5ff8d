use super::ack_common::{define_ack_packet, is_valid_publish_ack_reason_code};
use crate::packet::PacketType;

define_ack_packet! {
    /// PUBACK, the response to a QoS 1 PUBLISH.
    pub struct PubAckPacket;
    packet_type = PacketType::PubAck;
    validator = is_valid_publish_ack_reason_code;
    label = "PUBACK";
}
