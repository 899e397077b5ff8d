use super::ack_common::{define_ack_packet, is_valid_publish_ack_reason_code};
use crate::packet::PacketType;

define_ack_packet! {
    /// PUBREC, the first response to a QoS 2 PUBLISH.
    pub struct PubRecPacket;
    packet_type = PacketType::PubRec;
    validator = is_valid_publish_ack_reason_code;
    label = "PUBREC";
}
