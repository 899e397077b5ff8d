//! Decision functions for the QoS 2 exchange.
//!
//! They own no state: callers report what their session knows about a
//! packet identifier and apply the returned actions in order.

use crate::packet::{PubCompPacket, PubRecPacket, PubRelPacket};
use crate::protocol::v5::reason_codes::ReasonCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS2Action {
    DeliverMessage { packet_id: u16 },
    PersistReceived { packet_id: u16 },
    ForgetReceived { packet_id: u16 },
    PersistReleased { packet_id: u16 },
    SendPubRec { packet_id: u16, reason_code: ReasonCode },
    SendPubRel { packet_id: u16, reason_code: ReasonCode },
    SendPubComp { packet_id: u16, reason_code: ReasonCode },
    CompleteFlow { packet_id: u16 },
    FailFlow { packet_id: u16, reason_code: ReasonCode },
}

/// Where an outbound QoS 2 publish stands when an acknowledgment arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundStage {
    AwaitingPubRec,
    AwaitingPubComp,
    Unknown,
}

impl QoS2Action {
    #[must_use]
    pub fn to_pubrec_packet(&self) -> Option<PubRecPacket> {
        match *self {
            Self::SendPubRec {
                packet_id,
                reason_code,
            } => Some(PubRecPacket::new_with_reason(packet_id, reason_code)),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_pubrel_packet(&self) -> Option<PubRelPacket> {
        match *self {
            Self::SendPubRel {
                packet_id,
                reason_code,
            } => Some(PubRelPacket::new_with_reason(packet_id, reason_code)),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_pubcomp_packet(&self) -> Option<PubCompPacket> {
        match *self {
            Self::SendPubComp {
                packet_id,
                reason_code,
            } => Some(PubCompPacket::new_with_reason(packet_id, reason_code)),
            _ => None,
        }
    }
}

/// Inbound QoS 2 PUBLISH. Delivery happens on first receipt only.
#[must_use]
pub fn handle_incoming_publish(packet_id: u16, already_received: bool) -> Vec<QoS2Action> {
    let ack = QoS2Action::SendPubRec {
        packet_id,
        reason_code: ReasonCode::Success,
    };
    if already_received {
        return vec![ack];
    }
    vec![
        QoS2Action::PersistReceived { packet_id },
        QoS2Action::DeliverMessage { packet_id },
        ack,
    ]
}

#[must_use]
pub fn handle_incoming_pubrel(packet_id: u16, was_received: bool) -> Vec<QoS2Action> {
    if !was_received {
        return vec![QoS2Action::SendPubComp {
            packet_id,
            reason_code: ReasonCode::PacketIdentifierNotFound,
        }];
    }
    vec![
        QoS2Action::ForgetReceived { packet_id },
        QoS2Action::SendPubComp {
            packet_id,
            reason_code: ReasonCode::Success,
        },
    ]
}

#[must_use]
pub fn handle_incoming_pubrec(
    packet_id: u16,
    reason_code: ReasonCode,
    stage: OutboundStage,
) -> Vec<QoS2Action> {
    match stage {
        OutboundStage::Unknown => vec![QoS2Action::SendPubRel {
            packet_id,
            reason_code: ReasonCode::PacketIdentifierNotFound,
        }],
        OutboundStage::AwaitingPubRec if reason_code.is_error() => {
            vec![QoS2Action::FailFlow {
                packet_id,
                reason_code,
            }]
        }
        OutboundStage::AwaitingPubRec => vec![
            QoS2Action::PersistReleased { packet_id },
            QoS2Action::SendPubRel {
                packet_id,
                reason_code: ReasonCode::Success,
            },
        ],
        OutboundStage::AwaitingPubComp => vec![QoS2Action::SendPubRel {
            packet_id,
            reason_code: ReasonCode::Success,
        }],
    }
}

#[must_use]
pub fn handle_incoming_pubcomp(
    packet_id: u16,
    reason_code: ReasonCode,
    stage: OutboundStage,
) -> Vec<QoS2Action> {
    if stage != OutboundStage::AwaitingPubComp {
        return Vec::new();
    }
    if reason_code.is_error() {
        vec![QoS2Action::FailFlow {
            packet_id,
            reason_code,
        }]
    } else {
        vec![QoS2Action::CompleteFlow { packet_id }]
    }
}
