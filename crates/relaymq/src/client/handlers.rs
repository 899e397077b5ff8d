//! Inbound packet handling for the engine.

use super::engine::Engine;
use crate::auth_handler::respond_to_challenge;
use bytes::Bytes;
use relaymq_protocol::packet::{
    AuthPacket, PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, PublishPacket,
    SubAckPacket, UnsubAckPacket,
};
use relaymq_protocol::qos2::{self, OutboundStage, QoS2Action};
use relaymq_protocol::{DisconnectReason, Message, MqttError, Packet, QoS, ReasonCode, StoreKey};
use tracing::{debug, info, warn};

impl Engine {
    pub(super) async fn handle_frame(&mut self, mut frame: Bytes) {
        let packet = match Packet::decode(&mut frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Failed to decode inbound packet");
                self.abort_connection(ReasonCode::MalformedPacket, e.to_string())
                    .await;
                return;
            }
        };
        debug!(
            packet_type = ?packet.packet_type(),
            packet_id = ?packet.packet_id(),
            "Packet received"
        );

        match packet {
            Packet::Publish(publish) => self.on_publish(publish).await,
            Packet::PubAck(ack) => self.on_puback(ack).await,
            Packet::PubRec(rec) => self.on_pubrec(rec).await,
            Packet::PubRel(rel) => self.on_pubrel(rel).await,
            Packet::PubComp(comp) => self.on_pubcomp(comp).await,
            Packet::SubAck(ack) => self.on_suback(ack).await,
            Packet::UnsubAck(ack) => self.on_unsuback(ack).await,
            Packet::PingResp => {
                if let Some(link) = self.link.as_mut() {
                    link.keepalive.record_pong();
                }
            }
            Packet::Disconnect(disconnect) => {
                info!(reason_code = ?disconnect.reason_code, "Server sent DISCONNECT");
                self.link_failure = Some(DisconnectReason::ServerDisconnect(
                    disconnect.reason_code,
                ));
            }
            Packet::Auth(auth) => self.on_auth(auth).await,
            other => {
                self.abort_connection(
                    ReasonCode::ProtocolError,
                    format!("Unexpected {:?} from server", other.packet_type()),
                )
                .await;
            }
        }
    }

    fn deliver(&self, publish: PublishPacket) {
        let message = Message::from(publish);
        if self.shared.callbacks.dispatch(&message) == 0 {
            debug!(topic = %message.topic, "No callback for inbound message");
        }
    }

    async fn on_publish(&mut self, mut publish: PublishPacket) {
        if let Err(e) = self.aliases.resolve(&mut publish) {
            self.abort_connection(ReasonCode::TopicAliasInvalid, e.to_string())
                .await;
            return;
        }

        let packet_id = match (publish.qos, publish.packet_id) {
            (QoS::AtMostOnce, _) => {
                self.deliver(publish);
                return;
            }
            (_, Some(packet_id)) => packet_id,
            (qos, None) => {
                self.abort_connection(
                    ReasonCode::ProtocolError,
                    format!("{qos:?} PUBLISH without packet identifier"),
                )
                .await;
                return;
            }
        };

        if publish.qos == QoS::AtLeastOnce {
            self.deliver(publish);
            self.send_control(Packet::PubAck(PubAckPacket::new(packet_id)))
                .await;
            return;
        }

        let mut pending = Some(publish);
        for action in qos2::handle_incoming_publish(packet_id, self.session.has_received(packet_id))
        {
            match action {
                QoS2Action::PersistReceived { .. } => {
                    let Some(publish) = &pending else {
                        continue;
                    };
                    if let Err(e) = self.session.record_received(publish).await {
                        warn!(packet_id, error = %e, "Failed to persist inbound QoS 2 receipt");
                        let rec = PubRecPacket::new_with_reason(
                            packet_id,
                            ReasonCode::ImplementationSpecificError,
                        );
                        self.send_control(Packet::PubRec(rec)).await;
                        return;
                    }
                }
                QoS2Action::DeliverMessage { .. } => {
                    if let Some(publish) = pending.take() {
                        self.deliver(publish);
                    }
                }
                QoS2Action::SendPubRec { .. } => {
                    if let Some(rec) = action.to_pubrec_packet() {
                        self.send_control(Packet::PubRec(rec)).await;
                    }
                }
                _ => {}
            }
        }
    }

    async fn on_pubrel(&mut self, rel: PubRelPacket) {
        let packet_id = rel.packet_id;
        for action in qos2::handle_incoming_pubrel(packet_id, self.session.has_received(packet_id))
        {
            match action {
                QoS2Action::ForgetReceived { .. } => self.session.forget_received(packet_id).await,
                QoS2Action::SendPubComp { .. } => {
                    if let Some(comp) = action.to_pubcomp_packet() {
                        self.send_control(Packet::PubComp(comp)).await;
                    }
                }
                _ => {}
            }
        }
    }

    async fn on_puback(&mut self, ack: PubAckPacket) {
        let packet_id = ack.packet_id;
        let awaiting = matches!(
            self.session.outbound.get(packet_id),
            Some(entry) if entry.sent
                && matches!(&entry.packet, Packet::Publish(p) if p.qos == QoS::AtLeastOnce)
        );
        if !awaiting {
            debug!(packet_id, "PUBACK for unknown packet identifier");
            return;
        }

        if let Some(entry) = self.session.finish_outbound(packet_id).await {
            if ack.reason_code.is_error() {
                warn!(packet_id, reason_code = ?ack.reason_code, "Publish rejected");
                entry.token.fail(MqttError::PublishFailed(ack.reason_code));
            } else {
                entry.token.complete(Some(Packet::PubAck(ack)));
            }
        }
        self.after_ack().await;
    }

    fn outbound_stage(&self, packet_id: u16) -> OutboundStage {
        match self.session.outbound.get(packet_id).map(|entry| &entry.packet) {
            Some(Packet::Publish(p)) if p.qos == QoS::ExactlyOnce => OutboundStage::AwaitingPubRec,
            Some(Packet::PubRel(_)) => OutboundStage::AwaitingPubComp,
            _ => OutboundStage::Unknown,
        }
    }

    async fn on_pubrec(&mut self, rec: PubRecPacket) {
        let packet_id = rec.packet_id;
        let stage = self.outbound_stage(packet_id);
        for action in qos2::handle_incoming_pubrec(packet_id, rec.reason_code, stage) {
            match action {
                QoS2Action::FailFlow { reason_code, .. } => {
                    if let Some(entry) = self.session.finish_outbound(packet_id).await {
                        warn!(packet_id, reason_code = ?reason_code, "QoS 2 publish rejected");
                        entry.token.fail(MqttError::PublishFailed(reason_code));
                    }
                    self.after_ack().await;
                }
                QoS2Action::PersistReleased { .. } => {
                    if !self.release_flow(packet_id).await {
                        return;
                    }
                }
                QoS2Action::SendPubRel { .. } => {
                    if let Some(rel) = action.to_pubrel_packet() {
                        self.send_control(Packet::PubRel(rel)).await;
                    }
                }
                _ => {}
            }
        }
    }

    /// The broker holds the message: the PUBLISH is replaced by its PUBREL,
    /// in the queue and in the store.
    ///
    /// Returns false when the PUBREL could not be stored. The PUBREL is then
    /// withheld and the connection closed, so the flow stays at the PUBLISH
    /// stage and is retried from the DUP PUBLISH on the next connection.
    async fn release_flow(&mut self, packet_id: u16) -> bool {
        let pubrel = Packet::PubRel(PubRelPacket::new(packet_id));
        if let Err(e) = self
            .session
            .persist(StoreKey::Confirmed(packet_id), &pubrel)
            .await
        {
            self.abort_connection(
                ReasonCode::ImplementationSpecificError,
                format!("Failed to persist PUBREL {packet_id}: {e}"),
            )
            .await;
            return false;
        }
        if let Some(entry) = self.session.outbound.get_mut(packet_id) {
            entry.packet = pubrel;
        }
        true
    }

    async fn on_pubcomp(&mut self, comp: PubCompPacket) {
        let packet_id = comp.packet_id;
        let stage = self.outbound_stage(packet_id);
        if stage == OutboundStage::Unknown {
            debug!(packet_id, "PUBCOMP for unknown packet identifier");
            return;
        }
        for action in qos2::handle_incoming_pubcomp(packet_id, comp.reason_code, stage) {
            let Some(entry) = self.session.finish_outbound(packet_id).await else {
                continue;
            };
            match action {
                QoS2Action::FailFlow { reason_code, .. } => {
                    warn!(packet_id, reason_code = ?reason_code, "QoS 2 release rejected");
                    entry.token.fail(MqttError::PublishFailed(reason_code));
                }
                _ => {
                    entry.token.complete(Some(Packet::PubComp(comp.clone())));
                }
            }
        }
        self.after_ack().await;
    }

    async fn on_suback(&mut self, ack: SubAckPacket) {
        let packet_id = ack.packet_id;
        let Some(Packet::Subscribe(_)) = self.session.outbound.get(packet_id).map(|e| &e.packet)
        else {
            debug!(packet_id, "SUBACK for unknown packet identifier");
            return;
        };
        let Some(entry) = self.session.finish_outbound(packet_id).await else {
            return;
        };

        if let Packet::Subscribe(subscribe) = &entry.packet {
            for (filter, reason_code) in subscribe.filters.iter().zip(&ack.reason_codes) {
                if reason_code.is_error() {
                    warn!(filter = %filter.filter, reason_code = ?reason_code, "Subscription rejected");
                    self.shared.callbacks.remove_listener(&filter.filter);
                }
            }
        }

        if ack.all_failed() {
            let reason_code = ack
                .reason_codes
                .first()
                .copied()
                .unwrap_or(ReasonCode::UnspecifiedError);
            entry.token.fail(MqttError::SubscriptionFailed(reason_code));
        } else {
            entry.token.complete(Some(Packet::SubAck(ack)));
        }
        self.after_ack().await;
    }

    async fn on_unsuback(&mut self, ack: UnsubAckPacket) {
        let packet_id = ack.packet_id;
        let Some(Packet::Unsubscribe(_)) = self.session.outbound.get(packet_id).map(|e| &e.packet)
        else {
            debug!(packet_id, "UNSUBACK for unknown packet identifier");
            return;
        };
        let Some(entry) = self.session.finish_outbound(packet_id).await else {
            return;
        };

        if ack.all_failed() {
            let reason_code = ack
                .reason_codes
                .first()
                .copied()
                .unwrap_or(ReasonCode::UnspecifiedError);
            entry.token.fail(MqttError::UnsubscriptionFailed(reason_code));
        } else {
            entry.token.complete(Some(Packet::UnsubAck(ack)));
        }
        self.after_ack().await;
    }

    /// Server AUTH during the session. A pending `authenticate` token takes
    /// the packet unless a handler is there to answer a challenge.
    async fn on_auth(&mut self, auth: AuthPacket) {
        let challenge = auth.reason_code == ReasonCode::ContinueAuthentication;
        if !challenge || self.auth.is_none() {
            match self.auth_token.take() {
                Some(token) => {
                    token.complete(Some(Packet::Auth(auth)));
                }
                None if challenge => {
                    self.abort_connection(
                        ReasonCode::ProtocolError,
                        "AUTH challenge without an authentication handler".to_string(),
                    )
                    .await;
                }
                None => debug!(reason_code = ?auth.reason_code, "Unsolicited AUTH"),
            }
            return;
        }

        let handler = self.auth.clone();
        let method = self.options.properties.authentication_method.clone();
        match respond_to_challenge(handler.as_deref(), method.as_deref(), &auth).await {
            Ok(Some(reply)) => self.send_control(Packet::Auth(reply)).await,
            Ok(None) => {}
            Err(e) => {
                if let Some(token) = self.auth_token.take() {
                    token.fail(e.clone());
                }
                self.abort_connection(ReasonCode::NotAuthorized, e.to_string())
                    .await;
            }
        }
    }
}
