//! The per-client event loop.
//!
//! One task owns the session, the retry queue, the live connection and every
//! timer. Client handles talk to it through [`Command`]s; the reader task of
//! the current connection forwards raw bytes tagged with a connection epoch so
//! that data from a link that has already been replaced is ignored.

use super::command::Command;
use super::handshake::{self, Handshake, HandshakeRequest, READ_BUFFER_SIZE};
use super::shared::Shared;
use crate::auth_handler::AuthHandler;
use crate::session::Session;
use crate::token::Token;
use crate::transport::{BoxedStream, Connector, ServerUri};
use crate::types::ConnectOptions;
use bytes::{Bytes, BytesMut};
use relaymq_protocol::packet::{
    AuthPacket, DisconnectPacket, PublishPacket, SubscribePacket, UnsubscribePacket,
};
use relaymq_protocol::{
    ConnectionCapabilities, ConnectionEvent, ConnectionState, DisconnectReason,
    InboundTopicAliases, KeepaliveAction, KeepaliveTracker, MqttError, Packet, PacketFramer,
    Properties, QoS, ReasonCode, ReconnectBackoff, Result, StoreKey,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

type HandshakeFuture = Pin<Box<dyn Future<Output = Result<Handshake>> + Send>>;

pub(super) enum LinkEvent {
    Data { epoch: u64, bytes: Bytes },
    Closed { epoch: u64, error: Option<String> },
}

/// The live network connection.
pub(super) struct Link {
    writer: WriteHalf<BoxedStream>,
    reader: JoinHandle<()>,
    pub(super) framer: PacketFramer,
    pub(super) keepalive: KeepaliveTracker,
    pub(super) capabilities: ConnectionCapabilities,
    server_uri: ServerUri,
}

struct PendingDisconnect {
    deadline: Instant,
    reason: ReasonCode,
    properties: Properties,
    token: Token,
}

pub(crate) struct EngineParts {
    pub shared: Arc<Shared>,
    pub session: Session,
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub connector: Arc<dyn Connector>,
    pub auth: Option<Arc<dyn AuthHandler>>,
    pub server_uri: ServerUri,
    pub options: ConnectOptions,
}

pub(crate) struct Engine {
    pub(super) shared: Arc<Shared>,
    pub(super) session: Session,
    commands: mpsc::UnboundedReceiver<Command>,
    connector: Arc<dyn Connector>,
    pub(super) auth: Option<Arc<dyn AuthHandler>>,
    server_uri: ServerUri,
    pub(super) options: ConnectOptions,

    pub(super) link: Option<Link>,
    /// Set when the link failed; the loop turns it into a connection loss.
    pub(super) link_failure: Option<DisconnectReason>,
    epoch: u64,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    events_rx: mpsc::UnboundedReceiver<LinkEvent>,
    pub(super) aliases: InboundTopicAliases,

    handshake: Option<HandshakeFuture>,
    connect_token: Option<Token>,
    /// The running handshake replaces a lost connection.
    reconnecting: bool,
    /// A connection was established since the last explicit connect.
    established: bool,
    backoff: ReconnectBackoff,
    reconnect_at: Option<Instant>,

    disconnect: Option<PendingDisconnect>,
    pub(super) auth_token: Option<Token>,
    closed: bool,
}

impl Engine {
    pub(crate) fn new(parts: EngineParts) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let backoff = ReconnectBackoff::new(&parts.options.reconnect);
        Self {
            shared: parts.shared,
            session: parts.session,
            commands: parts.commands,
            connector: parts.connector,
            auth: parts.auth,
            server_uri: parts.server_uri,
            options: parts.options,
            link: None,
            link_failure: None,
            epoch: 0,
            events_tx,
            events_rx,
            aliases: InboundTopicAliases::default(),
            handshake: None,
            connect_token: None,
            reconnecting: false,
            established: false,
            backoff,
            reconnect_at: None,
            disconnect: None,
            auth_token: None,
            closed: false,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(client_id = %self.session.client_id(), "Client engine started");
        while !self.closed {
            if let Some(reason) = self.link_failure.take() {
                self.connection_lost(reason);
                continue;
            }

            let keepalive_at = self
                .link
                .as_ref()
                .and_then(|link| link.keepalive.next_deadline())
                .map(Instant::from_std);
            let reconnect_at = self.reconnect_at;
            let disconnect_at = self.disconnect.as_ref().map(|pending| pending.deadline);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All client handles dropped");
                        self.shutdown(None).await;
                    }
                },

                // Bytes and close notifications from the reader task
                Some(event) = self.events_rx.recv() => self.handle_link_event(event).await,

                // CONNECT / CONNACK exchange in progress
                result = poll_handshake(&mut self.handshake) => {
                    self.handshake = None;
                    self.handshake_finished(result).await;
                }

                () = sleep_until(keepalive_at) => self.keepalive_due().await,

                () = sleep_until(reconnect_at) => {
                    self.reconnect_at = None;
                    if self.link.is_none() && self.handshake.is_none() {
                        self.begin_handshake(true);
                    }
                }

                () = sleep_until(disconnect_at) => {
                    debug!("Quiesce period elapsed");
                    self.finish_disconnect().await;
                }
            }
        }
        debug!(client_id = %self.session.client_id(), "Client engine stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { options, token } => self.connect(*options, token),
            Command::Disconnect {
                quiesce,
                reason,
                properties,
                token,
            } => self.start_disconnect(quiesce, reason, properties, token).await,
            Command::Publish { packet, token } => self.publish(packet, token).await,
            Command::Subscribe { packet, token } => self.subscribe(packet, token).await,
            Command::Unsubscribe { packet, token } => self.unsubscribe(packet, token).await,
            Command::Authenticate { packet, token } => self.authenticate(packet, token).await,
            Command::Reconnect => {
                if self.link.is_some() || self.handshake.is_some() {
                    debug!("Reconnect ignored, connection already active");
                    return;
                }
                self.reconnect_at = None;
                self.begin_handshake(true);
            }
            Command::Close { token } => self.shutdown(Some(token)).await,
        }
    }

    fn connect(&mut self, options: ConnectOptions, token: Token) {
        if self.link.is_some() {
            token.fail(MqttError::AlreadyConnected);
            return;
        }
        if let Some(previous) = self.connect_token.take() {
            previous.fail(MqttError::InvalidState(
                "Superseded by a newer connect".to_string(),
            ));
        }
        self.handshake = None;
        self.reconnect_at = None;
        self.backoff = ReconnectBackoff::new(&options.reconnect);
        self.options = options;
        self.established = false;
        self.connect_token = Some(token);
        self.begin_handshake(false);
    }

    fn server_uris(&self) -> Result<Vec<ServerUri>> {
        if self.options.server_uris.is_empty() {
            return Ok(vec![self.server_uri.clone()]);
        }
        self.options
            .server_uris
            .iter()
            .map(|uri| uri.parse())
            .collect()
    }

    fn begin_handshake(&mut self, reconnect: bool) {
        let uris = match self.server_uris() {
            Ok(uris) => uris,
            Err(e) => {
                self.shared.set_state(ConnectionState::Disconnected);
                if let Some(token) = self.connect_token.take() {
                    token.fail(e);
                }
                return;
            }
        };

        self.shared.set_state(ConnectionState::Connecting);
        self.reconnecting = reconnect;
        info!(
            client_id = %self.shared.client_id(),
            reconnect,
            uris = uris.len(),
            "Initiating MQTT connection"
        );
        let request = HandshakeRequest {
            connector: Arc::clone(&self.connector),
            auth: self.auth.clone(),
            uris,
            options: self.options.clone(),
            client_id: self.shared.client_id(),
        };
        self.handshake = Some(Box::pin(handshake::establish(request)));
    }

    async fn handshake_finished(&mut self, result: Result<Handshake>) {
        let reconnect = std::mem::take(&mut self.reconnecting);
        let handshake = match result {
            Ok(handshake) => handshake,
            Err(e) => {
                warn!(error = %e, reconnect, "Connection attempt failed");
                self.shared.set_state(ConnectionState::Disconnected);
                if let Some(token) = self.connect_token.take() {
                    token.fail(e);
                }
                if reconnect && self.options.reconnect.enabled {
                    self.schedule_reconnect();
                }
                return;
            }
        };

        let Handshake {
            stream,
            framer,
            leftover,
            connack,
            server_uri,
        } = handshake;

        let capabilities = ConnectionCapabilities::from(&connack);
        if let Some(assigned) = &capabilities.assigned_client_id {
            info!(client_id = %assigned, "Broker assigned client identifier");
            self.shared.set_client_id(assigned);
        }
        let keep_alive = capabilities.effective_keep_alive(self.options.keep_alive);

        let (reader, writer) = tokio::io::split(stream);
        self.epoch += 1;
        let reader = tokio::spawn(read_loop(reader, self.epoch, self.events_tx.clone()));
        self.link = Some(Link {
            writer,
            reader,
            framer,
            keepalive: KeepaliveTracker::new(keep_alive, now()),
            capabilities: capabilities.clone(),
            server_uri: server_uri.clone(),
        });
        self.aliases
            .reset(self.options.properties.topic_alias_maximum.unwrap_or(0));
        self.shared.set_capabilities(capabilities);
        self.shared.set_state(ConnectionState::Connected);
        self.backoff.reset();
        self.established = true;

        info!(
            client_id = %self.shared.client_id(),
            server_uri = %server_uri,
            session_present = connack.session_present,
            keep_alive = ?keep_alive,
            "Connected to MQTT broker"
        );

        if self.options.clean_start && !connack.session_present {
            self.session.discard_broker_state().await;
        }

        let session_present = connack.session_present;
        if let Some(token) = self.connect_token.take() {
            token.complete(Some(Packet::ConnAck(connack)));
        }
        self.shared.callbacks.emit(&ConnectionEvent::Connected {
            session_present,
            reconnect,
            server_uri: server_uri.to_string(),
        });

        for frame in leftover {
            if self.link_failure.is_some() {
                break;
            }
            self.handle_frame(frame).await;
        }
        self.flush().await;
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.backoff.next_delay();
        let attempt = self.backoff.attempt();
        self.reconnect_at = Some(Instant::now() + delay);
        info!(attempt, delay = ?delay, "Reconnect scheduled");
        self.shared
            .callbacks
            .emit(&ConnectionEvent::ReconnectScheduled { attempt, delay });
    }

    fn drop_link(&mut self) -> Option<Link> {
        self.epoch += 1;
        let link = self.link.take()?;
        link.reader.abort();
        Some(link)
    }

    pub(super) fn connection_lost(&mut self, reason: DisconnectReason) {
        if self.drop_link().is_none() {
            return;
        }
        self.session.outbound.mark_all_unsent();
        self.shared.set_state(ConnectionState::Disconnected);
        if let Some(token) = self.auth_token.take() {
            token.fail(MqttError::ConnectionError(
                "Connection lost during authentication".to_string(),
            ));
        }

        if let Some(pending) = self.disconnect.take() {
            info!(reason = ?reason, "Connection closed while disconnecting");
            self.established = false;
            pending.token.complete(None);
            self.shared.callbacks.emit(&ConnectionEvent::Disconnected);
            return;
        }

        error!(
            client_id = %self.shared.client_id(),
            reason = ?reason,
            pending = self.session.outbound.len(),
            "Connection lost"
        );
        self.shared
            .callbacks
            .emit(&ConnectionEvent::ConnectionLost { reason });
        if self.options.reconnect.enabled && self.established {
            self.schedule_reconnect();
        }
    }

    async fn start_disconnect(
        &mut self,
        quiesce: Duration,
        reason: ReasonCode,
        properties: Properties,
        token: Token,
    ) {
        if self.disconnect.is_some() {
            token.fail(MqttError::InvalidState(
                "Disconnect already in progress".to_string(),
            ));
            return;
        }
        let reconnect_pending = self.reconnect_at.take().is_some();
        self.established = false;

        if self.handshake.take().is_some() {
            info!("Connection attempt abandoned by disconnect");
            self.reconnecting = false;
            if let Some(connect) = self.connect_token.take() {
                connect.fail(MqttError::ConnectionError(
                    "Disconnected before the connection completed".to_string(),
                ));
            }
            self.shared.set_state(ConnectionState::Disconnected);
            token.complete(None);
            self.shared.callbacks.emit(&ConnectionEvent::Disconnected);
            return;
        }

        if self.link.is_none() {
            self.shared.set_state(ConnectionState::Disconnected);
            token.complete(None);
            if reconnect_pending {
                self.shared.callbacks.emit(&ConnectionEvent::Disconnected);
            }
            return;
        }

        info!(
            client_id = %self.shared.client_id(),
            quiesce = ?quiesce,
            "Initiating MQTT disconnect"
        );
        self.shared.set_state(ConnectionState::Disconnecting);
        self.disconnect = Some(PendingDisconnect {
            deadline: Instant::now() + quiesce,
            reason,
            properties,
            token,
        });
        self.check_quiesce().await;
    }

    pub(super) async fn check_quiesce(&mut self) {
        if self.disconnect.is_some() && !self.session.outbound.awaiting_acknowledgment() {
            self.finish_disconnect().await;
        }
    }

    async fn finish_disconnect(&mut self) {
        let Some(pending) = self.disconnect.take() else {
            return;
        };

        let mut packet = DisconnectPacket::new(pending.reason);
        packet.properties = pending.properties;
        if let Err(e) = self.write_packet(&Packet::Disconnect(packet)).await {
            debug!(error = %e, "DISCONNECT could not be written");
        }
        self.link_failure = None;

        if let Some(mut link) = self.drop_link() {
            if let Err(e) = link.writer.shutdown().await {
                trace!(error = %e, "Transport shutdown failed");
            }
        }
        self.session.outbound.mark_all_unsent();
        if let Some(token) = self.auth_token.take() {
            token.fail(MqttError::NotConnected);
        }
        self.shared.set_state(ConnectionState::Disconnected);
        info!(client_id = %self.shared.client_id(), "Disconnected from MQTT broker");
        pending.token.complete(None);
        self.shared.callbacks.emit(&ConnectionEvent::Disconnected);
    }

    async fn shutdown(&mut self, token: Option<Token>) {
        self.closed = true;
        self.handshake = None;
        self.reconnect_at = None;
        if let Some(mut link) = self.drop_link() {
            if let Err(e) = link.writer.shutdown().await {
                trace!(error = %e, "Transport shutdown failed");
            }
        }
        if let Some(connect) = self.connect_token.take() {
            connect.fail(MqttError::ClientClosed);
        }
        if let Some(auth) = self.auth_token.take() {
            auth.fail(MqttError::ClientClosed);
        }
        if let Some(pending) = self.disconnect.take() {
            pending.token.complete(None);
        }
        for entry in self.session.outbound.drain() {
            entry.token.fail(MqttError::ClientClosed);
        }
        if let Err(e) = self.session.store().close().await {
            warn!(error = %e, "Failed to close persistence");
        }
        self.shared.set_state(ConnectionState::Closed);
        info!(client_id = %self.shared.client_id(), "Client closed");
        if let Some(token) = token {
            token.complete(None);
        }
    }

    /// Encodes and writes one packet. A write failure marks the link as lost.
    pub(super) async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        if self.link_failure.is_some() {
            return Err(MqttError::NotConnected);
        }
        let Some(link) = self.link.as_mut() else {
            return Err(MqttError::NotConnected);
        };
        let bytes = packet.to_bytes()?;

        match write_frame(&mut link.writer, &bytes).await {
            Ok(()) => {
                link.keepalive.record_write(now());
                debug!(
                    packet_type = ?packet.packet_type(),
                    packet_id = ?packet.packet_id(),
                    size = bytes.len(),
                    "Packet sent"
                );
                Ok(())
            }
            Err(e) => {
                error!(server_uri = %link.server_uri, error = %e, "Write failed");
                self.link_failure = Some(DisconnectReason::NetworkError(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Writes a packet whose failure needs no handling beyond the link loss
    /// it already recorded.
    pub(super) async fn send_control(&mut self, packet: Packet) {
        if let Err(e) = self.write_packet(&packet).await {
            trace!(error = %e, packet_type = ?packet.packet_type(), "Control packet dropped");
        }
    }

    /// Sends DISCONNECT with `reason_code` and drops the connection.
    pub(super) async fn abort_connection(&mut self, reason_code: ReasonCode, message: String) {
        warn!(reason_code = ?reason_code, %message, "Closing connection after protocol error");
        self.send_control(Packet::Disconnect(DisconnectPacket::new(reason_code)))
            .await;
        self.link_failure = Some(DisconnectReason::ProtocolError(message));
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Data { epoch, bytes } if epoch == self.epoch => {
                let Some(link) = self.link.as_mut() else {
                    return;
                };
                match link.framer.feed(&bytes) {
                    Ok(frames) => {
                        for frame in frames {
                            if self.link_failure.is_some() || self.link.is_none() {
                                break;
                            }
                            self.handle_frame(frame).await;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Inbound stream is corrupt");
                        self.link_failure = Some(DisconnectReason::ProtocolError(e.to_string()));
                    }
                }
            }
            LinkEvent::Closed { epoch, error } if epoch == self.epoch => {
                let reason = error.unwrap_or_else(|| "Connection closed by peer".to_string());
                self.link_failure = Some(DisconnectReason::NetworkError(reason));
            }
            _ => trace!("Ignoring event from a previous connection"),
        }
    }

    async fn keepalive_due(&mut self) {
        let now = now();
        let Some(action) = self.link.as_ref().map(|link| link.keepalive.poll(now)) else {
            return;
        };
        match action {
            KeepaliveAction::SendPing => {
                if self.write_packet(&Packet::PingReq).await.is_ok() {
                    if let Some(link) = self.link.as_mut() {
                        link.keepalive.record_ping_sent(now);
                    }
                }
            }
            KeepaliveAction::TimedOut => {
                warn!("No PINGRESP within the keep alive timeout");
                self.link_failure = Some(DisconnectReason::KeepAliveTimeout);
            }
            KeepaliveAction::Idle => {}
        }
    }

    fn online(&self) -> bool {
        self.link.is_some() && self.link_failure.is_none() && self.disconnect.is_none()
    }

    async fn publish(&mut self, packet: PublishPacket, token: Token) {
        if packet.qos == QoS::AtMostOnce && self.online() {
            let borrowed = packet.packet_id;
            let result = self.write_packet(&Packet::Publish(packet)).await;
            if let Some(packet_id) = borrowed {
                self.session.release_id(packet_id);
            }
            match result {
                Ok(()) => token.complete(None),
                Err(e) => token.fail(e),
            };
            return;
        }

        let Some(packet_id) = packet.packet_id else {
            token.fail(MqttError::NotConnected);
            return;
        };
        if !self.online() && self.options.buffer.enabled {
            self.buffer_publish(packet_id, packet, token).await;
            return;
        }
        if packet.qos == QoS::AtMostOnce {
            self.session.release_id(packet_id);
            token.fail(MqttError::NotConnected);
            return;
        }

        let packet = Packet::Publish(packet);
        if let Err(e) = self.session.persist(StoreKey::Sent(packet_id), &packet).await {
            warn!(packet_id, error = %e, "Failed to persist outbound publish");
            self.session.release_id(packet_id);
            token.fail(e);
            return;
        }
        self.session.outbound.push(packet_id, packet, token, false);
        self.flush().await;
    }

    async fn buffer_publish(&mut self, packet_id: u16, packet: PublishPacket, token: Token) {
        let buffer = self.options.buffer;
        if self.session.outbound.buffered_count() >= buffer.max_messages {
            let oldest = self
                .session
                .outbound
                .oldest_buffered_id()
                .filter(|_| buffer.delete_oldest);
            match oldest {
                Some(oldest) => {
                    if let Some(entry) = self.session.finish_outbound(oldest).await {
                        warn!(packet_id = oldest, "Offline buffer full, dropping oldest message");
                        entry.token.fail(MqttError::BufferFull);
                    }
                }
                None => {
                    warn!(packet_id, "Offline buffer full, rejecting message");
                    self.session.release_id(packet_id);
                    token.fail(MqttError::BufferFull);
                    return;
                }
            }
        }

        let packet = Packet::Publish(packet);
        if let Err(e) = self
            .session
            .persist(StoreKey::SentBuffered(packet_id), &packet)
            .await
        {
            warn!(packet_id, error = %e, "Failed to persist buffered publish");
            self.session.release_id(packet_id);
            token.fail(e);
            return;
        }
        debug!(packet_id, "Publish buffered while offline");
        self.session.outbound.push(packet_id, packet, token, true);
    }

    async fn subscribe(&mut self, packet: SubscribePacket, token: Token) {
        let packet_id = packet.packet_id;
        self.session
            .outbound
            .push(packet_id, Packet::Subscribe(packet), token, false);
        self.flush().await;
    }

    async fn unsubscribe(&mut self, packet: UnsubscribePacket, token: Token) {
        let packet_id = packet.packet_id;
        self.session
            .outbound
            .push(packet_id, Packet::Unsubscribe(packet), token, false);
        self.flush().await;
    }

    async fn authenticate(&mut self, packet: AuthPacket, token: Token) {
        if !self.online() {
            token.fail(MqttError::NotConnected);
            return;
        }
        if let Err(e) = self.write_packet(&Packet::Auth(packet)).await {
            token.fail(e);
            return;
        }
        if let Some(previous) = self.auth_token.replace(token) {
            previous.fail(MqttError::InvalidState(
                "Superseded by a newer AUTH exchange".to_string(),
            ));
        }
    }

    /// Writes queued entries in submission order. QoS 1 and 2 publishes wait
    /// while the broker's receive maximum is reached.
    pub(super) async fn flush(&mut self) {
        let Some(receive_maximum) = self
            .link
            .as_ref()
            .map(|link| usize::from(link.capabilities.receive_maximum))
        else {
            return;
        };

        for packet_id in self.session.outbound.unsent_ids() {
            if self.link_failure.is_some() || self.link.is_none() {
                break;
            }
            let Some(entry) = self.session.outbound.get(packet_id) else {
                continue;
            };
            let is_new_publish = matches!(&entry.packet, Packet::Publish(p) if p.qos != QoS::AtMostOnce);
            if is_new_publish && self.session.outbound.in_flight_publishes() >= receive_maximum {
                trace!(packet_id, receive_maximum, "Publish waiting for receive maximum");
                continue;
            }
            let packet = entry.packet.clone();
            let buffered = entry.buffered;
            let at_most_once = matches!(&packet, Packet::Publish(p) if p.qos == QoS::AtMostOnce);

            if buffered && !at_most_once {
                match self.session.persist(StoreKey::Sent(packet_id), &packet).await {
                    Ok(()) => {
                        self.session.forget(StoreKey::SentBuffered(packet_id)).await;
                        if let Some(entry) = self.session.outbound.get_mut(packet_id) {
                            entry.buffered = false;
                        }
                    }
                    Err(e) => warn!(packet_id, error = %e, "Failed to persist buffered publish as sent"),
                }
            }

            if self.write_packet(&packet).await.is_err() {
                break;
            }

            if at_most_once {
                if let Some(entry) = self.session.finish_outbound(packet_id).await {
                    entry.token.complete(None);
                }
            } else if let Some(entry) = self.session.outbound.get_mut(packet_id) {
                entry.sent = true;
            }
        }
    }

    /// Acknowledgments free receive-maximum slots and may end a quiesce.
    pub(super) async fn after_ack(&mut self) {
        self.flush().await;
        self.check_quiesce().await;
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn poll_handshake(handshake: &mut Option<HandshakeFuture>) -> Result<Handshake> {
    match handshake {
        Some(handshake) => handshake.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn write_frame(writer: &mut WriteHalf<BoxedStream>, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

async fn read_loop(
    mut reader: ReadHalf<BoxedStream>,
    epoch: u64,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        buffer.reserve(READ_BUFFER_SIZE);
        match reader.read_buf(&mut buffer).await {
            Ok(0) => {
                let _ = events.send(LinkEvent::Closed { epoch, error: None });
                return;
            }
            Ok(n) => {
                trace!(bytes = n, "Read from transport");
                let bytes = buffer.split().freeze();
                if events.send(LinkEvent::Data { epoch, bytes }).is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = events.send(LinkEvent::Closed {
                    epoch,
                    error: Some(e.to_string()),
                });
                return;
            }
        }
    }
}
