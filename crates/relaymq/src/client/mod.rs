//! The public client handle.
//!
//! Every operation validates its arguments against the current state and the
//! broker's capabilities, allocates identifiers and hands a command to the
//! engine task, returning a [`Token`] that completes when the broker answers.
//! Usage errors are returned synchronously and never reach the engine.

mod command;
mod engine;
mod handlers;
mod handshake;
mod shared;

use crate::auth_handler::AuthHandler;
use crate::callback::{ConnectionEventCallback, MessageCallback};
use crate::persistence::{MemoryPersistence, Persistence};
use crate::session::Session;
use crate::token::Token;
use crate::transport::{Connector, NetworkConnector, ServerUri};
use crate::types::ConnectOptions;
use bytes::Bytes;
use command::Command;
use engine::{Engine, EngineParts};
use relaymq_protocol::constants::defaults;
use relaymq_protocol::packet::{
    AuthPacket, PublishPacket, SubscribePacket, TopicFilter, UnsubscribePacket,
};
use relaymq_protocol::{
    has_wildcards, is_shared_subscription, validate_client_id, validate_topic_filter,
    validate_topic_name, ConnectionCapabilities, ConnectionEvent, ConnectionState, Message,
    MqttError, Packet, Properties, PublishOptions, QoS, ReasonCode, Result, SubscribeOptions,
};
use shared::Shared;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Configures and starts an [`MqttClient`].
pub struct ClientBuilder {
    server_uri: String,
    client_id: String,
    options: ConnectOptions,
    persistence: Option<Arc<dyn Persistence>>,
    connector: Option<Arc<dyn Connector>>,
    auth_handler: Option<Arc<dyn AuthHandler>>,
}

impl ClientBuilder {
    #[must_use]
    pub fn new(server_uri: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            server_uri: server_uri.into(),
            client_id: client_id.into(),
            options: ConnectOptions::default(),
            persistence: None,
            connector: None,
            auth_handler: None,
        }
    }

    /// Options used by [`MqttClient::connect`].
    #[must_use]
    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    /// Defaults to [`MemoryPersistence`].
    #[must_use]
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Defaults to [`NetworkConnector`].
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    #[must_use]
    pub fn with_auth_handler(mut self, handler: Arc<dyn AuthHandler>) -> Self {
        self.auth_handler = Some(handler);
        self
    }

    /// Opens the persistence, restores unfinished deliveries and starts the
    /// engine task. Must be called within a tokio runtime.
    pub async fn build(self) -> Result<MqttClient> {
        validate_client_id(&self.client_id)?;
        let server_uri: ServerUri = self.server_uri.parse()?;
        for uri in &self.options.server_uris {
            uri.parse::<ServerUri>()?;
        }

        let store: Arc<dyn Persistence> = self
            .persistence
            .unwrap_or_else(|| Arc::new(MemoryPersistence::new()));
        store.open(&self.client_id, server_uri.as_str()).await?;

        let mut session = Session::new(self.client_id.clone(), Arc::clone(&store));
        let restored = session.restore().await?;
        if !restored.is_empty() {
            info!(
                client_id = %self.client_id,
                count = restored.len(),
                "Restored unfinished deliveries"
            );
        }

        let shared = Arc::new(Shared::new(
            self.client_id,
            server_uri.to_string(),
            self.options.clone(),
            session.ids(),
            session.subscription_ids(),
            restored,
        ));
        let connector: Arc<dyn Connector> = self
            .connector
            .unwrap_or_else(|| Arc::new(NetworkConnector::new()));
        let (commands, receiver) = mpsc::unbounded_channel();
        let engine = Engine::new(EngineParts {
            shared: Arc::clone(&shared),
            session,
            commands: receiver,
            connector,
            auth: self.auth_handler,
            server_uri,
            options: self.options,
        });
        tokio::spawn(engine.run());

        Ok(MqttClient { shared, commands })
    }
}

/// Handle to one MQTT session. Clones share the same session and engine.
#[derive(Clone)]
pub struct MqttClient {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for MqttClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttClient")
            .field("client_id", &self.shared.client_id())
            .field("server_uri", &self.shared.server_uri())
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}

impl MqttClient {
    /// A client with in-memory persistence and the default network connector.
    pub async fn new(server_uri: impl Into<String>, client_id: impl Into<String>) -> Result<Self> {
        ClientBuilder::new(server_uri, client_id).build().await
    }

    #[must_use]
    pub fn builder(server_uri: impl Into<String>, client_id: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(server_uri, client_id)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| MqttError::ClientClosed)
    }

    /// The client identifier in use; a broker-assigned one once connected.
    #[must_use]
    pub fn client_id(&self) -> String {
        self.shared.client_id()
    }

    #[must_use]
    pub fn server_uri(&self) -> &str {
        self.shared.server_uri()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.state().is_connected()
    }

    /// Capabilities from the most recent CONNACK.
    #[must_use]
    pub fn capabilities(&self) -> ConnectionCapabilities {
        self.shared.capabilities()
    }

    /// Tokens of deliveries restored from persistence that have not completed.
    #[must_use]
    pub fn pending_delivery_tokens(&self) -> Vec<Token> {
        self.shared.restored_tokens()
    }

    /// Called for inbound messages no listener claims.
    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let callback: MessageCallback = Arc::new(callback);
        self.shared.callbacks.set_message_callback(callback);
    }

    pub fn on_connection_event<F>(&self, callback: F)
    where
        F: Fn(ConnectionEvent) + Send + Sync + 'static,
    {
        let callback: ConnectionEventCallback = Arc::new(callback);
        self.shared.callbacks.add_event_callback(callback);
    }

    /// Connects with the options the client was built with.
    pub fn connect(&self) -> Result<Token> {
        self.connect_with(self.shared.options())
    }

    /// The token completes with the CONNACK, or fails with the refusal or the
    /// last transport error once every server URI has been tried.
    pub fn connect_with(&self, options: ConnectOptions) -> Result<Token> {
        for uri in &options.server_uris {
            uri.parse::<ServerUri>()?;
        }
        if self.shared.client_id().is_empty() && !options.clean_start {
            return Err(MqttError::InvalidClientId(
                "an empty client identifier requires clean start".to_string(),
            ));
        }

        let found = self.shared.transition(
            |state| state == ConnectionState::Disconnected,
            ConnectionState::Connecting,
        );
        match found {
            ConnectionState::Disconnected => {}
            ConnectionState::Closed => return Err(MqttError::ClientClosed),
            ConnectionState::Connected => return Err(MqttError::AlreadyConnected),
            other => {
                return Err(MqttError::InvalidState(format!(
                    "Cannot connect while {other:?}"
                )))
            }
        }

        self.shared.set_options(options.clone());
        let token = Token::new(None);
        self.send(Command::Connect {
            options: Box::new(options),
            token: token.clone(),
        })?;
        Ok(token)
    }

    /// Disconnects after waiting up to the default quiesce period for
    /// outstanding acknowledgments.
    pub fn disconnect(&self) -> Result<Token> {
        self.disconnect_with(
            defaults::QUIESCE_TIMEOUT,
            ReasonCode::Success,
            Properties::new(),
        )
    }

    /// The token always completes successfully, even when the DISCONNECT
    /// cannot be written.
    pub fn disconnect_with(
        &self,
        quiesce: Duration,
        reason: ReasonCode,
        properties: Properties,
    ) -> Result<Token> {
        match self.shared.state() {
            ConnectionState::Closed => return Err(MqttError::ClientClosed),
            ConnectionState::Disconnecting => {
                return Err(MqttError::InvalidState(
                    "Disconnect already in progress".to_string(),
                ))
            }
            _ => {}
        }
        let token = Token::new(None);
        self.send(Command::Disconnect {
            quiesce,
            reason,
            properties,
            token: token.clone(),
        })?;
        Ok(token)
    }

    /// Drops the current connection attempt schedule and connects again with
    /// the last options.
    pub fn reconnect(&self) -> Result<()> {
        match self.shared.state() {
            ConnectionState::Disconnected => self.send(Command::Reconnect),
            ConnectionState::Closed => Err(MqttError::ClientClosed),
            other => Err(MqttError::InvalidState(format!(
                "Cannot reconnect while {other:?}"
            ))),
        }
    }

    /// Releases the engine and the persistence. Only a disconnected client
    /// can be closed; closing twice is a no-op.
    pub fn close(&self) -> Result<Token> {
        let found = self.shared.transition(
            |state| state == ConnectionState::Disconnected,
            ConnectionState::Closed,
        );
        match found {
            ConnectionState::Disconnected => {
                let token = Token::new(None);
                if self
                    .send(Command::Close {
                        token: token.clone(),
                    })
                    .is_err()
                {
                    token.complete(None);
                }
                Ok(token)
            }
            ConnectionState::Closed => {
                let token = Token::new(None);
                token.complete(None);
                Ok(token)
            }
            other => Err(MqttError::InvalidState(format!(
                "Cannot close while {other:?}"
            ))),
        }
    }

    fn connected_capabilities(&self) -> Result<ConnectionCapabilities> {
        match self.shared.state() {
            ConnectionState::Connected => Ok(self.shared.capabilities()),
            ConnectionState::Closed => Err(MqttError::ClientClosed),
            _ => Err(MqttError::NotConnected),
        }
    }

    pub fn subscribe(&self, filter: impl Into<String>, qos: QoS) -> Result<Token> {
        let filter = TopicFilter::new(filter, SubscribeOptions::new(qos));
        self.subscribe_many(vec![filter], Properties::new())
    }

    /// The token fails only when the broker rejects every filter; per-filter
    /// results are in the SUBACK it carries.
    pub fn subscribe_many(&self, filters: Vec<TopicFilter>, properties: Properties) -> Result<Token> {
        self.subscribe_inner(filters, properties, None)
    }

    /// Subscribes and routes matching messages to `callback` instead of the
    /// default message callback.
    pub fn subscribe_with_listener<F>(
        &self,
        filter: impl Into<String>,
        qos: QoS,
        callback: F,
    ) -> Result<Token>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let filter = TopicFilter::new(filter, SubscribeOptions::new(qos));
        self.subscribe_inner(vec![filter], Properties::new(), Some(Arc::new(callback)))
    }

    fn subscribe_inner(
        &self,
        filters: Vec<TopicFilter>,
        properties: Properties,
        listener: Option<MessageCallback>,
    ) -> Result<Token> {
        if filters.is_empty() {
            return Err(MqttError::InvalidTopicFilter(
                "at least one topic filter is required".to_string(),
            ));
        }
        for filter in &filters {
            validate_topic_filter(&filter.filter)?;
        }
        let capabilities = self.connected_capabilities()?;
        for filter in &filters {
            if !capabilities.wildcard_subscription_available && has_wildcards(&filter.filter) {
                return Err(MqttError::WildcardSubscriptionsNotSupported);
            }
            if !capabilities.shared_subscription_available
                && is_shared_subscription(&filter.filter)
            {
                return Err(MqttError::SharedSubscriptionsNotSupported);
            }
        }
        if properties.subscription_identifiers().next().is_some()
            && !capabilities.subscription_identifiers_available
        {
            return Err(MqttError::SubscriptionIdentifiersNotSupported);
        }

        let packet_id = self.shared.ids.lock().allocate()?;
        let mut packet = SubscribePacket {
            packet_id,
            filters,
            properties,
        };

        if let Some(callback) = listener {
            let subscription_id = capabilities
                .subscription_identifiers_available
                .then(|| self.shared.subscription_ids.next());
            if let Some(id) = subscription_id {
                packet = packet.with_subscription_identifier(id);
            }
            for filter in &packet.filters {
                self.shared.callbacks.register_listener(
                    filter.filter.clone(),
                    subscription_id,
                    Arc::clone(&callback),
                );
            }
        }

        debug!(packet_id, filters = packet.filters.len(), "Subscribing");
        let token = Token::new(Some(packet_id));
        let filters: Vec<String> = packet.filters.iter().map(|f| f.filter.clone()).collect();
        if let Err(e) = self.send(Command::Subscribe {
            packet,
            token: token.clone(),
        }) {
            self.shared.ids.lock().release(packet_id);
            for filter in &filters {
                self.shared.callbacks.remove_listener(filter);
            }
            return Err(e);
        }
        Ok(token)
    }

    pub fn unsubscribe(&self, filter: impl Into<String>) -> Result<Token> {
        self.unsubscribe_many(vec![filter.into()], Properties::new())
    }

    /// Listeners for the filters stop receiving messages immediately.
    pub fn unsubscribe_many(&self, filters: Vec<String>, properties: Properties) -> Result<Token> {
        if filters.is_empty() {
            return Err(MqttError::InvalidTopicFilter(
                "at least one topic filter is required".to_string(),
            ));
        }
        for filter in &filters {
            validate_topic_filter(filter)?;
        }
        self.connected_capabilities()?;

        let packet_id = self.shared.ids.lock().allocate()?;
        for filter in &filters {
            self.shared.callbacks.remove_listener(filter);
        }
        let packet = UnsubscribePacket {
            packet_id,
            filters,
            properties,
        };

        debug!(packet_id, "Unsubscribing");
        let token = Token::new(Some(packet_id));
        if let Err(e) = self.send(Command::Unsubscribe {
            packet,
            token: token.clone(),
        }) {
            self.shared.ids.lock().release(packet_id);
            return Err(e);
        }
        Ok(token)
    }

    pub fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Result<Token> {
        self.publish_with_options(topic, payload, PublishOptions::new(qos).with_retain(retain))
    }

    /// QoS 0 tokens complete once the packet is written, QoS 1 with the
    /// PUBACK and QoS 2 with the PUBCOMP. While disconnected the message is
    /// buffered when offline buffering is enabled.
    pub fn publish_with_options(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        options: PublishOptions,
    ) -> Result<Token> {
        let topic = topic.into();
        validate_topic_name(&topic)?;

        let state = self.shared.state();
        if state.is_closed() {
            return Err(MqttError::ClientClosed);
        }
        let connected = state.is_connected();
        if !connected && !self.shared.options().buffer.enabled {
            return Err(MqttError::NotConnected);
        }

        let mut qos = options.qos;
        let capabilities = self.shared.capabilities();
        if connected {
            if options.retain && !capabilities.retain_available {
                return Err(MqttError::RetainNotSupported);
            }
            let granted = capabilities.downgrade_qos(qos);
            if granted != qos {
                warn!(
                    topic = %topic,
                    requested = ?qos,
                    granted = ?granted,
                    "Downgrading publish QoS to the server maximum"
                );
                qos = granted;
            }
            if let Some(alias) = options.properties.topic_alias {
                if alias == 0 || alias > capabilities.topic_alias_maximum {
                    return Err(MqttError::TopicAliasInvalid(alias));
                }
            }
        }

        let mut packet = PublishPacket::new(topic, payload, qos).with_retain(options.retain);
        packet.properties = Properties::from(&options.properties);

        // Offline QoS 0 messages borrow an identifier to key their record.
        let packet_id = if qos == QoS::AtMostOnce && connected {
            None
        } else {
            Some(self.shared.ids.lock().allocate()?)
        };
        packet.packet_id = packet_id;

        let release = |shared: &Shared| {
            if let Some(id) = packet_id {
                shared.ids.lock().release(id);
            }
        };

        if connected {
            if let Some(max) = capabilities.maximum_packet_size {
                let max = usize::try_from(max).unwrap_or(usize::MAX);
                let size = Packet::Publish(packet.clone()).to_bytes()?.len();
                if size > max {
                    release(&self.shared);
                    return Err(MqttError::PacketTooLarge { size, max });
                }
            }
        }

        let token = Token::new(packet_id.filter(|_| qos != QoS::AtMostOnce));
        if let Err(e) = self.send(Command::Publish {
            packet,
            token: token.clone(),
        }) {
            release(&self.shared);
            return Err(e);
        }
        Ok(token)
    }

    /// Starts re-authentication (reason `ReAuthenticate`) or continues an
    /// exchange (`ContinueAuthentication`). The token completes with the
    /// next AUTH from the broker.
    pub fn authenticate(&self, reason: ReasonCode, properties: Properties) -> Result<Token> {
        if !matches!(
            reason,
            ReasonCode::ContinueAuthentication | ReasonCode::ReAuthenticate
        ) {
            return Err(MqttError::InvalidReasonCode(u8::from(reason)));
        }
        self.connected_capabilities()?;

        let mut packet = AuthPacket::new(reason);
        packet.properties = properties;
        let token = Token::new(None);
        self.send(Command::Authenticate {
            packet,
            token: token.clone(),
        })?;
        Ok(token)
    }
}
