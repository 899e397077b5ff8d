use crate::callback::CallbackRegistry;
use crate::session::SubscriptionIdentifiers;
use crate::token::Token;
use crate::types::ConnectOptions;
use parking_lot::{Mutex, RwLock};
use relaymq_protocol::{ConnectionCapabilities, ConnectionState, PacketIdAllocator};
use std::sync::Arc;

/// State read synchronously by client handles and written by the engine.
pub(crate) struct Shared {
    client_id: RwLock<String>,
    server_uri: String,
    status: Mutex<Status>,
    pub(crate) ids: Arc<Mutex<PacketIdAllocator>>,
    pub(crate) subscription_ids: Arc<SubscriptionIdentifiers>,
    pub(crate) callbacks: CallbackRegistry,
    restored: Mutex<Vec<Token>>,
}

struct Status {
    state: ConnectionState,
    capabilities: ConnectionCapabilities,
    options: ConnectOptions,
}

impl Shared {
    pub(crate) fn new(
        client_id: String,
        server_uri: String,
        options: ConnectOptions,
        ids: Arc<Mutex<PacketIdAllocator>>,
        subscription_ids: Arc<SubscriptionIdentifiers>,
        restored: Vec<Token>,
    ) -> Self {
        Self {
            client_id: RwLock::new(client_id),
            server_uri,
            status: Mutex::new(Status {
                state: ConnectionState::Disconnected,
                capabilities: ConnectionCapabilities::default(),
                options,
            }),
            ids,
            subscription_ids,
            callbacks: CallbackRegistry::new(),
            restored: Mutex::new(restored),
        }
    }

    pub(crate) fn client_id(&self) -> String {
        self.client_id.read().clone()
    }

    pub(crate) fn set_client_id(&self, client_id: &str) {
        client_id.clone_into(&mut self.client_id.write());
    }

    pub(crate) fn server_uri(&self) -> &str {
        &self.server_uri
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.status.lock().state
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.status.lock().state = state;
    }

    /// Moves to `next` only when the current state satisfies `allowed`.
    /// Returns the state found.
    pub(crate) fn transition(
        &self,
        allowed: impl FnOnce(ConnectionState) -> bool,
        next: ConnectionState,
    ) -> ConnectionState {
        let mut status = self.status.lock();
        let current = status.state;
        if allowed(current) {
            status.state = next;
        }
        current
    }

    pub(crate) fn capabilities(&self) -> ConnectionCapabilities {
        self.status.lock().capabilities.clone()
    }

    pub(crate) fn set_capabilities(&self, capabilities: ConnectionCapabilities) {
        self.status.lock().capabilities = capabilities;
    }

    pub(crate) fn options(&self) -> ConnectOptions {
        self.status.lock().options.clone()
    }

    pub(crate) fn set_options(&self, options: ConnectOptions) {
        self.status.lock().options = options;
    }

    pub(crate) fn restored_tokens(&self) -> Vec<Token> {
        let mut restored = self.restored.lock();
        restored.retain(|token| !token.is_complete());
        restored.clone()
    }
}
