use parking_lot::RwLock;
use relaymq_protocol::{topic_matches_filter, ConnectionEvent, Message};
use std::sync::Arc;

/// Receives application messages.
pub type MessageCallback = Arc<dyn Fn(Message) + Send + Sync>;

pub type ConnectionEventCallback = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;

#[derive(Clone)]
struct Listener {
    filter: String,
    subscription_id: Option<u32>,
    callback: MessageCallback,
}

/// Routes inbound messages and connection events to application code.
///
/// Callbacks are cloned out of the lock before they run, so a callback may
/// register or remove others.
#[derive(Default)]
pub struct CallbackRegistry {
    listeners: RwLock<Vec<Listener>>,
    message_callback: RwLock<Option<MessageCallback>>,
    event_callbacks: RwLock<Vec<ConnectionEventCallback>>,
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any listener already registered for `filter`.
    pub fn register_listener(
        &self,
        filter: impl Into<String>,
        subscription_id: Option<u32>,
        callback: MessageCallback,
    ) {
        let filter = filter.into();
        let mut listeners = self.listeners.write();
        listeners.retain(|listener| listener.filter != filter);
        listeners.push(Listener {
            filter,
            subscription_id,
            callback,
        });
    }

    pub fn remove_listener(&self, filter: &str) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|listener| listener.filter != filter);
        listeners.len() != before
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn set_message_callback(&self, callback: MessageCallback) {
        *self.message_callback.write() = Some(callback);
    }

    pub fn add_event_callback(&self, callback: ConnectionEventCallback) {
        self.event_callbacks.write().push(callback);
    }

    /// Delivers `message` to the listeners whose subscription identifier it
    /// carries, else to listeners whose filter matches its topic, else to the
    /// message callback. Returns how many callbacks ran.
    pub fn dispatch(&self, message: &Message) -> usize {
        let targets = self.targets(message);
        for callback in &targets {
            callback(message.clone());
        }
        targets.len()
    }

    fn targets(&self, message: &Message) -> Vec<MessageCallback> {
        let listeners = self.listeners.read();
        let ids = &message.properties.subscription_identifiers;

        let by_id: Vec<MessageCallback> = listeners
            .iter()
            .filter(|listener| listener.subscription_id.is_some_and(|id| ids.contains(&id)))
            .map(|listener| Arc::clone(&listener.callback))
            .collect();
        if !by_id.is_empty() {
            return by_id;
        }

        let by_filter: Vec<MessageCallback> = listeners
            .iter()
            .filter(|listener| topic_matches_filter(&message.topic, &listener.filter))
            .map(|listener| Arc::clone(&listener.callback))
            .collect();
        if !by_filter.is_empty() {
            return by_filter;
        }

        self.message_callback.read().iter().cloned().collect()
    }

    pub fn emit(&self, event: &ConnectionEvent) {
        let callbacks = self.event_callbacks.read().clone();
        for callback in callbacks {
            callback(event.clone());
        }
    }
}
