use relaymq_protocol::constants::defaults;
use relaymq_protocol::{ReconnectConfig, WillMessage};
use std::ops::{Deref, DerefMut};
use std::time::Duration;

/// Forwards `with_*` builders to the wrapped protocol options.
macro_rules! forward_protocol_builders {
    ($($name:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            #[must_use]
            pub fn $name(mut self, $($arg: $ty),*) -> Self {
                self.protocol = self.protocol.$name($($arg),*);
                self
            }
        )*
    };
}

/// Everything `connect` needs: the CONNECT packet fields plus the client-side
/// behaviour around it.
///
/// Derefs to [`relaymq_protocol::ConnectOptions`], so `options.keep_alive` or
/// `options.properties` read the protocol fields directly. The client
/// identifier always comes from the client the options are used with.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub protocol: relaymq_protocol::ConnectOptions,
    /// Tried in order; empty means the URI the client was built with.
    pub server_uris: Vec<String>,
    /// Limit for the transport connect plus the CONNECT/CONNACK exchange, per URI.
    pub connection_timeout: Duration,
    pub reconnect: ReconnectConfig,
    pub buffer: BufferOptions,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for ConnectOptions {
    type Target = relaymq_protocol::ConnectOptions;

    fn deref(&self) -> &Self::Target {
        &self.protocol
    }
}

impl DerefMut for ConnectOptions {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.protocol
    }
}

impl ConnectOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            protocol: relaymq_protocol::ConnectOptions::default(),
            server_uris: Vec::new(),
            connection_timeout: defaults::CONNECTION_TIMEOUT,
            reconnect: ReconnectConfig::default(),
            buffer: BufferOptions::default(),
        }
    }

    forward_protocol_builders! {
        with_keep_alive(keep_alive: Duration);
        with_clean_start(clean_start: bool);
        with_will(will: WillMessage);
        with_session_expiry_interval(seconds: u32);
        with_receive_maximum(receive_maximum: u16);
        with_maximum_packet_size(size: u32);
        with_topic_alias_maximum(maximum: u16);
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl AsRef<[u8]>,
    ) -> Self {
        self.protocol = self.protocol.with_credentials(username, password);
        self
    }

    #[must_use]
    pub fn with_authentication_method(mut self, method: impl Into<String>) -> Self {
        self.protocol = self.protocol.with_authentication_method(method);
        self
    }

    #[must_use]
    pub fn with_authentication_data(mut self, data: impl AsRef<[u8]>) -> Self {
        self.protocol = self.protocol.with_authentication_data(data);
        self
    }

    #[must_use]
    pub fn with_user_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.protocol = self.protocol.with_user_property(key, value);
        self
    }

    #[must_use]
    pub fn with_request_problem_information(mut self, request: bool) -> Self {
        self.protocol.properties.request_problem_information = Some(request);
        self
    }

    #[must_use]
    pub fn with_request_response_information(mut self, request: bool) -> Self {
        self.protocol.properties.request_response_information = Some(request);
        self
    }

    #[must_use]
    pub fn with_server_uris<I, S>(mut self, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_uris = uris.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_automatic_reconnect(mut self, enabled: bool) -> Self {
        self.reconnect.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.reconnect = self.reconnect.with_delays(min_delay, max_delay);
        self
    }

    #[must_use]
    pub fn with_buffer(mut self, buffer: BufferOptions) -> Self {
        self.buffer = buffer;
        self
    }
}

/// Publishes accepted while no connection is up.
///
/// Buffered messages are persisted under `sent-buffered-<id>` and written in
/// order once the next connection is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOptions {
    pub enabled: bool,
    pub max_messages: usize,
    /// When full, drop the oldest buffered message instead of refusing the new one.
    pub delete_oldest: bool,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            max_messages: defaults::OFFLINE_BUFFER_SIZE,
            delete_oldest: false,
        }
    }
}

impl BufferOptions {
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    #[must_use]
    pub fn with_delete_oldest(mut self, delete_oldest: bool) -> Self {
        self.delete_oldest = delete_oldest;
        self
    }
}
