//! # relaymq
//!
//! An async MQTT v5.0 client built around a single engine task per client.
//!
//! Every operation returns a [`Token`] that completes when the broker has
//! answered: a PUBACK for QoS 1, a PUBCOMP for QoS 2, the SUBACK of a
//! subscription. QoS 1 and 2 messages are written to a [`Persistence`] store
//! before they are sent and replayed after a reconnect or a restart, so the
//! delivery guarantees hold across both.
//!
//! ## Architecture
//!
//! - [`MqttClient`] is a cheap, cloneable handle. Calls validate synchronously
//!   and hand a command to the engine.
//! - The engine owns the session, the retry queue, the connection and all
//!   timers (keep alive, reconnect backoff, disconnect quiesce).
//! - Protocol state machines live in the sans-io `relaymq-protocol` crate,
//!   re-exported here.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relaymq::{ConnectOptions, MqttClient, QoS};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ConnectOptions::new()
//!         .with_keep_alive(Duration::from_secs(30))
//!         .with_automatic_reconnect(true);
//!     let client = MqttClient::builder("mqtt://localhost:1883", "weather-station")
//!         .with_options(options)
//!         .build()
//!         .await?;
//!
//!     client.connect()?.wait().await?;
//!
//!     client
//!         .subscribe_with_listener("sensors/+/temperature", QoS::AtLeastOnce, |msg| {
//!             println!("{}: {}", msg.topic, String::from_utf8_lossy(&msg.payload));
//!         })?
//!         .wait()
//!         .await?;
//!
//!     client
//!         .publish("sensors/roof/temperature", "21.5", QoS::ExactlyOnce, false)?
//!         .wait()
//!         .await?;
//!
//!     client.disconnect()?.wait().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Durable delivery
//!
//! ```rust,no_run
//! use relaymq::{FilePersistence, MqttClient};
//! use std::sync::Arc;
//!
//! # async fn example() -> relaymq::Result<()> {
//! let client = MqttClient::builder("mqtts://broker.example.com", "meter-17")
//!     .with_persistence(Arc::new(FilePersistence::new("/var/lib/meter/mqtt")))
//!     .build()
//!     .await?;
//!
//! // Deliveries left unfinished by a previous run resume on connect.
//! for token in client.pending_delivery_tokens() {
//!     token.on_complete(|t| println!("restored delivery {:?} finished", t.message_id()));
//! }
//! client.connect()?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_lossless)]

pub use relaymq_protocol::{constants, packet, qos2, validation};

pub mod auth_handler;
pub mod callback;
pub mod client;
pub mod persistence;
pub mod session;
pub mod token;
pub mod transport;
pub mod types;

pub use auth_handler::{AuthFuture, AuthHandler, AuthResponse};
pub use callback::{ConnectionEventCallback, MessageCallback};
pub use client::{ClientBuilder, MqttClient};
pub use persistence::{FilePersistence, MemoryPersistence, Persistence, StoreFuture};
pub use token::{Token, TokenResult};
pub use transport::{
    AsyncStream, BoxedStream, ConnectFuture, Connector, NetworkConnector, Scheme, ServerUri,
};
pub use types::{BufferOptions, ConnectOptions};

pub use relaymq_protocol::{
    ConnectionCapabilities, ConnectionEvent, ConnectionState, DisconnectReason, Message,
    MessageProperties, MqttError, Packet, Properties, PublishOptions, PublishProperties, QoS,
    ReasonCode, ReconnectConfig, Result, RetainHandling, SubscribeOptions, WillMessage,
    WillProperties,
};
