//! Enhanced authentication hook.
//!
//! The client never interprets authentication data; it relays the bytes of
//! each server AUTH challenge to the handler and sends back what it returns.

use bytes::Bytes;
use relaymq_protocol::packet::AuthPacket;
use relaymq_protocol::{MqttError, ReasonCode, Result};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResponse {
    /// Send another AUTH carrying this data.
    Continue(Vec<u8>),
    /// Nothing more to send; wait for the server's verdict.
    Success,
    Abort(String),
}

pub type AuthFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

pub trait AuthHandler: Send + Sync {
    fn handle_challenge<'a>(
        &'a self,
        auth_method: &'a str,
        challenge_data: Option<&'a [u8]>,
    ) -> AuthFuture<'a, AuthResponse>;

    /// Authentication data for the CONNECT packet when the options carry none.
    fn initial_response<'a>(&'a self, _auth_method: &'a str) -> AuthFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move { Ok(None) })
    }
}

/// Answers a server AUTH carrying Continue Authentication. `None` means the
/// handler has nothing to send.
pub(crate) async fn respond_to_challenge(
    handler: Option<&dyn AuthHandler>,
    configured_method: Option<&str>,
    challenge: &AuthPacket,
) -> Result<Option<AuthPacket>> {
    if challenge.reason_code != ReasonCode::ContinueAuthentication {
        return Err(MqttError::ProtocolError(format!(
            "Unexpected AUTH reason code {:?}",
            challenge.reason_code
        )));
    }
    let Some(handler) = handler else {
        return Err(MqttError::ProtocolError(
            "AUTH challenge received without an authentication handler".to_string(),
        ));
    };
    let Some(method) = challenge.authentication_method().or(configured_method) else {
        return Err(MqttError::ProtocolError(
            "AUTH challenge without authentication method".to_string(),
        ));
    };

    let data = challenge.authentication_data().map(|data| &data[..]);
    match handler.handle_challenge(method, data).await? {
        AuthResponse::Continue(reply) => {
            debug!(method, len = reply.len(), "Answering AUTH challenge");
            Ok(Some(AuthPacket::continue_with(method, Bytes::from(reply))))
        }
        AuthResponse::Success => Ok(None),
        AuthResponse::Abort(reason) => {
            warn!(method, %reason, "Authentication aborted by handler");
            Err(MqttError::AuthenticationFailed)
        }
    }
}
