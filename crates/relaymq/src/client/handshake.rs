//! Transport connect plus the CONNECT / AUTH / CONNACK exchange.

use crate::auth_handler::{respond_to_challenge, AuthHandler};
use crate::transport::{BoxedStream, Connector, ServerUri};
use crate::types::ConnectOptions;
use bytes::Bytes;
use relaymq_protocol::packet::{ConnAckPacket, ConnectPacket};
use relaymq_protocol::{MqttError, Packet, PacketFramer, Result};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

pub(crate) const READ_BUFFER_SIZE: usize = 8 * 1024;

pub(crate) struct HandshakeRequest {
    pub connector: Arc<dyn Connector>,
    pub auth: Option<Arc<dyn AuthHandler>>,
    pub uris: Vec<ServerUri>,
    pub options: ConnectOptions,
    pub client_id: String,
}

/// A connection that has received a successful CONNACK.
pub(crate) struct Handshake {
    pub stream: BoxedStream,
    pub framer: PacketFramer,
    /// Frames that arrived in the same read as the CONNACK.
    pub leftover: Vec<Bytes>,
    pub connack: ConnAckPacket,
    pub server_uri: ServerUri,
}

/// Tries each URI in order. Transport failures and timeouts move on to the
/// next URI; a refusal from a broker ends the attempt.
pub(crate) async fn establish(request: HandshakeRequest) -> Result<Handshake> {
    let mut last_error = None;
    for uri in &request.uris {
        debug!(server_uri = %uri, client_id = %request.client_id, "Connecting");
        let outcome = if request.options.connection_timeout.is_zero() {
            Ok(attempt(&request, uri).await)
        } else {
            tokio::time::timeout(request.options.connection_timeout, attempt(&request, uri)).await
        };

        match outcome {
            Ok(Ok(handshake)) => {
                info!(
                    server_uri = %uri,
                    session_present = handshake.connack.session_present,
                    "CONNACK accepted"
                );
                return Ok(handshake);
            }
            Ok(Err(e @ (MqttError::ConnectionRefused(_) | MqttError::AuthenticationFailed))) => {
                warn!(server_uri = %uri, error = %e, "Broker refused the connection");
                return Err(e);
            }
            Ok(Err(e)) => {
                warn!(server_uri = %uri, error = %e, "Connection attempt failed");
                last_error = Some(e);
            }
            Err(_) => {
                warn!(
                    server_uri = %uri,
                    timeout = ?request.options.connection_timeout,
                    "Connection attempt timed out"
                );
                last_error = Some(MqttError::Timeout);
            }
        }
    }
    Err(last_error
        .unwrap_or_else(|| MqttError::ConnectionError("No server URI to connect to".to_string())))
}

async fn attempt(request: &HandshakeRequest, uri: &ServerUri) -> Result<Handshake> {
    let mut stream = request.connector.connect(uri).await?;

    let connect = connect_packet(request).await?;
    stream
        .write_all(&Packet::Connect(Box::new(connect)).to_bytes()?)
        .await?;
    stream.flush().await?;

    let mut framer = match request.options.properties.maximum_packet_size {
        Some(max) => PacketFramer::with_max_packet_size(max),
        None => PacketFramer::new(),
    };
    let mut chunk = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(MqttError::ConnectionClosedByPeer);
        }

        let mut frames = framer.feed(&chunk[..n])?.into_iter();
        while let Some(mut frame) = frames.next() {
            match Packet::decode(&mut frame)? {
                Packet::ConnAck(connack) => {
                    if connack.reason_code.is_error() {
                        return Err(MqttError::ConnectionRefused(connack.reason_code));
                    }
                    return Ok(Handshake {
                        stream,
                        framer,
                        leftover: frames.collect(),
                        connack,
                        server_uri: uri.clone(),
                    });
                }
                Packet::Auth(challenge) => {
                    let method = request.options.properties.authentication_method.as_deref();
                    if let Some(reply) =
                        respond_to_challenge(request.auth.as_deref(), method, &challenge).await?
                    {
                        stream.write_all(&Packet::Auth(reply).to_bytes()?).await?;
                        stream.flush().await?;
                    }
                }
                other => {
                    return Err(MqttError::ProtocolError(format!(
                        "Expected CONNACK, received {:?}",
                        other.packet_type()
                    )))
                }
            }
        }
    }
}

async fn connect_packet(request: &HandshakeRequest) -> Result<ConnectPacket> {
    let mut options = request.options.protocol.clone();
    options.client_id.clone_from(&request.client_id);

    if options.properties.authentication_data.is_none() {
        if let (Some(handler), Some(method)) = (
            request.auth.as_ref(),
            options.properties.authentication_method.clone(),
        ) {
            if let Some(data) = handler.initial_response(&method).await? {
                options.properties.authentication_data = Some(Bytes::from(data));
            }
        }
    }
    Ok(ConnectPacket::new(&options))
}
