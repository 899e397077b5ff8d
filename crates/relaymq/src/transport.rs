//! Byte-stream transports the client connects over.
//!
//! A [`Connector`] turns a [`ServerUri`] into a bidirectional stream. The
//! default [`NetworkConnector`] speaks plain TCP and TLS; tests and custom
//! transports plug in their own implementation.

use relaymq_protocol::{MqttError, Result};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;
use url::Url;

pub const DEFAULT_TCP_PORT: u16 = 1883;
pub const DEFAULT_TLS_PORT: u16 = 8883;

pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

pub type BoxedStream = Box<dyn AsyncStream>;

pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = Result<BoxedStream>> + Send + 'a>>;

pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, uri: &'a ServerUri) -> ConnectFuture<'a>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Tls,
}

/// A parsed broker address: `tcp://` or `mqtt://` for plain TCP,
/// `ssl://`, `tls://` or `mqtts://` for TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUri {
    raw: String,
    scheme: Scheme,
    host: String,
    port: u16,
}

impl ServerUri {
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ServerUri {
    type Err = MqttError;

    fn from_str(raw: &str) -> Result<Self> {
        let url =
            Url::parse(raw).map_err(|e| MqttError::InvalidServerUri(format!("{raw}: {e}")))?;
        let (scheme, default_port) = match url.scheme() {
            "tcp" | "mqtt" => (Scheme::Tcp, DEFAULT_TCP_PORT),
            "ssl" | "tls" | "mqtts" => (Scheme::Tls, DEFAULT_TLS_PORT),
            other => {
                return Err(MqttError::InvalidServerUri(format!(
                    "{raw}: unsupported scheme {other}"
                )))
            }
        };
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| MqttError::InvalidServerUri(format!("{raw}: missing host")))?;
        // IPv6 literals come back bracketed.
        let host = host.trim_start_matches('[').trim_end_matches(']');

        Ok(Self {
            raw: raw.to_string(),
            scheme,
            host: host.to_string(),
            port: url.port().unwrap_or(default_port),
        })
    }
}

impl fmt::Display for ServerUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// TCP with `TCP_NODELAY`, optionally wrapped in TLS.
#[derive(Clone)]
pub struct NetworkConnector {
    tls: Option<Arc<ClientConfig>>,
}

impl Default for NetworkConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NetworkConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConnector")
            .field("custom_tls", &self.tls.is_some())
            .finish()
    }
}

impl NetworkConnector {
    /// TLS connections trust the Mozilla root set from `webpki-roots`.
    #[must_use]
    pub fn new() -> Self {
        Self { tls: None }
    }

    #[must_use]
    pub fn with_tls_config(config: Arc<ClientConfig>) -> Self {
        Self { tls: Some(config) }
    }

    fn tls_config(&self) -> Result<Arc<ClientConfig>> {
        if let Some(config) = &self.tls {
            return Ok(Arc::clone(config));
        }
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config =
            ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
                .with_safe_default_protocol_versions()
                .map_err(|e| {
                    MqttError::Configuration(format!("Failed to set TLS protocol versions: {e}"))
                })?
                .with_root_certificates(roots)
                .with_no_client_auth();
        Ok(Arc::new(config))
    }

    async fn open(&self, uri: &ServerUri) -> Result<BoxedStream> {
        let tcp = TcpStream::connect((uri.host(), uri.port()))
            .await
            .map_err(|e| MqttError::ConnectionError(format!("{uri}: {e}")))?;
        tcp.set_nodelay(true)?;
        debug!(server_uri = %uri, "TCP connection established");

        match uri.scheme() {
            Scheme::Tcp => Ok(Box::new(tcp)),
            Scheme::Tls => {
                let server_name = ServerName::try_from(uri.host().to_string()).map_err(|e| {
                    MqttError::InvalidServerUri(format!("{uri}: invalid TLS server name: {e}"))
                })?;
                let stream = TlsConnector::from(self.tls_config()?)
                    .connect(server_name, tcp)
                    .await
                    .map_err(|e| MqttError::ConnectionError(format!("{uri}: TLS handshake: {e}")))?;
                debug!(server_uri = %uri, "TLS session established");
                Ok(Box::new(stream))
            }
        }
    }
}

impl Connector for NetworkConnector {
    fn connect<'a>(&'a self, uri: &'a ServerUri) -> ConnectFuture<'a> {
        Box::pin(self.open(uri))
    }
}
