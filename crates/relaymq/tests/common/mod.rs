//! In-process broker double for the integration tests.
//!
//! `DuplexConnector` hands the client one end of a `tokio::io::duplex` pipe and
//! sends the other end to the test, which then scripts the broker side packet
//! by packet with `ScriptedBroker`.

#![allow(dead_code)]

use bytes::Bytes;
use relaymq::packet::{ConnAckPacket, ConnectPacket};
use relaymq::{
    BoxedStream, ConnectFuture, ConnectOptions, Connector, MemoryPersistence, MqttClient,
    MqttError, Packet, Persistence, ReasonCode, ServerUri, StoreFuture,
};
use relaymq_protocol::PacketFramer;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub struct Accepted {
    pub uri: String,
    pub stream: DuplexStream,
}

pub struct DuplexConnector {
    accepted: mpsc::UnboundedSender<Accepted>,
    refuse_next: AtomicUsize,
    attempts: AtomicUsize,
    write_fault: Arc<AtomicBool>,
}

impl DuplexConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Accepted>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepted,
            refuse_next: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            write_fault: Arc::new(AtomicBool::new(false)),
        });
        (connector, rx)
    }

    /// The next `count` transport connects fail.
    pub fn refuse_next(&self, count: usize) {
        self.refuse_next.store(count, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// From now on every write on the client side of the link fails.
    pub fn break_writes(&self) {
        self.write_fault.store(true, Ordering::SeqCst);
    }
}

impl Connector for DuplexConnector {
    fn connect<'a>(&'a self, uri: &'a ServerUri) -> ConnectFuture<'a> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .refuse_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            // Hosts named "down*" never answer.
            if refused || uri.host().starts_with("down") {
                return Err(MqttError::ConnectionError(format!(
                    "{uri}: connection refused"
                )));
            }

            let (client, server) = tokio::io::duplex(64 * 1024);
            self.accepted
                .send(Accepted {
                    uri: uri.to_string(),
                    stream: server,
                })
                .map_err(|_| MqttError::ConnectionError("broker gone".to_string()))?;
            Ok(Box::new(FaultyStream {
                inner: client,
                write_fault: Arc::clone(&self.write_fault),
            }) as BoxedStream)
        })
    }
}

/// The client end of the pipe. Writes fail once `write_fault` is set; reads
/// keep working.
struct FaultyStream {
    inner: DuplexStream,
    write_fault: Arc<AtomicBool>,
}

impl FaultyStream {
    fn check(&self) -> io::Result<()> {
        if self.write_fault.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write fault"));
        }
        Ok(())
    }
}

impl AsyncRead for FaultyStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for FaultyStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.check()?;
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.check()?;
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// A memory store whose writes to keys starting with `prefix` fail while
/// `failures` is above zero.
pub struct FlakyStore {
    inner: MemoryPersistence,
    prefix: String,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(prefix: &str, failures: usize) -> Self {
        Self {
            inner: MemoryPersistence::new(),
            prefix: prefix.to_string(),
            failures: AtomicUsize::new(failures),
        }
    }

    pub fn records(&self) -> &MemoryPersistence {
        &self.inner
    }
}

impl Persistence for FlakyStore {
    fn open<'a>(&'a self, client_id: &'a str, server_uri: &'a str) -> StoreFuture<'a, ()> {
        self.inner.open(client_id, server_uri)
    }

    fn put<'a>(&'a self, key: &'a str, value: Bytes) -> StoreFuture<'a, ()> {
        let fail = key.starts_with(&self.prefix)
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if fail {
            return Box::pin(async move {
                Err(MqttError::Persistence(format!("{key}: disk full")))
            });
        }
        self.inner.put(key, value)
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Bytes>> {
        self.inner.get(key)
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        self.inner.remove(key)
    }

    fn contains_key<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        self.inner.contains_key(key)
    }

    fn keys(&self) -> StoreFuture<'_, Vec<String>> {
        self.inner.keys()
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        self.inner.clear()
    }

    fn close(&self) -> StoreFuture<'_, ()> {
        self.inner.close()
    }
}

pub struct ScriptedBroker {
    pub uri: String,
    stream: DuplexStream,
    framer: PacketFramer,
    pending: VecDeque<Packet>,
}

impl ScriptedBroker {
    pub async fn accept(rx: &mut mpsc::UnboundedReceiver<Accepted>) -> Self {
        let accepted = tokio::time::timeout(TIMEOUT, rx.recv())
            .await
            .expect("client did not connect")
            .expect("connector dropped");
        Self {
            uri: accepted.uri,
            stream: accepted.stream,
            framer: PacketFramer::new(),
            pending: VecDeque::new(),
        }
    }

    /// Accepts a connection, reads CONNECT and answers with a successful CONNACK.
    pub async fn accept_session(
        rx: &mut mpsc::UnboundedReceiver<Accepted>,
        session_present: bool,
    ) -> (Self, ConnectPacket) {
        let mut broker = Self::accept(rx).await;
        let connect = broker.expect_connect().await;
        broker
            .send(Packet::ConnAck(ConnAckPacket::new(
                session_present,
                ReasonCode::Success,
            )))
            .await;
        (broker, connect)
    }

    pub async fn expect_connect(&mut self) -> ConnectPacket {
        match self.recv().await {
            Packet::Connect(connect) => *connect,
            other => panic!("expected CONNECT, got {other:?}"),
        }
    }

    pub async fn recv(&mut self) -> Packet {
        self.try_recv()
            .await
            .expect("connection closed while waiting for a packet")
    }

    /// `None` once the client has closed its end.
    pub async fn try_recv(&mut self) -> Option<Packet> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(packet) = self.pending.pop_front() {
                return Some(packet);
            }
            let n = tokio::time::timeout(TIMEOUT, self.stream.read(&mut chunk))
                .await
                .expect("timed out waiting for the client")
                .ok()?;
            if n == 0 {
                return None;
            }
            self.pending
                .extend(self.framer.feed_packets(&chunk[..n]).expect("client sent garbage"));
        }
    }

    pub async fn send(&mut self, packet: Packet) {
        let bytes = packet.to_bytes().expect("encode");
        self.stream.write_all(&bytes).await.expect("write to client");
    }

    /// Drops the broker side, as a network failure would.
    pub fn drop_connection(self) {}
}

/// Honours `RUST_LOG`, e.g. `RUST_LOG=relaymq=trace`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_options() -> ConnectOptions {
    ConnectOptions::new().with_keep_alive(Duration::ZERO)
}

pub async fn client_with(
    client_id: &str,
    options: ConnectOptions,
    store: Arc<dyn Persistence>,
) -> (
    MqttClient,
    Arc<DuplexConnector>,
    mpsc::UnboundedReceiver<Accepted>,
) {
    init_tracing();
    let (connector, rx) = DuplexConnector::new();
    let client = MqttClient::builder("tcp://broker.test:1883", client_id)
        .with_options(options)
        .with_connector(Arc::clone(&connector) as Arc<dyn Connector>)
        .with_persistence(store)
        .build()
        .await
        .expect("build client");
    (client, connector, rx)
}

pub async fn client(
    client_id: &str,
) -> (
    MqttClient,
    Arc<DuplexConnector>,
    mpsc::UnboundedReceiver<Accepted>,
) {
    client_with(client_id, test_options(), Arc::new(MemoryPersistence::new())).await
}

/// Connects `client` against a fresh scripted broker.
pub async fn connect(
    client: &MqttClient,
    rx: &mut mpsc::UnboundedReceiver<Accepted>,
) -> ScriptedBroker {
    let token = client.connect().expect("connect");
    let (broker, _) = ScriptedBroker::accept_session(rx, false).await;
    token
        .wait_timeout(TIMEOUT)
        .await
        .expect("connect token failed");
    broker
}
