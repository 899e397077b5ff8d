//! Client session state that outlives individual connections.
//!
//! The session owns the retry queue, the inbound QoS 2 receipts and the
//! durable store behind both. Packet identifiers come from an allocator shared
//! with the client handle, so allocation can fail synchronously in the caller.

mod outbound;
mod restore;

pub use outbound::{OutboundEntry, OutboundQueue};

use crate::persistence::Persistence;
use crate::token::Token;
use parking_lot::Mutex;
use relaymq_protocol::constants::MAX_SUBSCRIPTION_IDENTIFIER;
use relaymq_protocol::packet::PublishPacket;
use relaymq_protocol::{MqttError, Packet, PacketIdAllocator, Result, StoreKey};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Hands out subscription identifiers, wrapping after the largest one.
#[derive(Debug)]
pub struct SubscriptionIdentifiers {
    next: AtomicU32,
}

impl Default for SubscriptionIdentifiers {
    fn default() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }
}

impl SubscriptionIdentifiers {
    pub fn next(&self) -> u32 {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
                Some(if id >= MAX_SUBSCRIPTION_IDENTIFIER {
                    1
                } else {
                    id + 1
                })
            })
            .unwrap_or_else(|id| id)
    }
}

pub struct Session {
    client_id: String,
    store: Arc<dyn Persistence>,
    ids: Arc<Mutex<PacketIdAllocator>>,
    subscription_ids: Arc<SubscriptionIdentifiers>,
    pub(crate) outbound: OutboundQueue,
    inbound_qos2: HashSet<u16>,
}

impl Session {
    pub fn new(client_id: impl Into<String>, store: Arc<dyn Persistence>) -> Self {
        Self {
            client_id: client_id.into(),
            store,
            ids: Arc::new(Mutex::new(PacketIdAllocator::new())),
            subscription_ids: Arc::new(SubscriptionIdentifiers::default()),
            outbound: OutboundQueue::new(),
            inbound_qos2: HashSet::new(),
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn ids(&self) -> Arc<Mutex<PacketIdAllocator>> {
        Arc::clone(&self.ids)
    }

    #[must_use]
    pub fn subscription_ids(&self) -> Arc<SubscriptionIdentifiers> {
        Arc::clone(&self.subscription_ids)
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Persistence> {
        &self.store
    }

    pub fn allocate_id(&self) -> Result<u16> {
        self.ids.lock().allocate()
    }

    pub fn release_id(&self, packet_id: u16) {
        if !self.ids.lock().release(packet_id) {
            debug!(packet_id, "Released packet identifier that was not in use");
        }
    }

    /// Stores the wire encoding of `packet` under `key`.
    pub async fn persist(&self, key: StoreKey, packet: &Packet) -> Result<()> {
        let bytes = packet.to_bytes()?;
        self.store.put(&key.to_string(), bytes).await
    }

    /// Removes `key`. Failures are logged; a stale record is dropped on the next restore.
    pub async fn forget(&self, key: StoreKey) {
        if let Err(e) = self.store.remove(&key.to_string()).await {
            warn!(key = %key, error = %e, "Failed to remove stored record");
        }
    }

    #[must_use]
    pub fn has_received(&self, packet_id: u16) -> bool {
        self.inbound_qos2.contains(&packet_id)
    }

    /// Records an inbound QoS 2 PUBLISH until its PUBREL arrives.
    pub async fn record_received(&mut self, publish: &PublishPacket) -> Result<()> {
        let Some(packet_id) = publish.packet_id else {
            return Ok(());
        };
        self.persist(
            StoreKey::Received(packet_id),
            &Packet::Publish(publish.clone()),
        )
        .await?;
        self.inbound_qos2.insert(packet_id);
        Ok(())
    }

    pub async fn forget_received(&mut self, packet_id: u16) {
        if self.inbound_qos2.remove(&packet_id) {
            self.forget(StoreKey::Received(packet_id)).await;
        }
    }

    /// Removes an outbound entry together with its records and identifier.
    pub async fn finish_outbound(&mut self, packet_id: u16) -> Option<OutboundEntry> {
        let entry = self.outbound.remove(packet_id)?;
        match &entry.packet {
            Packet::Publish(_) if entry.buffered => {
                self.forget(StoreKey::SentBuffered(packet_id)).await;
            }
            Packet::Publish(_) => self.forget(StoreKey::Sent(packet_id)).await,
            Packet::PubRel(_) => {
                self.forget(StoreKey::Confirmed(packet_id)).await;
                self.forget(StoreKey::Sent(packet_id)).await;
            }
            _ => {}
        }
        self.release_id(packet_id);
        Some(entry)
    }

    /// A clean start with no session on the broker: the session is cleared.
    ///
    /// Released (PUBREL stage) flows complete with no response, the broker
    /// already took the message. Every other entry the previous session
    /// owned fails with `SessionDiscarded`. Publishes buffered while offline
    /// were never transmitted and stay queued.
    pub async fn discard_broker_state(&mut self) {
        let received: Vec<u16> = self.inbound_qos2.drain().collect();
        for packet_id in received {
            self.forget(StoreKey::Received(packet_id)).await;
        }

        let discarded: Vec<u16> = self
            .outbound
            .iter()
            .filter(|entry| !entry.buffered)
            .filter_map(|entry| entry.packet.packet_id())
            .collect();
        for packet_id in discarded {
            let Some(entry) = self.finish_outbound(packet_id).await else {
                continue;
            };
            match entry.packet {
                Packet::PubRel(_) => {
                    entry.token.complete(None);
                }
                _ => {
                    debug!(packet_id, "Outbound entry dropped with the old session");
                    entry.token.fail(MqttError::SessionDiscarded);
                }
            }
        }
    }

    /// Tokens of every queued entry, oldest first.
    #[must_use]
    pub fn pending_tokens(&self) -> Vec<Token> {
        self.outbound.iter().map(|entry| entry.token.clone()).collect()
    }
}
