//! Rebuilds the retry queue and inbound receipts from the durable store.

use super::Session;
use crate::token::Token;
use relaymq_protocol::packet_id::sort_by_issue_order;
use relaymq_protocol::{Packet, QoS, Result, StoreKey};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

impl Session {
    /// Loads every stored record, once, before the first connection.
    ///
    /// - `received-<id>` marks an inbound QoS 2 message awaiting PUBREL.
    /// - `sent-<id>` is queued again with DUP set, or replaced by its PUBREL when
    ///   `confirmed-<id>` exists.
    /// - `sent-buffered-<id>` is queued as never sent; QoS 0 records are removed
    ///   from the store once queued.
    /// - `confirmed-<id>` without its `sent-<id>` is purged.
    ///
    /// Undecodable records are removed. Every restored outbound id is reserved
    /// in the allocator. Returns one fresh token per queued entry.
    pub async fn restore(&mut self) -> Result<Vec<Token>> {
        let mut keys = Vec::new();
        for raw in self.store.keys().await? {
            match raw.parse::<StoreKey>() {
                Ok(key) => keys.push(key),
                Err(e) => {
                    warn!(key = %raw, error = %e, "Removing unrecognised record");
                    self.store.remove(&raw).await?;
                }
            }
        }
        let mut issued: Vec<u16> = keys
            .iter()
            .filter(|key| matches!(key, StoreKey::Sent(_) | StoreKey::SentBuffered(_)))
            .map(StoreKey::packet_id)
            .collect();
        sort_by_issue_order(&mut issued);
        let position: HashMap<u16, usize> =
            issued.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        // Sent records before buffered ones, each in the order their ids were issued.
        keys.sort_unstable_by_key(|key| {
            let group = match key {
                StoreKey::Sent(_) => 0,
                StoreKey::SentBuffered(_) => 1,
                StoreKey::Confirmed(_) | StoreKey::Received(_) => 2,
            };
            let id = key.packet_id();
            (group, position.get(&id).copied().unwrap_or(usize::from(id)))
        });

        let confirmed: HashSet<u16> = keys
            .iter()
            .filter_map(|key| match key {
                StoreKey::Confirmed(id) => Some(*id),
                _ => None,
            })
            .collect();
        let mut paired = HashSet::new();
        let mut tokens = Vec::new();

        for key in keys {
            match key {
                StoreKey::Received(id) => {
                    if self.load(key).await?.is_some() {
                        self.inbound_qos2.insert(id);
                    }
                }
                StoreKey::Sent(id) => {
                    let Some(Packet::Publish(mut publish)) = self.load_publish(key).await? else {
                        continue;
                    };
                    let mut packet = None;
                    if confirmed.contains(&id) {
                        match self.load(StoreKey::Confirmed(id)).await? {
                            Some(Packet::PubRel(pubrel)) => {
                                paired.insert(id);
                                packet = Some(Packet::PubRel(pubrel));
                            }
                            _ => debug!(packet_id = id, "Release record unusable, resending PUBLISH"),
                        }
                    }
                    let packet = packet.unwrap_or_else(|| {
                        publish.dup = publish.qos != QoS::AtMostOnce;
                        Packet::Publish(publish)
                    });
                    if !self.requeue(id, packet, false, &mut tokens) {
                        self.forget(key).await;
                    }
                }
                StoreKey::SentBuffered(id) => {
                    let Some(Packet::Publish(mut publish)) = self.load_publish(key).await? else {
                        continue;
                    };
                    let at_most_once = publish.qos == QoS::AtMostOnce;
                    publish.packet_id = Some(id);
                    let queued = self.requeue(id, Packet::Publish(publish), true, &mut tokens);
                    if !queued || at_most_once {
                        self.forget(key).await;
                    }
                }
                StoreKey::Confirmed(_) => {}
            }
        }

        if let Some(newest) = issued.iter().rev().find(|id| self.outbound.get(**id).is_some()) {
            self.ids.lock().resume_after(*newest);
        }

        for id in confirmed.difference(&paired) {
            info!(packet_id = id, "Purging release record without a stored publish");
            self.forget(StoreKey::Confirmed(*id)).await;
        }

        info!(
            client_id = %self.client_id,
            queued = tokens.len(),
            inbound = self.inbound_qos2.len(),
            "Restored session state"
        );
        Ok(tokens)
    }

    async fn load(&self, key: StoreKey) -> Result<Option<Packet>> {
        let name = key.to_string();
        let Some(mut bytes) = self.store.get(&name).await? else {
            return Ok(None);
        };
        match Packet::decode(&mut bytes) {
            Ok(packet) => Ok(Some(packet)),
            Err(e) => {
                warn!(key = %name, error = %e, "Discarding corrupt record");
                self.store.remove(&name).await?;
                Ok(None)
            }
        }
    }

    /// Like [`load`](Self::load) but drops records that hold something other than a PUBLISH.
    async fn load_publish(&self, key: StoreKey) -> Result<Option<Packet>> {
        match self.load(key).await? {
            Some(packet @ Packet::Publish(_)) => Ok(Some(packet)),
            Some(other) => {
                warn!(key = %key, packet_type = ?other.packet_type(), "Discarding mistyped record");
                self.forget(key).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn requeue(&mut self, id: u16, packet: Packet, buffered: bool, tokens: &mut Vec<Token>) -> bool {
        if let Err(e) = self.ids.lock().reserve(id) {
            warn!(packet_id = id, error = %e, "Skipping record for an identifier already restored");
            return false;
        }
        let token = Token::new(Some(id));
        self.outbound.push(id, packet, token.clone(), buffered);
        tokens.push(token);
        true
    }
}
