use crate::token::Token;
use relaymq_protocol::{Packet, QoS};
use std::collections::{BTreeMap, HashMap};

/// A packet waiting for transmission or for its acknowledgment.
#[derive(Debug)]
pub struct OutboundEntry {
    pub seq: u64,
    /// PUBLISH, PUBREL, SUBSCRIBE or UNSUBSCRIBE.
    pub packet: Packet,
    pub token: Token,
    /// Written on the current connection.
    pub sent: bool,
    /// Accepted while offline and never transmitted.
    pub buffered: bool,
}

impl OutboundEntry {
    /// QoS 1 and 2 publish flows occupy one slot of the server's receive maximum
    /// until they complete.
    #[must_use]
    pub fn is_publish_flow(&self) -> bool {
        match &self.packet {
            Packet::Publish(publish) => publish.qos != QoS::AtMostOnce,
            Packet::PubRel(_) => true,
            _ => false,
        }
    }
}

/// The retry queue: outbound entries in submission order, indexed by packet id.
///
/// A QoS 2 flow keeps its slot when its PUBLISH is replaced by the PUBREL, so
/// a PUBLISH is always retransmitted before the PUBREL of a later flow.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    entries: BTreeMap<u64, OutboundEntry>,
    by_id: HashMap<u16, u64>,
    next_seq: u64,
}

impl OutboundQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry for `packet_id`. Returns false, leaving the queue
    /// untouched, when the id already has an entry.
    pub fn push(&mut self, packet_id: u16, packet: Packet, token: Token, buffered: bool) -> bool {
        if self.by_id.contains_key(&packet_id) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_id.insert(packet_id, seq);
        self.entries.insert(
            seq,
            OutboundEntry {
                seq,
                packet,
                token,
                sent: false,
                buffered,
            },
        );
        true
    }

    #[must_use]
    pub fn get(&self, packet_id: u16) -> Option<&OutboundEntry> {
        self.by_id
            .get(&packet_id)
            .and_then(|seq| self.entries.get(seq))
    }

    pub fn get_mut(&mut self, packet_id: u16) -> Option<&mut OutboundEntry> {
        self.by_id
            .get(&packet_id)
            .and_then(|seq| self.entries.get_mut(seq))
    }

    pub fn remove(&mut self, packet_id: u16) -> Option<OutboundEntry> {
        let seq = self.by_id.remove(&packet_id)?;
        self.entries.remove(&seq)
    }

    /// Ids of entries still to be written, in submission order.
    #[must_use]
    pub fn unsent_ids(&self) -> Vec<u16> {
        self.entries
            .values()
            .filter(|entry| !entry.sent)
            .filter_map(entry_id)
            .collect()
    }

    /// Publish flows written on this connection and not yet complete.
    #[must_use]
    pub fn in_flight_publishes(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.sent && entry.is_publish_flow())
            .count()
    }

    /// Whether anything written on this connection still awaits an acknowledgment.
    #[must_use]
    pub fn awaiting_acknowledgment(&self) -> bool {
        self.entries.values().any(|entry| entry.sent)
    }

    #[must_use]
    pub fn buffered_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.buffered).count()
    }

    #[must_use]
    pub fn oldest_buffered_id(&self) -> Option<u16> {
        self.entries
            .values()
            .find(|entry| entry.buffered)
            .and_then(entry_id)
    }

    /// After a connection ends every entry must be written again; publishes
    /// that already went out are flagged as duplicates.
    pub fn mark_all_unsent(&mut self) {
        for entry in self.entries.values_mut() {
            if !entry.sent {
                continue;
            }
            entry.sent = false;
            if let Packet::Publish(publish) = &mut entry.packet {
                if publish.qos != QoS::AtMostOnce {
                    publish.dup = true;
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutboundEntry> {
        self.entries.values()
    }

    /// Removes every entry, oldest first.
    pub fn drain(&mut self) -> Vec<OutboundEntry> {
        self.by_id.clear();
        std::mem::take(&mut self.entries).into_values().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn entry_id(entry: &OutboundEntry) -> Option<u16> {
    entry.packet.packet_id()
}
