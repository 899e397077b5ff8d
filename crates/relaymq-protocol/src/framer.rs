//! Turns an unbounded byte stream into complete MQTT frames.
//!
//! Chunks may split a packet anywhere or carry several packets at once; the
//! framer keeps the unconsumed tail between calls. A malformed remaining length
//! is fatal: the caller must drop the link and [`PacketFramer::reset`] before reuse.

use crate::encoding::peek_variable_int;
use crate::error::{MqttError, Result};
use crate::packet::Packet;
use bytes::{Bytes, BytesMut};

#[derive(Debug, Default)]
pub struct PacketFramer {
    buffer: BytesMut,
    max_packet_size: Option<u32>,
}

impl PacketFramer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects any frame whose total size exceeds `max` bytes.
    #[must_use]
    pub fn with_max_packet_size(max: u32) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_packet_size: Some(max),
        }
    }

    /// Appends `data` and returns every frame it completed, in order.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Like [`feed`](Self::feed) but decodes each frame.
    pub fn feed_packets(&mut self, data: &[u8]) -> Result<Vec<Packet>> {
        self.feed(data)?
            .into_iter()
            .map(|mut frame| Packet::decode(&mut frame))
            .collect()
    }

    /// Splits off the next complete frame, if the buffer holds one.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.buffer.len() < 2 {
            return Ok(None);
        }
        let Some((remaining, len_bytes)) = peek_variable_int(&self.buffer[1..])? else {
            return Ok(None);
        };

        let total = 1 + len_bytes + remaining as usize;
        if let Some(max) = self.max_packet_size {
            if total > max as usize {
                return Err(MqttError::PacketTooLarge {
                    size: total,
                    max: max as usize,
                });
            }
        }
        if self.buffer.len() < total {
            return Ok(None);
        }
        tracing::trace!(size = total, buffered = self.buffer.len(), "Framed packet");
        Ok(Some(self.buffer.split_to(total).freeze()))
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
