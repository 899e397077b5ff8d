use crate::constants::MAX_PACKET_ID;
use crate::error::{MqttError, Result};

const WORDS: usize = (MAX_PACKET_ID as usize + 1) / 64;

/// Issues packet identifiers in `1..=65535`.
///
/// Allocation scans forward from the last issued id, wrapping from 65535 to 1
/// and skipping ids in use. It gives up only after two complete passes.
#[derive(Debug, Clone)]
pub struct PacketIdAllocator {
    in_use: Vec<u64>,
    last_issued: u16,
    count: usize,
}

impl Default for PacketIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketIdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_use: vec![0; WORDS],
            last_issued: 0,
            count: 0,
        }
    }

    pub fn allocate(&mut self) -> Result<u16> {
        let mut candidate = self.last_issued;
        for _ in 0..2 * usize::from(MAX_PACKET_ID) {
            candidate = if candidate == MAX_PACKET_ID {
                1
            } else {
                candidate + 1
            };
            if !self.is_in_use(candidate) {
                self.mark(candidate);
                self.last_issued = candidate;
                return Ok(candidate);
            }
        }
        Err(MqttError::PacketIdExhausted)
    }

    /// Frees `id`; returns false if it was not allocated.
    pub fn release(&mut self, id: u16) -> bool {
        if id == 0 || !self.is_in_use(id) {
            return false;
        }
        let (word, bit) = Self::slot(id);
        self.in_use[word] &= !bit;
        self.count -= 1;
        true
    }

    /// Marks an id restored from storage as in use. The cursor stays put; see
    /// [`resume_after`](Self::resume_after).
    pub fn reserve(&mut self, id: u16) -> Result<()> {
        if id == 0 {
            return Err(MqttError::MalformedPacket(
                "Packet identifier must be non-zero".to_string(),
            ));
        }
        if self.is_in_use(id) {
            return Err(MqttError::PacketIdInUse(id));
        }
        self.mark(id);
        Ok(())
    }

    /// Continues allocation after `id`, the newest identifier of a restored session.
    pub fn resume_after(&mut self, id: u16) {
        self.last_issued = id;
    }

    #[must_use]
    pub fn is_in_use(&self, id: u16) -> bool {
        let (word, bit) = Self::slot(id);
        self.in_use[word] & bit != 0
    }

    #[must_use]
    pub fn in_use_count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn last_issued(&self) -> u16 {
        self.last_issued
    }

    pub fn clear(&mut self) {
        self.in_use.iter_mut().for_each(|word| *word = 0);
        self.count = 0;
    }

    fn mark(&mut self, id: u16) {
        let (word, bit) = Self::slot(id);
        self.in_use[word] |= bit;
        self.count += 1;
    }

    fn slot(id: u16) -> (usize, u64) {
        (usize::from(id) / 64, 1u64 << (id % 64))
    }
}

/// Sorts identifiers that were in use together into the order they were issued.
///
/// Allocation only moves forward and wraps from 65535 to 1, so the oldest id
/// is the one that follows the widest gap around the circle.
pub fn sort_by_issue_order(ids: &mut Vec<u16>) {
    ids.sort_unstable();
    ids.dedup();
    let (Some(&first), Some(&last)) = (ids.first(), ids.last()) else {
        return;
    };
    let mut start = 0;
    let mut widest = u32::from(MAX_PACKET_ID) - u32::from(last) + u32::from(first);
    for (i, pair) in ids.windows(2).enumerate() {
        let gap = u32::from(pair[1] - pair[0]);
        if gap > widest {
            widest = gap;
            start = i + 1;
        }
    }
    ids.rotate_left(start);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sequential_allocation() {
        let mut ids = PacketIdAllocator::new();
        assert_eq!(ids.allocate().unwrap(), 1);
        assert_eq!(ids.allocate().unwrap(), 2);
        assert_eq!(ids.in_use_count(), 2);
        assert!(ids.release(1));
        assert!(!ids.release(1));
        assert_eq!(ids.allocate().unwrap(), 3);
    }

    #[test]
    fn test_exhaustion_after_full_range() {
        let mut ids = PacketIdAllocator::new();
        let mut seen = HashSet::new();
        for _ in 0..MAX_PACKET_ID {
            assert!(seen.insert(ids.allocate().unwrap()));
        }
        assert_eq!(seen.len(), 65_535);
        assert!(!seen.contains(&0));
        assert!(matches!(ids.allocate(), Err(MqttError::PacketIdExhausted)));

        assert!(ids.release(4242));
        assert_eq!(ids.allocate().unwrap(), 4242);
    }

    #[test]
    fn test_wraps_and_skips_in_use() {
        let mut ids = PacketIdAllocator::new();
        ids.reserve(65_535).unwrap();
        ids.reserve(1).unwrap();
        ids.resume_after(65_534);
        assert_eq!(ids.allocate().unwrap(), 2);
        assert_eq!(ids.last_issued(), 2);
    }

    #[test]
    fn test_reserve_conflicts() {
        let mut ids = PacketIdAllocator::new();
        ids.reserve(10).unwrap();
        assert!(matches!(ids.reserve(10), Err(MqttError::PacketIdInUse(10))));
        assert!(ids.reserve(0).is_err());
        assert_eq!(ids.last_issued(), 0);
        ids.resume_after(10);
        assert_eq!(ids.allocate().unwrap(), 11);
        ids.clear();
        assert_eq!(ids.in_use_count(), 0);
        assert!(!ids.is_in_use(10));
    }

    #[test]
    fn test_issue_order_across_wrap() {
        let mut ids = vec![3, 65_535, 1, 65_530];
        sort_by_issue_order(&mut ids);
        assert_eq!(ids, vec![65_530, 65_535, 1, 3]);

        let mut ids = vec![12, 3, 7];
        sort_by_issue_order(&mut ids);
        assert_eq!(ids, vec![3, 7, 12]);

        let mut ids = Vec::new();
        sort_by_issue_order(&mut ids);
        assert!(ids.is_empty());
    }
}
