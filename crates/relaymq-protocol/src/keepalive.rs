use std::time::{Duration, Instant};

/// Percentage of the keep alive after which an unanswered PINGREQ means the
/// link is dead.
pub const PING_TIMEOUT_PERCENT: u32 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveAction {
    Idle,
    SendPing,
    TimedOut,
}

/// Tracks outbound activity for one connection and decides when to ping.
#[derive(Debug, Clone)]
pub struct KeepaliveTracker {
    interval: Duration,
    last_write: Instant,
    ping_sent_at: Option<Instant>,
}

impl KeepaliveTracker {
    /// A zero `interval` disables keep alive.
    #[must_use]
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_write: now,
            ping_sent_at: None,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Any successful packet write.
    pub fn record_write(&mut self, now: Instant) {
        self.last_write = now;
    }

    pub fn record_ping_sent(&mut self, now: Instant) {
        self.last_write = now;
        self.ping_sent_at = Some(now);
    }

    pub fn record_pong(&mut self) {
        self.ping_sent_at = None;
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.interval * PING_TIMEOUT_PERCENT / 100
    }

    #[must_use]
    pub fn poll(&self, now: Instant) -> KeepaliveAction {
        if !self.is_enabled() {
            return KeepaliveAction::Idle;
        }
        match self.ping_sent_at {
            Some(sent) if now.saturating_duration_since(sent) >= self.timeout() => {
                KeepaliveAction::TimedOut
            }
            Some(_) => KeepaliveAction::Idle,
            None if now.saturating_duration_since(self.last_write) >= self.interval => {
                KeepaliveAction::SendPing
            }
            None => KeepaliveAction::Idle,
        }
    }

    /// When [`poll`](Self::poll) should next be called.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.is_enabled() {
            return None;
        }
        Some(match self.ping_sent_at {
            Some(sent) => sent + self.timeout(),
            None => self.last_write + self.interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_after_idle_interval() {
        let start = Instant::now();
        let tracker = KeepaliveTracker::new(Duration::from_secs(10), start);
        assert_eq!(tracker.poll(start + Duration::from_secs(9)), KeepaliveAction::Idle);
        assert_eq!(
            tracker.poll(start + Duration::from_secs(10)),
            KeepaliveAction::SendPing
        );
        assert_eq!(tracker.next_deadline(), Some(start + Duration::from_secs(10)));
    }

    #[test]
    fn test_write_activity_skips_ping() {
        let start = Instant::now();
        let mut tracker = KeepaliveTracker::new(Duration::from_secs(10), start);
        tracker.record_write(start + Duration::from_secs(8));
        assert_eq!(
            tracker.poll(start + Duration::from_secs(12)),
            KeepaliveAction::Idle
        );
        assert_eq!(
            tracker.next_deadline(),
            Some(start + Duration::from_secs(18))
        );
    }

    #[test]
    fn test_unanswered_ping_times_out() {
        let start = Instant::now();
        let mut tracker = KeepaliveTracker::new(Duration::from_secs(10), start);
        tracker.record_ping_sent(start + Duration::from_secs(10));
        assert_eq!(
            tracker.poll(start + Duration::from_secs(20)),
            KeepaliveAction::Idle
        );
        assert_eq!(
            tracker.poll(start + Duration::from_secs(25)),
            KeepaliveAction::TimedOut
        );

        tracker.record_pong();
        assert_eq!(
            tracker.poll(start + Duration::from_secs(25)),
            KeepaliveAction::Idle
        );
    }

    #[test]
    fn test_zero_interval_disables() {
        let start = Instant::now();
        let tracker = KeepaliveTracker::new(Duration::ZERO, start);
        assert_eq!(tracker.poll(start + Duration::from_secs(3600)), KeepaliveAction::Idle);
        assert_eq!(tracker.next_deadline(), None);
    }
}
