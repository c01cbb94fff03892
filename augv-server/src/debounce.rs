use augv_core::BlockedOffsetSet;
use std::time::{Duration, Instant};

/// Coalesces repeated obstacle notifications for one agent.
///
/// A non-empty set is sent when it differs from the last sent set or when
/// `min_interval` has passed since the last send.
#[derive(Debug, Clone)]
pub struct Debouncer {
    min_interval: Duration,
    last_sent: Option<(Instant, BlockedOffsetSet)>,
}

impl Debouncer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: None,
        }
    }

    pub fn should_send(&self, offsets: &BlockedOffsetSet, now: Instant) -> bool {
        if offsets.is_empty() {
            return false;
        }
        match &self.last_sent {
            None => true,
            Some((at, sent)) => {
                sent != offsets || now.saturating_duration_since(*at) >= self.min_interval
            }
        }
    }

    /// Remember an attempted send, whether or not it was delivered
    pub fn record(&mut self, offsets: &BlockedOffsetSet, now: Instant) {
        self.last_sent = Some((now, offsets.clone()));
    }

    pub fn last_sent(&self) -> Option<&BlockedOffsetSet> {
        self.last_sent.as_ref().map(|(_, set)| set)
    }
}
