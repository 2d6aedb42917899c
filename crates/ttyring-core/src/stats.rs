//! Traffic counters.
//!
//! Recorded on the worker thread at completion time with relaxed atomics;
//! read from anywhere via `snapshot()`. Counts are advisory — they are not
//! synchronized with callback delivery.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counters {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountersSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// One fully drained write of `bytes`.
    pub fn record_send(&self, bytes: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// One delivered read of `bytes`.
    pub fn record_receive(&self, bytes: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let c = Counters::new();
        c.record_send(10);
        c.record_send(22);
        c.record_receive(5);
        let s = c.snapshot();
        assert_eq!(s.messages_sent, 2);
        assert_eq!(s.bytes_sent, 32);
        assert_eq!(s.messages_received, 1);
        assert_eq!(s.bytes_received, 5);
    }

    #[test]
    fn test_zero_byte_events_still_count_messages() {
        let c = Counters::new();
        c.record_send(0);
        c.record_receive(0);
        let s = c.snapshot();
        assert_eq!(s.messages_sent, 1);
        assert_eq!(s.messages_received, 1);
        assert_eq!(s.bytes_sent, 0);
        assert_eq!(s.bytes_received, 0);
    }
}
