//! Bounded ring buffer of past events.
//!
//! New connections are replayed the whole buffer, oldest first, before they
//! see any live event. Once full, the oldest event is evicted.

use std::collections::VecDeque;

use crate::event::Event;

/// Default maximum number of events kept for replay.
pub const DEFAULT_BACKLOG_CAPACITY: usize = 100;

pub struct Backlog {
    buffer: VecDeque<Event>,
    capacity: usize,
}

impl Backlog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BACKLOG_CAPACITY)
    }

    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event, evicting the oldest entries once at capacity.
    pub fn push(&mut self, event: Event) {
        while self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    /// Point-in-time copy, oldest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.buffer.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Backlog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(n: usize) -> Event {
        Event::new(format!("event {n}"), None)
    }

    #[test]
    fn push_and_snapshot_in_order() {
        let mut buf = Backlog::new();
        buf.push(ev(1));
        buf.push(ev(2));
        buf.push(ev(3));

        let snap = buf.snapshot();
        assert_eq!(snap, vec![ev(1), ev(2), ev(3)]);
    }

    #[test]
    fn empty_snapshot() {
        let buf = Backlog::new();
        assert!(buf.is_empty());
        assert!(buf.snapshot().is_empty());
    }

    #[test]
    fn capacity_eviction_is_oldest_first() {
        let mut buf = Backlog::with_capacity(3);
        for n in 1..=4 {
            buf.push(ev(n));
        }

        assert_eq!(buf.len(), 3);
        assert_eq!(buf.snapshot(), vec![ev(2), ev(3), ev(4)]);
    }

    #[test]
    fn keeps_last_min_k_capacity() {
        for k in 0..12 {
            let mut buf = Backlog::with_capacity(5);
            for n in 0..k {
                buf.push(ev(n));
            }
            let expected: Vec<Event> = (k.saturating_sub(5)..k).map(ev).collect();
            assert_eq!(buf.snapshot(), expected, "k = {k}");
        }
    }

    #[test]
    fn snapshot_is_detached_from_later_pushes() {
        let mut buf = Backlog::with_capacity(2);
        buf.push(ev(1));
        let snap = buf.snapshot();
        buf.push(ev(2));
        buf.push(ev(3));
        assert_eq!(snap, vec![ev(1)]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut buf = Backlog::with_capacity(0);
        assert_eq!(buf.capacity(), 1);
        buf.push(ev(1));
        buf.push(ev(2));
        assert_eq!(buf.snapshot(), vec![ev(2)]);
    }
}
