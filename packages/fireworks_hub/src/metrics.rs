//! Hub metrics for observability

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Hub-wide counters, shared by the actor and every connection loop.
#[derive(Debug, Default)]
pub struct HubMetrics {
    // Connection metrics
    /// Currently registered connections
    pub active_connections: AtomicU64,
    /// Total connections since start
    pub total_connections: AtomicU64,

    // Request metrics
    /// Text frames read from clients
    pub requests_received: AtomicU64,
    /// Frames that did not parse as a request
    pub parse_failures: AtomicU64,
    /// Requests dropped because their asset could not be loaded
    pub asset_failures: AtomicU64,

    // Delivery metrics
    /// Events appended to the backlog and broadcast
    pub events_broadcast: AtomicU64,
    /// Individual event deliveries queued on a connection
    pub deliveries: AtomicU64,
    /// Deliveries dropped because a connection's queue was full
    pub deliveries_dropped: AtomicU64,
    /// Deliveries to connections whose transport was gone
    pub write_failures: AtomicU64,
    /// Idle prompts sent
    pub nudges_sent: AtomicU64,

    start_time: Option<Instant>,
}

impl HubMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Saturate: unregister can race a late write failure for the same id.
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn asset_failure(&self) {
        self.asset_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_broadcast(&self) {
        self.events_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self, n: u64) {
        self.deliveries.fetch_add(n, Ordering::Relaxed);
    }

    pub fn delivery_dropped(&self) {
        self.deliveries_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn nudge_sent(&self) {
        self.nudges_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            requests: RequestMetrics {
                received: self.requests_received.load(Ordering::Relaxed),
                parse_failures: self.parse_failures.load(Ordering::Relaxed),
                asset_failures: self.asset_failures.load(Ordering::Relaxed),
            },
            deliveries: DeliveryMetrics {
                events_broadcast: self.events_broadcast.load(Ordering::Relaxed),
                delivered: self.deliveries.load(Ordering::Relaxed),
                dropped: self.deliveries_dropped.load(Ordering::Relaxed),
                write_failures: self.write_failures.load(Ordering::Relaxed),
                nudges_sent: self.nudges_sent.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub requests: RequestMetrics,
    pub deliveries: DeliveryMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetrics {
    pub received: u64,
    pub parse_failures: u64,
    pub asset_failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryMetrics {
    pub events_broadcast: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub write_failures: u64,
    pub nudges_sent: u64,
}
