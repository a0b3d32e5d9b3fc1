//! Live connections and fan-out.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::HubError;
use crate::event::Event;

/// Opaque identifier for one client session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Write half of a client session.
///
/// Events are queued on a bounded channel that the transport's writer task
/// drains in order, so each connection observes events in dispatch order.
/// When the writer task dies the receiver is dropped and every later send
/// fails with `HubError::Write`.
#[derive(Clone, Debug)]
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::Sender<Event>,
}

impl Connection {
    /// Create a connection together with the receiving end of its queue.
    pub fn open(queue_capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (outbound, rx) = mpsc::channel(queue_capacity.max(1));
        let conn = Self {
            id: ConnectionId::new(),
            outbound,
        };
        (conn, rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue one event without waiting.
    pub fn send(&self, event: Event) -> Result<(), HubError> {
        self.outbound.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => HubError::QueueFull(self.id.clone()),
            mpsc::error::TrySendError::Closed(_) => HubError::Write(self.id.clone()),
        })
    }

    /// Completes once the writer side has dropped its receiver.
    pub async fn closed(&self) {
        self.outbound.closed().await
    }
}

/// Outcome of delivering one event to one connection.
#[derive(Debug)]
pub struct Delivery {
    pub connection: ConnectionId,
    pub outcome: Result<(), HubError>,
}

/// The set of live connections. Not synchronized on its own; the hub actor
/// is its only owner.
#[derive(Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if a connection with the same id is already registered.
    pub fn register(&mut self, conn: Connection) -> bool {
        if self.connections.contains_key(conn.id()) {
            return false;
        }
        debug!(conn_id = %conn.id(), "Registered connection");
        self.connections.insert(conn.id().clone(), conn);
        true
    }

    pub fn unregister(&mut self, id: &ConnectionId) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            debug!(conn_id = %id, "Unregistered connection");
        }
        removed
    }

    /// Queue `event` on every connection. Never stops early; each
    /// connection's outcome is reported back.
    pub fn broadcast(&self, event: &Event) -> Vec<Delivery> {
        self.connections
            .values()
            .map(|conn| {
                let outcome = conn.send(event.clone());
                if let Err(ref e) = outcome {
                    warn!(
                        conn_id = %conn.id(),
                        error_code = e.error_code(),
                        "Broadcast delivery failed: {}",
                        e
                    );
                }
                Delivery {
                    connection: conn.id().clone(),
                    outcome,
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
