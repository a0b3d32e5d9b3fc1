//! The hub actor.
//!
//! One task owns the registry and the backlog. Every join, leave and publish
//! is a command on its channel, so appending an event and broadcasting it is
//! one step, and so is replaying the backlog to a new connection and
//! registering it. A connection that joins while an event is being published
//! therefore sees that event exactly once: in its replay, or live.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::asset::AssetResolver;
use crate::backlog::{Backlog, DEFAULT_BACKLOG_CAPACITY};
use crate::error::HubError;
use crate::event::{Event, Request};
use crate::metrics::HubMetrics;
use crate::pipeline;
use crate::registry::{Connection, ConnectionId, Delivery, Registry};

/// Default number of live events a connection may have queued before
/// further events are dropped for it.
pub const DEFAULT_SEND_QUEUE: usize = 256;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Events kept for replay to new connections
    pub backlog_capacity: usize,
    /// Live events a connection may have queued, on top of its replay
    pub send_queue: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            backlog_capacity: DEFAULT_BACKLOG_CAPACITY,
            send_queue: DEFAULT_SEND_QUEUE,
        }
    }
}

/// Point-in-time view of the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub backlog_len: usize,
    pub backlog_capacity: usize,
}

/// Commands that can be sent to the hub actor
#[derive(Debug)]
enum HubCommand {
    Join {
        respond_to: oneshot::Sender<(Connection, mpsc::Receiver<Event>)>,
    },
    Leave {
        id: ConnectionId,
        respond_to: oneshot::Sender<bool>,
    },
    Publish {
        event: Event,
        respond_to: oneshot::Sender<Vec<Delivery>>,
    },
    Backlog {
        respond_to: oneshot::Sender<Vec<Event>>,
    },
    Stats {
        respond_to: oneshot::Sender<HubStats>,
    },
}

/// Handle to communicate with the hub actor
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
    resolver: Arc<dyn AssetResolver>,
    metrics: Arc<HubMetrics>,
}

impl HubHandle {
    /// Spawn the hub actor and return its handle. The actor stops once every
    /// handle has been dropped.
    pub fn spawn(config: HubConfig, resolver: Arc<dyn AssetResolver>) -> Self {
        Self::spawn_with_metrics(config, resolver, Arc::new(HubMetrics::new()))
    }

    pub fn spawn_with_metrics(
        config: HubConfig,
        resolver: Arc<dyn AssetResolver>,
        metrics: Arc<HubMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(256);
        let actor = HubActor {
            registry: Registry::new(),
            backlog: Backlog::with_capacity(config.backlog_capacity),
            send_queue: config.send_queue,
            receiver,
            metrics: metrics.clone(),
        };

        tokio::spawn(async move {
            actor.run().await;
        });

        Self {
            sender,
            resolver,
            metrics,
        }
    }

    /// Register a new connection. Its queue already holds the backlog replay
    /// followed by the welcome event.
    pub async fn join(&self) -> Result<(Connection, mpsc::Receiver<Event>), HubError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubCommand::Join { respond_to: tx })
            .await
            .map_err(|_| HubError::HubClosed)?;
        rx.await.map_err(|_| HubError::HubClosed)
    }

    /// Remove a connection. Returns false if it was already gone.
    pub async fn leave(&self, id: &ConnectionId) -> Result<bool, HubError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubCommand::Leave {
                id: id.clone(),
                respond_to: tx,
            })
            .await
            .map_err(|_| HubError::HubClosed)?;
        rx.await.map_err(|_| HubError::HubClosed)
    }

    /// Append an event to the backlog and broadcast it to every connection.
    pub async fn publish(&self, event: Event) -> Result<Vec<Delivery>, HubError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubCommand::Publish {
                event,
                respond_to: tx,
            })
            .await
            .map_err(|_| HubError::HubClosed)?;
        rx.await.map_err(|_| HubError::HubClosed)
    }

    /// Run a request through the event pipeline: build the event, then
    /// publish it. Nothing is published when the asset cannot be resolved.
    pub async fn submit(&self, request: &Request) -> Result<Vec<Delivery>, HubError> {
        let request = request.clone();
        let built = self
            .resolve_blocking(move |resolver| pipeline::build_event(&request, resolver))
            .await;
        let event = match built {
            Ok(event) => event,
            Err(e) => {
                self.metrics.asset_failure();
                return Err(e);
            }
        };
        self.publish(event).await
    }

    /// Build the idle prompt for a quiet connection.
    pub async fn nudge(&self) -> Result<Event, HubError> {
        self.resolve_blocking(pipeline::build_nudge).await
    }

    /// Asset loads read from disk, so they run on the blocking pool.
    async fn resolve_blocking<T, F>(&self, build: F) -> Result<T, HubError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn AssetResolver) -> Result<T, HubError> + Send + 'static,
    {
        let resolver = self.resolver.clone();
        tokio::task::spawn_blocking(move || build(resolver.as_ref()))
            .await
            .map_err(|e| HubError::AssetResolution {
                path: "<resolver task>".to_string(),
                reason: e.to_string(),
            })?
    }

    pub async fn backlog(&self) -> Result<Vec<Event>, HubError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubCommand::Backlog { respond_to: tx })
            .await
            .map_err(|_| HubError::HubClosed)?;
        rx.await.map_err(|_| HubError::HubClosed)
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubCommand::Stats { respond_to: tx })
            .await
            .map_err(|_| HubError::HubClosed)?;
        rx.await.map_err(|_| HubError::HubClosed)
    }

    pub fn metrics(&self) -> &Arc<HubMetrics> {
        &self.metrics
    }
}

struct HubActor {
    registry: Registry,
    backlog: Backlog,
    send_queue: usize,
    receiver: mpsc::Receiver<HubCommand>,
    metrics: Arc<HubMetrics>,
}

impl HubActor {
    async fn run(mut self) {
        debug!(
            backlog_capacity = self.backlog.capacity(),
            send_queue = self.send_queue,
            "Hub actor started"
        );

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                HubCommand::Join { respond_to } => {
                    let joined = self.join();
                    let _ = respond_to.send(joined);
                }

                HubCommand::Leave { id, respond_to } => {
                    let removed = self.registry.unregister(&id);
                    if removed {
                        self.metrics.connection_closed();
                        info!(conn_id = %id, connections = self.registry.len(), "Connection left");
                    }
                    let _ = respond_to.send(removed);
                }

                HubCommand::Publish { event, respond_to } => {
                    let deliveries = self.publish(event);
                    let _ = respond_to.send(deliveries);
                }

                HubCommand::Backlog { respond_to } => {
                    let _ = respond_to.send(self.backlog.snapshot());
                }

                HubCommand::Stats { respond_to } => {
                    let _ = respond_to.send(HubStats {
                        connections: self.registry.len(),
                        backlog_len: self.backlog.len(),
                        backlog_capacity: self.backlog.capacity(),
                    });
                }
            }
        }

        debug!("Hub actor stopped");
    }

    fn join(&mut self) -> (Connection, mpsc::Receiver<Event>) {
        // Room for the whole replay plus the welcome, so neither can be dropped.
        let capacity = self.backlog.capacity() + 1 + self.send_queue;
        let (conn, rx) = Connection::open(capacity);

        for event in self.backlog.iter() {
            let _ = conn.send(event.clone());
        }
        let _ = conn.send(Event::welcome());

        self.registry.register(conn.clone());
        self.metrics.connection_opened();
        info!(
            conn_id = %conn.id(),
            replayed = self.backlog.len(),
            connections = self.registry.len(),
            "Connection joined"
        );
        (conn, rx)
    }

    fn publish(&mut self, event: Event) -> Vec<Delivery> {
        self.backlog.push(event.clone());
        let deliveries = self.registry.broadcast(&event);
        self.metrics.event_broadcast();

        let mut delivered = 0;
        for delivery in &deliveries {
            match &delivery.outcome {
                Ok(()) => delivered += 1,
                Err(e) if e.is_fatal() => {
                    self.metrics.write_failure();
                    if self.registry.unregister(&delivery.connection) {
                        self.metrics.connection_closed();
                    }
                }
                Err(_) => self.metrics.delivery_dropped(),
            }
        }
        self.metrics.delivered(delivered);

        if delivered < deliveries.len() as u64 {
            warn!(
                delivered,
                attempted = deliveries.len(),
                "Broadcast partially delivered"
            );
        } else {
            debug!(delivered, text = event.text(), "Broadcast delivered");
        }
        deliveries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::WELCOME_TEXT;
    use crate::test_helpers::StaticResolver;

    fn spawn_hub(backlog_capacity: usize) -> HubHandle {
        HubHandle::spawn(
            HubConfig {
                backlog_capacity,
                send_queue: 64,
            },
            Arc::new(StaticResolver::new()),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn ev(n: usize) -> Event {
        Event::new(format!("event {n}"), None)
    }

    #[tokio::test]
    async fn empty_backlog_join_gets_only_welcome() {
        let hub = spawn_hub(10);
        let (_conn, mut rx) = hub.join().await.unwrap();

        let received = drain(&mut rx);
        assert_eq!(received, vec![Event::welcome()]);
        assert_eq!(received[0].text(), WELCOME_TEXT);
        assert_eq!(received[0].asset(), None);
    }

    #[tokio::test]
    async fn joiner_gets_last_min_k_capacity_then_welcome() {
        for k in [0usize, 1, 3, 5, 9] {
            let hub = spawn_hub(5);
            for n in 0..k {
                hub.publish(ev(n)).await.unwrap();
            }

            let (_conn, mut rx) = hub.join().await.unwrap();
            let mut expected: Vec<Event> = (k.saturating_sub(5)..k).map(ev).collect();
            expected.push(Event::welcome());
            assert_eq!(drain(&mut rx), expected, "k = {k}");
        }
    }

    #[tokio::test]
    async fn live_events_follow_replay() {
        let hub = spawn_hub(10);
        hub.publish(ev(0)).await.unwrap();
        let (_conn, mut rx) = hub.join().await.unwrap();
        hub.publish(ev(1)).await.unwrap();

        assert_eq!(drain(&mut rx), vec![ev(0), Event::welcome(), ev(1)]);
    }

    #[tokio::test]
    async fn submit_blue_then_unknown_colour() {
        let hub = spawn_hub(10);
        let (_first, mut rx1) = hub.join().await.unwrap();
        drain(&mut rx1);

        hub.submit(&Request::new("blue", "Ann")).await.unwrap();
        let blue = Event::new("Ann: blue", Some("asset:blue".into()));
        assert_eq!(drain(&mut rx1), vec![blue.clone()]);
        assert_eq!(hub.backlog().await.unwrap(), vec![blue.clone()]);

        let (_second, mut rx2) = hub.join().await.unwrap();
        assert_eq!(drain(&mut rx2), vec![blue, Event::welcome()]);

        hub.submit(&Request::new("neon", "Bo")).await.unwrap();
        let neon = Event::new("Bo: neon", Some(StaticResolver::DEFAULT.into()));
        assert_eq!(drain(&mut rx1), vec![neon.clone()]);
        assert_eq!(drain(&mut rx2), vec![neon]);
    }

    #[tokio::test]
    async fn failed_resolution_publishes_nothing() {
        let resolver = StaticResolver::failing();
        let hub = HubHandle::spawn(HubConfig::default(), Arc::new(resolver));
        let (_conn, mut rx) = hub.join().await.unwrap();
        drain(&mut rx);

        let err = hub.submit(&Request::new("blue", "Ann")).await.unwrap_err();
        assert!(matches!(err, HubError::AssetResolution { .. }));
        assert!(drain(&mut rx).is_empty());
        assert!(hub.backlog().await.unwrap().is_empty());
        assert_eq!(hub.metrics().snapshot().requests.asset_failures, 1);
    }

    #[tokio::test]
    async fn write_failure_unregisters_and_spares_others() {
        let hub = spawn_hub(10);
        let (dead, rx_dead) = hub.join().await.unwrap();
        let (_live, mut rx_live) = hub.join().await.unwrap();
        drain(&mut rx_live);
        drop(rx_dead);

        let deliveries = hub.publish(ev(1)).await.unwrap();
        let failed: Vec<_> = deliveries.iter().filter(|d| d.outcome.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(&failed[0].connection, dead.id());

        assert_eq!(drain(&mut rx_live), vec![ev(1)]);
        assert_eq!(hub.stats().await.unwrap().connections, 1);
        assert!(!hub.leave(dead.id()).await.unwrap());

        let snap = hub.metrics().snapshot();
        assert_eq!(snap.deliveries.write_failures, 1);
        assert_eq!(snap.connections.active, 1);
    }

    #[tokio::test]
    async fn slow_connection_drops_events_but_stays_registered() {
        let hub = HubHandle::spawn(
            HubConfig {
                backlog_capacity: 1,
                send_queue: 1,
            },
            Arc::new(StaticResolver::new()),
        );
        // Queue capacity is 1 (replay) + 1 (welcome) + 1 (live); the replay
        // slot is unused because the backlog was empty at join.
        let (conn, mut rx) = hub.join().await.unwrap();
        hub.publish(ev(1)).await.unwrap();
        hub.publish(ev(2)).await.unwrap();
        let deliveries = hub.publish(ev(3)).await.unwrap();

        assert!(matches!(deliveries[0].outcome, Err(HubError::QueueFull(_))));
        assert_eq!(drain(&mut rx), vec![Event::welcome(), ev(1), ev(2)]);
        assert_eq!(hub.stats().await.unwrap().connections, 1);
        assert!(hub.leave(conn.id()).await.unwrap());
        assert_eq!(hub.metrics().snapshot().deliveries.dropped, 1);
    }

    #[tokio::test]
    async fn leave_removes_connection() {
        let hub = spawn_hub(10);
        let (conn, mut rx) = hub.join().await.unwrap();
        drain(&mut rx);

        assert!(hub.leave(conn.id()).await.unwrap());
        hub.publish(ev(1)).await.unwrap();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(hub.stats().await.unwrap().connections, 0);
    }

    #[tokio::test]
    async fn concurrent_join_sees_each_event_once_in_order() {
        for _ in 0..20 {
            let hub = spawn_hub(100);
            let publisher = {
                let hub = hub.clone();
                tokio::spawn(async move {
                    for n in 0..50 {
                        hub.publish(ev(n)).await.unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            };

            tokio::task::yield_now().await;
            let (_conn, mut rx) = hub.join().await.unwrap();
            publisher.await.unwrap();

            let texts: Vec<String> = drain(&mut rx)
                .into_iter()
                .filter(|e| e.text() != WELCOME_TEXT)
                .map(|e| e.text().to_string())
                .collect();
            let expected: Vec<String> = (0..50).map(|n| format!("event {n}")).collect();
            assert_eq!(texts, expected);
        }
    }

    #[tokio::test]
    async fn stats_reports_backlog() {
        let hub = spawn_hub(2);
        for n in 0..3 {
            hub.publish(ev(n)).await.unwrap();
        }
        let stats = hub.stats().await.unwrap();
        assert_eq!(
            stats,
            HubStats {
                connections: 0,
                backlog_len: 2,
                backlog_capacity: 2,
            }
        );
    }
}
