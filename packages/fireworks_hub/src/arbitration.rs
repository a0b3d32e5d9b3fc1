//! Per-connection request loop.
//!
//! Each iteration races the next inbound frame against the connection's idle
//! timer:
//!
//! - a text frame resets the timer and is parsed and submitted to the hub;
//! - the timer firing grows the timer and sends an idle prompt to this
//!   connection only;
//! - a close frame, end of stream or read error ends the loop and removes
//!   the connection from the hub, as does the writer side going away.
//!
//! A single reader task lives for the whole connection and hands frames over
//! a one-slot channel. Receiving from that channel is cancel-safe, so a frame
//! that lands just after the timer fires is picked up by the next iteration
//! instead of being lost or leaving a second read behind.

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::HubError;
use crate::event::Request;
use crate::hub::HubHandle;
use crate::idle::IdleTimer;
use crate::registry::Connection;

/// A frame read from the client transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No read outstanding.
    Awaiting,
    /// Waiting on the next frame and the idle timer.
    Racing,
    Terminated,
}

/// Why a loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// The client closed the connection or the stream ended.
    Closed,
    /// The transport failed while reading.
    ReadFailed(HubError),
    /// The outbound side is gone; nothing more can be delivered.
    TransportGone,
    /// The hub actor stopped.
    HubGone,
}

enum Outcome {
    Frame(String),
    Idle,
    Closed,
    ReadFailed(HubError),
    TransportGone,
}

pub struct ConnectionLoop {
    hub: HubHandle,
    connection: Connection,
    idle: IdleTimer,
    state: LoopState,
}

impl ConnectionLoop {
    pub fn new(hub: HubHandle, connection: Connection, idle: IdleTimer) -> Self {
        Self {
            hub,
            connection,
            idle,
            state: LoopState::Awaiting,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Drive the connection until it terminates, then unregister it.
    pub async fn run<S>(&mut self, incoming: S) -> Exit
    where
        S: Stream<Item = Result<Inbound, HubError>> + Send + Unpin + 'static,
    {
        let conn_id = self.connection.id().clone();
        let (frame_tx, mut frame_rx) = mpsc::channel::<Result<Inbound, HubError>>(1);

        let reader = tokio::spawn(async move {
            let mut incoming = incoming;
            while let Some(item) = incoming.next().await {
                let last = !matches!(item, Ok(Inbound::Text(_)));
                if frame_tx.send(item).await.is_err() || last {
                    break;
                }
            }
        });

        let exit = loop {
            self.state = LoopState::Racing;
            let outcome = tokio::select! {
                biased;
                frame = frame_rx.recv() => match frame {
                    Some(Ok(Inbound::Text(text))) => Outcome::Frame(text),
                    Some(Ok(Inbound::Close)) | None => Outcome::Closed,
                    Some(Err(e)) => Outcome::ReadFailed(e),
                },
                _ = self.connection.closed() => Outcome::TransportGone,
                _ = tokio::time::sleep(self.idle.current()) => Outcome::Idle,
            };
            self.state = LoopState::Awaiting;

            let step = match outcome {
                Outcome::Frame(text) => self.on_frame(&text).await,
                Outcome::Idle => self.on_idle().await,
                Outcome::Closed => Err(Exit::Closed),
                Outcome::ReadFailed(e) => Err(Exit::ReadFailed(e)),
                Outcome::TransportGone => Err(Exit::TransportGone),
            };
            if let Err(exit) = step {
                break exit;
            }
        };

        self.state = LoopState::Terminated;
        reader.abort();
        if let Err(e) = self.hub.leave(&conn_id).await {
            debug!(conn_id = %conn_id, "Hub gone before leave: {}", e);
        }

        match &exit {
            Exit::ReadFailed(e) => warn!(conn_id = %conn_id, "Connection loop ended: {}", e),
            other => info!(conn_id = %conn_id, "Connection loop ended: {:?}", other),
        }
        exit
    }

    async fn on_frame(&mut self, text: &str) -> Result<(), Exit> {
        let metrics = self.hub.metrics().clone();
        metrics.request_received();
        self.idle.reset();

        let request = match Request::parse(text) {
            Ok(request) => request,
            Err(e) => {
                metrics.parse_failure();
                warn!(
                    conn_id = %self.connection.id(),
                    error_code = e.error_code(),
                    "Ignoring message: {}",
                    e
                );
                return Ok(());
            }
        };
        debug!(
            conn_id = %self.connection.id(),
            attribute = %request.attribute,
            sender = %request.sender,
            "Received request"
        );

        match self.hub.submit(&request).await {
            Ok(_) => Ok(()),
            Err(HubError::HubClosed) => Err(Exit::HubGone),
            Err(e) => {
                warn!(
                    conn_id = %self.connection.id(),
                    error_code = e.error_code(),
                    "Request dropped: {}",
                    e
                );
                Ok(())
            }
        }
    }

    async fn on_idle(&mut self) -> Result<(), Exit> {
        self.idle.on_timeout();
        let metrics = self.hub.metrics().clone();

        let nudge = match self.hub.nudge().await {
            Ok(nudge) => nudge,
            Err(e) => {
                metrics.asset_failure();
                warn!(
                    conn_id = %self.connection.id(),
                    error_code = e.error_code(),
                    "Couldn't build idle prompt: {}",
                    e
                );
                return Ok(());
            }
        };

        match self.connection.send(nudge) {
            Ok(()) => {
                metrics.nudge_sent();
                debug!(
                    conn_id = %self.connection.id(),
                    next_idle_secs = self.idle.current().as_secs(),
                    "Sent idle prompt"
                );
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(Exit::TransportGone),
            Err(e) => {
                metrics.delivery_dropped();
                warn!(
                    conn_id = %self.connection.id(),
                    error_code = e.error_code(),
                    "Idle prompt dropped: {}",
                    e
                );
                Ok(())
            }
        }
    }
}
