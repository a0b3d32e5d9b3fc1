//! Error kinds raised by the hub.
//!
//! None of these are process-fatal: each one is confined to the connection
//! (or the single request) that triggered it.

use crate::registry::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The transport could not be upgraded to a duplex connection.
    #[error("upgrade failed: {0}")]
    Upgrade(String),

    /// Transport-level read error. Terminates the connection's loop.
    #[error("read failed: {0}")]
    Read(String),

    /// The inbound payload was not a valid request.
    #[error("malformed request: {0}")]
    Parse(String),

    /// The asset for a request could not be loaded or encoded.
    #[error("asset resolution failed for {path}: {reason}")]
    AssetResolution { path: String, reason: String },

    /// The connection's outbound queue is closed; its transport is gone.
    #[error("write to {0} failed: connection closed")]
    Write(ConnectionId),

    /// The connection's outbound queue is full; this one event was dropped.
    #[error("send queue full for {0}, event dropped")]
    QueueFull(ConnectionId),

    /// The hub actor has stopped.
    #[error("hub is gone")]
    HubClosed,
}

impl HubError {
    /// Whether a delivery failure means the connection is dead and must be
    /// removed from the registry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Write(_) | Self::Read(_) | Self::HubClosed)
    }

    /// Stable name for structured log fields.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Upgrade(_) => "upgrade_failure",
            Self::Read(_) => "read_failure",
            Self::Parse(_) => "parse_failure",
            Self::AssetResolution { .. } => "asset_resolution_failure",
            Self::Write(_) => "write_failure",
            Self::QueueFull(_) => "queue_full",
            Self::HubClosed => "hub_closed",
        }
    }
}
