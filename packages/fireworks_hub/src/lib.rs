//! Fireworks Hub - connection hub and event dispatch
//!
//! Accepts client connections, replays recent events to newcomers, fans new
//! events out to everyone and nudges connections that have gone quiet. It has
//! no HTTP dependencies: transports plug in as a stream of [`Inbound`] frames
//! and a queue of outbound [`Event`]s.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fireworks_hub::{ConnectionLoop, FileAssetResolver, HubConfig, HubHandle, IdleTimer, Inbound};
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = HubHandle::spawn(HubConfig::default(), Arc::new(FileAssetResolver::new("images")));
//!
//!     let (conn, mut outbound) = hub.join().await.unwrap();
//!     tokio::spawn(async move {
//!         while let Some(event) = outbound.recv().await {
//!             println!("{}", event.text());
//!         }
//!     });
//!
//!     let frames = futures::stream::iter(vec![
//!         Ok(Inbound::Text(r#"{"attribute":"blue","sender":"Ann"}"#.to_string())),
//!         Ok(Inbound::Close),
//!     ]);
//!     ConnectionLoop::new(hub, conn, IdleTimer::default()).run(frames).await;
//! }
//! ```

pub mod arbitration;
pub mod asset;
pub mod backlog;
mod error;
pub mod event;
pub mod hub;
mod idle;
pub mod metrics;
pub mod pipeline;
pub mod registry;

#[cfg(test)]
mod test_helpers;

pub use arbitration::{ConnectionLoop, Exit, Inbound, LoopState};
pub use asset::{AssetResolver, EncodedAsset, FileAssetResolver};
pub use backlog::Backlog;
pub use error::HubError;
pub use event::{Event, Request};
pub use hub::{HubConfig, HubHandle, HubStats};
pub use idle::{DEFAULT_IDLE_INITIAL, DEFAULT_IDLE_STEP, IdleTimer};
pub use metrics::{HubMetrics, MetricsSnapshot};
pub use registry::{Connection, ConnectionId, Delivery, Registry};
