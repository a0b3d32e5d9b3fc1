//! WebSocket glue between axum sockets and the hub.
//!
//! Each socket is split: a writer task drains the connection's outbound queue
//! into JSON text frames, and the read half is handed to the hub's
//! [`ConnectionLoop`] as a stream of [`Inbound`] frames.

use axum::extract::ws::{Message, WebSocket};
use fireworks_hub::{ConnectionLoop, Exit, HubError, IdleTimer, Inbound};
use futures::stream::BoxStream;
use futures::{sink::SinkExt, stream::StreamExt};
use tracing::{debug, error, info, warn};

use crate::AppState;

/// Handle one upgraded fireworks socket until it closes.
pub async fn handle_socket(socket: WebSocket, state: AppState, client: String) {
    let (conn, mut outbound) = match state.hub.join().await {
        Ok(joined) => joined,
        Err(e) => {
            error!(client = %client, "Couldn't join hub: {}", e);
            return;
        }
    };
    let conn_id = conn.id().clone();
    info!(conn_id = %conn_id, client = %client, "Client joined");

    let (mut ws_sender, ws_receiver) = socket.split();

    let writer_id = conn_id.clone();
    let sender_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!(conn_id = %writer_id, "Failed to serialize event: {}", e);
                    continue;
                }
            };
            if let Err(e) = ws_sender.send(Message::Text(json.into())).await {
                warn!(conn_id = %writer_id, "{}: {}", HubError::Write(writer_id.clone()), e);
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let idle = IdleTimer::new(state.config.idle_initial, state.config.idle_step);
    let mut conn_loop = ConnectionLoop::new(state.hub.clone(), conn, idle);
    let exit = conn_loop.run(inbound_frames(ws_receiver)).await;

    match exit {
        Exit::ReadFailed(_) | Exit::TransportGone => {
            debug!(conn_id = %conn_id, "Connection dropped: {:?}", exit)
        }
        Exit::Closed | Exit::HubGone => {}
    }

    sender_task.abort();
    info!(conn_id = %conn_id, client = %client, "Client left");
}

/// Map raw socket messages onto hub frames. Binary payloads are read as
/// lossy UTF-8; ping/pong never reach the hub.
pub fn inbound_frames<S, E>(receiver: S) -> BoxStream<'static, Result<Inbound, HubError>>
where
    S: futures::Stream<Item = Result<Message, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    receiver
        .filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(Inbound::Text(text.as_str().to_owned()))),
                Ok(Message::Binary(bytes)) => Some(Ok(Inbound::Text(
                    String::from_utf8_lossy(&bytes).into_owned(),
                ))),
                Ok(Message::Close(_)) => Some(Ok(Inbound::Close)),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
                Err(e) => Some(Err(HubError::Read(e.to_string()))),
            }
        })
        .boxed()
}
