// =============================================================================
// WebSocket Handler — push-based feed updates
// =============================================================================
//
// Clients connect to `/api/v1/ws` and receive:
//   1. An immediate full StateSnapshot on connect.
//   2. A fresh snapshot after every feed event (status, candles, tick,
//      balance), across subscription switches.
//
// Ping frames are answered with Pong; any text frame is treated as a
// heartbeat and ignored.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::app_state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    info!("WebSocket connection accepted, upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Runs until the client goes away. One `select!` drives both directions.
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let mut events = state.subscribe();
    let (mut sender, mut receiver) = socket.split();
    if let Err(e) = send_snapshot(&mut sender, &state).await {
        warn!(error = %e, "failed to send initial WebSocket snapshot");
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        // Coalesce whatever else is queued into one snapshot.
                        while events.try_recv().is_ok() {}
                        if let Err(e) = send_snapshot(&mut sender, &state).await {
                            debug!(error = %e, "WebSocket send failed, disconnecting");
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!(msg = %text, "WebSocket heartbeat received");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "failed to send Pong, disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error, disconnecting");
                        break;
                    }
                }
            }
        }
    }
}

async fn send_snapshot<S>(
    sender: &mut S,
    state: &Arc<AppState>,
) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let snapshot = state.build_snapshot();

    match serde_json::to_string(&snapshot) {
        Ok(json) => {
            sender.send(Message::Text(json)).await?;
            debug!(version = snapshot.state_version, "WebSocket snapshot sent");
            Ok(())
        }
        Err(e) => {
            // Serialisation errors are not network errors; keep the socket.
            warn!(error = %e, "failed to serialize snapshot");
            Ok(())
        }
    }
}
