use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::events::{EventBroadcaster, WsEvent};

/// Router serving the consensus event stream on `/ws`
pub fn create_ws_router(broadcaster: Arc<EventBroadcaster>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(broadcaster)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(broadcaster): State<Arc<EventBroadcaster>>,
) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, broadcaster))
}

/// Push every consensus event to one client until either side goes away
async fn stream_events(socket: WebSocket, broadcaster: Arc<EventBroadcaster>) {
    let (mut outbound, mut inbound) = socket.split();
    let mut events = broadcaster.subscribe();
    info!(clients = broadcaster.subscriber_count(), "WebSocket client connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let Err(e) = outbound.send(encode(&event)).await {
                        debug!("WebSocket send failed: {}", e);
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("WebSocket client skipped {} events", n),
                Err(RecvError::Closed) => break,
            },
            frame = inbound.next() => match frame {
                // Pings are answered by axum; anything else from the client is ignored
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
            },
        }
    }

    info!("WebSocket client disconnected");
}

fn encode(event: &WsEvent) -> Message {
    // WsEvent holds only strings and integers
    let json = serde_json::to_string(event).unwrap_or_default();
    Message::Text(json.into())
}
