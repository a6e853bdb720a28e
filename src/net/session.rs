//! The persistent session endpoint: `/resource/room/{roomId}/ws?offset=N`
//! (spec §4.3, §6). Thin glue between the socket and a `RoomHandle` — all
//! session-state-machine logic lives in `hub::room`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use snafu::ResultExt;
use tracing::{info, warn};

use crate::error::MalformedSnafu;
use crate::wire::ClientMessage;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    offset: usize,
}

pub async fn upgrade(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<SessionQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, query.offset))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, room_id: String, offset: usize) {
    let Ok(handle) = state.registry.get(&room_id).await else {
        return;
    };

    // Bounded per-session outbound queue: a slow reader hits the flume
    // `Full` error on send and the room closes it rather than growing
    // memory unbounded (spec §5 backpressure).
    let (outbound_tx, outbound_rx) = flume::bounded(64);
    let Some(join) = handle.join(outbound_tx, offset).await else {
        return;
    };
    let site_id = join.site_id;

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Ok(msg) = outbound_rx.recv_async().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "failed to encode outbound message");
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let Ok(frame) = frame else { break };
        // Any inbound traffic, including bare pings, counts as liveness.
        handle.heartbeat(site_id);
        match frame {
            Message::Text(text) => {
                match serde_json::from_str::<ClientMessage>(&text).context(MalformedSnafu) {
                    Ok(ClientMessage::CrdtEvents { events }) => handle.submit_operations(site_id, events),
                    Ok(ClientMessage::SitePresence { name, visible, .. }) => {
                        handle.submit_presence(site_id, name, visible)
                    }
                    Err(e) => {
                        warn!(room_id = %room_id, site_id, error = %e, "malformed message, terminating session");
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!(room_id = %room_id, site_id, "session closed");
    handle.disconnect(site_id);
    writer.abort();
}
