use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::stream::StreamExt;
use serde::Deserialize;
use tokio::time::{self, Duration};

use crate::{
    error::{bad, AppResult},
    fanout::RoomEvent,
    state::AppState,
};

/// Idle keepalive so intermediaries don't silently close the socket. A
/// missing pong is NOT a disconnect; only the transport closing is.
const HEARTBEAT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsQuery {
    room_name: String,
    participant_name: String,
}

pub fn router() -> Router {
    Router::new().route("/subscribe", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(q): Query<WsQuery>,
    Extension(state): Extension<AppState>,
) -> AppResult<impl IntoResponse> {
    if q.room_name.trim().is_empty() || q.participant_name.trim().is_empty() {
        return Err(bad("roomName and participantName are required"));
    }
    Ok(ws.on_upgrade(move |sock| subscriber_loop(sock, state, q.room_name, q.participant_name)))
}

/* ---------------- per subscriber ---------------- */
async fn subscriber_loop(mut sock: WebSocket, state: AppState, room_name: String, identity: String) {
    // register before reading the snapshot: anything published in between
    // is queued behind the snapshot frame, never lost
    let (id, mut rx) = state.fanout.subscribe(&room_name, &identity).await;
    let snapshot = {
        let handle = state.room(&room_name).await;
        let room = handle.lock().await;
        RoomEvent::RoleSnapshot {
            host: room.host_identity.clone(),
            co_hosts: room.co_hosts.clone(),
        }
    };
    tracing::debug!(room = %room_name, %identity, "subscriber connected");

    if send_event(&mut sock, &snapshot).await.is_err() {
        state.fanout.unsubscribe(&room_name, id).await;
        return;
    }

    let mut heartbeat = time::interval(HEARTBEAT);
    heartbeat.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    if send_event(&mut sock, &event).await.is_err() {
                        break;
                    }
                }
                // registry dropped us: replaced, overflowed, or room deleted
                None => break,
            },
            _ = heartbeat.tick() => {
                if sock.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            frame = sock.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {} // pongs and stray frames are ignored
            },
        }
    }

    state.fanout.unsubscribe(&room_name, id).await;
    tracing::debug!(room = %room_name, %identity, "subscriber disconnected");
}

async fn send_event(sock: &mut WebSocket, event: &RoomEvent) -> Result<(), axum::Error> {
    let Ok(json) = serde_json::to_string(event) else {
        return Ok(());
    };
    sock.send(Message::Text(json)).await
}
