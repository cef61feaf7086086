//! `WS /jobs/{id}/stream`: relays one job's progress events to a single
//! connected client. Split-socket/select! relay pattern grounded on
//! `chat-cli/src/cli/chat/web_server/websocket.rs`'s `handle_websocket`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;

pub async fn stream_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay(socket, state, job_id))
}

async fn relay(socket: WebSocket, state: AppState, job_id: i64) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.progress.subscribe(job_id);

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let is_terminal = event.is_terminal();
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(job_id, error = %e, "failed to serialize progress event");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
            if is_terminal {
                break;
            }
        }
    });

    // The client may send ping frames (`spec.md` §6.1); control frames
    // are answered by the underlying websocket library automatically,
    // so this loop only needs to drain the stream until disconnect.
    let recv_task = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            if message.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }
}
