//! WebSocket transport (§4.9/§4.10): upgrades the connection, registers it
//! with the Hub, and splits into an independent read task (decodes inbound
//! frames, hands them to `session::handle_frame`) and write task (drains the
//! Hub's outbound queue onto the socket).

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::hub::Outbound;
use crate::protocol::{ClientFrame, ServerFrame};
use crate::session;
use crate::state::SharedState;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub async fn ws_handler(
    Path(user_id): Path<Uuid>,
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

#[instrument(skip(socket, state), fields(%user_id))]
async fn handle_socket(socket: WebSocket, state: SharedState, user_id: Uuid) {
    let (mut sink, mut stream) = socket.split();
    let (mut outbound, last_pong_millis) = state.hub.register(user_id);
    state.hub.spawn_heartbeat(user_id, last_pong_millis.clone());

    let writer = tokio::spawn(async move {
        while let Some(out) = outbound.recv().await {
            match out {
                Outbound::Frame(frame) => {
                    if sink.send(WsMessage::Text(frame.to_json().into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    });

    while let Some(received) = stream.next().await {
        let raw = match received {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue, // binary/ping/pong frames carry no protocol meaning here
            Err(e) => {
                warn!(error = %e, "websocket read error");
                break;
            }
        };

        match serde_json::from_str::<ClientFrame>(&raw) {
            // Heartbeat frames are transport-level (§4.9), answered here
            // rather than routed through the session protocol handler.
            Ok(ClientFrame::Pong { .. }) => {
                state.hub.record_pong(user_id);
                state.hub.send(user_id, ServerFrame::PongAck { timestamp: now_millis() });
            }
            Ok(ClientFrame::Ping { .. }) => {
                state.hub.send(user_id, ServerFrame::Pong { timestamp: now_millis() });
            }
            Ok(frame) => session::handle_frame(&state, user_id, frame).await,
            Err(e) => warn!(error = %e, "dropping unparsable client frame"),
        }
    }

    writer.abort();
    state.hub.unregister(user_id, &last_pong_millis);
    info!(%user_id, "connection closed");
}
