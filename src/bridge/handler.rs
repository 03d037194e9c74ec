use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bridge::{ConnectionHandle, ContentMessage, HostMessage};
use crate::state::AppState;

const MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Query parameters for a bridge connection
#[derive(Debug, Deserialize)]
pub struct BridgeQueryParams {
    pub key: Uuid,
}

/// Bridge socket routes
pub fn bridge_routes() -> Router<AppState> {
    Router::new().route("/bridge", get(bridge_upgrade))
}

/// Upgrade only for the key of the surface that is currently open.
async fn bridge_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<BridgeQueryParams>,
) -> Result<Response, StatusCode> {
    let active = state
        .session
        .check_bridge_key(params.key)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    if !active {
        tracing::warn!(key = %params.key, "Bridge connection with inactive key refused");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(ws
        .max_message_size(MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state, params.key)))
}

async fn handle_socket(socket: WebSocket, state: AppState, key: Uuid) {
    let conn_id = Uuid::new_v4();
    tracing::info!(conn_id = %conn_id, "Bridge connected");

    let (tx, mut rx) = mpsc::unbounded_channel::<HostMessage>();
    state
        .connections
        .add(ConnectionHandle::new(conn_id, key, tx));

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Ends when the connection handle is dropped, which closes the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
        let _ = ws_sender.close().await;
    });

    let read_state = state.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    let reply = handle_message(text.as_str(), key, &read_state).await;
                    match read_state.connections.get(&conn_id) {
                        Some(handle) => {
                            let _ = handle.send(reply);
                        }
                        None => break,
                    }
                }
                Ok(Message::Binary(_)) => {
                    tracing::warn!(conn_id = %conn_id, "Binary bridge frame dropped");
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(conn_id = %conn_id, "Bridge close received");
                    break;
                }
                Err(e) => {
                    tracing::warn!(conn_id = %conn_id, error = %e, "Bridge socket error");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => read_task.abort(),
        _ = &mut read_task => send_task.abort(),
    }

    state.connections.remove(&conn_id);
    tracing::info!(conn_id = %conn_id, "Bridge disconnected");
}

/// Parse and forward one content message. Anything outside the capability
/// set is refused here, before it reaches the session.
async fn handle_message(text: &str, key: Uuid, state: &AppState) -> HostMessage {
    let message: ContentMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "Unsupported bridge message");
            return HostMessage::Rejected {
                message: "Unsupported bridge message".to_string(),
            };
        }
    };

    match state.session.bridge_message(key, message).await {
        Ok(()) => HostMessage::Accepted,
        Err(e) => HostMessage::Rejected {
            message: e.user_message(),
        },
    }
}
