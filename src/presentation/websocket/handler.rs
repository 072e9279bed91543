//! WebSocket Connection Handler
//!
//! Upgrades `/ws/{user_id}` requests and runs the per-connection loop.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::gateway::Gateway;
use super::session::{Connection, Payload};
use crate::startup::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<i64>,
    State(state): State<AppState>,
) -> Response {
    let max_message_size = state.settings.websocket.max_message_size;
    let max_frame_size = state.settings.websocket.max_frame_size;

    ws.max_message_size(max_message_size)
        .max_frame_size(max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, user_id, state.gateway))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: i64, gateway: Arc<Gateway>) {
    // Split socket for concurrent read/write
    let (mut sender, mut receiver) = socket.split();

    // Outbound queue, drained by the writer task
    let (tx, mut rx) = mpsc::unbounded_channel::<Payload>();
    let connection = Arc::new(Connection::new(user_id, tx));
    let connection_id = connection.id();

    // Spawn task to forward queued frames to the socket
    let mut writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender
                .send(Message::Text(payload.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
        }
        let _ = sender.close().await;
    });

    gateway.on_connect(Arc::clone(&connection));

    // Main message loop; frames from this connection are handled in order
    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        gateway.handle_frame(&connection, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(user_id, connection_id = %connection_id, "Connection closed");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::trace!(user_id, connection_id = %connection_id, "Ignoring binary frame");
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong are handled by axum
                    }
                    Some(Err(e)) => {
                        tracing::debug!(
                            user_id,
                            connection_id = %connection_id,
                            error = %e,
                            "WebSocket error"
                        );
                        break;
                    }
                }
            }

            _ = &mut writer => {
                tracing::debug!(user_id, connection_id = %connection_id, "Writer stopped");
                break;
            }
        }
    }

    // Cleanup
    gateway.on_disconnect(&connection);
    writer.abort();
}
