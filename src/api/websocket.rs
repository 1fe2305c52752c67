//! Full-duplex voice session over WebSocket

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::ApiState;
use crate::session::{ClientMessage, ServerMessage, SessionOrchestrator};

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/{client_id}", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    Path(client_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, client_id))
}

/// Drive one session until the client goes away
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>, client_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(32);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    let (mut orchestrator, mut events) =
        SessionOrchestrator::open(state.services.clone(), client_id.clone(), tx.clone()).await;
    tracing::info!(client_id = %client_id, "WebSocket connected");

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => orchestrator.handle(message).await,
                        Err(e) => {
                            tracing::debug!(client_id = %client_id, error = %e, "invalid client message");
                            let _ = tx
                                .send(ServerMessage::error("invalid_message", e.to_string()))
                                .await;
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    tracing::trace!(len = data.len(), "received ping");
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(client_id = %client_id, "WebSocket closed by client");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(client_id = %client_id, error = %e, "WebSocket receive failed");
                    break;
                }
            },
            Some(event) = events.recv() => orchestrator.handle_voice_event(event).await,
            _ = &mut send_task => {
                tracing::debug!(client_id = %client_id, "WebSocket send side closed");
                break;
            }
        }
    }

    orchestrator.close().await;
    send_task.abort();
}
