use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::state::AppState;
use crate::session::{ServerMessage, TranscribeSession};

/// GET /ws/transcribe
/// Upgrade and run the real-time transcription protocol
pub async fn ws_transcribe(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_transcribe_socket(socket, state))
}

async fn handle_transcribe_socket(socket: WebSocket, state: AppState) {
    info!("WebSocket connection established");

    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();

    // forwards session events to the socket; ends once every sender is gone
    let sender_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to encode outbound event: {}", e);
                    continue;
                }
            };

            if sink.send(Message::Text(payload)).await.is_err() {
                debug!("Client went away mid-send");
                break;
            }
        }

        if let Err(e) = sink.close().await {
            debug!("Could not close WebSocket: {}", e);
        }
    });

    let mut session = TranscribeSession::new(state.session_context(), outbound_tx.clone());
    session.announce_connected();

    while let Some(received) = stream.next().await {
        let message = match received {
            Ok(message) => message,
            Err(e) => {
                error!("Error receiving WebSocket message: {}", e);
                break;
            }
        };

        match message {
            Message::Text(text) => {
                if let Err(e) = session.handle_frame(&text).await {
                    // framing is gone; tell the client best-effort and stop
                    error!("Protocol error, closing connection: {:#}", e);
                    let _ = outbound_tx.send(ServerMessage::error(format!("Server error: {}", e)));
                    break;
                }
            }
            Message::Close(_) => {
                info!("WebSocket disconnected");
                break;
            }
            _ => {}
        }
    }

    drop(session);
    drop(outbound_tx);
    if let Err(e) = sender_task.await {
        debug!("Sender task ended abnormally: {}", e);
    }

    info!("WebSocket connection closed");
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
