//! Streaming batch endpoint over WebSocket.
//!
//! The client opens `/ws/batch` and sends one JSON message,
//! `{token, files, options}`. The server replies with the batch event stream
//! as JSON text frames and closes after `complete`. Anything wrong with the
//! request yields a single `{"type": "error"}` frame before any event.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use strmshot_models::BatchOptions;
use strmshot_worker::event_channel;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

const WS_SEND_BUFFER_SIZE: usize = 32;
/// Events buffered between the batch and the socket before the oldest
/// non-terminal ones are dropped.
const EVENT_BUFFER_SIZE: usize = 256;
const WS_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// First (and only) client message.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WsBatchRequest {
    #[serde(default)]
    pub token: Option<String>,
    pub files: Vec<String>,
    #[serde(default)]
    pub options: BatchOptions,
}

#[derive(Serialize)]
struct ErrorFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'a str,
}

/// Queue a text frame, waiting when the send buffer is full.
async fn send_text(tx: &mpsc::Sender<Message>, json: String) -> bool {
    match tx.try_send(Message::Text(json)) {
        Ok(_) => true,
        Err(mpsc::error::TrySendError::Full(msg)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(msg).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

async fn send_error(tx: &mpsc::Sender<Message>, message: &str) {
    let frame = ErrorFrame {
        kind: "error",
        message,
    };
    if let Ok(json) = serde_json::to_string(&frame) {
        send_text(tx, json).await;
        metrics::record_ws_message_sent("batch", "error");
    }
}

/// WebSocket batch endpoint.
pub async fn ws_batch(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection("batch");

    ws.on_upgrade(|socket| async move {
        handle_batch_socket(socket, state).await;
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    })
}

async fn handle_batch_socket(socket: WebSocket, state: AppState) {
    let (ws_sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    match tokio::time::timeout(WS_CLIENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => run_session(&state, &text, &tx).await,
        Ok(_) | Err(_) => send_error(&tx, "Expected JSON batch request or connection timeout").await,
    }

    let _ = tx.send(Message::Close(None)).await;
    drop(tx);
    let _ = send_task.await;
}

/// Validate one batch request and stream its events into `tx`.
pub async fn run_session(state: &AppState, text: &str, tx: &mpsc::Sender<Message>) {
    let request: WsBatchRequest = match serde_json::from_str(text) {
        Ok(req) => req,
        Err(e) => {
            send_error(tx, &format!("Invalid request: {}", e)).await;
            return;
        }
    };

    if !state.config.token_matches(request.token.as_deref()) {
        warn!("WebSocket batch rejected: invalid token");
        send_error(tx, "Authentication failed").await;
        return;
    }

    if let Err(e) = request.options.validate() {
        send_error(tx, &format!("Invalid options: {}", e)).await;
        return;
    }

    let total = request.files.len();
    info!(total, "WebSocket batch started");

    let (sender, mut events) = event_channel(EVENT_BUFFER_SIZE);
    let runner = state.runner.clone();
    let batch = tokio::spawn(async move {
        runner
            .run_batch(request.files, request.options, Arc::new(sender))
            .await
    });

    while let Some(event) = events.recv().await {
        let kind = event.event_type().as_str();
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize batch event");
                continue;
            }
        };
        if !send_text(tx, json).await {
            // The batch keeps running; its outcomes still land on disk
            info!(total, "Client disconnected, batch continues in background");
            return;
        }
        metrics::record_ws_message_sent("batch", kind);
    }

    if events.dropped() > 0 {
        warn!(dropped = events.dropped(), "Slow client missed batch events");
    }

    match batch.await {
        Ok(Ok(summary)) => info!(
            total,
            succeeded = summary.progress.succeeded,
            failed = summary.progress.failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "WebSocket batch finished"
        ),
        Ok(Err(e)) => send_error(tx, &e.to_string()).await,
        Err(e) => {
            error!(error = %e, "Batch task aborted");
            send_error(tx, "Batch aborted").await;
        }
    }
}
