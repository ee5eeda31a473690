// ABOUTME: WebSocket connection loop binding one socket to one realtime session
// ABOUTME: Forwards manager messages out and feeds inbound samples and resets into the manager
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::manager::SessionManager;
use super::protocol::ServerMessage;
use axum::extract::ws::{Message, WebSocket};
use cpet_core::errors::{AppError, AppResult, ErrorCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Drive one WebSocket until either side goes away, then close its session
pub async fn handle_connection(manager: Arc<SessionManager>, ws: WebSocket, session_id: String) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let session_id = match manager.open(tx, Some(session_id), None).await {
        Ok(session_id) => session_id,
        Err(error) => {
            warn!(error = %error, "Rejected WebSocket session");
            if let Ok(json) = serde_json::to_string(&ServerMessage::error(&error)) {
                if let Err(send_err) = ws_tx.send(Message::Text(json.into())).await {
                    debug!(send_error = %send_err, "Failed to report rejected session");
                }
            }
            if let Err(close_err) = ws_tx.close().await {
                debug!(error = %close_err, "Failed to close rejected WebSocket");
            }
            return;
        }
    };
    info!(session_id = %session_id, "WebSocket attached");

    // Forward manager messages to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize outbound message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_text(&manager, &session_id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut send_task => break,
        }
    }

    manager.close(&session_id).await;
    send_task.abort();
    info!(session_id = %session_id, "WebSocket detached");
}

async fn handle_text(manager: &SessionManager, session_id: &str, text: &str) {
    let outcome = match serde_json::from_str::<Value>(text) {
        Ok(value) => dispatch(manager, session_id, &value).await,
        Err(e) => Err(AppError::new(
            ErrorCode::InvalidFormat,
            format!("Invalid message format: {e}"),
        )),
    };
    if let Err(error) = outcome {
        debug!(session_id, error = %error, "Inbound message rejected");
        manager.push(session_id, ServerMessage::error(&error));
    }
}

async fn dispatch(manager: &SessionManager, session_id: &str, value: &Value) -> AppResult<()> {
    match value.get("type").and_then(Value::as_str) {
        None | Some("sample") => manager.handle_inbound(session_id, value).await.map(|_| ()),
        Some("reset") => manager.reset(session_id).await,
        Some(other) => Err(AppError::invalid_input(format!(
            "Unknown message type '{other}'"
        ))),
    }
}
