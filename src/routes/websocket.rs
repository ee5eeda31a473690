// ABOUTME: WebSocket route upgrading HTTP connections into realtime sessions
// ABOUTME: The session id comes from the path; configuration from a prior registration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::realtime::handle_connection;
use crate::resources::ServerResources;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::{debug, info};

/// WebSocket routes implementation
pub struct RealtimeRoutes;

impl RealtimeRoutes {
    /// Create the realtime WebSocket route
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/api/ws/realtime/{session_id}",
                get(Self::handle_websocket),
            )
            .with_state(resources)
    }

    /// Upgrade the connection and hand it to the session manager
    async fn handle_websocket(
        ws: WebSocketUpgrade,
        State(resources): State<Arc<ServerResources>>,
        Path(session_id): Path<String>,
    ) -> impl IntoResponse {
        info!(session_id = %session_id, "New realtime WebSocket request");
        let manager = Arc::clone(&resources.sessions);

        ws.on_upgrade(move |socket: WebSocket| async move {
            debug!(session_id = %session_id, "WebSocket upgraded, delegating to manager");
            handle_connection(manager, socket, session_id).await;
        })
    }
}
