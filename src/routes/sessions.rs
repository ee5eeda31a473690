// ABOUTME: Session registration and summary routes
// ABOUTME: Pre-registers session configuration consumed by the next WebSocket connection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Session Routes
//!
//! - `POST /api/sessions` - Register a pending session configuration
//! - `GET /api/sessions/{session_id}` - Summary of an open session

use crate::realtime::{SessionConfig, SessionSummary};
use crate::resources::ServerResources;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cpet_core::errors::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session routes implementation
pub struct SessionRoutes;

/// Request to register a session ahead of its connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterSessionRequest {
    /// Desired session id; generated when absent
    #[serde(default)]
    pub session_id: Option<String>,
    /// Session configuration
    #[serde(flatten)]
    pub config: SessionConfig,
}

/// Response after registering a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSessionResponse {
    /// Session identifier to connect with
    pub session_id: String,
    /// Path of the WebSocket endpoint for this session
    pub websocket_path: String,
}

impl SessionRoutes {
    /// Create the session routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/sessions", post(Self::handle_register))
            .route("/api/sessions/{session_id}", get(Self::handle_summary))
            .with_state(resources)
    }

    async fn handle_register(
        State(resources): State<Arc<ServerResources>>,
        Json(request): Json<RegisterSessionRequest>,
    ) -> Result<Response, AppError> {
        let session_id = resources
            .sessions
            .register_session(request.session_id, request.config)?;
        let response = RegisterSessionResponse {
            websocket_path: format!("/api/ws/realtime/{session_id}"),
            session_id,
        };
        Ok((StatusCode::CREATED, Json(response)).into_response())
    }

    async fn handle_summary(
        State(resources): State<Arc<ServerResources>>,
        Path(session_id): Path<String>,
    ) -> Result<Json<SessionSummary>, AppError> {
        Ok(Json(resources.sessions.summary(&session_id).await?))
    }
}
