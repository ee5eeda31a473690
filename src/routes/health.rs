// ABOUTME: Health check route for service monitoring
// ABOUTME: Reports liveness plus open and pending session counts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::resources::ServerResources;
use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;

/// Health routes implementation
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create the health check route
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/health", get(Self::handle_health))
            .with_state(resources)
    }

    async fn handle_health(State(resources): State<Arc<ServerResources>>) -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "status": "healthy",
            "service": cpet_core::constants::service_names::CPET_REALTIME_SERVER,
            "version": env!("CARGO_PKG_VERSION"),
            "active_sessions": resources.sessions.active_sessions(),
            "pending_sessions": resources.sessions.pending_sessions(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }
}
