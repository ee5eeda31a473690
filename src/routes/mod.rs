// ABOUTME: Route module organization for the CPET realtime server HTTP endpoints
// ABOUTME: Combines domain routers and applies the CORS and tracing layers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Route module for the CPET realtime server
//!
//! Each domain module holds route definitions and thin handlers that
//! delegate to the session manager or the consensus resolver.

/// Exam annotation and consensus routes
pub mod exams;
/// Health check route
pub mod health;
/// Session registration and summary routes
pub mod sessions;
/// Realtime WebSocket route
pub mod websocket;

pub use exams::ExamRoutes;
pub use health::HealthRoutes;
pub use sessions::{RegisterSessionRequest, RegisterSessionResponse, SessionRoutes};
pub use websocket::RealtimeRoutes;

use crate::middleware::{request_tracing, setup_cors};
use crate::resources::ServerResources;
use axum::Router;
use std::sync::Arc;

/// Every route of the server with middleware applied
pub fn build_router(resources: &Arc<ServerResources>) -> Router {
    Router::new()
        .merge(HealthRoutes::routes(Arc::clone(resources)))
        .merge(SessionRoutes::routes(Arc::clone(resources)))
        .merge(ExamRoutes::routes(Arc::clone(resources)))
        .merge(RealtimeRoutes::routes(Arc::clone(resources)))
        .layer(setup_cors(&resources.config))
        .layer(request_tracing())
}
