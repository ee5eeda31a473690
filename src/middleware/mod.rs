// ABOUTME: HTTP middleware for CORS and request tracing
// ABOUTME: Layers applied once to the combined router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// CORS configuration
pub mod cors;
/// Request span creation
pub mod tracing;

pub use cors::setup_cors;
pub use tracing::{request_id, request_tracing};
