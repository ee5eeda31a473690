// ABOUTME: Main library entry point for the CPET realtime threshold server
// ABOUTME: Session management, exam replay, reader consensus and the HTTP/WebSocket surface
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

// Crate-level attributes:
// - deny(unsafe_code): Zero-tolerance unsafe policy
#![deny(unsafe_code)]

//! # CPET Realtime Server
//!
//! Streams cardiopulmonary exercise test samples through per-session online
//! anaerobic threshold detectors and pushes results back over WebSockets.
//!
//! ## Features
//!
//! - **Live sessions**: one detector per connection, many sessions at once
//! - **Exam replay**: recorded exams re-emitted as paced sample streams
//! - **Reader consensus**: two readers plus an adjudicator per exam
//! - **Graceful degradation**: a rule-based scorer stands in whenever the
//!   injected scoring function fails or is too slow
//!
//! ## Architecture
//!
//! - `cpet-core`: errors, constants and the data model
//! - `cpet-detection`: the detector, scoring contract and consensus fold
//! - this crate: configuration, sessions, replay, storage and routes
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cpet_realtime_server::config::ServerConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("CPET realtime server configured on port {}", config.http_port);
//!     Ok(())
//! }
//! ```

/// Environment-based server configuration
pub mod config;

/// Annotation stores and the consensus resolver
pub mod consensus;

/// Structured logging setup
pub mod logging;

/// CORS and request tracing layers
pub mod middleware;

/// Realtime session manager and WebSocket transport
pub mod realtime;

/// Recorded exam loading, smoothing and replay planning
pub mod replay;

/// Shared server resources
pub mod resources;

/// HTTP routes
pub mod routes;
