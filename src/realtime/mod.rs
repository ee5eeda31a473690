// ABOUTME: Realtime session layer multiplexing many concurrent detection sessions
// ABOUTME: Session manager, outbound wire protocol and the WebSocket transport
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Realtime Sessions
//!
//! The [`SessionManager`] owns every open session. Each session is driven by
//! exactly one task: the receive loop of its WebSocket, or a replay task.

/// Session lifecycle and sample processing
pub mod manager;
/// Outbound message envelope
pub mod protocol;
/// WebSocket transport
pub mod websocket;

pub use manager::{SessionManager, SessionSummary};
pub use protocol::{PredictionMessage, ServerMessage};
pub use websocket::handle_connection;

use crate::replay::{ReplayDefaults, ReplayRequest};
use cpet_core::constants::realtime;
use cpet_core::errors::AppResult;
use cpet_core::models::SessionMode;
use cpet_detection::DetectorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process-wide settings for the session manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Detector defaults applied to every new session
    pub detector: DetectorConfig,
    /// Buffered samples required before the scoring function is consulted
    pub min_points_for_model: usize,
    /// Latency budget for one scoring call
    pub scoring_timeout: Duration,
    /// Replay defaults for sessions that leave parameters unset
    pub replay: ReplayDefaults,
    /// Bound on registrations not yet claimed by a connection
    pub max_pending_sessions: usize,
    /// How long a registration waits for its connection
    pub pending_ttl: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            min_points_for_model: realtime::DEFAULT_MIN_POINTS_FOR_MODEL,
            scoring_timeout: Duration::from_millis(realtime::DEFAULT_SCORING_TIMEOUT_MS),
            replay: ReplayDefaults::default(),
            max_pending_sessions: realtime::MAX_PENDING_SESSIONS,
            pending_ttl: Duration::from_secs(realtime::PENDING_SESSION_TTL_SECS),
        }
    }
}

/// Per-session configuration, registered ahead of the connection or applied at open
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Subject being tested
    #[serde(default)]
    pub subject_id: Option<String>,
    /// Where samples come from
    #[serde(default)]
    pub mode: SessionMode,
    /// Trigger threshold override
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Persistence override
    #[serde(default)]
    pub persistence: Option<u32>,
    /// Replay parameters, used in replay mode
    #[serde(default)]
    pub replay: ReplayRequest,
}

impl SessionConfig {
    /// Detector configuration with this session's overrides applied to `base`
    ///
    /// Replay parameters are checked as well, so a configuration that passes
    /// here can be opened as is.
    ///
    /// # Errors
    ///
    /// Returns a validation error when an override is out of range.
    pub fn detector_config(&self, base: &DetectorConfig) -> AppResult<DetectorConfig> {
        self.replay.validate()?;
        let config = DetectorConfig {
            threshold: self.threshold.unwrap_or(base.threshold),
            persistence: self.persistence.unwrap_or(base.persistence),
            ..*base
        };
        config.validate()?;
        Ok(config)
    }
}
