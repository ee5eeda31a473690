// ABOUTME: Data replay simulator turning recorded exams into paced sample streams
// ABOUTME: Plan building is pure data; pacing lives in the session manager's replay task
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Data Replay Simulator
//!
//! `load` is [`ExamStore::load_rows`], `plan` is [`ReplayPlan::build`] and
//! `pick_random_exam` is [`pick_random_exam`].

/// Replay plan construction
pub mod plan;
/// Row smoothing and time windows
pub mod smoothing;
/// Exam stores
pub mod store;

pub use plan::{ReplayItem, ReplayPlan};
pub use smoothing::{prepare_rows, ExamRow, Smoothing, TimeWindow};
pub use store::{pick_random_exam, ExamStore, InMemoryExamStore, JsonExamStore};

use cpet_core::constants::{consensus, replay};
use cpet_core::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Process-wide replay defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayDefaults {
    /// Playback speed multiplier
    pub speed: f64,
    /// Smoothing mode such as `none`, `breath:5` or `sec:5`
    pub smoothing: String,
    /// Step for rows without a `Time` value
    pub default_step_secs: f64,
}

impl Default for ReplayDefaults {
    fn default() -> Self {
        Self {
            speed: replay::DEFAULT_SPEED,
            smoothing: "none".to_owned(),
            default_step_secs: consensus::DEFAULT_DELTA_SECS,
        }
    }
}

/// Per-session replay parameters; unset fields fall back to [`ReplayDefaults`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayRequest {
    /// Exam to replay; a random one is picked when absent
    #[serde(default)]
    pub exam_id: Option<String>,
    /// Playback speed multiplier
    #[serde(default)]
    pub speed: Option<f64>,
    /// Smoothing mode such as `none`, `breath:5` or `sec:5`
    #[serde(default)]
    pub smoothing: Option<String>,
    /// Earliest exam time to replay
    #[serde(default)]
    pub start: Option<f64>,
    /// Latest exam time to replay
    #[serde(default)]
    pub end: Option<f64>,
}

impl ReplayRequest {
    /// Check the explicitly requested parameters
    ///
    /// # Errors
    ///
    /// Returns a validation error for a speed that is not a positive number.
    pub fn validate(&self) -> AppResult<()> {
        match self.speed {
            Some(speed) if !(speed.is_finite() && speed > 0.0) => Err(AppError::invalid_input(
                format!("replay speed must be a positive number, got {speed}"),
            )),
            _ => Ok(()),
        }
    }

    /// Effective speed
    #[must_use]
    pub fn speed_or(&self, defaults: &ReplayDefaults) -> f64 {
        self.speed.unwrap_or(defaults.speed)
    }

    /// Effective smoothing
    #[must_use]
    pub fn smoothing_or(&self, defaults: &ReplayDefaults) -> Smoothing {
        Smoothing::parse(self.smoothing.as_deref().unwrap_or(&defaults.smoothing))
    }

    /// Requested time window
    #[must_use]
    pub const fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            end: self.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_non_positive_speed() {
        for speed in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            let request = ReplayRequest {
                speed: Some(speed),
                ..ReplayRequest::default()
            };
            assert!(request.validate().is_err(), "speed {speed} accepted");
        }
        let request = ReplayRequest {
            speed: Some(0.5),
            ..ReplayRequest::default()
        };
        assert!(request.validate().is_ok());
        assert!(ReplayRequest::default().validate().is_ok());
    }
}
