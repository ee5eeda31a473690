// ABOUTME: Detection result, intensity zone and session mode models
// ABOUTME: The shapes pushed to clients after each scored sample
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exercise intensity classification for one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityZone {
    /// No work rate yet, or unloaded pedalling before exercise began
    Warmup,
    /// Below the anaerobic threshold
    Aerobic,
    /// Inside the transition window right after the threshold
    Threshold,
    /// Past the transition window
    Anaerobic,
    /// Work rate dropped back to zero after exercise
    Recovery,
}

impl IntensityZone {
    /// Wire name of the zone
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warmup => "warmup",
            Self::Aerobic => "aerobic",
            Self::Threshold => "threshold",
            Self::Anaerobic => "anaerobic",
            Self::Recovery => "recovery",
        }
    }
}

impl fmt::Display for IntensityZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-sample output of the threshold detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Timestamp of the sample that produced this result
    pub timestamp: f64,
    /// Probability that the subject is past the anaerobic threshold, in [0, 1]
    pub at_probability: f64,
    /// Whether the detector has latched the threshold
    pub at_triggered: bool,
    /// Extrapolated time at which the threshold will be crossed
    pub predicted_at_time: Option<f64>,
    /// Stability of recent probabilities, in [0.5, 1]
    pub confidence: f64,
    /// Intensity zone of the sample
    pub intensity_zone: IntensityZone,
    /// Advisory texts
    pub alerts: Vec<String>,
}

impl DetectionResult {
    /// Result for a sample taken before exercise began
    #[must_use]
    pub const fn warmup(timestamp: f64) -> Self {
        Self {
            timestamp,
            at_probability: 0.0,
            at_triggered: false,
            predicted_at_time: None,
            confidence: 0.0,
            intensity_zone: IntensityZone::Warmup,
            alerts: Vec::new(),
        }
    }

    /// Copy with probability rounded to 3 decimals and confidence to 2, for the wire
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            at_probability: round_to(self.at_probability, 3),
            confidence: round_to(self.confidence, 2),
            ..self.clone()
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

/// Origin of the samples feeding a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Samples arrive over the connection from a device
    #[default]
    #[serde(alias = "device")]
    Live,
    /// Samples are generated from a recorded exam
    #[serde(alias = "sim")]
    Replay,
}

impl SessionMode {
    /// Wire name of the mode
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Replay => "replay",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "live" | "device" => Ok(Self::Live),
            "replay" | "sim" => Ok(Self::Replay),
            other => Err(format!("unknown session mode '{other}'")),
        }
    }
}
