// ABOUTME: Threshold detection engine for cardiopulmonary exercise test streams
// ABOUTME: Online detector, scoring contract with rule-based fallback, consensus fold, Weber classes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # CPET Detection
//!
//! Pure computation, no I/O. The realtime server owns one
//! [`DetectionSession`] per monitored subject and drives it with probabilities
//! from a shared [`ScoringFunction`].

/// Online anaerobic threshold detector
pub mod detector;

/// Scoring function contract and the rule-based fallback
pub mod scoring;

/// Two-reader consensus fold
pub mod consensus;

/// Peak VO2 classification
pub mod vo2_peak;

pub use detector::{DetectionSession, DetectorConfig};
pub use scoring::{
    decode_crossing_time, RuleBasedScorer, ScoreOutput, ScoringError, ScoringFunction,
    StaticFeatures,
};
pub use vo2_peak::{Vo2PeakPrediction, WeberClass};
