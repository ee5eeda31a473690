// ABOUTME: Scoring function contract plus the deterministic rule-based fallback scorer
// ABOUTME: Explicit Result-returning seam so callers degrade to RER bands instead of failing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Scoring
//!
//! A [`ScoringFunction`] turns a buffered sample history into a probability
//! per sample. Implementations are shared across sessions and must be
//! re-entrant. When one fails, callers switch to [`RuleBasedScorer`].

use async_trait::async_trait;
use cpet_core::constants::rule_based;
use cpet_core::errors::{AppError, ErrorCode};
use cpet_core::models::Sample;
use std::collections::BTreeMap;
use thiserror::Error;

/// Exam-level features (age, weight, ...) passed alongside the history
pub type StaticFeatures = BTreeMap<String, f64>;

/// Output of one scoring call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreOutput {
    /// Probability per buffered sample, oldest first
    pub probabilities: Vec<f64>,
    /// Fractional index into the history where the crossing is estimated
    pub crossing_time_index: Option<f64>,
    /// Estimated peak oxygen uptake in ml/kg/min
    pub peak_value: Option<f64>,
}

impl ScoreOutput {
    /// Output carrying only per-sample probabilities
    #[must_use]
    pub const fn from_probabilities(probabilities: Vec<f64>) -> Self {
        Self {
            probabilities,
            crossing_time_index: None,
            peak_value: None,
        }
    }

    /// Probability for the most recent sample
    #[must_use]
    pub fn latest_probability(&self) -> Option<f64> {
        self.probabilities.last().copied()
    }

    /// Crossing index decoded into a timestamp over `history`
    #[must_use]
    pub fn crossing_time(&self, history: &[Sample]) -> Option<f64> {
        let index = self.crossing_time_index?;
        let timestamps: Vec<f64> = history.iter().map(Sample::timestamp).collect();
        decode_crossing_time(index, &timestamps)
    }
}

/// Scoring function failures; every variant is recovered by the fallback scorer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    /// No model is loaded
    #[error("scoring model unavailable: {0}")]
    Unavailable(String),
    /// Not enough buffered samples for the model
    #[error("insufficient history: have {have}, need {need}")]
    InsufficientHistory {
        /// Buffered samples
        have: usize,
        /// Samples required
        need: usize,
    },
    /// The model raised an error
    #[error("scoring failed: {0}")]
    Failed(String),
    /// The call exceeded its latency budget
    #[error("scoring timed out after {millis} ms")]
    TimedOut {
        /// Budget that was exceeded
        millis: u64,
    },
    /// The model returned no probabilities
    #[error("scoring returned no probabilities")]
    EmptyOutput,
}

impl From<ScoringError> for AppError {
    fn from(error: ScoringError) -> Self {
        let code = match error {
            ScoringError::TimedOut { .. } | ScoringError::Unavailable(_) => {
                ErrorCode::ExternalServiceUnavailable
            }
            _ => ErrorCode::ExternalServiceError,
        };
        Self::new(code, error.to_string())
    }
}

/// Contract for anything that can score a sample history
#[async_trait]
pub trait ScoringFunction: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Score `history`, oldest sample first
    ///
    /// # Errors
    ///
    /// Returns a [`ScoringError`] when the model is unavailable or fails.
    async fn score(
        &self,
        history: &[Sample],
        static_features: Option<&StaticFeatures>,
    ) -> Result<ScoreOutput, ScoringError>;
}

/// Deterministic scorer from respiratory exchange ratio bands and the VE/VO2 slope
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedScorer;

impl RuleBasedScorer {
    /// Probability for every sample in `history`
    #[must_use]
    pub fn score_sequence(history: &[Sample]) -> Vec<f64> {
        history
            .iter()
            .enumerate()
            .map(|(i, sample)| {
                let base = rer_band_probability(sample.rer());
                if i >= rule_based::SLOPE_LOOKBACK
                    && ve_vo2_slope(&history[i - rule_based::SLOPE_LOOKBACK..=i])
                        .is_some_and(|slope| slope > rule_based::SLOPE_TRIGGER)
                {
                    (base + rule_based::SLOPE_BOOST).min(1.0)
                } else {
                    base
                }
            })
            .collect()
    }

    /// Probability for the most recent sample, 0 for an empty history
    #[must_use]
    pub fn latest_probability(history: &[Sample]) -> f64 {
        Self::score_sequence(history).last().copied().unwrap_or(0.0)
    }
}

#[async_trait]
impl ScoringFunction for RuleBasedScorer {
    fn name(&self) -> &str {
        "rule_based"
    }

    async fn score(
        &self,
        history: &[Sample],
        _static_features: Option<&StaticFeatures>,
    ) -> Result<ScoreOutput, ScoringError> {
        Ok(ScoreOutput::from_probabilities(Self::score_sequence(
            history,
        )))
    }
}

fn rer_band_probability(rer: f64) -> f64 {
    rule_based::RER_BANDS
        .iter()
        .find(|(min_rer, _)| rer >= *min_rer)
        .map_or(rule_based::BASELINE_PROBABILITY, |(_, probability)| {
            *probability
        })
}

fn ve_vo2_slope(window: &[Sample]) -> Option<f64> {
    let first = window.first()?;
    let last = window.last()?;
    let vo2_varies = window
        .iter()
        .any(|sample| (sample.vo2() - first.vo2()).abs() > f64::EPSILON);
    if !vo2_varies {
        return None;
    }
    Some((last.ve() - first.ve()) / (last.vo2() - first.vo2() + rule_based::SLOPE_EPSILON))
}

/// Interpolate a fractional sample index into a timestamp
///
/// The index is clamped to the buffered range first.
#[must_use]
pub fn decode_crossing_time(index: f64, timestamps: &[f64]) -> Option<f64> {
    if timestamps.is_empty() || !index.is_finite() {
        return None;
    }
    let max_index = timestamps.len() - 1;
    let clamped = index.clamp(0.0, max_index as f64);
    let lower = clamped.floor() as usize;
    let upper = (lower + 1).min(max_index);
    if lower == upper {
        return Some(timestamps[lower]);
    }
    let fraction = clamped - lower as f64;
    Some(fraction.mul_add(timestamps[upper] - timestamps[lower], timestamps[lower]))
}
