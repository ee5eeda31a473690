// ABOUTME: Online anaerobic threshold detector, one instance per monitored session
// ABOUTME: Debounced sticky trigger, time-to-threshold extrapolation, zone state machine, confidence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Online Threshold Detector
//!
//! Consumes one `(sample, probability)` pair at a time. The trigger is
//! debounced by a persistence count and, once set, never clears until
//! [`DetectionSession::reset`].

use cpet_core::constants::{alerts, detector};
use cpet_core::errors::{AppError, AppResult};
use cpet_core::models::{DetectionResult, IntensityZone, Sample};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Tunables for one detector instance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Probability at or above which a sample counts toward the trigger
    pub threshold: f64,
    /// Consecutive above-threshold samples required to trigger
    pub persistence: u32,
    /// Window size in samples; history retains twice this many
    pub window_size: usize,
    /// Seconds labelled `threshold` after the first post-trigger exercise sample
    pub transition_window_secs: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: detector::DEFAULT_THRESHOLD,
            persistence: detector::DEFAULT_PERSISTENCE,
            window_size: detector::DEFAULT_WINDOW_SIZE,
            transition_window_secs: detector::DEFAULT_TRANSITION_WINDOW_SECS,
        }
    }
}

impl DetectorConfig {
    /// Check the tunables are usable
    ///
    /// # Errors
    ///
    /// Returns a validation error when the threshold is outside (0, 1],
    /// persistence or window is zero, or the transition window is negative.
    pub fn validate(&self) -> AppResult<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(AppError::invalid_input(format!(
                "threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if self.persistence == 0 {
            return Err(AppError::invalid_input("persistence must be at least 1"));
        }
        if self.window_size == 0 {
            return Err(AppError::invalid_input("window size must be at least 1"));
        }
        if !self.transition_window_secs.is_finite() || self.transition_window_secs < 0.0 {
            return Err(AppError::invalid_input(
                "transition window must be a non-negative number of seconds",
            ));
        }
        Ok(())
    }

    const fn history_capacity(&self) -> usize {
        self.window_size.saturating_mul(2)
    }
}

/// A `(timestamp, probability)` pair recorded by [`DetectionSession::update`]
#[derive(Debug, Clone, Copy, PartialEq)]
struct ProbabilityPoint {
    timestamp: f64,
    probability: f64,
}

/// Per-session detector state
#[derive(Debug, Clone)]
pub struct DetectionSession {
    config: DetectorConfig,
    samples: VecDeque<Sample>,
    probabilities: VecDeque<ProbabilityPoint>,
    samples_seen: usize,
    triggered: bool,
    trigger_time: Option<f64>,
    consecutive_above: u32,
    exercise_started: bool,
    transition_anchor: Option<f64>,
}

impl DetectionSession {
    /// Create an empty detector
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        let capacity = config.history_capacity();
        Self {
            config,
            samples: VecDeque::with_capacity(capacity),
            probabilities: VecDeque::with_capacity(capacity),
            samples_seen: 0,
            triggered: false,
            trigger_time: None,
            consecutive_above: 0,
            exercise_started: false,
            transition_anchor: None,
        }
    }

    /// Active tunables
    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Append a sample, evicting the oldest beyond twice the window
    pub fn ingest(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.config.history_capacity() {
            self.samples.pop_front();
        }
        self.samples_seen += 1;
    }

    /// Whether `sample` falls in the pre-exercise warmup phase
    #[must_use]
    pub fn is_warmup(&self, sample: &Sample) -> bool {
        sample.work_rate() <= 0.0 && !self.exercise_started
    }

    /// Fold one probability into the detector state
    ///
    /// The timestamp is taken from the most recently ingested sample.
    /// `direct_crossing_time` is a scoring-function estimate used before the
    /// trigger; without it the crossing time is extrapolated.
    pub fn update(
        &mut self,
        probability: f64,
        direct_crossing_time: Option<f64>,
        work_rate: Option<f64>,
    ) -> DetectionResult {
        let probability = if probability.is_finite() {
            probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let timestamp = self.samples.back().map_or(0.0, Sample::timestamp);

        self.probabilities.push_back(ProbabilityPoint {
            timestamp,
            probability,
        });
        while self.probabilities.len() > self.config.history_capacity() {
            self.probabilities.pop_front();
        }

        let mut alert_list = Vec::new();
        if !self.triggered {
            if probability >= self.config.threshold {
                self.consecutive_above += 1;
            } else {
                self.consecutive_above = 0;
            }

            if self.consecutive_above >= self.config.persistence {
                self.triggered = true;
                self.trigger_time = Some(timestamp);
                debug!(trigger_time = timestamp, probability, "Anaerobic threshold triggered");
                alert_list.push(alerts::THRESHOLD_REACHED.to_owned());
            } else if probability >= detector::NEAR_THRESHOLD_ALERT {
                alert_list.push(alerts::NEAR_THRESHOLD.to_owned());
            } else if probability >= detector::AEROBIC_ZONE_ALERT {
                alert_list.push(alerts::AEROBIC_ZONE.to_owned());
            }
        }

        let predicted_at_time = if self.triggered {
            self.trigger_time
        } else {
            direct_crossing_time
                .filter(|t| t.is_finite())
                .or_else(|| self.extrapolate_crossing_time())
        };

        DetectionResult {
            timestamp,
            at_probability: probability,
            at_triggered: self.triggered,
            predicted_at_time,
            confidence: self.confidence(),
            intensity_zone: self.classify_zone(work_rate, timestamp),
            alerts: alert_list,
        }
    }

    /// Clear history and every trigger and zone flag
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    /// Linear projection of when the probability reaches the threshold
    ///
    /// Uses the endpoints of the most recent points. A flat or falling trend
    /// yields no estimate.
    fn extrapolate_crossing_time(&self) -> Option<f64> {
        let count = self.probabilities.len();
        if count < detector::EXTRAPOLATION_POINTS {
            return None;
        }
        let first = self.probabilities[count - detector::EXTRAPOLATION_POINTS];
        let last = self.probabilities[count - 1];

        let time_diff = last.timestamp - first.timestamp;
        let prob_diff = last.probability - first.probability;
        if time_diff <= 0.0 || prob_diff <= 0.0 {
            return None;
        }

        let remaining = self.config.threshold - last.probability;
        if remaining <= 0.0 {
            return Some(last.timestamp);
        }
        let slope = prob_diff / time_diff;
        Some(last.timestamp + remaining / slope)
    }

    fn classify_zone(&mut self, work_rate: Option<f64>, now: f64) -> IntensityZone {
        let Some(work_rate) = work_rate else {
            return IntensityZone::Warmup;
        };
        if work_rate <= 0.0 {
            return if self.exercise_started {
                IntensityZone::Recovery
            } else {
                IntensityZone::Warmup
            };
        }
        self.exercise_started = true;

        if !self.triggered {
            return IntensityZone::Aerobic;
        }
        let anchor = *self.transition_anchor.get_or_insert(now);
        if now - anchor <= self.config.transition_window_secs {
            IntensityZone::Threshold
        } else {
            IntensityZone::Anaerobic
        }
    }

    fn confidence(&self) -> f64 {
        let count = self.probabilities.len();
        if count < detector::CONFIDENCE_POINTS {
            return detector::MIN_CONFIDENCE;
        }
        let recent = self
            .probabilities
            .range(count - detector::CONFIDENCE_POINTS..)
            .map(|point| point.probability);
        let n = detector::CONFIDENCE_POINTS as f64;
        let mean = recent.clone().sum::<f64>() / n;
        let variance = recent.map(|p| (p - mean).powi(2)).sum::<f64>() / n;
        2.0f64
            .mul_add(-variance.sqrt(), 1.0)
            .clamp(detector::MIN_CONFIDENCE, 1.0)
    }

    /// Buffered samples, oldest first
    pub fn history(&self) -> impl ExactSizeIterator<Item = &Sample> + '_ {
        self.samples.iter()
    }

    /// Copy of the buffered samples for an out-of-lock scoring call
    #[must_use]
    pub fn history_snapshot(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }

    /// Most recently ingested sample
    #[must_use]
    pub fn latest_sample(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Samples ingested since creation or the last reset
    #[must_use]
    pub const fn samples_seen(&self) -> usize {
        self.samples_seen
    }

    /// Sticky trigger flag
    #[must_use]
    pub const fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Timestamp of the triggering sample
    #[must_use]
    pub const fn trigger_time(&self) -> Option<f64> {
        self.trigger_time
    }

    /// Current run of above-threshold probabilities
    #[must_use]
    pub const fn consecutive_above(&self) -> u32 {
        self.consecutive_above
    }

    /// Whether any positive work rate has been seen
    #[must_use]
    pub const fn exercise_started(&self) -> bool {
        self.exercise_started
    }
}

impl Default for DetectionSession {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}
