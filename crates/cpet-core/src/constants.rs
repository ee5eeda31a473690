// ABOUTME: Application constants organized by domain for the realtime detection core
// ABOUTME: Detector defaults, rule-based scoring bands, replay defaults, and wire limits
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Application-wide constants grouped by the component that owns them.

/// Online threshold detector defaults
pub mod detector {
    /// Probability at or above which a sample counts toward a trigger
    pub const DEFAULT_THRESHOLD: f64 = 0.7;
    /// Consecutive above-threshold samples required to trigger
    pub const DEFAULT_PERSISTENCE: u32 = 3;
    /// Sliding window size in samples; history keeps twice this many
    pub const DEFAULT_WINDOW_SIZE: usize = 60;
    /// Seconds after the first post-trigger exercise sample still labelled `threshold`
    pub const DEFAULT_TRANSITION_WINDOW_SECS: f64 = 30.0;
    /// Points used for linear time-to-threshold extrapolation
    pub const EXTRAPOLATION_POINTS: usize = 10;
    /// Points used for the dispersion-based confidence score
    pub const CONFIDENCE_POINTS: usize = 5;
    /// Confidence floor, also returned while history is too short
    pub const MIN_CONFIDENCE: f64 = 0.5;
    /// Probability at which the "near threshold" advisory fires
    pub const NEAR_THRESHOLD_ALERT: f64 = 0.5;
    /// Probability at which the "aerobic zone" advisory fires
    pub const AEROBIC_ZONE_ALERT: f64 = 0.3;
}

/// Advisory alert texts pushed with detection results
pub mod alerts {
    /// Emitted once, on the update that sets the trigger
    pub const THRESHOLD_REACHED: &str = "Anaerobic threshold reached; the test may be stopped";
    /// Probability is approaching the trigger threshold
    pub const NEAR_THRESHOLD: &str = "Approaching anaerobic threshold; watch closely";
    /// Probability indicates aerobic work
    pub const AEROBIC_ZONE: &str = "Entering aerobic zone";
}

/// Rule-based fallback scoring bands
pub mod rule_based {
    /// `(minimum RER, probability)` pairs, checked in order
    pub const RER_BANDS: [(f64, f64); 4] = [(1.10, 0.9), (1.00, 0.7), (0.95, 0.5), (0.85, 0.3)];
    /// Probability when RER is below every band
    pub const BASELINE_PROBABILITY: f64 = 0.1;
    /// Look-back (in samples) for the VE/VO2 slope
    pub const SLOPE_LOOKBACK: usize = 10;
    /// VE/VO2 slope above which the probability is boosted
    pub const SLOPE_TRIGGER: f64 = 30.0;
    /// Boost applied when the slope trigger fires
    pub const SLOPE_BOOST: f64 = 0.2;
    /// Denominator guard for the slope
    pub const SLOPE_EPSILON: f64 = 1e-6;
}

/// Replay simulator defaults
pub mod replay {
    /// Default inter-sample step when the exam has no time column
    pub const DEFAULT_STEP_SECS: f64 = 15.0;
    /// Default playback speed multiplier
    pub const DEFAULT_SPEED: f64 = 1.0;
    /// Floor applied to the speed divisor
    pub const SPEED_EPSILON: f64 = 1e-3;
    /// Column holding the explicit sample time
    pub const TIME_COLUMN: &str = "Time";
}

/// Session manager defaults
pub mod realtime {
    /// Minimum buffered samples before the injected scoring function is consulted
    pub const DEFAULT_MIN_POINTS_FOR_MODEL: usize = 8;
    /// Upper bound on a scoring call before falling back
    pub const DEFAULT_SCORING_TIMEOUT_MS: u64 = 250;
    /// Registrations waiting for their connection at any one time
    pub const MAX_PENDING_SESSIONS: usize = 1024;
    /// Seconds a registration stays claimable
    pub const PENDING_SESSION_TTL_SECS: u64 = 600;
}

/// Consensus defaults
pub mod consensus {
    /// Agreement tolerance between the two primary readers, in seconds
    pub const DEFAULT_DELTA_SECS: f64 = 15.0;
}

/// Wire format limits
pub mod limits {
    /// Maximum number of extension fields accepted on one sample
    pub const MAX_EXTENSION_FIELDS: usize = 32;
    /// Maximum accepted SpO2 percentage
    pub const MAX_SPO2_PERCENT: f64 = 100.0;
}

/// Service identity used in logs
pub mod service_names {
    /// Name of the realtime server binary
    pub const CPET_REALTIME_SERVER: &str = "cpet-realtime-server";
}
