// ABOUTME: Replay plan construction from recorded exam rows
// ABOUTME: Maps columns to samples and computes speed-scaled inter-sample delays without any timing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::smoothing::ExamRow;
use cpet_core::constants::replay::{SPEED_EPSILON, TIME_COLUMN};
use cpet_core::models::{Sample, SampleError};
use std::time::Duration;
use tracing::warn;

/// Extension columns carried through to samples, with their lower-case names
const EXTENSION_COLUMNS: [(&str, &str); 6] = [
    ("VT", "vt"),
    ("PetO2", "peto2"),
    ("PetCO2", "petco2"),
    ("VE_VO2", "ve_vo2"),
    ("VE_VCO2", "ve_vco2"),
    ("VO2_HR", "vo2_hr"),
];

/// One sample and the wait before emitting it
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayItem {
    /// Sample to emit
    pub sample: Sample,
    /// Seconds to wait after the previous emission, already divided by the speed
    pub delay_secs: f64,
}

impl ReplayItem {
    /// Delay as a [`Duration`]
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_secs).unwrap_or(Duration::ZERO)
    }
}

/// Ordered samples with pacing, built once per replayed session
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayPlan {
    items: Vec<ReplayItem>,
    speed: f64,
    default_step_secs: f64,
}

impl ReplayPlan {
    /// Build the plan for rows already in time order
    ///
    /// Timestamps come from the `Time` column, or `index * default_step_secs`
    /// when a row has none. The first item waits zero; each later one waits
    /// `max(0, Δt) / max(speed, ε)`. Rows that cannot form a valid sample are
    /// skipped.
    #[must_use]
    pub fn build(rows: &[ExamRow], speed: f64, default_step_secs: f64) -> Self {
        let divisor = speed.max(SPEED_EPSILON);
        let mut items = Vec::with_capacity(rows.len());
        let mut previous: Option<f64> = None;

        for (index, row) in rows.iter().enumerate() {
            let timestamp = finite(row, TIME_COLUMN).unwrap_or(index as f64 * default_step_secs);
            let sample = match sample_from_row(row, timestamp) {
                Ok(sample) => sample,
                Err(error) => {
                    warn!(index, %error, "Skipping exam row that does not form a valid sample");
                    continue;
                }
            };
            let delay_secs = previous.map_or(0.0, |prev| (timestamp - prev).max(0.0) / divisor);
            previous = Some(timestamp);
            items.push(ReplayItem { sample, delay_secs });
        }

        Self {
            items,
            speed,
            default_step_secs,
        }
    }

    /// Planned items in emission order
    #[must_use]
    pub fn items(&self) -> &[ReplayItem] {
        &self.items
    }

    /// Consume the plan into its items
    #[must_use]
    pub fn into_items(self) -> Vec<ReplayItem> {
        self.items
    }

    /// Number of planned samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing will be emitted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Speed multiplier the delays were computed with
    #[must_use]
    pub const fn speed(&self) -> f64 {
        self.speed
    }

    /// Step used for rows without a `Time` value
    #[must_use]
    pub const fn default_step_secs(&self) -> f64 {
        self.default_step_secs
    }
}

fn finite(row: &ExamRow, column: &str) -> Option<f64> {
    row.get(column).copied().filter(|value| value.is_finite())
}

/// Physiological readings that cannot be negative are dropped rather than rejected
fn reading(row: &ExamRow, column: &str) -> Option<f64> {
    finite(row, column).filter(|value| *value >= 0.0)
}

fn sample_from_row(row: &ExamRow, timestamp: f64) -> Result<Sample, SampleError> {
    let spo2 = reading(row, "SpO2").filter(|value| *value <= 100.0);
    let builder = Sample::builder(timestamp)
        .vo2(reading(row, "VO2"))
        .vco2(reading(row, "VCO2"))
        .ve(reading(row, "VE"))
        .hr(reading(row, "HR"))
        .rr(reading(row, "Bf"))
        .rer(reading(row, "RER"))
        .work_rate(finite(row, "Power_Load"))
        .spo2(spo2)
        .sbp(reading(row, "BP_Syst"))
        .dbp(reading(row, "BP_Diast"));

    EXTENSION_COLUMNS
        .iter()
        .fold(builder, |builder, (column, name)| {
            builder.extension(*name, finite(row, column))
        })
        .build()
}
