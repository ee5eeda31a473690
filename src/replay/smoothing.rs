// ABOUTME: Row windowing and smoothing applied to recorded exams before replay
// ABOUTME: Breath-count rolling means and fixed-second binning over the Time column
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use cpet_core::constants::replay::TIME_COLUMN;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One recorded exam row: column name to numeric value, absent when missing
pub type ExamRow = BTreeMap<String, f64>;

/// Smoothing applied to exam rows
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Smoothing {
    /// Rows are used as recorded
    #[default]
    None,
    /// Trailing rolling mean over this many breaths (rows)
    Breath(usize),
    /// Mean over fixed bins of this many seconds
    Seconds(u32),
}

impl Smoothing {
    /// Parse `none`, `raw`, `breath:N`, `breath_N`, `breathN`, `sec:N` and variants
    ///
    /// Unknown strings and zero-sized windows mean no smoothing.
    #[must_use]
    pub fn parse(mode: &str) -> Self {
        let key = mode.trim().to_lowercase();
        let (mode, rest) = if let Some(rest) = key.strip_prefix("breath") {
            ("breath", rest)
        } else if let Some(rest) = key.strip_prefix("sec") {
            ("sec", rest)
        } else {
            return Self::None;
        };
        let rest = rest
            .strip_prefix(':')
            .or_else(|| rest.strip_prefix('_'))
            .unwrap_or(rest);
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        match (mode, digits.parse::<u32>()) {
            (_, Ok(0) | Err(_)) => Self::None,
            ("breath", Ok(n)) => Self::Breath(n as usize),
            (_, Ok(n)) => Self::Seconds(n),
        }
    }

    /// Apply the smoothing to rows already in time order
    #[must_use]
    pub fn apply(self, rows: Vec<ExamRow>) -> Vec<ExamRow> {
        match self {
            Self::None => rows,
            Self::Breath(window) => rolling_mean(&rows, window),
            Self::Seconds(seconds) => bin_by_seconds(rows, f64::from(seconds)),
        }
    }
}

impl fmt::Display for Smoothing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Breath(n) => write!(f, "breath:{n}"),
            Self::Seconds(n) => write!(f, "sec:{n}"),
        }
    }
}

/// Inclusive bounds on the `Time` column
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Earliest time kept
    pub start: Option<f64>,
    /// Latest time kept
    pub end: Option<f64>,
}

impl TimeWindow {
    /// Whether either bound is set
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    fn contains(&self, row: &ExamRow) -> bool {
        if !self.is_bounded() {
            return true;
        }
        let Some(time) = row_time(row) else {
            return false;
        };
        self.start.map_or(true, |start| time >= start) && self.end.map_or(true, |end| time <= end)
    }
}

fn row_time(row: &ExamRow) -> Option<f64> {
    row.get(TIME_COLUMN).copied().filter(|t| t.is_finite())
}

/// Sort by `Time` (rows without one last), drop rows outside `window`, then smooth
#[must_use]
pub fn prepare_rows(mut rows: Vec<ExamRow>, smoothing: Smoothing, window: TimeWindow) -> Vec<ExamRow> {
    rows.sort_by(|a, b| {
        let a = row_time(a).unwrap_or(f64::INFINITY);
        let b = row_time(b).unwrap_or(f64::INFINITY);
        a.total_cmp(&b)
    });
    rows.retain(|row| window.contains(row));
    smoothing.apply(rows)
}

fn rolling_mean(rows: &[ExamRow], window: usize) -> Vec<ExamRow> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let trailing = &rows[(i + 1).saturating_sub(window)..=i];
            let mut smoothed = mean_columns(trailing);
            if let Some(time) = row.get(TIME_COLUMN) {
                smoothed.insert(TIME_COLUMN.to_owned(), *time);
            } else {
                smoothed.remove(TIME_COLUMN);
            }
            smoothed
        })
        .collect()
}

fn bin_by_seconds(rows: Vec<ExamRow>, seconds: f64) -> Vec<ExamRow> {
    if !rows.iter().any(|row| row_time(row).is_some()) {
        return rows;
    }
    let mut bins: BTreeMap<i64, Vec<ExamRow>> = BTreeMap::new();
    for row in rows {
        if let Some(time) = row_time(&row) {
            let bin = (time / seconds).floor() as i64;
            bins.entry(bin).or_default().push(row);
        }
    }
    bins.into_iter()
        .map(|(bin, members)| {
            let mut smoothed = mean_columns(&members);
            smoothed.insert(TIME_COLUMN.to_owned(), bin as f64 * seconds);
            smoothed
        })
        .collect()
}

/// Per-column mean over the rows that carry that column
fn mean_columns(rows: &[ExamRow]) -> ExamRow {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for row in rows {
        for (column, value) in row {
            if value.is_finite() {
                let entry = sums.entry(column.as_str()).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }
    }
    sums.into_iter()
        .map(|(column, (sum, count))| (column.to_owned(), sum / count as f64))
        .collect()
}
