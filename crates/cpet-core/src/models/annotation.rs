// ABOUTME: Reader annotation and per-exam consensus record models
// ABOUTME: Role parsing is trimmed and case-insensitive; records serialize deterministically
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::errors::{AppError, ErrorCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Role of the reader who produced an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderRole {
    /// First primary reader
    A,
    /// Second primary reader
    B,
    /// Authoritative third reader
    Adjudicator,
}

impl ReaderRole {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
            Self::Adjudicator => "adjudicator",
        }
    }
}

impl fmt::Display for ReaderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown reader role string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown reader role '{0}', expected one of a, b, adjudicator")]
pub struct RoleParseError(pub String);

impl From<RoleParseError> for AppError {
    fn from(error: RoleParseError) -> Self {
        Self::new(ErrorCode::InvalidInput, error.to_string())
    }
}

impl FromStr for ReaderRole {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a" => Ok(Self::A),
            "b" => Ok(Self::B),
            "adjudicator" => Ok(Self::Adjudicator),
            _ => Err(RoleParseError(s.to_owned())),
        }
    }
}

/// One reader's claimed threshold crossing time for an exam
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Exam the annotation refers to
    pub exam_id: String,
    /// Free-form identifier of the reader
    pub reader_id: String,
    /// Role the reader annotated under
    pub role: ReaderRole,
    /// Claimed crossing time in seconds from exam start
    pub crossing_time: f64,
    /// Smoothing the reader viewed the exam with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoothing: Option<String>,
    /// Reader notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Creation time; the newest annotation per role is authoritative
    pub created_at: DateTime<Utc>,
}

impl Annotation {
    /// Create an annotation stamped with the current time
    ///
    /// # Errors
    ///
    /// Returns a validation error when the crossing time is not a finite,
    /// non-negative number of seconds.
    pub fn new(
        exam_id: impl Into<String>,
        reader_id: impl Into<String>,
        role: ReaderRole,
        crossing_time: f64,
    ) -> Result<Self, AppError> {
        if !crossing_time.is_finite() || crossing_time < 0.0 {
            return Err(AppError::new(
                ErrorCode::ValueOutOfRange,
                format!("crossing time must be a finite, non-negative number of seconds, got {crossing_time}"),
            ));
        }
        Ok(Self {
            exam_id: exam_id.into(),
            reader_id: reader_id.into(),
            role,
            crossing_time,
            smoothing: None,
            notes: None,
            created_at: Utc::now(),
        })
    }

    /// Attach the smoothing the reader used
    #[must_use]
    pub fn with_smoothing(mut self, smoothing: impl Into<String>) -> Self {
        self.smoothing = Some(smoothing.into());
        self
    }

    /// Attach reader notes
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Override the creation time
    #[must_use]
    pub const fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Agreement status of an exam's annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusStatus {
    /// No primary annotation yet
    Pending,
    /// Exactly one primary annotation
    Partial,
    /// Both primaries agree within tolerance
    Concordant,
    /// Both primaries disagree beyond tolerance
    Discordant,
    /// Adjudicator has ruled
    Finalized,
}

impl ConsensusStatus {
    /// Wire name of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Concordant => "concordant",
            Self::Discordant => "discordant",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for ConsensusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsensusStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "partial" => Ok(Self::Partial),
            "concordant" => Ok(Self::Concordant),
            "discordant" => Ok(Self::Discordant),
            "finalized" => Ok(Self::Finalized),
            other => Err(AppError::database(format!(
                "unknown consensus status '{other}'"
            ))),
        }
    }
}

/// Per-exam aggregate of the latest annotation per role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusRecord {
    /// Exam identifier, the record's key
    pub exam_id: String,
    /// Agreement tolerance in seconds
    pub delta: f64,
    /// Agreement status
    pub status: ConsensusStatus,
    /// Latest time from reader A
    pub t_a: Option<f64>,
    /// Latest time from reader B
    pub t_b: Option<f64>,
    /// Latest adjudicator time
    pub t_adjudicator: Option<f64>,
    /// Resolved crossing time
    pub ground_truth: Option<f64>,
    /// Creation time of the newest contributing annotation
    pub updated_at: Option<DateTime<Utc>>,
}
