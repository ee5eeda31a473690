// ABOUTME: Data model shared by the detection engine, the replay simulator and the server
// ABOUTME: Re-exports samples, detection results, annotations and consensus records
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Data Models
//!
//! - [`Sample`]: one validated, immutable vector of cardiopulmonary readings
//! - [`DetectionResult`]: the detector's output for one sample
//! - [`Annotation`] and [`ConsensusRecord`]: reader annotations and their fold

mod annotation;
mod detection;
mod sample;

pub use annotation::{Annotation, ConsensusRecord, ConsensusStatus, ReaderRole, RoleParseError};
pub use detection::{DetectionResult, IntensityZone, SessionMode};
pub use sample::{Sample, SampleBuilder, SampleError};
