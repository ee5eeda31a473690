// ABOUTME: Core types and constants for the CPET realtime threshold platform
// ABOUTME: Foundation crate with error handling, constants, and the shared data model
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # CPET Core
//!
//! Foundation crate shared by the detection engine and the realtime server.
//! It changes infrequently, which keeps incremental builds of the workspace fast.
//!
//! ## Modules
//!
//! - **errors**: Unified error handling with `AppError` and `ErrorCode`
//! - **constants**: Detector, scoring, replay and consensus defaults
//! - **models**: Samples, detection results, annotations and consensus records

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Application constants organized by domain
pub mod constants;

/// Core data models (Sample, `DetectionResult`, Annotation, `ConsensusRecord`)
pub mod models;
