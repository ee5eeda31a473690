// ABOUTME: Reader annotation storage and the consensus resolver service
// ABOUTME: Appends annotations, folds the newest per role, and upserts one record per exam
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Consensus Resolver
//!
//! Readers `a` and `b` annotate an exam independently; an adjudicator may
//! override them. Annotation history is append-only, and the per-exam
//! [`ConsensusRecord`] is recomputed from the newest annotation per role and
//! upserted under the exam id. Writes to one exam are serialized by a
//! per-exam lock so the stored record always matches the stored history.

/// In-memory annotation store
pub mod memory;
/// `SQLite` annotation store
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryAnnotationStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAnnotationStore;

use async_trait::async_trait;
use cpet_core::errors::{AppError, AppResult};
use cpet_core::models::{Annotation, ConsensusRecord, ReaderRole};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Persistence for annotations and consensus records
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Append one annotation to the exam's history
    async fn append(&self, annotation: &Annotation) -> AppResult<()>;

    /// Every annotation of the exam, in insertion order
    async fn annotations(&self, exam_id: &str) -> AppResult<Vec<Annotation>>;

    /// Insert or replace the exam's record
    async fn upsert_consensus(&self, record: &ConsensusRecord) -> AppResult<()>;

    /// The exam's stored record, if any
    async fn consensus(&self, exam_id: &str) -> AppResult<Option<ConsensusRecord>>;
}

/// Annotation as submitted by a reader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnnotation {
    /// Free-form reader identifier
    #[serde(default = "anonymous_reader")]
    pub reader_id: String,
    /// `a`, `b` or `adjudicator`, case-insensitive
    pub role: String,
    /// Claimed crossing time in seconds from exam start
    pub crossing_time: f64,
    /// Smoothing the reader viewed the exam with
    #[serde(default)]
    pub smoothing: Option<String>,
    /// Reader notes
    #[serde(default)]
    pub notes: Option<String>,
}

fn anonymous_reader() -> String {
    "anonymous".to_owned()
}

/// Records annotations and keeps each exam's consensus record current
#[derive(Clone)]
pub struct ConsensusResolver {
    store: Arc<dyn AnnotationStore>,
    default_delta: f64,
    exam_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ConsensusResolver {
    /// Resolver over `store` using `default_delta` seconds of tolerance
    #[must_use]
    pub fn new(store: Arc<dyn AnnotationStore>, default_delta: f64) -> Self {
        Self {
            store,
            default_delta,
            exam_locks: Arc::new(DashMap::new()),
        }
    }

    /// Tolerance used when none is given
    #[must_use]
    pub const fn default_delta(&self) -> f64 {
        self.default_delta
    }

    /// Append an annotation and return the recomputed record
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown role or an invalid crossing
    /// time (nothing is stored), or a database error from the store.
    pub async fn record_annotation(
        &self,
        exam_id: &str,
        annotation: NewAnnotation,
    ) -> AppResult<ConsensusRecord> {
        let role: ReaderRole = annotation.role.parse()?;
        let mut record =
            Annotation::new(exam_id, annotation.reader_id, role, annotation.crossing_time)?;
        record.smoothing = annotation.smoothing;
        record.notes = annotation.notes;

        let lock = self.exam_lock(exam_id);
        let _guard = lock.lock().await;
        self.store.append(&record).await?;
        info!(
            exam_id,
            role = %role,
            reader_id = %record.reader_id,
            crossing_time = record.crossing_time,
            "Annotation recorded"
        );
        self.fold_and_store(exam_id, self.default_delta).await
    }

    /// Fold the exam's annotations and upsert the result
    ///
    /// Re-running with unchanged annotations and tolerance stores an
    /// identical record.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a negative or non-finite tolerance, or
    /// a database error from the store.
    pub async fn recompute(&self, exam_id: &str, delta: Option<f64>) -> AppResult<ConsensusRecord> {
        let delta = delta.unwrap_or(self.default_delta);
        if !delta.is_finite() || delta < 0.0 {
            return Err(AppError::invalid_input(format!(
                "delta must be a non-negative number of seconds, got {delta}"
            )));
        }
        let lock = self.exam_lock(exam_id);
        let _guard = lock.lock().await;
        self.fold_and_store(exam_id, delta).await
    }

    /// Caller must hold the exam's lock
    async fn fold_and_store(&self, exam_id: &str, delta: f64) -> AppResult<ConsensusRecord> {
        let annotations = self.store.annotations(exam_id).await?;
        let record = cpet_detection::consensus::resolve(exam_id, &annotations, delta);
        self.store.upsert_consensus(&record).await?;
        info!(
            exam_id,
            status = %record.status,
            ground_truth = ?record.ground_truth,
            annotations = annotations.len(),
            "Consensus recomputed"
        );
        Ok(record)
    }

    /// The stored record, recomputed with the default tolerance when absent
    ///
    /// # Errors
    ///
    /// Returns a database error from the store.
    pub async fn consensus(&self, exam_id: &str) -> AppResult<ConsensusRecord> {
        let lock = self.exam_lock(exam_id);
        let _guard = lock.lock().await;
        match self.store.consensus(exam_id).await? {
            Some(record) => Ok(record),
            None => self.fold_and_store(exam_id, self.default_delta).await,
        }
    }

    /// The exam's annotation history
    ///
    /// # Errors
    ///
    /// Returns a database error from the store.
    pub async fn annotations(&self, exam_id: &str) -> AppResult<Vec<Annotation>> {
        self.store.annotations(exam_id).await
    }

    fn exam_lock(&self, exam_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.exam_locks.entry(exam_id.to_owned()).or_default().value())
    }
}
