// ABOUTME: Annotation store backed by concurrent maps for tests and single-process deployments
// ABOUTME: Per-exam append-only history plus an atomic per-key consensus upsert
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::AnnotationStore;
use async_trait::async_trait;
use cpet_core::errors::AppResult;
use cpet_core::models::{Annotation, ConsensusRecord};
use dashmap::DashMap;

/// Annotation store held in memory
#[derive(Debug, Default)]
pub struct InMemoryAnnotationStore {
    annotations: DashMap<String, Vec<Annotation>>,
    records: DashMap<String, ConsensusRecord>,
}

impl InMemoryAnnotationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnnotationStore for InMemoryAnnotationStore {
    async fn append(&self, annotation: &Annotation) -> AppResult<()> {
        self.annotations
            .entry(annotation.exam_id.clone())
            .or_default()
            .push(annotation.clone());
        Ok(())
    }

    async fn annotations(&self, exam_id: &str) -> AppResult<Vec<Annotation>> {
        Ok(self
            .annotations
            .get(exam_id)
            .map(|history| history.value().clone())
            .unwrap_or_default())
    }

    async fn upsert_consensus(&self, record: &ConsensusRecord) -> AppResult<()> {
        self.records.insert(record.exam_id.clone(), record.clone());
        Ok(())
    }

    async fn consensus(&self, exam_id: &str) -> AppResult<Option<ConsensusRecord>> {
        Ok(self.records.get(exam_id).map(|record| record.value().clone()))
    }
}
