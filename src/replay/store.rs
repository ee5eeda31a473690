// ABOUTME: Exam store abstraction for recorded CPET exams used by replay sessions
// ABOUTME: JSON directory store, in-memory store, and uniform random exam selection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::smoothing::{prepare_rows, ExamRow, Smoothing, TimeWindow};
use async_trait::async_trait;
use cpet_core::errors::{AppError, AppResult};
use cpet_detection::StaticFeatures;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// Source of recorded exams
#[async_trait]
pub trait ExamStore: Send + Sync {
    /// Identifiers of every available exam
    async fn list_exam_ids(&self) -> AppResult<Vec<String>>;

    /// Exam-level features handed to the scoring function
    async fn load_metadata(&self, exam_id: &str) -> AppResult<StaticFeatures>;

    /// Rows exactly as stored
    async fn load_raw_rows(&self, exam_id: &str) -> AppResult<Vec<ExamRow>>;

    /// Rows sorted by time, windowed, then smoothed
    async fn load_rows(
        &self,
        exam_id: &str,
        smoothing: Smoothing,
        window: TimeWindow,
    ) -> AppResult<Vec<ExamRow>> {
        let rows = self.load_raw_rows(exam_id).await?;
        Ok(prepare_rows(rows, smoothing, window))
    }
}

/// Pick an exam uniformly at random
///
/// # Errors
///
/// Returns not-found when the store holds no exams, or the store's own error
pub async fn pick_random_exam(store: &dyn ExamStore) -> AppResult<String> {
    let ids = store.list_exam_ids().await?;
    ids.choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| AppError::not_found("Any exam"))
}

/// On-disk exam document
#[derive(Debug, Deserialize)]
struct ExamDocument {
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    rows: Vec<Map<String, Value>>,
}

/// Directory of `<exam_id>.json` documents
#[derive(Debug, Clone)]
pub struct JsonExamStore {
    root: PathBuf,
}

impl JsonExamStore {
    /// Serve exams from `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn exam_path(&self, exam_id: &str) -> AppResult<PathBuf> {
        let valid = !exam_id.is_empty()
            && !exam_id.starts_with('.')
            && exam_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(AppError::invalid_input(format!(
                "Invalid exam id '{exam_id}'"
            )));
        }
        Ok(self.root.join(format!("{exam_id}.json")))
    }

    async fn read_document(&self, exam_id: &str) -> AppResult<ExamDocument> {
        let path = self.exam_path(exam_id)?;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AppError::not_found(format!("Exam {exam_id}")).with_resource_id(exam_id));
            }
            Err(e) => {
                return Err(AppError::external_service(
                    "exam store",
                    format!("failed to read {}", path.display()),
                )
                .with_source(e));
            }
        };
        debug!(exam_id, path = %path.display(), "Loaded exam document");
        serde_json::from_str(&contents).map_err(|e| {
            AppError::external_service("exam store", format!("malformed exam {exam_id}"))
                .with_source(e)
        })
    }
}

#[async_trait]
impl ExamStore for JsonExamStore {
    async fn list_exam_ids(&self) -> AppResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            AppError::external_service(
                "exam store",
                format!("cannot list {}", self.root.display()),
            )
            .with_source(e)
        })?;

        let mut ids = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|e| {
                AppError::external_service("exam store", "directory scan failed").with_source(e)
            })?;
            let Some(entry) = entry else { break };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                ids.push(stem.to_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn load_metadata(&self, exam_id: &str) -> AppResult<StaticFeatures> {
        let document = self.read_document(exam_id).await?;
        Ok(numeric_fields(&document.metadata).collect())
    }

    async fn load_raw_rows(&self, exam_id: &str) -> AppResult<Vec<ExamRow>> {
        let document = self.read_document(exam_id).await?;
        Ok(document
            .rows
            .iter()
            .map(|row| numeric_fields(row).collect())
            .collect())
    }
}

/// Numeric entries of a JSON object; strings, nulls and nested values are skipped
fn numeric_fields(object: &Map<String, Value>) -> impl Iterator<Item = (String, f64)> + '_ {
    object
        .iter()
        .filter_map(|(key, value)| value.as_f64().map(|number| (key.clone(), number)))
}

/// Stored exam held by [`InMemoryExamStore`]
#[derive(Debug, Clone, Default)]
struct StoredExam {
    rows: Vec<ExamRow>,
    metadata: StaticFeatures,
}

/// Exam store backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryExamStore {
    exams: DashMap<String, StoredExam>,
}

impl InMemoryExamStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an exam
    pub fn insert(&self, exam_id: impl Into<String>, rows: Vec<ExamRow>, metadata: StaticFeatures) {
        self.exams
            .insert(exam_id.into(), StoredExam { rows, metadata });
    }

    fn get(&self, exam_id: &str) -> AppResult<StoredExam> {
        self.exams
            .get(exam_id)
            .map(|exam| exam.value().clone())
            .ok_or_else(|| AppError::not_found(format!("Exam {exam_id}")).with_resource_id(exam_id))
    }
}

#[async_trait]
impl ExamStore for InMemoryExamStore {
    async fn list_exam_ids(&self) -> AppResult<Vec<String>> {
        let mut ids: Vec<String> = self.exams.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn load_metadata(&self, exam_id: &str) -> AppResult<StaticFeatures> {
        Ok(self.get(exam_id)?.metadata)
    }

    async fn load_raw_rows(&self, exam_id: &str) -> AppResult<Vec<ExamRow>> {
        Ok(self.get(exam_id)?.rows)
    }
}
