// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides quiet logging, sample builders, exam fixtures and manager construction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used
)]
//! Shared test utilities for `cpet_realtime_server`

use async_trait::async_trait;
use cpet_core::models::Sample;
use cpet_detection::{ScoreOutput, ScoringError, ScoringFunction, StaticFeatures};
use cpet_realtime_server::realtime::{
    ManagerConfig, PredictionMessage, ServerMessage, SessionManager,
};
use cpet_realtime_server::config::ServerConfig;
use cpet_realtime_server::consensus::{ConsensusResolver, InMemoryAnnotationStore};
use cpet_realtime_server::replay::{ExamRow, ExamStore, InMemoryExamStore};
use cpet_realtime_server::resources::ServerResources;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Exercise sample with the given work rate and RER
pub fn exercise_sample(timestamp: f64, work_rate: f64, rer: f64) -> Sample {
    Sample::builder(timestamp)
        .vo2(1500.0 + timestamp)
        .vco2(1500.0 * rer)
        .ve(40.0)
        .hr(120.0)
        .rer(rer)
        .work_rate(work_rate)
        .build()
        .unwrap()
}

/// Exam row with a `Time` column
pub fn exam_row(time: f64, work_rate: f64, rer: f64) -> ExamRow {
    ExamRow::from([
        ("Time".to_owned(), time),
        ("VO2".to_owned(), 1500.0 + time),
        ("VCO2".to_owned(), 1500.0 * rer),
        ("VE".to_owned(), 40.0),
        ("HR".to_owned(), 120.0),
        ("RER".to_owned(), rer),
        ("Power_Load".to_owned(), work_rate),
    ])
}

/// In-memory exam store holding `exams`
pub fn exam_store(exams: Vec<(&str, Vec<ExamRow>)>) -> Arc<InMemoryExamStore> {
    let store = InMemoryExamStore::new();
    for (exam_id, rows) in exams {
        store.insert(exam_id, rows, StaticFeatures::new());
    }
    Arc::new(store)
}

/// Manager consulting `scorer` from the first sample on
pub fn create_manager(
    scorer: Arc<dyn ScoringFunction>,
    exam_store: Option<Arc<dyn ExamStore>>,
) -> Arc<SessionManager> {
    init_test_logging();
    let config = ManagerConfig {
        min_points_for_model: 1,
        ..ManagerConfig::default()
    };
    Arc::new(SessionManager::new(config, scorer, exam_store))
}

/// Server resources around `manager` with in-memory annotations
pub fn create_resources(manager: Arc<SessionManager>) -> Arc<ServerResources> {
    let config = ServerConfig::default();
    let consensus = ConsensusResolver::new(
        Arc::new(InMemoryAnnotationStore::new()),
        config.consensus_delta,
    );
    Arc::new(ServerResources::new(manager, consensus, Arc::new(config)))
}

/// Everything currently queued on a connection
pub fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

/// Scorer replaying a fixed probability script, one value per call
pub struct ScriptedScorer {
    script: Mutex<Vec<f64>>,
    calls: AtomicUsize,
}

impl ScriptedScorer {
    pub fn new(probabilities: &[f64]) -> Self {
        let mut script = probabilities.to_vec();
        script.reverse();
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringFunction for ScriptedScorer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn score(
        &self,
        history: &[Sample],
        _static_features: Option<&StaticFeatures>,
    ) -> Result<ScoreOutput, ScoringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop().unwrap_or(0.0);
        let mut probabilities = vec![0.0; history.len().saturating_sub(1)];
        probabilities.push(next);
        Ok(ScoreOutput::from_probabilities(probabilities))
    }
}

/// Scorer that always fails
pub struct FailingScorer;

#[async_trait]
impl ScoringFunction for FailingScorer {
    fn name(&self) -> &str {
        "failing"
    }

    async fn score(
        &self,
        _history: &[Sample],
        _static_features: Option<&StaticFeatures>,
    ) -> Result<ScoreOutput, ScoringError> {
        Err(ScoringError::Unavailable("no model loaded".into()))
    }
}

/// Scorer that never answers within any sensible budget
pub struct SlowScorer;

#[async_trait]
impl ScoringFunction for SlowScorer {
    fn name(&self) -> &str {
        "slow"
    }

    async fn score(
        &self,
        history: &[Sample],
        _static_features: Option<&StaticFeatures>,
    ) -> Result<ScoreOutput, ScoringError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(ScoreOutput::from_probabilities(vec![1.0; history.len()]))
    }
}

/// Scorer returning a constant probability plus crossing index and peak value
pub struct RichScorer {
    pub probability: f64,
    pub crossing_time_index: Option<f64>,
    pub peak_value: Option<f64>,
}

#[async_trait]
impl ScoringFunction for RichScorer {
    fn name(&self) -> &str {
        "rich"
    }

    async fn score(
        &self,
        history: &[Sample],
        _static_features: Option<&StaticFeatures>,
    ) -> Result<ScoreOutput, ScoringError> {
        Ok(ScoreOutput {
            probabilities: vec![self.probability; history.len()],
            crossing_time_index: self.crossing_time_index,
            peak_value: self.peak_value,
        })
    }
}

/// Prediction bodies among `messages`, in order
pub fn predictions(messages: &[ServerMessage]) -> Vec<&PredictionMessage> {
    messages
        .iter()
        .filter_map(|message| match message {
            ServerMessage::Prediction(prediction) => Some(prediction.as_ref()),
            _ => None,
        })
        .collect()
}
