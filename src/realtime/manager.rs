// ABOUTME: Session and connection manager owning every concurrent detection session
// ABOUTME: Open/close lifecycle, scoring with rule-based fallback, and cancellable paced replay tasks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Session Manager
//!
//! Registries (sessions, connections, pending configurations, replay tasks)
//! are concurrent maps shared by all sessions. A session's detector state
//! sits behind its own mutex, which is only ever contended by the single
//! task driving that session; the lock is released while the scoring
//! function runs.

use super::protocol::{PredictionMessage, ServerMessage};
use super::{ManagerConfig, SessionConfig};
use crate::replay::{pick_random_exam, ExamStore, ReplayPlan, ReplayRequest};
use cpet_core::errors::{AppError, AppResult};
use cpet_core::models::{DetectionResult, Sample, SessionMode};
use cpet_detection::{
    DetectionSession, RuleBasedScorer, ScoringError, ScoringFunction, StaticFeatures,
    Vo2PeakPrediction,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio::time::Instant as TokioInstant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Mutable state of one open session
#[derive(Debug)]
struct LiveSession {
    detector: DetectionSession,
    mode: SessionMode,
    subject_id: Option<String>,
    exam_id: Option<String>,
    static_features: Option<StaticFeatures>,
    opened_at: Instant,
}

impl LiveSession {
    fn summary(&self, session_id: &str, connected: bool, replay_active: bool) -> SessionSummary {
        SessionSummary {
            session_id: session_id.to_owned(),
            mode: self.mode,
            subject_id: self.subject_id.clone(),
            exam_id: self.exam_id.clone(),
            samples: self.detector.samples_seen(),
            triggered: self.detector.is_triggered(),
            trigger_time: self.detector.trigger_time(),
            elapsed_secs: self.opened_at.elapsed().as_secs_f64(),
            connected,
            replay_active,
        }
    }
}

/// Outbound half of a session's connection
#[derive(Debug, Clone)]
struct ConnectionHandle {
    tx: UnboundedSender<ServerMessage>,
}

/// Registration waiting for its connection
#[derive(Debug, Clone)]
struct PendingSession {
    config: SessionConfig,
    registered_at: TokioInstant,
}

/// Cancellation handle of a running replay task
#[derive(Debug, Clone)]
struct ReplayHandle {
    id: Uuid,
    token: CancellationToken,
}

/// Read-only snapshot of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Session identifier
    pub session_id: String,
    /// Where samples come from
    pub mode: SessionMode,
    /// Subject being tested
    pub subject_id: Option<String>,
    /// Exam bound by a replay
    pub exam_id: Option<String>,
    /// Samples received so far
    pub samples: usize,
    /// Whether the threshold trigger has fired
    pub triggered: bool,
    /// Sample time at which the trigger fired
    pub trigger_time: Option<f64>,
    /// Wall-clock seconds since the session was opened
    pub elapsed_secs: f64,
    /// Whether a connection is attached
    pub connected: bool,
    /// Whether a replay task is running
    pub replay_active: bool,
}

/// Probability and optional extras chosen for one sample
struct Scored {
    probability: f64,
    crossing_time: Option<f64>,
    peak_value: Option<f64>,
}

/// Owner of every concurrent detection session
pub struct SessionManager {
    config: ManagerConfig,
    scorer: Arc<dyn ScoringFunction>,
    exam_store: Option<Arc<dyn ExamStore>>,
    sessions: DashMap<String, Arc<Mutex<LiveSession>>>,
    connections: DashMap<String, ConnectionHandle>,
    pending: DashMap<String, PendingSession>,
    replays: DashMap<String, ReplayHandle>,
}

impl SessionManager {
    /// Create a manager using `scorer` for every session
    #[must_use]
    pub fn new(
        config: ManagerConfig,
        scorer: Arc<dyn ScoringFunction>,
        exam_store: Option<Arc<dyn ExamStore>>,
    ) -> Self {
        Self {
            config,
            scorer,
            exam_store,
            sessions: DashMap::new(),
            connections: DashMap::new(),
            pending: DashMap::new(),
            replays: DashMap::new(),
        }
    }

    /// Manager settings
    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Store a configuration to be applied by the next `open` of `session_id`
    ///
    /// A fresh id is generated when none is given. Registrations expire after
    /// `pending_ttl`; expired ones are swept here and ignored by `open`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for out-of-range overrides, a locked error
    /// when the session is already open, or a quota error when
    /// `max_pending_sessions` registrations are already waiting.
    pub fn register_session(
        &self,
        session_id: Option<String>,
        config: SessionConfig,
    ) -> AppResult<String> {
        config.detector_config(&self.config.detector)?;
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.sessions.contains_key(&session_id) {
            return Err(AppError::locked(format!("Session {session_id} is already open"))
                .with_resource_id(session_id));
        }

        let now = TokioInstant::now();
        self.pending
            .retain(|_, pending| !self.is_expired(pending, now));
        if !self.pending.contains_key(&session_id)
            && self.pending.len() >= self.config.max_pending_sessions
        {
            warn!(
                pending = self.pending.len(),
                "Pending session registry is full, rejecting registration"
            );
            return Err(AppError::quota_exceeded(format!(
                "{} sessions are already waiting for a connection",
                self.pending.len()
            )));
        }

        info!(session_id = %session_id, mode = %config.mode, "Registered pending session");
        self.pending.insert(
            session_id.clone(),
            PendingSession {
                config,
                registered_at: now,
            },
        );
        Ok(session_id)
    }

    fn is_expired(&self, pending: &PendingSession, now: TokioInstant) -> bool {
        now.duration_since(pending.registered_at) >= self.config.pending_ttl
    }

    /// Attach a connection and create (or resume) its session
    ///
    /// A pending registration for the id wins over `config` and is consumed.
    /// The `connected` message is pushed before returning; replay-mode
    /// sessions start replaying right after it.
    ///
    /// # Errors
    ///
    /// Returns a locked error when the session already has a connection, or
    /// a validation error for an invalid configuration. Nothing is registered
    /// on error.
    pub async fn open(
        self: &Arc<Self>,
        tx: UnboundedSender<ServerMessage>,
        session_id: Option<String>,
        config: Option<SessionConfig>,
    ) -> AppResult<String> {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.connections.contains_key(&session_id) {
            return Err(already_connected(&session_id));
        }

        let now = TokioInstant::now();
        let pending = self
            .pending
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .filter(|pending| !self.is_expired(pending, now))
            .map(|pending| pending.config);
        let config = pending.or(config).unwrap_or_default();
        let detector_config = config.detector_config(&self.config.detector)?;

        match self.connections.entry(session_id.clone()) {
            Entry::Occupied(_) => return Err(already_connected(&session_id)),
            Entry::Vacant(slot) => {
                slot.insert(ConnectionHandle { tx });
            }
        }
        self.pending.remove(&session_id);

        let session = Arc::clone(
            self.sessions
                .entry(session_id.clone())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(LiveSession {
                        detector: DetectionSession::new(detector_config),
                        mode: config.mode,
                        subject_id: config.subject_id.clone(),
                        exam_id: None,
                        static_features: None,
                        opened_at: Instant::now(),
                    }))
                })
                .value(),
        );
        let mode = session.lock().await.mode;

        info!(
            session_id = %session_id,
            mode = %mode,
            subject_id = config.subject_id.as_deref().unwrap_or("-"),
            threshold = detector_config.threshold,
            persistence = detector_config.persistence,
            "Session opened"
        );
        self.push(&session_id, ServerMessage::connected(&session_id, mode));

        if mode == SessionMode::Replay {
            if let Err(error) = self.start_replay(&session_id, config.replay).await {
                warn!(session_id = %session_id, %error, "Replay could not start");
                self.push(&session_id, ServerMessage::error(&error));
            }
        }
        Ok(session_id)
    }

    /// Detach the connection, cancel any replay and drop the session
    ///
    /// Calling it for an unknown or already closed session does nothing.
    pub async fn close(&self, session_id: &str) -> Option<SessionSummary> {
        if let Some((_, replay)) = self.replays.remove(session_id) {
            replay.token.cancel();
            debug!(session_id, "Replay task cancelled");
        }
        self.connections.remove(session_id);
        let (_, session) = self.sessions.remove(session_id)?;

        let summary = session.lock().await.summary(session_id, false, false);
        info!(
            session_id,
            mode = %summary.mode,
            exam_id = summary.exam_id.as_deref().unwrap_or("-"),
            samples = summary.samples,
            triggered = summary.triggered,
            trigger_time = ?summary.trigger_time,
            elapsed_secs = summary.elapsed_secs,
            "Session closed"
        );
        Some(summary)
    }

    /// Parse a raw inbound sample and process it
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown session, a validation error for a
    /// malformed sample or when the session is driven by a replay. Session
    /// state is untouched on error.
    pub async fn handle_inbound(
        &self,
        session_id: &str,
        raw: &Value,
    ) -> AppResult<DetectionResult> {
        let session = self.session(session_id)?;
        if session.lock().await.mode == SessionMode::Replay {
            return Err(AppError::invalid_input(format!(
                "Session {session_id} is driven by a replay and does not accept live samples"
            ))
            .with_resource_id(session_id));
        }
        let sample = Sample::from_json(raw)?;
        self.process_sample(session_id, sample).await
    }

    /// Score one validated sample, update the detector and push the result
    ///
    /// Warmup samples skip scoring and yield a zero-probability result.
    ///
    /// # Errors
    ///
    /// Returns not-found when the session is unknown.
    pub async fn process_sample(
        &self,
        session_id: &str,
        sample: Sample,
    ) -> AppResult<DetectionResult> {
        let session = self.session(session_id)?;

        let (history, static_features) = {
            let mut state = session.lock().await;
            if state.detector.is_warmup(&sample) {
                state.detector.ingest(sample.clone());
                let result = DetectionResult::warmup(sample.timestamp());
                let message = PredictionMessage::new(
                    &result,
                    state.detector.samples_seen(),
                    state.exam_id.clone(),
                    sample,
                    None,
                );
                drop(state);
                self.push(session_id, message.into());
                return Ok(result);
            }
            state.detector.ingest(sample.clone());
            (state.detector.history_snapshot(), state.static_features.clone())
        };

        let scored = self
            .score(session_id, &history, static_features.as_ref())
            .await;

        let mut state = session.lock().await;
        let result = state.detector.update(
            scored.probability,
            scored.crossing_time,
            Some(sample.work_rate()),
        );
        let message = PredictionMessage::new(
            &result,
            state.detector.samples_seen(),
            state.exam_id.clone(),
            sample,
            scored.peak_value.and_then(Vo2PeakPrediction::from_peak),
        );
        drop(state);

        self.push(session_id, message.into());
        Ok(result)
    }

    /// Clear the session's detector so it can follow a new exam
    ///
    /// # Errors
    ///
    /// Returns not-found when the session is unknown, or a locked error while
    /// a replay task is driving the session.
    pub async fn reset(&self, session_id: &str) -> AppResult<()> {
        let session = self.session(session_id)?;
        if self.replays.contains_key(session_id) {
            return Err(AppError::locked(format!(
                "Session {session_id} is driven by a replay and cannot be reset"
            ))
            .with_resource_id(session_id));
        }
        session.lock().await.detector.reset();
        info!(session_id, "Session detector reset");
        Ok(())
    }

    async fn score(
        &self,
        session_id: &str,
        history: &[Sample],
        static_features: Option<&StaticFeatures>,
    ) -> Scored {
        if history.len() < self.config.min_points_for_model {
            return fallback(history);
        }

        let timeout = self.config.scoring_timeout;
        let outcome = tokio::time::timeout(timeout, self.scorer.score(history, static_features))
            .await
            .unwrap_or_else(|_| {
                Err(ScoringError::TimedOut {
                    millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            });
        let output = outcome.and_then(|output| match output.latest_probability() {
            Some(probability) => Ok((probability, output)),
            None => Err(ScoringError::EmptyOutput),
        });

        match output {
            Ok((probability, output)) => Scored {
                probability,
                crossing_time: output.crossing_time(history),
                peak_value: output.peak_value,
            },
            Err(error) => {
                warn!(
                    session_id,
                    scorer = self.scorer.name(),
                    %error,
                    "Scoring function failed, using rule-based fallback"
                );
                fallback(history)
            }
        }
    }

    /// Load an exam and launch a cancellable task emitting its samples
    ///
    /// Returns the exam id. An empty plan sends `replay_complete` with zero
    /// samples and closes the session.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown session or exam, a validation error
    /// for a non-positive speed, a configuration error when no exam store is
    /// configured, or a locked error when a replay is already running for
    /// the session.
    pub async fn start_replay(
        self: &Arc<Self>,
        session_id: &str,
        request: ReplayRequest,
    ) -> AppResult<String> {
        let session = self.session(session_id)?;
        request.validate()?;
        let store = self
            .exam_store
            .as_ref()
            .ok_or_else(|| AppError::config("Replay requires an exam store (set CPET_DATA_DIR)"))?;
        if self.replays.contains_key(session_id) {
            return Err(AppError::locked(format!("Session {session_id} is already replaying"))
                .with_resource_id(session_id));
        }

        let exam_id = match request.exam_id.clone() {
            Some(exam_id) => exam_id,
            None => pick_random_exam(store.as_ref()).await?,
        };
        let defaults = &self.config.replay;
        let speed = request.speed_or(defaults);
        let smoothing = request.smoothing_or(defaults);
        let rows = store
            .load_rows(&exam_id, smoothing, request.window())
            .await?;
        let metadata = store.load_metadata(&exam_id).await?;
        let plan = ReplayPlan::build(&rows, speed, defaults.default_step_secs);

        {
            let mut state = session.lock().await;
            state.mode = SessionMode::Replay;
            state.exam_id = Some(exam_id.clone());
            state.static_features = Some(metadata);
        }
        info!(
            session_id,
            exam_id = %exam_id,
            samples = plan.len(),
            speed,
            smoothing = %smoothing,
            "Replay started"
        );

        if plan.is_empty() {
            self.push(
                session_id,
                ServerMessage::ReplayComplete {
                    exam_id: exam_id.clone(),
                    samples: 0,
                },
            );
            self.close(session_id).await;
            return Ok(exam_id);
        }

        let handle = ReplayHandle {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
        };
        match self.replays.entry(session_id.to_owned()) {
            Entry::Occupied(_) => {
                return Err(AppError::locked(format!("Session {session_id} is already replaying"))
                    .with_resource_id(session_id));
            }
            Entry::Vacant(slot) => {
                slot.insert(handle.clone());
            }
        }

        let manager = Arc::clone(self);
        let task_session = session_id.to_owned();
        let task_exam = exam_id.clone();
        tokio::spawn(async move {
            manager.run_replay(task_session, task_exam, plan, handle).await;
        });
        Ok(exam_id)
    }

    async fn run_replay(
        &self,
        session_id: String,
        exam_id: String,
        plan: ReplayPlan,
        handle: ReplayHandle,
    ) {
        let mut emitted = 0usize;
        for item in plan.into_items() {
            tokio::select! {
                biased;
                () = handle.token.cancelled() => {
                    debug!(session_id = %session_id, emitted, "Replay stopped by cancellation");
                    return;
                }
                () = tokio::time::sleep(item.delay()) => {}
            }
            if handle.token.is_cancelled() || !self.is_connected(&session_id) {
                debug!(session_id = %session_id, emitted, "Replay stopped, connection gone");
                self.replays.remove_if(&session_id, |_, current| current.id == handle.id);
                return;
            }
            if let Err(error) = self.process_sample(&session_id, item.sample).await {
                debug!(session_id = %session_id, %error, "Replay stopped, session gone");
                self.replays.remove_if(&session_id, |_, current| current.id == handle.id);
                return;
            }
            emitted += 1;
        }

        self.replays.remove_if(&session_id, |_, current| current.id == handle.id);
        info!(session_id = %session_id, exam_id = %exam_id, samples = emitted, "Replay finished");
        self.push(
            &session_id,
            ServerMessage::ReplayComplete {
                exam_id,
                samples: emitted,
            },
        );
    }

    /// Snapshot of a session
    ///
    /// # Errors
    ///
    /// Returns not-found when the session is unknown.
    pub async fn summary(&self, session_id: &str) -> AppResult<SessionSummary> {
        let session = self.session(session_id)?;
        let connected = self.is_connected(session_id);
        let replay_active = self.replays.contains_key(session_id);
        let summary = session.lock().await.summary(session_id, connected, replay_active);
        Ok(summary)
    }

    /// Send a message on the session's connection; false when none is attached
    pub fn push(&self, session_id: &str, message: ServerMessage) -> bool {
        let Some(connection) = self.connections.get(session_id).map(|c| c.value().clone()) else {
            debug!(session_id, "No connection attached, dropping message");
            return false;
        };
        if let Err(error) = connection.tx.send(message) {
            warn!(session_id, error = %error, "Failed to queue message for connection");
            return false;
        }
        true
    }

    /// Whether a live connection is attached to the session
    #[must_use]
    pub fn is_connected(&self, session_id: &str) -> bool {
        self.connections
            .get(session_id)
            .is_some_and(|connection| !connection.tx.is_closed())
    }

    /// Number of open sessions
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Number of registrations not yet consumed by `open` or swept as expired
    #[must_use]
    pub fn pending_sessions(&self) -> usize {
        self.pending.len()
    }

    /// Close every open session
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        info!(sessions = ids.len(), "Closing all sessions");
        for session_id in ids {
            self.close(&session_id).await;
        }
    }

    fn session(&self, session_id: &str) -> AppResult<Arc<Mutex<LiveSession>>> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                AppError::not_found(format!("Session {session_id}")).with_resource_id(session_id)
            })
    }
}

fn already_connected(session_id: &str) -> AppError {
    AppError::locked(format!("Session {session_id} already has a connection"))
        .with_resource_id(session_id)
}

fn fallback(history: &[Sample]) -> Scored {
    Scored {
        probability: RuleBasedScorer::latest_probability(history),
        crossing_time: None,
        peak_value: None,
    }
}
