// ABOUTME: Integration tests for the realtime session manager
// ABOUTME: Covers triggering, scorer fallback, replay pacing and cancellation, and session isolation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{
    create_manager, drain, exam_row, exam_store, exercise_sample, predictions, FailingScorer,
    RichScorer, ScriptedScorer, SlowScorer,
};
use cpet_core::constants::alerts;
use cpet_core::errors::ErrorCode;
use cpet_core::models::{IntensityZone, SessionMode};
use cpet_detection::WeberClass;
use cpet_realtime_server::realtime::{ManagerConfig, ServerMessage, SessionConfig, SessionManager};
use cpet_realtime_server::replay::{ExamStore, ReplayRequest};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;

fn replay_config(exam_id: &str, speed: f64) -> SessionConfig {
    SessionConfig {
        mode: SessionMode::Replay,
        replay: ReplayRequest {
            exam_id: Some(exam_id.to_owned()),
            speed: Some(speed),
            ..ReplayRequest::default()
        },
        ..SessionConfig::default()
    }
}

#[tokio::test]
async fn test_trigger_fires_on_persistence_count() {
    let scorer = Arc::new(ScriptedScorer::new(&[0.5, 0.8, 0.8, 0.8]));
    let manager = create_manager(scorer.clone(), None);
    let (tx, mut rx) = unbounded_channel();
    let id = manager.open(tx, None, None).await.unwrap();

    let mut triggered = Vec::new();
    for (i, t) in [10.0, 20.0, 30.0, 40.0].into_iter().enumerate() {
        let result = manager
            .process_sample(&id, exercise_sample(t, 100.0, 0.9))
            .await
            .unwrap();
        triggered.push(result.at_triggered);
        assert_eq!(scorer.calls(), i + 1);
    }
    assert_eq!(triggered, vec![false, false, false, true]);

    let messages = drain(&mut rx);
    let predictions = predictions(&messages);
    assert_eq!(predictions.len(), 4);
    let last = predictions[3];
    assert_eq!(last.data_count, 4);
    assert_eq!(last.result.predicted_at_time, Some(40.0));
    assert_eq!(last.result.intensity_zone, IntensityZone::Threshold);
    assert_eq!(last.result.alerts, vec![alerts::THRESHOLD_REACHED.to_owned()]);

    let summary = manager.summary(&id).await.unwrap();
    assert!(summary.triggered);
    assert_eq!(summary.trigger_time, Some(40.0));
    assert_eq!(summary.samples, 4);
}

#[tokio::test]
async fn test_failing_scorer_falls_back_to_rule_based() {
    let manager = create_manager(Arc::new(FailingScorer), None);
    let (tx, _rx) = unbounded_channel();
    let id = manager.open(tx, None, None).await.unwrap();

    let result = manager
        .process_sample(&id, exercise_sample(15.0, 120.0, 1.12))
        .await
        .unwrap();
    assert!((result.at_probability - 0.9).abs() < 1e-9);

    let result = manager
        .process_sample(&id, exercise_sample(30.0, 120.0, 0.80))
        .await
        .unwrap();
    assert!((result.at_probability - 0.1).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_slow_scorer_times_out_to_rule_based() {
    let manager = create_manager(Arc::new(SlowScorer), None);
    let (tx, _rx) = unbounded_channel();
    let id = manager.open(tx, None, None).await.unwrap();

    let result = manager
        .process_sample(&id, exercise_sample(15.0, 120.0, 1.02))
        .await
        .unwrap();
    assert!((result.at_probability - 0.7).abs() < 1e-9);
}

#[tokio::test]
async fn test_short_history_skips_the_scorer() {
    let scorer = Arc::new(ScriptedScorer::new(&[0.2, 0.2, 0.2]));
    let manager = Arc::new(SessionManager::new(
        ManagerConfig {
            min_points_for_model: 3,
            ..ManagerConfig::default()
        },
        scorer.clone(),
        None,
    ));
    let (tx, _rx) = unbounded_channel();
    let id = manager.open(tx, None, None).await.unwrap();

    for t in [15.0, 30.0] {
        manager
            .process_sample(&id, exercise_sample(t, 80.0, 0.9))
            .await
            .unwrap();
    }
    assert_eq!(scorer.calls(), 0);

    manager
        .process_sample(&id, exercise_sample(45.0, 80.0, 0.9))
        .await
        .unwrap();
    assert_eq!(scorer.calls(), 1);
}

#[tokio::test]
async fn test_scorer_extras_reach_the_prediction() {
    let scorer = Arc::new(RichScorer {
        probability: 0.4,
        crossing_time_index: Some(1.5),
        peak_value: Some(18.26),
    });
    let manager = create_manager(scorer, None);
    let (tx, mut rx) = unbounded_channel();
    let id = manager.open(tx, None, None).await.unwrap();

    for t in [10.0, 20.0, 30.0] {
        manager
            .process_sample(&id, exercise_sample(t, 90.0, 0.9))
            .await
            .unwrap();
    }

    let messages = drain(&mut rx);
    let last = *predictions(&messages).last().unwrap();
    assert_eq!(last.result.predicted_at_time, Some(25.0));
    let vo2 = last.vo2_peak_prediction.as_ref().unwrap();
    assert!((vo2.predicted_vo2_peak - 18.3).abs() < 1e-9);
    assert_eq!(vo2.weber_class, WeberClass::B);
}

#[tokio::test]
async fn test_live_samples_parse_at_the_boundary() {
    let manager = create_manager(Arc::new(FailingScorer), None);
    let (tx, mut rx) = unbounded_channel();
    let id = manager.open(tx, None, None).await.unwrap();
    drain(&mut rx);

    let error = manager
        .handle_inbound(&id, &json!({ "timestamp": "soon" }))
        .await
        .unwrap_err();
    assert!(error.code.is_validation());
    assert!(drain(&mut rx).is_empty());

    let result = manager
        .handle_inbound(
            &id,
            &json!({ "type": "sample", "timestamp": 12.0, "power_load": 60, "rer": 1.05 }),
        )
        .await
        .unwrap();
    assert_eq!(result.intensity_zone, IntensityZone::Aerobic);
    assert_eq!(predictions(&drain(&mut rx)).len(), 1);

    let error = manager
        .handle_inbound("missing", &json!({ "timestamp": 1.0 }))
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::ResourceNotFound);
}

#[tokio::test]
async fn test_sessions_do_not_share_detector_state() {
    let scorer = Arc::new(RichScorer {
        probability: 0.9,
        crossing_time_index: None,
        peak_value: None,
    });
    let manager = create_manager(scorer, None);
    manager
        .register_session(
            Some("strict".into()),
            SessionConfig {
                threshold: Some(0.95),
                ..SessionConfig::default()
            },
        )
        .unwrap();

    let (tx_a, _rx_a) = unbounded_channel();
    let (tx_b, _rx_b) = unbounded_channel();
    manager.open(tx_a, Some("default".into()), None).await.unwrap();
    manager.open(tx_b, Some("strict".into()), None).await.unwrap();

    let a = Arc::clone(&manager);
    let b = Arc::clone(&manager);
    let feed_a = tokio::spawn(async move {
        for t in [10.0, 20.0, 30.0] {
            a.process_sample("default", exercise_sample(t, 100.0, 0.9))
                .await
                .unwrap();
        }
    });
    let feed_b = tokio::spawn(async move {
        for t in [10.0, 20.0, 30.0] {
            b.process_sample("strict", exercise_sample(t, 100.0, 0.9))
                .await
                .unwrap();
        }
    });
    feed_a.await.unwrap();
    feed_b.await.unwrap();

    assert!(manager.summary("default").await.unwrap().triggered);
    assert!(!manager.summary("strict").await.unwrap().triggered);
    assert_eq!(manager.active_sessions(), 2);
}

#[tokio::test]
async fn test_pending_registration_is_consumed_once() {
    let manager = create_manager(Arc::new(FailingScorer), None);
    manager
        .register_session(
            Some("bike-1".into()),
            SessionConfig {
                subject_id: Some("subject-7".into()),
                ..SessionConfig::default()
            },
        )
        .unwrap();

    let (tx, _rx) = unbounded_channel();
    manager.open(tx, Some("bike-1".into()), None).await.unwrap();
    assert_eq!(
        manager.summary("bike-1").await.unwrap().subject_id.as_deref(),
        Some("subject-7")
    );

    let error = manager
        .register_session(Some("bike-1".into()), SessionConfig::default())
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::ResourceLocked);

    manager.close("bike-1").await;
    let (tx, _rx) = unbounded_channel();
    manager.open(tx, Some("bike-1".into()), None).await.unwrap();
    assert!(manager.summary("bike-1").await.unwrap().subject_id.is_none());
}

#[tokio::test]
async fn test_reset_clears_the_trigger() {
    let scorer = Arc::new(RichScorer {
        probability: 1.0,
        crossing_time_index: None,
        peak_value: None,
    });
    let manager = create_manager(scorer, None);
    let (tx, _rx) = unbounded_channel();
    let id = manager.open(tx, None, None).await.unwrap();
    for t in [10.0, 20.0, 30.0] {
        manager
            .process_sample(&id, exercise_sample(t, 100.0, 0.9))
            .await
            .unwrap();
    }
    assert!(manager.summary(&id).await.unwrap().triggered);

    manager.reset(&id).await.unwrap();
    let summary = manager.summary(&id).await.unwrap();
    assert!(!summary.triggered);
    assert_eq!(summary.samples, 0);
}

#[tokio::test(start_paused = true)]
async fn test_replay_emits_every_row_then_completes() {
    let store = exam_store(vec![(
        "exam-1",
        vec![
            exam_row(0.0, 0.0, 0.8),
            exam_row(15.0, 50.0, 0.9),
            exam_row(30.0, 100.0, 1.0),
        ],
    )]);
    let manager = create_manager(Arc::new(FailingScorer), Some(store as Arc<dyn ExamStore>));
    let (tx, mut rx) = unbounded_channel();
    let id = manager
        .open(tx, None, Some(replay_config("exam-1", 1.0)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;

    let messages = drain(&mut rx);
    assert!(matches!(
        messages.first(),
        Some(ServerMessage::Connected {
            mode: SessionMode::Replay,
            ..
        })
    ));
    let predictions = predictions(&messages);
    let timestamps: Vec<f64> = predictions.iter().map(|p| p.result.timestamp).collect();
    assert_eq!(timestamps, vec![0.0, 15.0, 30.0]);
    assert!(predictions
        .iter()
        .all(|p| p.exam_id.as_deref() == Some("exam-1")));
    assert!(matches!(
        messages.last(),
        Some(ServerMessage::ReplayComplete { samples: 3, .. })
    ));

    let summary = manager.summary(&id).await.unwrap();
    assert!(!summary.replay_active);
    assert_eq!(summary.exam_id.as_deref(), Some("exam-1"));
}

#[tokio::test(start_paused = true)]
async fn test_close_mid_replay_stops_emission() {
    let store = exam_store(vec![(
        "long",
        vec![
            exam_row(0.0, 50.0, 0.9),
            exam_row(100.0, 60.0, 0.9),
            exam_row(200.0, 70.0, 0.9),
        ],
    )]);
    let manager = create_manager(Arc::new(FailingScorer), Some(store as Arc<dyn ExamStore>));
    let (tx, mut rx) = unbounded_channel();
    let id = manager
        .open(tx, None, Some(replay_config("long", 1.0)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(50)).await;
    let before = drain(&mut rx);
    assert_eq!(predictions(&before).len(), 1);
    assert!(manager.summary(&id).await.unwrap().replay_active);

    manager.close(&id).await;
    tokio::time::sleep(Duration::from_secs(500)).await;

    let mut after = Vec::new();
    while let Some(message) = rx.recv().await {
        after.push(message);
    }
    assert!(after.is_empty());
    assert_eq!(manager.active_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_replay_session_rejects_live_samples() {
    let store = exam_store(vec![(
        "exam-2",
        vec![exam_row(0.0, 50.0, 0.9), exam_row(60.0, 60.0, 0.9)],
    )]);
    let manager = create_manager(Arc::new(FailingScorer), Some(store as Arc<dyn ExamStore>));
    let (tx, _rx) = unbounded_channel();
    let id = manager
        .open(tx, None, Some(replay_config("exam-2", 1.0)))
        .await
        .unwrap();

    let error = manager
        .handle_inbound(&id, &json!({ "timestamp": 5.0, "power_load": 40 }))
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::InvalidInput);

    let error = manager
        .start_replay(&id, ReplayRequest::default())
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::ResourceLocked);
}

#[tokio::test(start_paused = true)]
async fn test_reset_is_locked_while_replay_drives_the_session() {
    let store = exam_store(vec![(
        "exam-4",
        vec![
            exam_row(0.0, 50.0, 1.2),
            exam_row(10.0, 60.0, 1.2),
            exam_row(20.0, 70.0, 1.2),
            exam_row(30.0, 80.0, 1.2),
        ],
    )]);
    let manager = create_manager(Arc::new(FailingScorer), Some(store as Arc<dyn ExamStore>));
    let (tx, mut rx) = unbounded_channel();
    let id = manager
        .open(tx, None, Some(replay_config("exam-4", 1.0)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(25)).await;
    let error = manager.reset(&id).await.unwrap_err();
    assert_eq!(error.code, ErrorCode::ResourceLocked);

    tokio::time::sleep(Duration::from_secs(60)).await;
    let messages = drain(&mut rx);
    let emitted: Vec<(f64, bool)> = predictions(&messages)
        .iter()
        .map(|p| (p.result.timestamp, p.result.at_triggered))
        .collect();
    assert_eq!(
        emitted,
        vec![(0.0, false), (10.0, false), (20.0, true), (30.0, true)]
    );
    assert!(matches!(
        messages.last(),
        Some(ServerMessage::ReplayComplete { samples: 4, .. })
    ));

    manager.reset(&id).await.unwrap();
    assert!(!manager.summary(&id).await.unwrap().triggered);
}

#[tokio::test(start_paused = true)]
async fn test_replay_of_unknown_exam_reports_not_found() {
    let store = exam_store(vec![]);
    let manager = create_manager(Arc::new(FailingScorer), Some(store as Arc<dyn ExamStore>));
    let (tx, mut rx) = unbounded_channel();
    let id = manager
        .open(tx, None, Some(replay_config("nope", 1.0)))
        .await
        .unwrap();

    let messages = drain(&mut rx);
    assert!(matches!(
        messages.last(),
        Some(ServerMessage::Error {
            code: ErrorCode::ResourceNotFound,
            ..
        })
    ));
    assert!(manager.summary(&id).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_everything() {
    let store = exam_store(vec![(
        "exam-3",
        vec![exam_row(0.0, 50.0, 0.9), exam_row(600.0, 60.0, 0.9)],
    )]);
    let manager = create_manager(Arc::new(FailingScorer), Some(store as Arc<dyn ExamStore>));
    let (tx_live, _rx_live) = unbounded_channel();
    let (tx_replay, _rx_replay) = unbounded_channel();
    manager.open(tx_live, None, None).await.unwrap();
    manager
        .open(tx_replay, None, Some(replay_config("exam-3", 1.0)))
        .await
        .unwrap();
    assert_eq!(manager.active_sessions(), 2);

    manager.shutdown().await;
    assert_eq!(manager.active_sessions(), 0);
}
