// ABOUTME: HTTP route tests driven through the router without a listening socket
// ABOUTME: Covers health, session registration and summary, annotations and consensus endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::{create_manager, create_resources, FailingScorer};
use cpet_realtime_server::routes::build_router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn router() -> Router {
    let manager = create_manager(Arc::new(FailingScorer), None);
    build_router(&create_resources(manager))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_reports_session_counts() {
    let app = router();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "cpet-realtime-server");
    assert_eq!(body["active_sessions"], 0);
}

#[tokio::test]
async fn test_register_session_returns_websocket_path() {
    let app = router();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sessions",
        Some(json!({ "session_id": "bike-3", "subject_id": "s-9", "threshold": 0.8 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["session_id"], "bike-3");
    assert_eq!(body["websocket_path"], "/api/ws/realtime/bike-3");

    let (_, health) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(health["pending_sessions"], 1);

    let (status, body) = send(&app, Method::GET, "/api/sessions/bike-3", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "RESOURCE_NOT_FOUND");
}

#[tokio::test]
async fn test_register_session_rejects_bad_threshold() {
    let app = router();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sessions",
        Some(json!({ "threshold": 2.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_register_session_rejects_negative_replay_speed() {
    let app = router();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sessions",
        Some(json!({ "mode": "replay", "replay": { "exam_id": "exam-1", "speed": -2.0 } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");

    let (_, health) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(health["pending_sessions"], 0);
}

#[tokio::test]
async fn test_annotation_and_consensus_endpoints() {
    let app = router();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/exams/exam-5/annotations",
        Some(json!({ "reader_id": "dr-a", "role": "a", "crossing_time": 300.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "partial");

    let (_, body) = send(
        &app,
        Method::POST,
        "/api/exams/exam-5/annotations",
        Some(json!({ "role": "b", "crossing_time": 320.0 })),
    )
    .await;
    assert_eq!(body["status"], "discordant");
    assert_eq!(body["ground_truth"], Value::Null);

    let (status, body) = send(&app, Method::GET, "/api/exams/exam-5/annotations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[1]["reader_id"], "anonymous");

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/exams/exam-5/consensus?delta=30",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "concordant");
    assert_eq!(body["ground_truth"], 310.0);

    let (_, body) = send(&app, Method::GET, "/api/exams/exam-5/consensus", None).await;
    assert_eq!(body["status"], "concordant");
}

#[tokio::test]
async fn test_bad_annotation_role_is_rejected() {
    let app = router();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/exams/exam-6/annotations",
        Some(json!({ "role": "z", "crossing_time": 10.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");

    let (_, body) = send(&app, Method::GET, "/api/exams/exam-6/annotations", None).await;
    assert_eq!(body, json!([]));
}
