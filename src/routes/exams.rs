// ABOUTME: Exam annotation and consensus routes for the two-reader review workflow
// ABOUTME: Readers post crossing times; the consensus record is recomputed on every post
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Exam Routes
//!
//! - `POST /api/exams/{exam_id}/annotations` - Record a reader annotation
//! - `GET /api/exams/{exam_id}/annotations` - Annotation history
//! - `GET /api/exams/{exam_id}/consensus` - Consensus record, `?delta=` recomputes

use crate::consensus::NewAnnotation;
use crate::resources::ServerResources;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cpet_core::errors::AppError;
use cpet_core::models::{Annotation, ConsensusRecord};
use serde::Deserialize;
use std::sync::Arc;

/// Exam routes implementation
pub struct ExamRoutes;

/// Query parameters of the consensus endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsensusQuery {
    /// Tolerance to recompute with
    #[serde(default)]
    pub delta: Option<f64>,
}

impl ExamRoutes {
    /// Create the exam routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/api/exams/{exam_id}/annotations",
                post(Self::handle_record_annotation),
            )
            .route(
                "/api/exams/{exam_id}/annotations",
                get(Self::handle_list_annotations),
            )
            .route(
                "/api/exams/{exam_id}/consensus",
                get(Self::handle_consensus),
            )
            .with_state(resources)
    }

    async fn handle_record_annotation(
        State(resources): State<Arc<ServerResources>>,
        Path(exam_id): Path<String>,
        Json(request): Json<NewAnnotation>,
    ) -> Result<Response, AppError> {
        let record = resources
            .consensus
            .record_annotation(&exam_id, request)
            .await?;
        Ok((StatusCode::CREATED, Json(record)).into_response())
    }

    async fn handle_list_annotations(
        State(resources): State<Arc<ServerResources>>,
        Path(exam_id): Path<String>,
    ) -> Result<Json<Vec<Annotation>>, AppError> {
        Ok(Json(resources.consensus.annotations(&exam_id).await?))
    }

    async fn handle_consensus(
        State(resources): State<Arc<ServerResources>>,
        Path(exam_id): Path<String>,
        Query(query): Query<ConsensusQuery>,
    ) -> Result<Json<ConsensusRecord>, AppError> {
        let record = match query.delta {
            Some(delta) => resources.consensus.recompute(&exam_id, Some(delta)).await?,
            None => resources.consensus.consensus(&exam_id).await?,
        };
        Ok(Json(record))
    }
}
