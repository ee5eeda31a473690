// ABOUTME: Outbound message envelope for realtime sessions
// ABOUTME: JSON messages tagged by type: connected, prediction, replay_complete and error
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{DateTime, Utc};
use cpet_core::errors::{AppError, ErrorCode};
use cpet_core::models::{DetectionResult, Sample, SessionMode};
use cpet_detection::Vo2PeakPrediction;
use serde::Serialize;

/// Message pushed to a session's connection
#[non_exhaustive]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once when the session is opened
    Connected {
        /// Session identifier
        session_id: String,
        /// Wall-clock time of the connection
        timestamp: DateTime<Utc>,
        /// Where samples come from
        mode: SessionMode,
    },
    /// Detection result for one sample
    Prediction(Box<PredictionMessage>),
    /// A replay finished emitting its plan
    ReplayComplete {
        /// Exam that was replayed
        exam_id: String,
        /// Samples emitted
        samples: usize,
    },
    /// A request on this connection failed
    Error {
        /// Machine-readable code
        code: ErrorCode,
        /// Human-readable message
        message: String,
    },
}

impl ServerMessage {
    /// Connection acknowledgement stamped now
    #[must_use]
    pub fn connected(session_id: impl Into<String>, mode: SessionMode) -> Self {
        Self::Connected {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            mode,
        }
    }

    /// Error report for `error`
    #[must_use]
    pub fn error(error: &AppError) -> Self {
        Self::Error {
            code: error.code,
            message: error.message.clone(),
        }
    }
}

/// Body of a `prediction` message
#[derive(Debug, Clone, Serialize)]
pub struct PredictionMessage {
    /// Rounded detection result
    #[serde(flatten)]
    pub result: DetectionResult,
    /// Samples received by the session so far
    pub data_count: usize,
    /// Exam being replayed, if any
    pub exam_id: Option<String>,
    /// Sample the result was computed for
    pub sample: Sample,
    /// Peak VO2 estimate when the scoring function supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vo2_peak_prediction: Option<Vo2PeakPrediction>,
}

impl PredictionMessage {
    /// Wrap a result for the wire; probability and confidence are rounded
    #[must_use]
    pub fn new(
        result: &DetectionResult,
        data_count: usize,
        exam_id: Option<String>,
        sample: Sample,
        vo2_peak_prediction: Option<Vo2PeakPrediction>,
    ) -> Self {
        Self {
            result: result.rounded(),
            data_count,
            exam_id,
            sample,
            vo2_peak_prediction,
        }
    }
}

impl From<PredictionMessage> for ServerMessage {
    fn from(message: PredictionMessage) -> Self {
        Self::Prediction(Box::new(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_prediction_message_is_flat_and_rounded() {
        let result = DetectionResult {
            at_probability: 0.456_78,
            confidence: 0.912_3,
            ..DetectionResult::warmup(30.0)
        };
        let sample = Sample::builder(30.0).hr(120.0).build().unwrap();
        let message: ServerMessage =
            PredictionMessage::new(&result, 4, Some("exam-7".into()), sample, None).into();

        let json: Value = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "prediction");
        assert_eq!(json["at_probability"], 0.457);
        assert_eq!(json["confidence"], 0.91);
        assert_eq!(json["intensity_zone"], "warmup");
        assert_eq!(json["data_count"], 4);
        assert_eq!(json["exam_id"], "exam-7");
        assert_eq!(json["sample"]["hr"], 120.0);
        assert!(json.get("vo2_peak_prediction").is_none());
    }

    #[test]
    fn test_error_message_carries_code() {
        let message = ServerMessage::error(&AppError::not_found("Session x"));
        let json: Value = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "RESOURCE_NOT_FOUND");
        assert_eq!(json["message"], "Session x not found");
    }

    #[test]
    fn test_replay_complete_shape() {
        let message = ServerMessage::ReplayComplete {
            exam_id: "exam-1".into(),
            samples: 0,
        };
        let json: Value = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "replay_complete");
        assert_eq!(json["samples"], 0);
    }
}
