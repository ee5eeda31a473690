// ABOUTME: Physiological sample model with a validating builder and JSON boundary parser
// ABOUTME: Rejects malformed or out-of-range readings once, before any session state is touched
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::constants::limits::{MAX_EXTENSION_FIELDS, MAX_SPO2_PERCENT};
use crate::errors::{AppError, ErrorCode};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Keys that carry the message envelope rather than readings
const ENVELOPE_KEYS: [&str; 2] = ["type", "session_id"];

/// Every key consumed by a named field, including aliases
const KNOWN_KEYS: [&str; 14] = [
    "timestamp",
    "vo2",
    "vco2",
    "ve",
    "hr",
    "rr",
    "bf",
    "rer",
    "work_rate",
    "power_load",
    "power",
    "spo2",
    "sbp",
    "dbp",
];

/// Validation failures raised while building a [`Sample`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    /// The payload was not a JSON object
    #[error("sample payload must be a JSON object")]
    NotAnObject,
    /// A required field was absent
    #[error("missing required field '{field}'")]
    MissingField {
        /// Field name
        field: &'static str,
    },
    /// A field held a non-numeric value
    #[error("field '{field}' must be a number or null")]
    InvalidType {
        /// Field name
        field: String,
    },
    /// A field held NaN or an infinity
    #[error("field '{field}' must be finite")]
    NonFinite {
        /// Field name
        field: String,
    },
    /// A field was outside its accepted range
    #[error("field '{field}' = {value} is out of range: {reason}")]
    OutOfRange {
        /// Field name
        field: String,
        /// Offending value
        value: f64,
        /// Accepted range description
        reason: &'static str,
    },
    /// More extension fields than the bound allows
    #[error("too many extension fields: {count} (max {max})")]
    TooManyExtensions {
        /// Fields supplied
        count: usize,
        /// Accepted maximum
        max: usize,
    },
}

impl From<SampleError> for AppError {
    fn from(error: SampleError) -> Self {
        let code = match &error {
            SampleError::NotAnObject | SampleError::InvalidType { .. } => ErrorCode::InvalidFormat,
            SampleError::MissingField { .. } => ErrorCode::MissingRequiredField,
            SampleError::NonFinite { .. } | SampleError::OutOfRange { .. } => {
                ErrorCode::ValueOutOfRange
            }
            SampleError::TooManyExtensions { .. } => ErrorCode::InvalidInput,
        };
        Self::new(code, format!("Invalid sample: {error}"))
    }
}

/// One timestamped vector of cardiopulmonary readings
///
/// Fields are private: a sample is validated once by [`SampleBuilder::build`]
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    timestamp: f64,
    vo2: f64,
    vco2: f64,
    ve: f64,
    hr: f64,
    rr: f64,
    rer: f64,
    work_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    spo2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sbp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dbp: Option<f64>,
    #[serde(flatten)]
    extensions: BTreeMap<String, Option<f64>>,
}

impl Sample {
    /// Start building a sample taken at `timestamp` seconds into the exam
    #[must_use]
    pub fn builder(timestamp: f64) -> SampleBuilder {
        SampleBuilder::new(timestamp)
    }

    /// Parse an inbound JSON record
    ///
    /// Work rate is read from `work_rate`, then `power_load`, then `power`;
    /// respiratory rate from `rr`, then `bf`. Named fields match their key
    /// case-insensitively, an exact lower-case key taking precedence.
    /// Remaining numeric keys land in the extension map under their
    /// lower-cased name.
    ///
    /// # Errors
    ///
    /// Returns a [`SampleError`] when the payload is not an object, lacks a
    /// timestamp, carries non-numeric values, or holds out-of-range readings.
    pub fn from_json(value: &Value) -> Result<Self, SampleError> {
        let object = value.as_object().ok_or(SampleError::NotAnObject)?;

        let timestamp = numeric_field(object, "timestamp")?
            .ok_or(SampleError::MissingField { field: "timestamp" })?;

        let work_rate = first_present(object, &["work_rate", "power_load", "power"])?;
        let rr = first_present(object, &["rr", "bf"])?;

        let mut builder = Self::builder(timestamp)
            .vo2(numeric_field(object, "vo2")?)
            .vco2(numeric_field(object, "vco2")?)
            .ve(numeric_field(object, "ve")?)
            .hr(numeric_field(object, "hr")?)
            .rr(rr)
            .rer(numeric_field(object, "rer")?)
            .work_rate(work_rate)
            .spo2(numeric_field(object, "spo2")?)
            .sbp(numeric_field(object, "sbp")?)
            .dbp(numeric_field(object, "dbp")?);

        for (key, raw) in object {
            let lower = key.to_lowercase();
            if KNOWN_KEYS.contains(&lower.as_str()) || ENVELOPE_KEYS.contains(&lower.as_str()) {
                continue;
            }
            let value = match raw {
                Value::Null => None,
                Value::Number(number) => number.as_f64(),
                _ => return Err(SampleError::InvalidType { field: key.clone() }),
            };
            builder = builder.extension(lower, value);
        }

        builder.build()
    }

    /// Seconds since the start of the exam
    #[must_use]
    pub const fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Oxygen uptake
    #[must_use]
    pub const fn vo2(&self) -> f64 {
        self.vo2
    }

    /// Carbon dioxide output
    #[must_use]
    pub const fn vco2(&self) -> f64 {
        self.vco2
    }

    /// Minute ventilation
    #[must_use]
    pub const fn ve(&self) -> f64 {
        self.ve
    }

    /// Heart rate
    #[must_use]
    pub const fn hr(&self) -> f64 {
        self.hr
    }

    /// Respiratory rate
    #[must_use]
    pub const fn rr(&self) -> f64 {
        self.rr
    }

    /// Respiratory exchange ratio
    #[must_use]
    pub const fn rer(&self) -> f64 {
        self.rer
    }

    /// Work rate in watts; zero or below means unloaded pedalling or rest
    #[must_use]
    pub const fn work_rate(&self) -> f64 {
        self.work_rate
    }

    /// Oxygen saturation percentage
    #[must_use]
    pub const fn spo2(&self) -> Option<f64> {
        self.spo2
    }

    /// Systolic blood pressure
    #[must_use]
    pub const fn sbp(&self) -> Option<f64> {
        self.sbp
    }

    /// Diastolic blood pressure
    #[must_use]
    pub const fn dbp(&self) -> Option<f64> {
        self.dbp
    }

    /// Named derived or extra field, if present
    #[must_use]
    pub fn extension(&self, name: &str) -> Option<f64> {
        self.extensions.get(name).copied().flatten()
    }

    /// All extension fields
    #[must_use]
    pub const fn extensions(&self) -> &BTreeMap<String, Option<f64>> {
        &self.extensions
    }

    /// Resolve a feature by name for scoring functions
    ///
    /// Extension values win over direct fields; `ve_vo2`, `ve_vco2` and
    /// `vo2_hr` are derived when not supplied. Unknown names resolve to 0.
    #[must_use]
    pub fn feature(&self, name: &str) -> f64 {
        let lower = name.trim().to_lowercase();
        if let Some(value) = self.extension(&lower) {
            return value;
        }
        let direct = match lower.as_str() {
            "timestamp" | "time" => Some(self.timestamp),
            "vo2" => Some(self.vo2),
            "vco2" => Some(self.vco2),
            "ve" => Some(self.ve),
            "hr" => Some(self.hr),
            "rr" | "bf" => Some(self.rr),
            "rer" => Some(self.rer),
            "work_rate" | "power_load" | "power" => Some(self.work_rate),
            "spo2" => self.spo2,
            "sbp" => self.sbp,
            "dbp" => self.dbp,
            _ => None,
        };
        if let Some(value) = direct {
            return value;
        }
        match lower.as_str() {
            "ve_vo2" => ratio(self.ve, self.vo2),
            "ve_vco2" => ratio(self.ve, self.vco2),
            "vo2_hr" => ratio(self.vo2, self.hr),
            _ => 0.0,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn numeric_field(object: &Map<String, Value>, field: &str) -> Result<Option<f64>, SampleError> {
    let entry = object
        .get_key_value(field)
        .or_else(|| object.iter().find(|(key, _)| key.to_lowercase() == field));
    match entry {
        None | Some((_, Value::Null)) => Ok(None),
        Some((_, Value::Number(number))) => Ok(number.as_f64()),
        Some((key, _)) => Err(SampleError::InvalidType { field: key.clone() }),
    }
}

fn first_present(
    object: &Map<String, Value>,
    aliases: &[&str],
) -> Result<Option<f64>, SampleError> {
    for alias in aliases {
        if let Some(value) = numeric_field(object, alias)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Builder collecting readings before validation
#[derive(Debug, Clone)]
pub struct SampleBuilder {
    timestamp: f64,
    vo2: Option<f64>,
    vco2: Option<f64>,
    ve: Option<f64>,
    hr: Option<f64>,
    rr: Option<f64>,
    rer: Option<f64>,
    work_rate: Option<f64>,
    spo2: Option<f64>,
    sbp: Option<f64>,
    dbp: Option<f64>,
    extensions: BTreeMap<String, Option<f64>>,
}

impl SampleBuilder {
    fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            vo2: None,
            vco2: None,
            ve: None,
            hr: None,
            rr: None,
            rer: None,
            work_rate: None,
            spo2: None,
            sbp: None,
            dbp: None,
            extensions: BTreeMap::new(),
        }
    }

    /// Oxygen uptake
    #[must_use]
    pub fn vo2(mut self, value: impl Into<Option<f64>>) -> Self {
        self.vo2 = value.into();
        self
    }

    /// Carbon dioxide output
    #[must_use]
    pub fn vco2(mut self, value: impl Into<Option<f64>>) -> Self {
        self.vco2 = value.into();
        self
    }

    /// Minute ventilation
    #[must_use]
    pub fn ve(mut self, value: impl Into<Option<f64>>) -> Self {
        self.ve = value.into();
        self
    }

    /// Heart rate
    #[must_use]
    pub fn hr(mut self, value: impl Into<Option<f64>>) -> Self {
        self.hr = value.into();
        self
    }

    /// Respiratory rate
    #[must_use]
    pub fn rr(mut self, value: impl Into<Option<f64>>) -> Self {
        self.rr = value.into();
        self
    }

    /// Respiratory exchange ratio
    #[must_use]
    pub fn rer(mut self, value: impl Into<Option<f64>>) -> Self {
        self.rer = value.into();
        self
    }

    /// Work rate
    #[must_use]
    pub fn work_rate(mut self, value: impl Into<Option<f64>>) -> Self {
        self.work_rate = value.into();
        self
    }

    /// Oxygen saturation
    #[must_use]
    pub fn spo2(mut self, value: impl Into<Option<f64>>) -> Self {
        self.spo2 = value.into();
        self
    }

    /// Systolic pressure
    #[must_use]
    pub fn sbp(mut self, value: impl Into<Option<f64>>) -> Self {
        self.sbp = value.into();
        self
    }

    /// Diastolic pressure
    #[must_use]
    pub fn dbp(mut self, value: impl Into<Option<f64>>) -> Self {
        self.dbp = value.into();
        self
    }

    /// Extension field; the name is lower-cased and non-finite values become absent
    #[must_use]
    pub fn extension(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        let value = value.filter(|v| v.is_finite());
        self.extensions.insert(name.into().to_lowercase(), value);
        self
    }

    /// Validate and freeze the sample
    ///
    /// Missing core readings default to 0; optional readings stay absent.
    ///
    /// # Errors
    ///
    /// Returns a [`SampleError`] for a negative or non-finite timestamp,
    /// non-finite readings, negative physiological values, SpO2 outside
    /// 0-100, or too many extension fields.
    pub fn build(self) -> Result<Sample, SampleError> {
        if !self.timestamp.is_finite() {
            return Err(SampleError::NonFinite {
                field: "timestamp".to_owned(),
            });
        }
        if self.timestamp < 0.0 {
            return Err(out_of_range("timestamp", self.timestamp, "must be >= 0"));
        }
        if self.extensions.len() > MAX_EXTENSION_FIELDS {
            return Err(SampleError::TooManyExtensions {
                count: self.extensions.len(),
                max: MAX_EXTENSION_FIELDS,
            });
        }

        let work_rate = finite("work_rate", self.work_rate)?.unwrap_or(0.0);
        let spo2 = non_negative("spo2", self.spo2)?;
        if let Some(value) = spo2.filter(|v| *v > MAX_SPO2_PERCENT) {
            return Err(out_of_range("spo2", value, "must be within 0-100"));
        }

        Ok(Sample {
            timestamp: self.timestamp,
            vo2: non_negative("vo2", self.vo2)?.unwrap_or(0.0),
            vco2: non_negative("vco2", self.vco2)?.unwrap_or(0.0),
            ve: non_negative("ve", self.ve)?.unwrap_or(0.0),
            hr: non_negative("hr", self.hr)?.unwrap_or(0.0),
            rr: non_negative("rr", self.rr)?.unwrap_or(0.0),
            rer: non_negative("rer", self.rer)?.unwrap_or(0.0),
            work_rate,
            spo2,
            sbp: non_negative("sbp", self.sbp)?,
            dbp: non_negative("dbp", self.dbp)?,
            extensions: self.extensions,
        })
    }
}

fn out_of_range(field: &str, value: f64, reason: &'static str) -> SampleError {
    SampleError::OutOfRange {
        field: field.to_owned(),
        value,
        reason,
    }
}

fn finite(field: &str, value: Option<f64>) -> Result<Option<f64>, SampleError> {
    match value {
        Some(v) if !v.is_finite() => Err(SampleError::NonFinite {
            field: field.to_owned(),
        }),
        other => Ok(other),
    }
}

fn non_negative(field: &str, value: Option<f64>) -> Result<Option<f64>, SampleError> {
    match finite(field, value)? {
        Some(v) if v < 0.0 => Err(out_of_range(field, v, "must be >= 0")),
        other => Ok(other),
    }
}
