// ABOUTME: Environment configuration management for the realtime server
// ABOUTME: Parses ports, storage locations, detector tunables and replay defaults from env vars
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Environment-based configuration

use crate::realtime::ManagerConfig;
use crate::replay::ReplayDefaults;
use anyhow::{Context, Result};
use cpet_core::constants::{consensus, detector, realtime, replay};
use cpet_detection::DetectorConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 8081;

/// Deployment environment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development
    #[default]
    Development,
    /// Production deployment
    Production,
    /// Automated tests
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Annotation database location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseUrl {
    /// `SQLite` database file
    SQLite {
        /// Path to the database file
        path: PathBuf,
    },
    /// In-memory `SQLite`
    Memory,
}

impl DatabaseUrl {
    /// Parse `sqlite:<path>`, `sqlite::memory:` or a bare path
    #[must_use]
    pub fn parse_url(s: &str) -> Self {
        let path = s.strip_prefix("sqlite:").unwrap_or(s);
        if path == ":memory:" {
            Self::Memory
        } else {
            Self::SQLite {
                path: PathBuf::from(path),
            }
        }
    }

    /// Convert to an sqlx connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".to_owned(),
        }
    }

    /// Check if this is an in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_connection_string())
    }
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP and WebSocket port
    pub http_port: u16,
    /// Deployment environment
    pub environment: Environment,
    /// Directory of `<exam_id>.json` exam files; replay is unavailable without it
    pub data_dir: Option<PathBuf>,
    /// Annotation database; `None` keeps annotations in memory
    pub database: Option<DatabaseUrl>,
    /// Detector tunables applied to new sessions
    pub detector: DetectorConfig,
    /// Buffered samples required before the scoring function is consulted
    pub min_points_for_model: usize,
    /// Latency budget for one scoring call
    pub scoring_timeout: Duration,
    /// Replay defaults for sessions that do not override them
    pub replay: ReplayDefaults,
    /// Agreement tolerance for consensus, in seconds
    pub consensus_delta: f64,
    /// Comma-separated allowed CORS origins, or `*`
    pub cors_allowed_origins: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            environment: Environment::Development,
            data_dir: None,
            database: None,
            detector: DetectorConfig::default(),
            min_points_for_model: realtime::DEFAULT_MIN_POINTS_FOR_MODEL,
            scoring_timeout: Duration::from_millis(realtime::DEFAULT_SCORING_TIMEOUT_MS),
            replay: ReplayDefaults::default(),
            consensus_delta: consensus::DEFAULT_DELTA_SECS,
            cors_allowed_origins: "*".to_owned(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable does not parse or the result fails validation
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let delta: f64 = parse_env("CPET_DELTA_SEC", consensus::DEFAULT_DELTA_SECS)?;

        let config = Self {
            http_port: parse_env("HTTP_PORT", DEFAULT_HTTP_PORT)?,
            environment: Environment::from_str_or_default(
                &env::var("ENVIRONMENT").unwrap_or_default(),
            ),
            data_dir: non_empty_env("CPET_DATA_DIR").map(PathBuf::from),
            database: non_empty_env("CPET_DATABASE_URL").map(|url| DatabaseUrl::parse_url(&url)),
            detector: DetectorConfig {
                threshold: parse_env("CPET_AT_THRESHOLD", detector::DEFAULT_THRESHOLD)?,
                persistence: parse_env("CPET_AT_PERSISTENCE", detector::DEFAULT_PERSISTENCE)?,
                window_size: parse_env("CPET_WINDOW_SIZE", detector::DEFAULT_WINDOW_SIZE)?,
                transition_window_secs: parse_env(
                    "CPET_TRANSITION_SECS",
                    detector::DEFAULT_TRANSITION_WINDOW_SECS,
                )?,
            },
            min_points_for_model: parse_env(
                "CPET_MIN_POINTS_FOR_MODEL",
                realtime::DEFAULT_MIN_POINTS_FOR_MODEL,
            )?,
            scoring_timeout: Duration::from_millis(parse_env(
                "CPET_SCORING_TIMEOUT_MS",
                realtime::DEFAULT_SCORING_TIMEOUT_MS,
            )?),
            replay: ReplayDefaults {
                speed: parse_env("CPET_SIM_SPEED", replay::DEFAULT_SPEED)?,
                smoothing: non_empty_env("CPET_SIM_SMOOTH").unwrap_or_else(|| "none".to_owned()),
                default_step_secs: delta,
            },
            consensus_delta: delta,
            cors_allowed_origins: non_empty_env("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| "*".to_owned()),
        };

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        self.detector
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid detector configuration: {}", e.message))?;

        if !(self.replay.speed.is_finite() && self.replay.speed > 0.0) {
            return Err(anyhow::anyhow!(
                "CPET_SIM_SPEED must be a positive number, got {}",
                self.replay.speed
            ));
        }
        if !(self.consensus_delta.is_finite() && self.consensus_delta >= 0.0) {
            return Err(anyhow::anyhow!(
                "CPET_DELTA_SEC must be a non-negative number, got {}",
                self.consensus_delta
            ));
        }
        if self.scoring_timeout.is_zero() {
            return Err(anyhow::anyhow!("CPET_SCORING_TIMEOUT_MS must be positive"));
        }
        Ok(())
    }

    /// Session manager settings derived from this configuration
    #[must_use]
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            detector: self.detector,
            min_points_for_model: self.min_points_for_model,
            scoring_timeout: self.scoring_timeout,
            replay: self.replay.clone(),
            ..ManagerConfig::default()
        }
    }

    /// Get a summary of the configuration for logging
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "CPET Realtime Server Configuration:\n\
             - HTTP Port: {}\n\
             - Environment: {}\n\
             - Exam Data: {}\n\
             - Annotations: {}\n\
             - AT Threshold: {} (persistence {}, window {})\n\
             - Transition Window: {}s\n\
             - Model Min Points: {}\n\
             - Scoring Timeout: {}ms\n\
             - Replay: speed {}x, smoothing {}, step {}s\n\
             - Consensus Delta: {}s",
            self.http_port,
            self.environment,
            self.data_dir
                .as_ref()
                .map_or_else(|| "Disabled".to_owned(), |p| p.display().to_string()),
            self.database
                .as_ref()
                .map_or_else(|| "In-memory".to_owned(), ToString::to_string),
            self.detector.threshold,
            self.detector.persistence,
            self.detector.window_size,
            self.detector.transition_window_secs,
            self.min_points_for_model,
            self.scoring_timeout.as_millis(),
            self.replay.speed,
            self.replay.smoothing,
            self.replay.default_step_secs,
            self.consensus_delta,
        )
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            Environment::from_str_or_default("prod"),
            Environment::Production
        );
        assert_eq!(Environment::from_str_or_default("TEST"), Environment::Testing);
        assert_eq!(
            Environment::from_str_or_default("anything"),
            Environment::Development
        );
    }

    #[test]
    fn test_database_url_parsing() {
        assert!(DatabaseUrl::parse_url("sqlite::memory:").is_memory());
        assert_eq!(
            DatabaseUrl::parse_url("sqlite:./data/annotations.db"),
            DatabaseUrl::SQLite {
                path: PathBuf::from("./data/annotations.db")
            }
        );
        assert_eq!(
            DatabaseUrl::parse_url("annotations.db").to_connection_string(),
            "sqlite:annotations.db"
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.summary().contains("HTTP Port: 8081"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.replay.speed = 0.0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.consensus_delta = -1.0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.detector.threshold = 0.0;
        assert!(config.validate().is_err());
    }
}
