// ABOUTME: Shared server resources handed to every route as axum state
// ABOUTME: Session manager, consensus resolver and configuration behind one Arc
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::config::ServerConfig;
use crate::consensus::{AnnotationStore, ConsensusResolver, InMemoryAnnotationStore};
use crate::realtime::SessionManager;
use crate::replay::{ExamStore, JsonExamStore};
use cpet_core::errors::AppResult;
use cpet_detection::ScoringFunction;
use std::sync::Arc;
use tracing::info;

/// Long-lived services shared by all routes
pub struct ServerResources {
    /// Realtime session manager
    pub sessions: Arc<SessionManager>,
    /// Annotation consensus service
    pub consensus: ConsensusResolver,
    /// Server configuration
    pub config: Arc<ServerConfig>,
}

impl ServerResources {
    /// Bundle the services
    #[must_use]
    pub const fn new(
        sessions: Arc<SessionManager>,
        consensus: ConsensusResolver,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            sessions,
            consensus,
            config,
        }
    }

    /// Build every service from configuration around an injected scoring function
    ///
    /// Replay is enabled when `data_dir` is set. Annotations go to `SQLite`
    /// when a database URL is configured, otherwise they stay in memory.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a database is configured but
    /// `SQLite` support is not compiled in, or a database error when it
    /// cannot be opened.
    pub async fn from_config(
        config: Arc<ServerConfig>,
        scorer: Arc<dyn ScoringFunction>,
    ) -> AppResult<Self> {
        let exam_store = config.data_dir.as_ref().map(|dir| {
            info!(data_dir = %dir.display(), "Exam replay enabled");
            Arc::new(JsonExamStore::new(dir)) as Arc<dyn ExamStore>
        });

        let annotation_store: Arc<dyn AnnotationStore> = match &config.database {
            Some(database) => open_annotation_database(&database.to_connection_string()).await?,
            None => {
                info!("Annotations kept in memory");
                Arc::new(InMemoryAnnotationStore::new())
            }
        };

        let sessions = Arc::new(SessionManager::new(
            config.manager_config(),
            scorer,
            exam_store,
        ));
        let consensus = ConsensusResolver::new(annotation_store, config.consensus_delta);
        Ok(Self::new(sessions, consensus, config))
    }
}

#[cfg(feature = "sqlite")]
async fn open_annotation_database(url: &str) -> AppResult<Arc<dyn AnnotationStore>> {
    let store = crate::consensus::SqliteAnnotationStore::new(url).await?;
    info!(database = url, "Annotation database ready");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_annotation_database(url: &str) -> AppResult<Arc<dyn AnnotationStore>> {
    Err(cpet_core::errors::AppError::config(format!(
        "CPET_DATABASE_URL={url} requires the sqlite feature"
    )))
}
