// ABOUTME: SQLite annotation store with an append-only annotations table and keyed consensus table
// ABOUTME: Consensus writes use ON CONFLICT upserts so concurrent readers never race per exam
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::AnnotationStore;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use cpet_core::errors::{AppError, AppResult};
use cpet_core::models::{Annotation, ConsensusRecord, ConsensusStatus, ReaderRole};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};

/// Annotation store persisted in `SQLite`
#[derive(Clone)]
pub struct SqliteAnnotationStore {
    pool: Pool<Sqlite>,
}

impl SqliteAnnotationStore {
    /// Connect to `database_url` and create the tables
    ///
    /// In-memory databases use a single long-lived connection so every query
    /// sees the same database.
    ///
    /// # Errors
    ///
    /// Returns a database error when the connection or migration fails.
    pub async fn new(database_url: &str) -> AppResult<Self> {
        let connected = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(database_url)
                .await
        } else {
            SqlitePoolOptions::new()
                .connect(&create_if_missing(database_url))
                .await
        };
        let pool = connected.map_err(db_error("connect to annotation database"))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create the annotation and consensus tables
    ///
    /// # Errors
    ///
    /// Returns a database error when a statement fails.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS annotations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                exam_id TEXT NOT NULL,
                reader_id TEXT NOT NULL,
                role TEXT NOT NULL, -- 'a', 'b', 'adjudicator'
                crossing_time REAL NOT NULL,
                smoothing TEXT,
                notes TEXT,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error("create annotations table"))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_annotations_exam ON annotations(exam_id)")
            .execute(&self.pool)
            .await
            .map_err(db_error("create annotations index"))?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS consensus (
                exam_id TEXT PRIMARY KEY,
                delta REAL NOT NULL,
                status TEXT NOT NULL,
                t_a REAL,
                t_b REAL,
                t_adjudicator REAL,
                ground_truth REAL,
                updated_at TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error("create consensus table"))?;

        Ok(())
    }
}

#[async_trait]
impl AnnotationStore for SqliteAnnotationStore {
    async fn append(&self, annotation: &Annotation) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO annotations (exam_id, reader_id, role, crossing_time, smoothing, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(&annotation.exam_id)
        .bind(&annotation.reader_id)
        .bind(annotation.role.as_str())
        .bind(annotation.crossing_time)
        .bind(annotation.smoothing.as_deref())
        .bind(annotation.notes.as_deref())
        .bind(timestamp(annotation.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_error("insert annotation"))?;
        Ok(())
    }

    async fn annotations(&self, exam_id: &str) -> AppResult<Vec<Annotation>> {
        let rows = sqlx::query(
            r"
            SELECT exam_id, reader_id, role, crossing_time, smoothing, notes, created_at
            FROM annotations
            WHERE exam_id = $1
            ORDER BY id ASC
            ",
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("load annotations"))?;

        rows.iter().map(annotation_from_row).collect()
    }

    async fn upsert_consensus(&self, record: &ConsensusRecord) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO consensus (exam_id, delta, status, t_a, t_b, t_adjudicator, ground_truth, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT(exam_id) DO UPDATE SET
                delta = excluded.delta,
                status = excluded.status,
                t_a = excluded.t_a,
                t_b = excluded.t_b,
                t_adjudicator = excluded.t_adjudicator,
                ground_truth = excluded.ground_truth,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&record.exam_id)
        .bind(record.delta)
        .bind(record.status.as_str())
        .bind(record.t_a)
        .bind(record.t_b)
        .bind(record.t_adjudicator)
        .bind(record.ground_truth)
        .bind(record.updated_at.map(timestamp))
        .execute(&self.pool)
        .await
        .map_err(db_error("upsert consensus"))?;
        Ok(())
    }

    async fn consensus(&self, exam_id: &str) -> AppResult<Option<ConsensusRecord>> {
        let row = sqlx::query(
            r"
            SELECT exam_id, delta, status, t_a, t_b, t_adjudicator, ground_truth, updated_at
            FROM consensus
            WHERE exam_id = $1
            ",
        )
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("load consensus"))?;

        row.as_ref().map(record_from_row).transpose()
    }
}

fn db_error(operation: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| AppError::database(format!("Failed to {operation}: {e}")).with_source(e)
}

/// Full-precision RFC 3339 so stored creation times order and round-trip exactly
/// Ensure SQLite creates the database file if it doesn't exist
fn create_if_missing(database_url: &str) -> String {
    if !database_url.starts_with("sqlite:") || database_url.contains("mode=") {
        database_url.to_owned()
    } else if database_url.contains('?') {
        format!("{database_url}&mode=rwc")
    } else {
        format!("{database_url}?mode=rwc")
    }
}

fn timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| AppError::database(format!("Invalid stored timestamp '{value}': {e}")))
}

fn annotation_from_row(row: &SqliteRow) -> AppResult<Annotation> {
    let role: String = row.try_get("role").map_err(db_error("read role"))?;
    let role: ReaderRole = role
        .parse()
        .map_err(|_| AppError::database(format!("Invalid stored role '{role}'")))?;
    let created_at: String = row.try_get("created_at").map_err(db_error("read created_at"))?;

    Ok(Annotation {
        exam_id: row.try_get("exam_id").map_err(db_error("read exam_id"))?,
        reader_id: row.try_get("reader_id").map_err(db_error("read reader_id"))?,
        role,
        crossing_time: row
            .try_get("crossing_time")
            .map_err(db_error("read crossing_time"))?,
        smoothing: row.try_get("smoothing").map_err(db_error("read smoothing"))?,
        notes: row.try_get("notes").map_err(db_error("read notes"))?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn record_from_row(row: &SqliteRow) -> AppResult<ConsensusRecord> {
    let status: String = row.try_get("status").map_err(db_error("read status"))?;
    let updated_at: Option<String> = row.try_get("updated_at").map_err(db_error("read updated_at"))?;

    Ok(ConsensusRecord {
        exam_id: row.try_get("exam_id").map_err(db_error("read exam_id"))?,
        delta: row.try_get("delta").map_err(db_error("read delta"))?,
        status: status.parse::<ConsensusStatus>()?,
        t_a: row.try_get("t_a").map_err(db_error("read t_a"))?,
        t_b: row.try_get("t_b").map_err(db_error("read t_b"))?,
        t_adjudicator: row
            .try_get("t_adjudicator")
            .map_err(db_error("read t_adjudicator"))?,
        ground_truth: row
            .try_get("ground_truth")
            .map_err(db_error("read ground_truth"))?,
        updated_at: updated_at.as_deref().map(parse_timestamp).transpose()?,
    })
}
