//! Persistence of classification run logs

use crate::{ClassificationResult, ClassifyMode, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::fmt;
use tracing::{debug, info};

/// Outcome recorded for calls that ended in an error
pub const FAILED_OUTCOME: &str = "failed";

/// One classification call as recorded in the run log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ClassificationLog {
    /// Assigned by the database; ignored on insert
    pub id: i64,
    /// Unix timestamp in seconds
    pub created_at: i64,
    /// Caller-chosen task name, e.g. "article-categories"
    pub task: String,
    pub mode: String,
    pub items_processed: i64,
    pub groups_created: i64,
    pub attempts: i64,
    pub rate_limited: i64,
    pub outcome: String,
    pub decoding_mode: String,
    pub duration_ms: i64,
    pub error_message: Option<String>,
}

impl ClassificationLog {
    /// Summarize a finished call
    pub fn from_result(
        task: impl Into<String>,
        mode: ClassifyMode,
        items_processed: usize,
        result: &ClassificationResult,
    ) -> Self {
        let report = &result.report;
        let error_message = if report.last_errors.is_empty() {
            None
        } else {
            Some(report.last_errors.join("\n"))
        };

        Self {
            id: 0,
            created_at: chrono::Utc::now().timestamp(),
            task: task.into(),
            mode: mode.to_string(),
            items_processed: items_processed as i64,
            groups_created: result.groups.iter().filter(|g| !g.is_empty()).count() as i64,
            attempts: i64::from(report.attempts),
            rate_limited: i64::from(report.rate_limited),
            outcome: report.outcome.to_string(),
            decoding_mode: report.decoding_mode.to_string(),
            duration_ms: report.duration_ms as i64,
            error_message,
        }
    }

    /// Summarize a call that failed before producing any result
    pub fn from_error(
        task: impl Into<String>,
        mode: ClassifyMode,
        items_processed: usize,
        error: &dyn fmt::Display,
    ) -> Self {
        Self {
            id: 0,
            created_at: chrono::Utc::now().timestamp(),
            task: task.into(),
            mode: mode.to_string(),
            items_processed: items_processed as i64,
            groups_created: 0,
            attempts: 0,
            rate_limited: 0,
            outcome: FAILED_OUTCOME.to_string(),
            decoding_mode: String::new(),
            duration_ms: 0,
            error_message: Some(error.to_string()),
        }
    }
}

/// Run-log operations interface
#[async_trait]
pub trait LogOperations {
    /// Store a log entry, returning its id
    async fn record(&self, log: &ClassificationLog) -> Result<i64>;

    /// Most recent entries, newest first
    async fn recent(&self, limit: u32) -> Result<Vec<ClassificationLog>>;

    /// Total number of entries
    async fn count(&self) -> Result<i64>;
}

/// Run-log store backed by SQLite
#[derive(Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogOperations for LogStore {
    async fn record(&self, log: &ClassificationLog) -> Result<i64> {
        info!(
            "Recording classification log: task={}, outcome={}, attempts={}",
            log.task, log.outcome, log.attempts
        );

        let result = sqlx::query(
            r#"
            INSERT INTO classification_logs (
                created_at, task, mode, items_processed, groups_created,
                attempts, rate_limited, outcome, decoding_mode, duration_ms, error_message
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.created_at)
        .bind(&log.task)
        .bind(&log.mode)
        .bind(log.items_processed)
        .bind(log.groups_created)
        .bind(log.attempts)
        .bind(log.rate_limited)
        .bind(&log.outcome)
        .bind(&log.decoding_mode)
        .bind(log.duration_ms)
        .bind(&log.error_message)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Recorded classification log: {}", id);
        Ok(id)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<ClassificationLog>> {
        debug!("Listing recent classification logs: limit={}", limit);

        let logs = sqlx::query_as::<_, ClassificationLog>(
            r#"
            SELECT id, created_at, task, mode, items_processed, groups_created,
                   attempts, rate_limited, outcome, decoding_mode, duration_ms, error_message
            FROM classification_logs
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM classification_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
