//! Job status state machine and its durable store.
//!
//! ```text
//! Initialized ──▶ Processing ──▶ Completed
//!                      │
//!                      └──────▶ Failed      (only with failure tracking enabled)
//! ```
//!
//! By default a failed job still ends in `Completed`; clients detect failure
//! by the artifact being absent.

use crate::error::{ExportError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::RwLock;

/// Status of one export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Initialized,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Initialized => "Initialized",
            JobStatus::Processing => "Processing",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// The only status a job may hold right before `self`.
    pub fn predecessor(self) -> Option<JobStatus> {
        match self {
            JobStatus::Initialized => None,
            JobStatus::Processing => Some(JobStatus::Initialized),
            JobStatus::Completed | JobStatus::Failed => Some(JobStatus::Processing),
        }
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        next.predecessor() == Some(self)
    }
}

/// Check a status write against the job's current status.
///
/// A job with no recorded status may only be written as `Initialized`.
pub fn check_transition(guid: &str, current: Option<JobStatus>, next: JobStatus) -> Result<()> {
    let legal = match current {
        None => next == JobStatus::Initialized,
        Some(cur) => cur.can_transition_to(next),
    };
    if legal {
        Ok(())
    } else {
        Err(transition_error(guid, current, next))
    }
}

fn transition_error(guid: &str, current: Option<JobStatus>, next: JobStatus) -> ExportError {
    ExportError::InvalidTransition {
        guid: guid.to_string(),
        from: current.map_or("none", JobStatus::as_str).to_string(),
        to: next.as_str().to_string(),
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Initialized" => Ok(JobStatus::Initialized),
            "Processing" => Ok(JobStatus::Processing),
            "Completed" => Ok(JobStatus::Completed),
            "Failed" => Ok(JobStatus::Failed),
            other => Err(ExportError::InvalidInput(format!(
                "unknown job status '{other}'"
            ))),
        }
    }
}

/// Durable mapping from job token to status.
///
/// Implementations must accept concurrent writes to distinct keys, and reject
/// writes that break the state machine ([`check_transition`]) without changing
/// the stored status.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn put(&self, guid: &str, status: JobStatus) -> Result<()>;

    async fn get(&self, guid: &str) -> Result<Option<JobStatus>>;
}

/// SQLite-backed status store (`temp.db`).
#[derive(Debug, Clone)]
pub struct SqliteStatusStore {
    pool: SqlitePool,
}

impl SqliteStatusStore {
    /// Open (creating if needed) the status database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS status (guid TEXT PRIMARY KEY NOT NULL, status TEXT NOT NULL)",
        )
        .execute(&pool)
        .await?;
        tracing::info!(path = %path.display(), "opened export status store");
        Ok(Self { pool })
    }
}

#[async_trait]
impl StatusStore for SqliteStatusStore {
    async fn put(&self, guid: &str, status: JobStatus) -> Result<()> {
        // Single conditional statements, so the check and the write are atomic.
        let written = match status.predecessor() {
            None => {
                sqlx::query(
                    "INSERT INTO status (guid, status) VALUES (?1, ?2) \
                     ON CONFLICT(guid) DO NOTHING",
                )
                .bind(guid)
                .bind(status.as_str())
                .execute(&self.pool)
                .await?
            }
            Some(prev) => {
                sqlx::query("UPDATE status SET status = ?2 WHERE guid = ?1 AND status = ?3")
                    .bind(guid)
                    .bind(status.as_str())
                    .bind(prev.as_str())
                    .execute(&self.pool)
                    .await?
            }
        };
        if written.rows_affected() == 0 {
            let current = self.get(guid).await?;
            return Err(transition_error(guid, current, status));
        }
        Ok(())
    }

    async fn get(&self, guid: &str) -> Result<Option<JobStatus>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT status FROM status WHERE guid = ?1")
            .bind(guid)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(s,)| s.parse()).transpose()
    }
}

/// In-memory status store. Keeps every status written per key, in order.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    entries: RwLock<HashMap<String, Vec<JobStatus>>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status written for `guid`, oldest first.
    pub async fn history(&self, guid: &str) -> Vec<JobStatus> {
        self.entries
            .read()
            .await
            .get(guid)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn put(&self, guid: &str, status: JobStatus) -> Result<()> {
        let mut entries = self.entries.write().await;
        let history = entries.entry(guid.to_string()).or_default();
        check_transition(guid, history.last().copied(), status)?;
        history.push(status);
        Ok(())
    }

    async fn get(&self, guid: &str) -> Result<Option<JobStatus>> {
        Ok(self
            .entries
            .read()
            .await
            .get(guid)
            .and_then(|h| h.last().copied()))
    }
}
