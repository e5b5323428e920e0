//! SQLite-backed progression store
//!
//! Provides:
//! - Append-only interaction log (one row per practice session)
//! - Per-team goal registry with atomic upsert
//! - Insert-if-absent completion records
//! - Unlock animation "shown" records
//! - Transactional reset of a (learner, character) pair

pub mod interactions;
pub mod goals;
pub mod completions;
pub mod animations;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;

/// How long a writer waits on a locked database file before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Rows removed by a reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetSummary {
    pub interactions_deleted: usize,
    pub completion_deleted: bool,
    pub animation_deleted: bool,
}

impl ResetSummary {
    /// True when the pair was already in its initial state
    pub fn is_noop(&self) -> bool {
        self.interactions_deleted == 0 && !self.completion_deleted && !self.animation_deleted
    }
}

/// Shared handle to the progression database
#[derive(Clone)]
pub struct ProgressStore {
    conn: Arc<Mutex<Connection>>,
}

impl ProgressStore {
    /// Open (or create) the database at the given path
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init_schema(&conn)?;

        debug!("Opened progress store at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(r#"
            -- One row per completed practice session; never updated
            CREATE TABLE IF NOT EXISTS character_interactions (
                id TEXT PRIMARY KEY,
                learner_id TEXT NOT NULL,
                team_id TEXT,
                character_id TEXT NOT NULL,
                overall_performance REAL NOT NULL,
                engagement REAL NOT NULL,
                objection_handling REAL NOT NULL,
                information_gathering REAL NOT NULL,
                program_explanation REAL NOT NULL,
                closing_skills REAL NOT NULL,
                overall_effectiveness REAL NOT NULL,
                session_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS team_goals (
                team_id TEXT PRIMARY KEY,
                window_size INTEGER NOT NULL,
                threshold INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS challenge_completions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                learner_id TEXT NOT NULL,
                character_id TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                metrics_json TEXT NOT NULL,
                goals_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS unlock_animations (
                learner_id TEXT NOT NULL,
                character_id TEXT NOT NULL,
                shown_at TEXT NOT NULL,
                PRIMARY KEY (learner_id, character_id)
            );

            CREATE INDEX IF NOT EXISTS idx_interactions_pair
                ON character_interactions(learner_id, character_id, session_at DESC);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_completions_pair
                ON challenge_completions(learner_id, character_id);
        "#)?;

        Ok(())
    }

    /// Delete the pair's interactions, completion and animation record in one transaction
    pub async fn reset_pair(&self, learner_id: &str, character_id: &str) -> Result<ResetSummary> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let interactions_deleted = tx.execute(
            "DELETE FROM character_interactions WHERE learner_id = ?1 AND character_id = ?2",
            params![learner_id, character_id],
        )?;
        let completions_deleted = tx.execute(
            "DELETE FROM challenge_completions WHERE learner_id = ?1 AND character_id = ?2",
            params![learner_id, character_id],
        )?;
        let animations_deleted = tx.execute(
            "DELETE FROM unlock_animations WHERE learner_id = ?1 AND character_id = ?2",
            params![learner_id, character_id],
        )?;

        tx.commit()?;

        let summary = ResetSummary {
            interactions_deleted,
            completion_deleted: completions_deleted > 0,
            animation_deleted: animations_deleted > 0,
        };
        info!(
            "Reset {}/{}: {} interactions, completion={}, animation={}",
            learner_id, character_id, interactions_deleted,
            summary.completion_deleted, summary.animation_deleted
        );
        Ok(summary)
    }
}

/// Parse an RFC 3339 column inside a row mapper
fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

#[cfg(test)]
impl ProgressStore {
    /// Run raw SQL against the connection
    pub(crate) async fn execute_sql(&self, sql: &str) -> Result<()> {
        self.conn.lock().await.execute_batch(sql)?;
        Ok(())
    }
}
