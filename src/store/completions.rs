//! Completion records: insert-if-absent, never overwritten

use rusqlite::{params, Connection};
use tracing::error;

use super::{parse_timestamp, ProgressStore};
use crate::error::{ProgressError, Result};
use crate::types::CompletionRecord;

impl ProgressStore {
    /// The pair's completion record, if any
    ///
    /// More than one row for a pair is an `InvariantViolation`.
    pub async fn find_completion(&self, learner_id: &str, character_id: &str) -> Result<Option<CompletionRecord>> {
        let conn = self.conn.lock().await;
        load_completion(&conn, learner_id, character_id)
    }

    /// Insert `candidate` unless the pair already has a record
    ///
    /// Returns the record that is stored afterwards (the earlier winner when
    /// the insert was a no-op) and whether this call created it.
    pub async fn insert_completion_if_absent(&self, candidate: &CompletionRecord) -> Result<(CompletionRecord, bool)> {
        let conn = self.conn.lock().await;

        let inserted = conn.execute(
            r#"INSERT INTO challenge_completions
               (learner_id, character_id, completed_at, metrics_json, goals_json)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(learner_id, character_id) DO NOTHING"#,
            params![
                candidate.learner_id,
                candidate.character_id,
                candidate.completed_at.to_rfc3339(),
                serde_json::to_string(&candidate.metrics)?,
                serde_json::to_string(&candidate.goals)?,
            ],
        )?;

        let stored = load_completion(&conn, &candidate.learner_id, &candidate.character_id)?
            .ok_or_else(|| {
                ProgressError::InvariantViolation(format!(
                    "completion for {}/{} missing right after insert",
                    candidate.learner_id, candidate.character_id
                ))
            })?;

        Ok((stored, inserted > 0))
    }
}

fn load_completion(conn: &Connection, learner_id: &str, character_id: &str) -> Result<Option<CompletionRecord>> {
    let mut stmt = conn.prepare_cached(
        r#"SELECT completed_at, metrics_json, goals_json
           FROM challenge_completions
           WHERE learner_id = ?1 AND character_id = ?2"#,
    )?;

    let rows = stmt.query_map(params![learner_id, character_id], |row| {
        let completed_at: String = row.get(0)?;
        Ok((
            parse_timestamp(0, &completed_at)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?.collect::<std::result::Result<Vec<_>, _>>()?;

    if rows.len() > 1 {
        error!(
            "Found {} completion records for {}/{}; insert-if-absent was bypassed",
            rows.len(), learner_id, character_id
        );
        return Err(ProgressError::InvariantViolation(format!(
            "{} completion records for {}/{}",
            rows.len(), learner_id, character_id
        )));
    }

    match rows.into_iter().next() {
        Some((completed_at, metrics_json, goals_json)) => Ok(Some(CompletionRecord {
            learner_id: learner_id.to_string(),
            character_id: character_id.to_string(),
            completed_at,
            metrics: serde_json::from_str(&metrics_json)?,
            goals: serde_json::from_str(&goals_json)?,
        })),
        None => Ok(None),
    }
}
