//! Interaction log: append-only practice session rows

use chrono::DateTime;
use rusqlite::params;

use super::ProgressStore;
use crate::error::{ProgressError, Result};
use crate::types::{InteractionRecord, ScoreCard};

impl ProgressStore {
    /// Append one session outcome
    pub async fn append_interaction(&self, record: &InteractionRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        let s = &record.scores;

        conn.execute(
            r#"INSERT INTO character_interactions
               (id, learner_id, team_id, character_id,
                overall_performance, engagement, objection_handling, information_gathering,
                program_explanation, closing_skills, overall_effectiveness, session_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
            params![
                record.id,
                record.learner_id,
                record.team_id,
                record.character_id,
                s.overall_performance,
                s.engagement,
                s.objection_handling,
                s.information_gathering,
                s.program_explanation,
                s.closing_skills,
                s.overall_effectiveness,
                record.session_at.timestamp_millis(),
            ],
        )?;

        Ok(())
    }

    /// Scores of the most recent `limit` sessions, newest first
    pub async fn recent_scores(&self, learner_id: &str, character_id: &str, limit: u32) -> Result<Vec<ScoreCard>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            r#"SELECT overall_performance, engagement, objection_handling, information_gathering,
                      program_explanation, closing_skills, overall_effectiveness
               FROM character_interactions
               WHERE learner_id = ?1 AND character_id = ?2
               ORDER BY session_at DESC, rowid DESC
               LIMIT ?3"#,
        )?;

        let scores = stmt.query_map(params![learner_id, character_id, limit], |row| {
            Ok(ScoreCard {
                overall_performance: row.get(0)?,
                engagement: row.get(1)?,
                objection_handling: row.get(2)?,
                information_gathering: row.get(3)?,
                program_explanation: row.get(4)?,
                closing_skills: row.get(5)?,
                overall_effectiveness: row.get(6)?,
            })
        })?.collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(scores)
    }

    /// Full session history for a pair, newest first
    pub async fn list_interactions(&self, learner_id: &str, character_id: &str) -> Result<Vec<InteractionRecord>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            r#"SELECT id, learner_id, team_id, character_id,
                      overall_performance, engagement, objection_handling, information_gathering,
                      program_explanation, closing_skills, overall_effectiveness, session_at
               FROM character_interactions
               WHERE learner_id = ?1 AND character_id = ?2
               ORDER BY session_at DESC, rowid DESC"#,
        )?;

        let rows = stmt.query_map(params![learner_id, character_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                ScoreCard {
                    overall_performance: row.get(4)?,
                    engagement: row.get(5)?,
                    objection_handling: row.get(6)?,
                    information_gathering: row.get(7)?,
                    program_explanation: row.get(8)?,
                    closing_skills: row.get(9)?,
                    overall_effectiveness: row.get(10)?,
                },
                row.get::<_, i64>(11)?,
            ))
        })?.collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, learner_id, team_id, character_id, scores, millis)| {
                let session_at = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                    ProgressError::InvariantViolation(format!(
                        "interaction {} has an unrepresentable timestamp {}",
                        id, millis
                    ))
                })?;
                Ok(InteractionRecord { id, learner_id, team_id, character_id, scores, session_at })
            })
            .collect()
    }

    /// Number of sessions logged for a pair
    pub async fn interaction_count(&self, learner_id: &str, character_id: &str) -> Result<u64> {
        let conn = self.conn.lock().await;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM character_interactions WHERE learner_id = ?1 AND character_id = ?2",
            params![learner_id, character_id],
            |row| row.get(0),
        )?;

        Ok(count as u64)
    }
}
