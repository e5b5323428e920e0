//! Goal registry: one row per team

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{parse_timestamp, ProgressStore};
use crate::error::Result;
use crate::types::GoalConfig;

impl ProgressStore {
    /// Stored goals for a team, if the team ever saved any
    pub async fn team_goals(&self, team_id: &str) -> Result<Option<GoalConfig>> {
        let conn = self.conn.lock().await;

        let goals = conn.query_row(
            "SELECT window_size, threshold, updated_at FROM team_goals WHERE team_id = ?1",
            params![team_id],
            |row| {
                let updated_at: String = row.get(2)?;
                Ok(GoalConfig {
                    window_size: row.get(0)?,
                    threshold: row.get(1)?,
                    updated_at: Some(parse_timestamp(2, &updated_at)?),
                })
            },
        ).optional()?;

        Ok(goals)
    }

    /// Insert or overwrite a team's goals in a single statement
    pub async fn upsert_team_goals(&self, team_id: &str, window_size: u32, threshold: u32) -> Result<GoalConfig> {
        let conn = self.conn.lock().await;
        let now = Utc::now();

        conn.execute(
            r#"INSERT INTO team_goals (team_id, window_size, threshold, updated_at)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(team_id) DO UPDATE SET
                   window_size = excluded.window_size,
                   threshold = excluded.threshold,
                   updated_at = excluded.updated_at"#,
            params![team_id, window_size, threshold, now.to_rfc3339()],
        )?;

        Ok(GoalConfig {
            window_size,
            threshold,
            updated_at: Some(now),
        })
    }
}
