//! Unlock animation records

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{parse_timestamp, ProgressStore};
use crate::error::Result;

impl ProgressStore {
    /// When the unlock celebration was first shown for a pair
    pub async fn animation_shown_at(&self, learner_id: &str, character_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().await;

        let shown_at = conn.query_row(
            "SELECT shown_at FROM unlock_animations WHERE learner_id = ?1 AND character_id = ?2",
            params![learner_id, character_id],
            |row| {
                let shown_at: String = row.get(0)?;
                parse_timestamp(0, &shown_at)
            },
        ).optional()?;

        Ok(shown_at)
    }

    /// Record the animation as shown; returns false if it already was
    pub async fn mark_animation_shown(&self, learner_id: &str, character_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;

        let inserted = conn.execute(
            r#"INSERT INTO unlock_animations (learner_id, character_id, shown_at)
               VALUES (?1, ?2, ?3)
               ON CONFLICT(learner_id, character_id) DO NOTHING"#,
            params![learner_id, character_id, Utc::now().to_rfc3339()],
        )?;

        Ok(inserted > 0)
    }
}
