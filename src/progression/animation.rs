//! Unlock animation tracker

use tracing::debug;

use super::ProgressService;
use crate::error::Result;
use crate::types::{require_id, AnimationStatus};

impl ProgressService {
    /// Shown/unlocked flags for a pair and whether the celebration is due
    pub async fn animation_status(
        &self,
        learner_id: &str,
        character_id: &str,
        team_id: Option<&str>,
    ) -> Result<AnimationStatus> {
        require_id("learnerId", learner_id)?;
        require_id("characterId", character_id)?;

        let shown_at = self.store.animation_shown_at(learner_id, character_id).await?;
        let unlocked = self.is_unlocked(learner_id, character_id, team_id).await?;

        Ok(AnimationStatus {
            shown: shown_at.is_some(),
            unlocked,
            should_show: shown_at.is_none() && unlocked,
            shown_at,
        })
    }

    /// True only while the character is unlocked and the celebration was never recorded
    pub async fn should_show_unlock_animation(
        &self,
        learner_id: &str,
        character_id: &str,
        team_id: Option<&str>,
    ) -> Result<bool> {
        Ok(self.animation_status(learner_id, character_id, team_id).await?.should_show)
    }

    /// Record that the celebration was displayed; repeated calls are no-ops
    pub async fn mark_animation_shown(&self, learner_id: &str, character_id: &str) -> Result<()> {
        require_id("learnerId", learner_id)?;
        require_id("characterId", character_id)?;

        if self.store.mark_animation_shown(learner_id, character_id).await? {
            debug!("Unlock animation for {}/{} marked shown", learner_id, character_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ProgressStore;
    use crate::types::{GoalConfig, ScoreCard};

    fn service() -> ProgressService {
        ProgressService::new(
            ProgressStore::in_memory().unwrap(),
            vec!["Megan".into(), "David".into()],
            GoalConfig { window_size: 2, threshold: 80, updated_at: None },
        )
    }

    #[tokio::test]
    async fn test_locked_character_never_animates() {
        let svc = service();
        let status = svc.animation_status("m1", "David", None).await.unwrap();
        assert!(!status.unlocked);
        assert!(!status.shown);
        assert!(!status.should_show);
    }

    #[tokio::test]
    async fn test_animation_once_until_reset() {
        let svc = service();
        for _ in 0..2 {
            svc.record_interaction("m1", None, "Megan", ScoreCard::uniform(90.0), None).await.unwrap();
        }

        assert!(svc.should_show_unlock_animation("m1", "David", None).await.unwrap());
        assert!(svc.should_show_unlock_animation("m1", "David", None).await.unwrap());

        svc.mark_animation_shown("m1", "David").await.unwrap();
        svc.mark_animation_shown("m1", "David").await.unwrap();
        let status = svc.animation_status("m1", "David", None).await.unwrap();
        assert!(status.shown && status.unlocked && !status.should_show);
        assert!(status.shown_at.is_some());

        svc.reset("m1", "David").await.unwrap();
        assert!(svc.should_show_unlock_animation("m1", "David", None).await.unwrap());
    }
}
