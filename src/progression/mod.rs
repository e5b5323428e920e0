//! Progression engine
//!
//! Ties the store to the rules that decide a learner's progress:
//! - Rolling metrics aggregation over a team-configured window
//! - Goal registry with built-in defaults
//! - Unlock gate over the ordered character chain
//! - One-way completion ratchet with snapshots
//! - One-time unlock animation tracking
//! - Transactional reset of a (learner, character) pair
//!
//! Every operation is safe to repeat and to run concurrently for the same
//! pair; the store's insert-if-absent and upsert statements do the arbitration.

pub mod aggregate;
pub mod gate;
pub mod completion;
pub mod animation;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ProgressError, Result};
use crate::store::{ProgressStore, ResetSummary};
use crate::types::{
    normalize_team, require_id, AggregateMetrics, ChainProgress, CharacterProgress, GoalConfig,
    InteractionRecord, ScoreCard,
};

pub use aggregate::{aggregate_window, round_half_up};
pub use gate::{compute_unlock_state, UnlockState};

/// Everything the gate needs for one learner, evaluated together
#[derive(Debug, Clone)]
pub struct GateEvaluation {
    /// `None` when the goal lookup failed
    pub goals: Option<GoalConfig>,
    /// Characters whose aggregate could not be computed are absent
    pub metrics: HashMap<String, AggregateMetrics>,
    pub unlock: UnlockState,
    /// Goals were unavailable, so only the first character is unlocked
    pub degraded: bool,
}

/// Progression operations over a store and a fixed character chain
#[derive(Clone)]
pub struct ProgressService {
    store: ProgressStore,
    chain: Arc<Vec<String>>,
    default_goals: GoalConfig,
}

impl ProgressService {
    pub fn new(store: ProgressStore, chain: Vec<String>, default_goals: GoalConfig) -> Self {
        Self {
            store,
            chain: Arc::new(chain),
            default_goals,
        }
    }

    /// Open the configured database and chain
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let store = ProgressStore::open(&config.storage.database_path).await?;
        Ok(Self::new(
            store,
            config.progression.chain.clone(),
            config.progression.default_goals(),
        ))
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// The ordered character chain
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Chain position of a character
    pub fn position(&self, character_id: &str) -> Option<usize> {
        self.chain.iter().position(|c| c == character_id)
    }

    fn require_in_chain(&self, character_id: &str) -> Result<usize> {
        require_id("characterId", character_id)?;
        self.position(character_id).ok_or_else(|| {
            ProgressError::Validation(format!("unknown character '{}'", character_id))
        })
    }

    /// Append a completed session to the interaction log
    pub async fn record_interaction(
        &self,
        learner_id: &str,
        team_id: Option<&str>,
        character_id: &str,
        scores: ScoreCard,
        session_at: Option<DateTime<Utc>>,
    ) -> Result<InteractionRecord> {
        require_id("learnerId", learner_id)?;
        require_id("characterId", character_id)?;
        scores.validate()?;

        if self.position(character_id).is_none() {
            debug!("Recording session for character '{}' outside the chain", character_id);
        }

        let record = InteractionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            team_id: normalize_team(team_id).map(str::to_string),
            character_id: character_id.to_string(),
            scores,
            session_at: session_at.unwrap_or_else(Utc::now),
        };

        self.store.append_interaction(&record).await?;
        debug!(
            "Recorded session {} for {}/{} (overall {})",
            record.id, learner_id, character_id, scores.overall_performance
        );
        Ok(record)
    }

    /// Team goals, or the built-in defaults when the team has none
    pub async fn get_goals(&self, team_id: Option<&str>) -> Result<GoalConfig> {
        match normalize_team(team_id) {
            None => Ok(self.default_goals.clone()),
            Some(team) => Ok(self
                .store
                .team_goals(team)
                .await?
                .unwrap_or_else(|| self.default_goals.clone())),
        }
    }

    /// Insert or update a team's goals
    pub async fn set_goals(&self, team_id: &str, window_size: u32, threshold: u32) -> Result<GoalConfig> {
        require_id("teamId", team_id)?;
        GoalConfig::new(window_size, threshold)?;

        let goals = self.store.upsert_team_goals(team_id, window_size, threshold).await?;
        info!("Goals for team {} set to N={} T={}", team_id, window_size, threshold);
        Ok(goals)
    }

    /// Goals, per-character aggregates and the resulting unlock flags
    ///
    /// A failed aggregate is logged and left out, which locks the next
    /// character. A failed goal lookup leaves only position 0 unlocked.
    pub async fn evaluate_gate(&self, learner_id: &str, team_id: Option<&str>) -> Result<GateEvaluation> {
        require_id("learnerId", learner_id)?;
        let goals = match self.get_goals(team_id).await {
            Ok(goals) => goals,
            Err(e) => {
                warn!("Goal lookup for {} failed, treating chain as locked: {}", learner_id, e);
                let metrics = HashMap::new();
                let unlock = compute_unlock_state(&self.chain, &metrics, &self.default_goals);
                return Ok(GateEvaluation { goals: None, metrics, unlock, degraded: true });
            }
        };

        let mut metrics = HashMap::new();
        for character in self.chain.iter() {
            match self.aggregate(learner_id, character, goals.window_size).await {
                Ok(m) => {
                    metrics.insert(character.clone(), m);
                }
                Err(e) => warn!("Aggregate for {}/{} failed, treating as locked: {}", learner_id, character, e),
            }
        }

        let unlock = compute_unlock_state(&self.chain, &metrics, &goals);
        Ok(GateEvaluation { goals: Some(goals), metrics, unlock, degraded: false })
    }

    /// Whether one character is unlocked for a learner; failures read as locked
    pub async fn is_unlocked(&self, learner_id: &str, character_id: &str, team_id: Option<&str>) -> Result<bool> {
        require_id("learnerId", learner_id)?;
        let position = self.require_in_chain(character_id)?;
        if position == 0 {
            return Ok(true);
        }

        let previous = &self.chain[position - 1];
        let lookup = async {
            let goals = self.get_goals(team_id).await?;
            let metrics = self.aggregate(learner_id, previous, goals.window_size).await?;
            Ok::<_, ProgressError>(metrics.meets_goal(&goals))
        };

        match lookup.await {
            Ok(unlocked) => Ok(unlocked),
            Err(e) => {
                warn!("Unlock check for {}/{} failed, treating as locked: {}", learner_id, character_id, e);
                Ok(false)
            }
        }
    }

    /// The learner's full progress through the chain
    pub async fn chain_progress(&self, learner_id: &str, team_id: Option<&str>) -> Result<ChainProgress> {
        let gate = self.evaluate_gate(learner_id, team_id).await?;

        let mut characters = Vec::with_capacity(self.chain.len());
        for (position, character) in self.chain.iter().enumerate() {
            let completed = self.store.find_completion(learner_id, character).await?.is_some();
            let animation_shown = self.store.animation_shown_at(learner_id, character).await?.is_some();
            characters.push(CharacterProgress {
                character_id: character.clone(),
                position,
                metrics: gate.metrics.get(character).copied(),
                unlocked: gate.unlock.is_unlocked(character),
                completed,
                animation_shown,
            });
        }

        Ok(ChainProgress {
            learner_id: learner_id.to_string(),
            team_id: normalize_team(team_id).map(str::to_string),
            goals: gate.goals,
            degraded: gate.degraded,
            characters,
        })
    }

    /// Return a pair to its initial state: no sessions, not completed, animation unseen
    pub async fn reset(&self, learner_id: &str, character_id: &str) -> Result<ResetSummary> {
        require_id("learnerId", learner_id)?;
        require_id("characterId", character_id)?;

        let summary = self.store.reset_pair(learner_id, character_id).await?;
        if summary.is_noop() {
            debug!("Reset of {}/{} found nothing to delete", learner_id, character_id);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ProgressService {
        ProgressService::new(
            ProgressStore::in_memory().unwrap(),
            vec!["Megan".into(), "David".into(), "Linda".into()],
            GoalConfig::default(),
        )
    }

    async fn play(svc: &ProgressService, character: &str, overall: f64, sessions: usize) {
        for _ in 0..sessions {
            let mut scores = ScoreCard::uniform(75.0);
            scores.overall_performance = overall;
            svc.record_interaction("m1", Some("team-a"), character, scores, None).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_goals_default_when_missing() {
        let svc = service();
        assert_eq!(svc.get_goals(None).await.unwrap(), GoalConfig::default());
        assert_eq!(svc.get_goals(Some("")).await.unwrap(), GoalConfig::default());
        assert_eq!(svc.get_goals(Some("team-x")).await.unwrap(), GoalConfig::default());
    }

    #[tokio::test]
    async fn test_set_goals_validates_before_writing() {
        let svc = service();
        assert!(matches!(svc.set_goals("team-a", 0, 85).await, Err(ProgressError::Validation(_))));
        assert!(matches!(svc.set_goals("team-a", 10, 120).await, Err(ProgressError::Validation(_))));
        assert!(matches!(svc.set_goals("", 10, 85).await, Err(ProgressError::Validation(_))));
        assert!(svc.store().team_goals("team-a").await.unwrap().is_none());

        let goals = svc.set_goals("team-a", 3, 60).await.unwrap();
        assert_eq!(svc.get_goals(Some("team-a")).await.unwrap().window_size, goals.window_size);
    }

    #[tokio::test]
    async fn test_record_rejects_bad_input() {
        let svc = service();
        let scores = ScoreCard::uniform(50.0);
        assert!(svc.record_interaction("", None, "Megan", scores, None).await.is_err());
        assert!(svc.record_interaction("m1", None, " ", scores, None).await.is_err());
        assert!(svc
            .record_interaction("m1", None, "Megan", ScoreCard::uniform(-1.0), None)
            .await
            .is_err());
        assert_eq!(svc.store().interaction_count("m1", "Megan").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_chain_progress_unlocks_in_order() {
        let svc = service();
        play(&svc, "Megan", 90.0, 10).await;

        let progress = svc.chain_progress("m1", Some("team-a")).await.unwrap();
        let flags: Vec<bool> = progress.characters.iter().map(|c| c.unlocked).collect();
        assert_eq!(flags, vec![true, true, false]);
        assert_eq!(progress.characters[0].metrics.unwrap().total_calls, 10);
        assert!(!progress.characters[0].completed);
    }

    #[tokio::test]
    async fn test_goal_failure_locks_chain_past_first() {
        let svc = service();
        play(&svc, "Megan", 95.0, 10).await;
        svc.store().execute_sql("DROP TABLE team_goals").await.unwrap();

        assert!(!svc.is_unlocked("m1", "David", Some("team-a")).await.unwrap());

        let progress = svc.chain_progress("m1", Some("team-a")).await.unwrap();
        assert!(progress.degraded);
        assert!(progress.goals.is_none());
        let flags: Vec<bool> = progress.characters.iter().map(|c| c.unlocked).collect();
        assert_eq!(flags, vec![true, false, false]);
        assert!(progress.characters.iter().all(|c| c.metrics.is_none()));

        // Requests without a team never touch the goal table
        let untagged = svc.chain_progress("m1", None).await.unwrap();
        assert!(!untagged.degraded);
        assert!(untagged.characters[1].unlocked);
    }

    #[tokio::test]
    async fn test_is_unlocked_rejects_unknown_character() {
        let svc = service();
        assert!(svc.is_unlocked("m1", "Megan", None).await.unwrap());
        assert!(!svc.is_unlocked("m1", "David", None).await.unwrap());
        assert!(matches!(
            svc.is_unlocked("m1", "Zed", None).await,
            Err(ProgressError::Validation(_))
        ));
    }
}
