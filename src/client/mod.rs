//! Client side of the progression boundary
//!
//! The poller talks to a [`ProgressBackend`], either the HTTP server
//! ([`HttpBackend`]) or a [`ProgressService`] in the same process. The
//! embedding page is reached through [`HostContext`].

pub mod host;
pub mod http;
pub mod launch;
pub mod poller;

use crate::error::Result;
use crate::progression::ProgressService;
use crate::store::ResetSummary;
use crate::types::{AggregateMetrics, AnimationStatus, CompletionStatus, GoalConfig};

pub use host::{ConsoleHost, HostContext};
pub use http::HttpBackend;
pub use launch::SessionLauncher;
pub use poller::{CharacterView, PollerHandle, PollerOptions, ProgressPoller, ProgressSnapshot};

/// The idempotent operations the polling client relies on
#[async_trait::async_trait]
pub trait ProgressBackend: Send + Sync {
    /// Rolling aggregate under the team's window
    async fn aggregate_metrics(
        &self,
        learner_id: &str,
        character_id: &str,
        team_id: Option<&str>,
    ) -> Result<AggregateMetrics>;

    /// Team goals, defaults when the team has none
    async fn goal_config(&self, team_id: Option<&str>) -> Result<GoalConfig>;

    async fn completion_status(&self, learner_id: &str, character_id: &str) -> Result<CompletionStatus>;

    /// Record completion if mastery is met; safe to repeat
    async fn mark_complete(
        &self,
        learner_id: &str,
        character_id: &str,
        team_id: Option<&str>,
    ) -> Result<CompletionStatus>;

    async fn animation_status(
        &self,
        learner_id: &str,
        character_id: &str,
        team_id: Option<&str>,
    ) -> Result<AnimationStatus>;

    async fn mark_animation_shown(&self, learner_id: &str, character_id: &str) -> Result<()>;

    async fn reset(&self, learner_id: &str, character_id: &str) -> Result<ResetSummary>;
}

#[async_trait::async_trait]
impl ProgressBackend for ProgressService {
    async fn aggregate_metrics(
        &self,
        learner_id: &str,
        character_id: &str,
        team_id: Option<&str>,
    ) -> Result<AggregateMetrics> {
        self.aggregate_for_team(learner_id, character_id, team_id).await
    }

    async fn goal_config(&self, team_id: Option<&str>) -> Result<GoalConfig> {
        self.get_goals(team_id).await
    }

    async fn completion_status(&self, learner_id: &str, character_id: &str) -> Result<CompletionStatus> {
        ProgressService::completion_status(self, learner_id, character_id).await
    }

    async fn mark_complete(
        &self,
        learner_id: &str,
        character_id: &str,
        team_id: Option<&str>,
    ) -> Result<CompletionStatus> {
        self.evaluate_completion(learner_id, character_id, team_id).await
    }

    async fn animation_status(
        &self,
        learner_id: &str,
        character_id: &str,
        team_id: Option<&str>,
    ) -> Result<AnimationStatus> {
        ProgressService::animation_status(self, learner_id, character_id, team_id).await
    }

    async fn mark_animation_shown(&self, learner_id: &str, character_id: &str) -> Result<()> {
        ProgressService::mark_animation_shown(self, learner_id, character_id).await
    }

    async fn reset(&self, learner_id: &str, character_id: &str) -> Result<ResetSummary> {
        ProgressService::reset(self, learner_id, character_id).await
    }
}
