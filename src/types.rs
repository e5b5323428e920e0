//! Shared types used across modules
//!
//! Score cards, rolling aggregates, team goals and the completion/animation
//! records that the store, the server and the polling client all exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ProgressError, Result};

/// Default rolling window (number of most recent sessions averaged)
pub const DEFAULT_WINDOW_SIZE: u32 = 10;

/// Default mastery threshold for the rolling overall score
pub const DEFAULT_THRESHOLD: u32 = 85;

/// Highest value any score or threshold may take
pub const MAX_SCORE: f64 = 100.0;

/// Scores produced by one completed practice session
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreCard {
    /// The overall score, judged against the mastery threshold
    pub overall_performance: f64,
    pub engagement: f64,
    pub objection_handling: f64,
    pub information_gathering: f64,
    pub program_explanation: f64,
    pub closing_skills: f64,
    pub overall_effectiveness: f64,
}

impl ScoreCard {
    /// Same score in every field
    pub fn uniform(score: f64) -> Self {
        Self {
            overall_performance: score,
            engagement: score,
            objection_handling: score,
            information_gathering: score,
            program_explanation: score,
            closing_skills: score,
            overall_effectiveness: score,
        }
    }

    /// Field names paired with their values, in storage column order
    pub fn fields(&self) -> [(&'static str, f64); 7] {
        [
            ("overall_performance", self.overall_performance),
            ("engagement", self.engagement),
            ("objection_handling", self.objection_handling),
            ("information_gathering", self.information_gathering),
            ("program_explanation", self.program_explanation),
            ("closing_skills", self.closing_skills),
            ("overall_effectiveness", self.overall_effectiveness),
        ]
    }

    /// Reject NaN, infinities and anything outside 0..=100
    pub fn validate(&self) -> Result<()> {
        for (name, value) in self.fields() {
            if !value.is_finite() || !(0.0..=MAX_SCORE).contains(&value) {
                return Err(ProgressError::Validation(format!(
                    "{} must be between 0 and 100 (got {})",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// One logged practice session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub id: String,
    pub learner_id: String,
    pub team_id: Option<String>,
    pub character_id: String,
    pub scores: ScoreCard,
    pub session_at: DateTime<Utc>,
}

/// Rounded rolling averages over the most recent sessions of a pair
///
/// Derived on every query; never stored except as a completion snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub overall_performance: u32,
    pub engagement: u32,
    pub objection_handling: u32,
    pub information_gathering: u32,
    pub program_explanation: u32,
    pub closing_skills: u32,
    pub overall_effectiveness: u32,
    /// Number of sessions actually averaged (may be below the window size)
    pub total_calls: u32,
}

impl AggregateMetrics {
    /// Mastery: overall average at or above the threshold over a full window
    pub fn meets_goal(&self, goals: &GoalConfig) -> bool {
        self.overall_performance >= goals.threshold && self.total_calls >= goals.window_size
    }

    /// True when no sessions were found
    pub fn is_empty(&self) -> bool {
        self.total_calls == 0
    }
}

/// Per-team definition of mastery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalConfig {
    /// Number of most recent sessions averaged (N)
    pub window_size: u32,
    /// Minimum rolling overall score (T), inclusive
    pub threshold: u32,
    /// When the team row was last written; `None` for built-in defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl GoalConfig {
    pub fn new(window_size: u32, threshold: u32) -> Result<Self> {
        let goals = Self {
            window_size,
            threshold,
            updated_at: None,
        };
        goals.validate()?;
        Ok(goals)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(ProgressError::Validation(
                "window size must be a positive integer".to_string(),
            ));
        }
        if f64::from(self.threshold) > MAX_SCORE {
            return Err(ProgressError::Validation(format!(
                "threshold must be between 0 and 100 (got {})",
                self.threshold
            )));
        }
        Ok(())
    }
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            threshold: DEFAULT_THRESHOLD,
            updated_at: None,
        }
    }
}

/// Permanent record that a learner mastered a character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub learner_id: String,
    pub character_id: String,
    pub completed_at: DateTime<Utc>,
    /// Aggregate in effect when completion was first recorded
    pub metrics: AggregateMetrics,
    /// Goals in effect when completion was first recorded
    pub goals: GoalConfig,
}

/// Answer to "has this pair been completed?"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionStatus {
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<CompletionRecord>,
}

impl From<Option<CompletionRecord>> for CompletionStatus {
    fn from(record: Option<CompletionRecord>) -> Self {
        Self {
            completed: record.is_some(),
            snapshot: record,
        }
    }
}

/// Unlock celebration state for a pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationStatus {
    /// A shown record exists
    pub shown: bool,
    /// The unlock gate currently reports the character unlocked
    pub unlocked: bool,
    /// Not yet shown and unlocked
    pub should_show: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shown_at: Option<DateTime<Utc>>,
}

/// Progress of one character in the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterProgress {
    pub character_id: String,
    pub position: usize,
    /// `None` when the aggregate could not be computed
    pub metrics: Option<AggregateMetrics>,
    pub unlocked: bool,
    pub completed: bool,
    pub animation_shown: bool,
}

/// Progress of a learner through the whole chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainProgress {
    pub learner_id: String,
    pub team_id: Option<String>,
    /// `None` when the goal lookup failed
    pub goals: Option<GoalConfig>,
    /// Goals were unavailable, so everything past the first character reads locked
    #[serde(default)]
    pub degraded: bool,
    pub characters: Vec<CharacterProgress>,
}

/// Reject a missing or blank identifier
pub fn require_id<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(ProgressError::Validation(format!("{} is required", field)));
    }
    Ok(value)
}

/// Treat blank team ids as absent
pub fn normalize_team(team_id: Option<&str>) -> Option<&str> {
    team_id.filter(|t| !t.trim().is_empty())
}
