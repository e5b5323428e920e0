//! Rolling metrics aggregation

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use super::ProgressService;
use crate::error::{ProgressError, Result};
use crate::types::{require_id, AggregateMetrics, ScoreCard};

/// Decimal value of a score as written, without binary noise
fn exact(value: f64) -> Decimal {
    value
        .to_string()
        .parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_f64_retain(value))
        .unwrap_or_default()
}

/// Round half up to the nearest integer (scores are never negative)
pub fn round_half_up(value: Decimal) -> u32 {
    if value <= Decimal::ZERO {
        return 0;
    }
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .unwrap_or(u32::MAX)
}

/// Rounded per-field mean of a window of sessions
///
/// Sums are exact decimals, so the result does not depend on session order.
/// Each field is averaged independently and rounded once; an empty window
/// yields all zeros with `total_calls == 0`.
pub fn aggregate_window(window: &[ScoreCard]) -> AggregateMetrics {
    if window.is_empty() {
        return AggregateMetrics::default();
    }

    let mut sums = [Decimal::ZERO; 7];
    for card in window {
        for (sum, (_, value)) in sums.iter_mut().zip(card.fields()) {
            *sum += exact(value);
        }
    }

    let n = Decimal::from(window.len());
    let mean = |i: usize| round_half_up(sums[i] / n);

    AggregateMetrics {
        overall_performance: mean(0),
        engagement: mean(1),
        objection_handling: mean(2),
        information_gathering: mean(3),
        program_explanation: mean(4),
        closing_skills: mean(5),
        overall_effectiveness: mean(6),
        total_calls: window.len() as u32,
    }
}

impl ProgressService {
    /// Average of the most recent `window_size` sessions for a pair
    pub async fn aggregate(&self, learner_id: &str, character_id: &str, window_size: u32) -> Result<AggregateMetrics> {
        require_id("learnerId", learner_id)?;
        require_id("characterId", character_id)?;
        if window_size == 0 {
            return Err(ProgressError::Validation(
                "window size must be a positive integer".to_string(),
            ));
        }

        let window = self.store.recent_scores(learner_id, character_id, window_size).await?;
        let metrics = aggregate_window(&window);
        debug!(
            "Aggregate {}/{} over {} of {} sessions: overall={}",
            learner_id, character_id, metrics.total_calls, window_size, metrics.overall_performance
        );
        Ok(metrics)
    }

    /// Aggregate using the window configured for the team
    pub async fn aggregate_for_team(
        &self,
        learner_id: &str,
        character_id: &str,
        team_id: Option<&str>,
    ) -> Result<AggregateMetrics> {
        let goals = self.get_goals(team_id).await?;
        self.aggregate(learner_id, character_id, goals.window_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rust_decimal_macros::dec;

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(dec!(84.5)), 85);
        assert_eq!(round_half_up(dec!(84.49)), 84);
        assert_eq!(round_half_up(dec!(0.5)), 1);
        assert_eq!(round_half_up(Decimal::ZERO), 0);
        assert_eq!(round_half_up(dec!(100)), 100);
    }

    #[test]
    fn test_exact_mean_at_midpoint_rounds_up_in_any_order() {
        // Mean is exactly 845 / 10 = 84.5; float summation lands just below
        let overall = [88.1, 93.2, 93.6, 87.9, 99.0, 98.5, 93.3, 94.9, 81.3, 15.2];
        let forward: Vec<ScoreCard> = overall.iter().map(|s| ScoreCard::uniform(*s)).collect();
        let reverse: Vec<ScoreCard> = forward.iter().rev().copied().collect();

        assert_eq!(aggregate_window(&forward).overall_performance, 85);
        assert_eq!(aggregate_window(&reverse).overall_performance, 85);
        assert_eq!(aggregate_window(&forward), aggregate_window(&reverse));
    }

    #[test]
    fn test_exact_value_drops_float_noise() {
        assert_eq!(exact(88.1), dec!(88.1));
        assert_eq!(exact(0.1) + exact(0.2), dec!(0.3));
        assert_eq!(exact(100.0), dec!(100));
    }

    #[test]
    fn test_empty_window_is_all_zero() {
        let metrics = aggregate_window(&[]);
        assert_eq!(metrics, AggregateMetrics::default());
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_fields_rounded_independently() {
        let mut a = ScoreCard::uniform(80.0);
        let mut b = ScoreCard::uniform(80.0);
        a.overall_performance = 84.0;
        b.overall_performance = 85.0; // mean 84.5 -> 85
        a.engagement = 70.0;
        b.engagement = 70.8; // mean 70.4 -> 70
        a.closing_skills = 10.0;
        b.closing_skills = 11.0; // mean 10.5 -> 11

        let metrics = aggregate_window(&[a, b]);
        assert_eq!(metrics.overall_performance, 85);
        assert_eq!(metrics.engagement, 70);
        assert_eq!(metrics.closing_skills, 11);
        assert_eq!(metrics.objection_handling, 80);
        assert_eq!(metrics.total_calls, 2);
    }

    #[test]
    fn test_rounds_mean_not_rounded_scores() {
        // Rounding each score first would give (1 + 1 + 0) / 3 -> 1;
        // the true mean is 0.4 which rounds to 0.
        let window: Vec<ScoreCard> = [0.5, 0.5, 0.2].iter().map(|s| ScoreCard::uniform(*s)).collect();
        assert_eq!(aggregate_window(&window).overall_performance, 0);
    }
}
