//! Unlock gate: which characters of the chain are playable

use serde::Serialize;
use std::collections::HashMap;

use crate::types::{AggregateMetrics, GoalConfig};

/// Unlock flags in chain order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockState {
    entries: Vec<(String, bool)>,
}

impl UnlockState {
    /// Unknown characters are reported locked
    pub fn is_unlocked(&self, character_id: &str) -> bool {
        self.entries
            .iter()
            .find(|(c, _)| c == character_id)
            .map(|(_, unlocked)| *unlocked)
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(c, u)| (c.as_str(), *u))
    }

    pub fn unlocked(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|(_, u)| *u).map(|(c, _)| c)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Forward scan over the chain
///
/// Position 0 is always unlocked. Position `i > 0` is unlocked iff the
/// character at `i - 1` has metrics meeting `goals`; a missing entry counts
/// as not met.
pub fn compute_unlock_state(
    chain: &[String],
    metrics_by_character: &HashMap<String, AggregateMetrics>,
    goals: &GoalConfig,
) -> UnlockState {
    let mut entries = Vec::with_capacity(chain.len());
    let mut previous: Option<&String> = None;

    for character in chain {
        let unlocked = match previous {
            None => true,
            Some(prev) => metrics_by_character
                .get(prev)
                .is_some_and(|m| m.meets_goal(goals)),
        };
        entries.push((character.clone(), unlocked));
        previous = Some(character);
    }

    UnlockState { entries }
}
