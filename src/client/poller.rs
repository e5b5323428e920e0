//! Polling client loop
//!
//! One poller per view. Each tick reads goals and aggregates, evaluates the
//! gate, nudges the backend to record completions, and plays unlock
//! animations that have not been shown yet. The backend is the source of
//! truth; the poller only keeps the latest snapshot and a guard against
//! showing the same animation twice from this view.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{HostContext, ProgressBackend, SessionLauncher};
use crate::config::PollerConfig;
use crate::error::{ProgressError, Result};
use crate::progression::compute_unlock_state;
use crate::store::ResetSummary;
use crate::types::{AggregateMetrics, GoalConfig};

#[derive(Debug, Clone, Copy)]
pub struct PollerOptions {
    /// Time between ticks
    pub interval: Duration,
    /// Upper bound on each backend call
    pub request_timeout: Duration,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self::from_config(&PollerConfig::default())
    }
}

impl PollerOptions {
    pub fn from_config(config: &PollerConfig) -> Self {
        Self {
            interval: config.interval(),
            request_timeout: config.request_timeout(),
        }
    }
}

/// One character as seen by the last tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterView {
    pub character_id: String,
    /// `None` when the aggregate lookup failed
    pub metrics: Option<AggregateMetrics>,
    pub unlocked: bool,
    /// `None` when the completion check failed
    pub completed: Option<bool>,
}

/// Result of the most recent tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub learner_id: Option<String>,
    pub team_id: Option<String>,
    /// `None` when the goal lookup failed
    pub goals: Option<GoalConfig>,
    pub characters: Vec<CharacterView>,
    /// Ticks run since the poller started
    pub tick: u64,
    /// Some backend call failed during this tick
    pub degraded: bool,
}

impl ProgressSnapshot {
    pub fn character(&self, character_id: &str) -> Option<&CharacterView> {
        self.characters.iter().find(|c| c.character_id == character_id)
    }

    pub fn is_unlocked(&self, character_id: &str) -> bool {
        self.character(character_id).is_some_and(|c| c.unlocked)
    }

    /// Known to be completed; an unknown state reads false
    pub fn is_completed(&self, character_id: &str) -> bool {
        self.character(character_id).is_some_and(|c| c.completed == Some(true))
    }
}

enum Command {
    Refresh(oneshot::Sender<ProgressSnapshot>),
    Reset {
        character_id: String,
        reply: oneshot::Sender<Result<ResetSummary>>,
    },
    StartSession {
        character_id: String,
        reply: oneshot::Sender<Result<Url>>,
    },
}

/// Log a failed backend call; failures a later tick will not fix are errors
fn report_failure(what: &str, err: &ProgressError) {
    if err.is_transient() {
        warn!("{} failed: {}", what, err);
    } else {
        error!("{} failed: {}", what, err);
    }
}

/// Bound a single backend call; one attempt, no retry
async fn within<T>(limit: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, call).await?
}

pub struct ProgressPoller {
    backend: Arc<dyn ProgressBackend>,
    host: Arc<dyn HostContext>,
    chain: Vec<String>,
    launcher: SessionLauncher,
    options: PollerOptions,
    /// (learner, character) pairs whose animation this view already played
    shown: HashSet<(String, String)>,
    ticks: u64,
    snapshots: watch::Sender<ProgressSnapshot>,
}

impl ProgressPoller {
    pub fn new(
        backend: Arc<dyn ProgressBackend>,
        host: Arc<dyn HostContext>,
        chain: Vec<String>,
        launcher: SessionLauncher,
        options: PollerOptions,
    ) -> Self {
        let (snapshots, _) = watch::channel(ProgressSnapshot::default());
        Self {
            backend,
            host,
            chain,
            launcher,
            options,
            shown: HashSet::new(),
            ticks: 0,
            snapshots,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshots.borrow().clone()
    }

    fn current_learner(&self) -> Option<String> {
        self.host.learner_id().filter(|id| !id.trim().is_empty())
    }

    fn current_team(&self) -> Option<String> {
        self.host.team_id().filter(|id| !id.trim().is_empty())
    }

    fn publish(&self, snapshot: ProgressSnapshot) -> ProgressSnapshot {
        self.snapshots.send_replace(snapshot.clone());
        snapshot
    }

    /// Run one read-evaluate-act cycle and publish its snapshot
    pub async fn tick(&mut self) -> ProgressSnapshot {
        self.ticks += 1;

        let Some(learner_id) = self.current_learner() else {
            debug!("Tick {} skipped: host has no learner id yet", self.ticks);
            return self.publish(ProgressSnapshot {
                tick: self.ticks,
                ..Default::default()
            });
        };
        let team_id = self.current_team();
        let team = team_id.as_deref();
        let learner = learner_id.as_str();
        let backend = self.backend.clone();
        let limit = self.options.request_timeout;
        let mut degraded = false;

        let goals = match within(limit, backend.goal_config(team)).await {
            Ok(goals) => Some(goals),
            Err(e) => {
                report_failure("Goal lookup (chain locked for this tick)", &e);
                degraded = true;
                None
            }
        };

        let lookups = self
            .chain
            .iter()
            .map(|character| within(limit, backend.aggregate_metrics(learner, character, team)));
        let mut metrics = HashMap::new();
        for (character, result) in self.chain.iter().zip(join_all(lookups).await) {
            match result {
                Ok(m) => {
                    metrics.insert(character.clone(), m);
                }
                Err(e) => {
                    report_failure(&format!("Aggregate for {}/{}", learner, character), &e);
                    degraded = true;
                }
            }
        }

        let unlock = match &goals {
            Some(goals) => compute_unlock_state(&self.chain, &metrics, goals),
            // Without goals nothing past the first character can be proven unlocked
            None => compute_unlock_state(&self.chain, &HashMap::new(), &GoalConfig::default()),
        };

        let completions = self.chain.iter().map(|character| {
            let mastered = match (&goals, metrics.get(character)) {
                (Some(goals), Some(m)) => m.meets_goal(goals),
                _ => false,
            };
            let backend = backend.clone();
            async move {
                if mastered {
                    within(limit, backend.mark_complete(learner, character, team)).await
                } else {
                    within(limit, backend.completion_status(learner, character)).await
                }
            }
        });
        let mut completed = HashMap::new();
        for (character, result) in self.chain.iter().zip(join_all(completions).await) {
            match result {
                Ok(status) => {
                    completed.insert(character.as_str(), status.completed);
                }
                Err(e) => {
                    report_failure(&format!("Completion check for {}/{}", learner, character), &e);
                    degraded = true;
                }
            }
        }

        for (character, unlocked) in unlock.iter() {
            let key = (learner_id.clone(), character.to_string());
            if !unlocked || self.shown.contains(&key) {
                continue;
            }
            match within(limit, backend.animation_status(learner, character, team)).await {
                Ok(status) if status.should_show => {
                    self.shown.insert(key);
                    info!("Showing unlock animation for {}/{}", learner, character);
                    self.host.show_unlock_animation(character);
                    if let Err(e) = within(limit, backend.mark_animation_shown(learner, character)).await {
                        report_failure(&format!("Marking animation shown for {}/{}", learner, character), &e);
                        degraded = true;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    report_failure(&format!("Animation status for {}/{}", learner, character), &e);
                    degraded = true;
                }
            }
        }

        let characters = self
            .chain
            .iter()
            .map(|character| CharacterView {
                character_id: character.clone(),
                metrics: metrics.get(character).copied(),
                unlocked: unlock.is_unlocked(character),
                completed: completed.get(character.as_str()).copied(),
            })
            .collect();

        debug!("Tick {} for {} done (degraded: {})", self.ticks, learner, degraded);
        self.publish(ProgressSnapshot {
            learner_id: Some(learner_id.clone()),
            team_id: team_id.clone(),
            goals,
            characters,
            tick: self.ticks,
            degraded,
        })
    }

    /// Reset a character on the backend, forget its local animation guard, re-tick
    pub async fn reset(&mut self, character_id: &str) -> Result<ResetSummary> {
        let learner_id = self
            .current_learner()
            .ok_or_else(|| ProgressError::Validation("learnerId is required".to_string()))?;

        let summary = within(
            self.options.request_timeout,
            self.backend.reset(&learner_id, character_id),
        )
        .await?;

        self.shown.remove(&(learner_id.clone(), character_id.to_string()));
        info!("Reset {}/{} ({} sessions removed)", learner_id, character_id, summary.interactions_deleted);
        self.tick().await;
        Ok(summary)
    }

    /// Hand the learner off to an external session for an unlocked character
    pub fn start_session(&self, character_id: &str) -> Result<Url> {
        let learner_id = self
            .current_learner()
            .ok_or_else(|| ProgressError::Validation("learnerId is required".to_string()))?;

        let unlocked = {
            let snapshot = self.snapshots.borrow();
            snapshot.learner_id.as_deref() == Some(learner_id.as_str()) && snapshot.is_unlocked(character_id)
        };
        if !unlocked {
            return Err(ProgressError::Validation(format!("'{}' is locked", character_id)));
        }

        let team_id = self.current_team();
        let url = self.launcher.launch_url(&learner_id, team_id.as_deref(), character_id)?;
        info!("Starting session for {}/{}", learner_id, character_id);
        self.host.navigate_to(url.as_str());
        Ok(url)
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Refresh(reply) => {
                let snapshot = self.tick().await;
                let _ = reply.send(snapshot);
            }
            Command::Reset { character_id, reply } => {
                let _ = reply.send(self.reset(&character_id).await);
            }
            Command::StartSession { character_id, reply } => {
                let _ = reply.send(self.start_session(&character_id));
            }
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Poller started (interval: {:?}, timeout: {:?})",
            self.options.interval, self.options.request_timeout
        );

        // The first tick of an interval completes immediately
        let mut interval = tokio::time::interval(self.options.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        self.handle(command).await;
                        interval.reset();
                    }
                    None => {
                        debug!("Poller handle dropped");
                        break;
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("Poller shutting down");
                    break;
                }
            }
        }
    }

    /// Move the poller onto its own task
    pub fn spawn(self) -> PollerHandle {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let snapshots = self.subscribe();
        let task = tokio::spawn(self.run(command_rx, shutdown_rx));

        PollerHandle {
            commands: command_tx,
            shutdown: shutdown_tx,
            snapshots,
            task: Some(task),
        }
    }
}

/// Owner of a running poller; dropping it stops the loop
pub struct PollerHandle {
    commands: mpsc::Sender<Command>,
    shutdown: broadcast::Sender<()>,
    snapshots: watch::Receiver<ProgressSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.snapshots.clone()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| ProgressError::PollerStopped)?;
        reply_rx.await.map_err(|_| ProgressError::PollerStopped)
    }

    /// Tick now and return the resulting snapshot
    pub async fn refresh(&self) -> Result<ProgressSnapshot> {
        self.request(Command::Refresh).await
    }

    pub async fn reset(&self, character_id: &str) -> Result<ResetSummary> {
        self.request(|reply| Command::Reset {
            character_id: character_id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn start_session(&self, character_id: &str) -> Result<Url> {
        self.request(|reply| Command::StartSession {
            character_id: character_id.to_string(),
            reply,
        })
        .await?
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}
