//! Practice Progress - progression and completion engine
//!
//! Tracks a learner's way through an ordered chain of practice characters:
//! - Append-only session log in SQLite
//! - Rolling averages over a team-configured window
//! - Unlock gate driven by the previous character's mastery
//! - One-way completion ratchet with frozen goal snapshots
//! - One-time unlock animations
//! - Transactional reset of a learner/character pair
//! - HTTP API and a polling client for embedded widgets
//!
//! # Example
//!
//! ```ignore
//! use practice_progress::{Config, ProgressService, ScoreCard};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = ProgressService::from_config(&Config::load()?).await?;
//!     service.record_interaction("m-42", None, "Megan", ScoreCard::uniform(90.0), None).await?;
//!     let progress = service.chain_progress("m-42", None).await?;
//!     println!("{:?}", progress.characters);
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod error;
pub mod types;
pub mod config;
pub mod store;
pub mod progression;

// Boundary modules
pub mod server;
pub mod client;
pub mod cli;

// Re-export commonly used types for convenience
pub use error::{ProgressError, Result};

pub use types::{
    AggregateMetrics,
    AnimationStatus,
    ChainProgress,
    CompletionRecord,
    CompletionStatus,
    GoalConfig,
    InteractionRecord,
    ScoreCard,
};

pub use config::Config;

pub use store::{ProgressStore, ResetSummary};

pub use progression::{compute_unlock_state, ProgressService, UnlockState};

pub use client::{
    ConsoleHost,
    HostContext,
    HttpBackend,
    PollerHandle,
    ProgressBackend,
    ProgressPoller,
    ProgressSnapshot,
};

pub use server::{
    ServerState,
    router,
    start as start_server,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Practice progression engine", NAME, VERSION)
}
