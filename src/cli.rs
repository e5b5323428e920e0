//! CLI interface for practice-progress

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::client::{
    ConsoleHost, HttpBackend, PollerOptions, ProgressBackend, ProgressPoller, ProgressSnapshot, SessionLauncher,
};
use crate::config::{self, Config};
use crate::progression::ProgressService;
use crate::types::{AggregateMetrics, ChainProgress, ScoreCard};

#[derive(Parser)]
#[command(name = "practice-progress")]
#[command(about = "Progression and completion tracking for character practice sessions", long_about = None)]
#[command(version)]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(long, global = true, env = "PRACTICE_PROGRESS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (default from config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (default from config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Log a completed practice session
    Record {
        #[arg(short, long)]
        learner: String,
        #[arg(short, long)]
        character: String,
        #[arg(short, long)]
        team: Option<String>,
        /// Overall performance score (0-100)
        #[arg(long)]
        overall: f64,
        /// Sub-scores default to the overall score when omitted
        #[arg(long)]
        engagement: Option<f64>,
        #[arg(long)]
        objection_handling: Option<f64>,
        #[arg(long)]
        information_gathering: Option<f64>,
        #[arg(long)]
        program_explanation: Option<f64>,
        #[arg(long)]
        closing_skills: Option<f64>,
        #[arg(long)]
        overall_effectiveness: Option<f64>,
    },
    /// Show the rolling aggregate for a learner and character
    Aggregate {
        #[arg(short, long)]
        learner: String,
        #[arg(short, long)]
        character: String,
        #[arg(short, long)]
        team: Option<String>,
        /// Override the team's window size
        #[arg(short, long)]
        window: Option<u32>,
    },
    /// List logged sessions for a learner and character, newest first
    History {
        #[arg(short, long)]
        learner: String,
        #[arg(short, long)]
        character: String,
    },
    /// Manage team goals
    Goals {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Show a learner's progress through the character chain
    Status {
        #[arg(short, long)]
        learner: String,
        #[arg(short, long)]
        team: Option<String>,
    },
    /// Record completion if the learner has mastered the character
    Complete {
        #[arg(short, long)]
        learner: String,
        #[arg(short, long)]
        character: String,
        #[arg(short, long)]
        team: Option<String>,
    },
    /// Remove all progress for a learner and character
    Reset {
        #[arg(short, long)]
        learner: String,
        #[arg(short, long)]
        character: String,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Poll progress like an embedded widget until Ctrl-C
    Watch {
        #[arg(short, long)]
        learner: String,
        #[arg(short, long)]
        team: Option<String>,
        /// Read the database directly instead of the server
        #[arg(long)]
        local: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Show goals (team goals or the defaults)
    Get {
        #[arg(short, long)]
        team: Option<String>,
    },
    /// Set a team's window size and threshold
    Set {
        #[arg(short, long)]
        team: String,
        #[arg(short, long)]
        window: u32,
        #[arg(short = 'T', long)]
        threshold: u32,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { command } = &cli.command {
        return run_config(command, cli.config.as_ref());
    }

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            crate::server::start(config, &host, port).await?;
        }
        Commands::Record {
            learner,
            character,
            team,
            overall,
            engagement,
            objection_handling,
            information_gathering,
            program_explanation,
            closing_skills,
            overall_effectiveness,
        } => {
            let scores = ScoreCard {
                overall_performance: overall,
                engagement: engagement.unwrap_or(overall),
                objection_handling: objection_handling.unwrap_or(overall),
                information_gathering: information_gathering.unwrap_or(overall),
                program_explanation: program_explanation.unwrap_or(overall),
                closing_skills: closing_skills.unwrap_or(overall),
                overall_effectiveness: overall_effectiveness.unwrap_or(overall),
            };
            let service = ProgressService::from_config(&config).await?;
            let record = service
                .record_interaction(&learner, team.as_deref(), &character, scores, None)
                .await?;
            let metrics = service
                .aggregate_for_team(&learner, &character, team.as_deref())
                .await?;
            println!("✓ Recorded session {} for {} / {}", record.id, learner, character);
            print_metrics(&metrics);
        }
        Commands::Aggregate { learner, character, team, window } => {
            let service = ProgressService::from_config(&config).await?;
            let metrics = match window {
                Some(window) => service.aggregate(&learner, &character, window).await?,
                None => service.aggregate_for_team(&learner, &character, team.as_deref()).await?,
            };
            print_metrics(&metrics);
        }
        Commands::History { learner, character } => {
            let service = ProgressService::from_config(&config).await?;
            let records = service.store().list_interactions(&learner, &character).await?;
            if records.is_empty() {
                println!("No sessions logged for {} / {}.", learner, character);
            }
            for record in records {
                println!(
                    "{}  overall {:>5.1}  {}",
                    record.session_at.format("%Y-%m-%d %H:%M:%S"),
                    record.scores.overall_performance,
                    record.id
                );
            }
        }
        Commands::Goals { command } => {
            let service = ProgressService::from_config(&config).await?;
            let goals = match command {
                GoalCommands::Get { team } => service.get_goals(team.as_deref()).await?,
                GoalCommands::Set { team, window, threshold } => {
                    let goals = service.set_goals(&team, window, threshold).await?;
                    println!("✓ Goals updated for team {}", team);
                    goals
                }
            };
            println!("Window size: {}", goals.window_size);
            println!("Threshold:   {}", goals.threshold);
            if let Some(updated_at) = goals.updated_at {
                println!("Updated:     {}", updated_at.format("%Y-%m-%d %H:%M:%S"));
            }
        }
        Commands::Status { learner, team } => {
            let service = ProgressService::from_config(&config).await?;
            let progress = service.chain_progress(&learner, team.as_deref()).await?;
            print_progress(&progress);
        }
        Commands::Complete { learner, character, team } => {
            let service = ProgressService::from_config(&config).await?;
            let status = service
                .evaluate_completion(&learner, &character, team.as_deref())
                .await?;
            match status.snapshot {
                Some(record) => {
                    println!("✓ {} completed {} at {}", learner, character, record.completed_at.format("%Y-%m-%d %H:%M:%S"));
                    println!(
                        "  Goals met: overall >= {} over {} sessions",
                        record.goals.threshold, record.goals.window_size
                    );
                    print_metrics(&record.metrics);
                }
                None => println!("{} has not mastered {} yet.", learner, character),
            }
        }
        Commands::Reset { learner, character, yes } => {
            if !yes {
                println!("This will delete all sessions, completion and animation state for {} / {}.", learner, character);
                println!("Type 'yes' to confirm:");
                let mut input = String::new();
                std::io::stdin().read_line(&mut input)?;
                if input.trim().to_lowercase() != "yes" {
                    println!("Cancelled.");
                    return Ok(());
                }
            }
            let service = ProgressService::from_config(&config).await?;
            let summary = service.reset(&learner, &character).await?;
            if summary.is_noop() {
                println!("Nothing to reset for {} / {}.", learner, character);
            } else {
                println!(
                    "✓ Reset {} / {}: {} session(s) removed",
                    learner, character, summary.interactions_deleted
                );
            }
        }
        Commands::Watch { learner, team, local } => {
            watch(config, learner, team, local).await?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn run_config(command: &ConfigCommands, path: Option<&PathBuf>) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let config = load_config(path)?;
            config::show_config(&config);
        }
        ConfigCommands::Init { force } => {
            let path = match path {
                Some(path) => path.clone(),
                None => config::config_path()?,
            };
            if path.exists() && !force {
                println!("Config already exists at {} (use --force to overwrite)", path.display());
                return Ok(());
            }
            Config::default().save_to(&path)?;
            println!("✓ Wrote default config to {}", path.display());
        }
    }
    Ok(())
}

/// Drive a poller with a console host, printing each new snapshot
async fn watch(config: Config, learner: String, team: Option<String>, local: bool) -> Result<()> {
    let backend: Arc<dyn ProgressBackend> = if local {
        Arc::new(ProgressService::from_config(&config).await?)
    } else {
        Arc::new(HttpBackend::from_config(&config.poller)?)
    };
    let launcher = SessionLauncher::from_config(&config.launcher)?;
    let host = Arc::new(ConsoleHost::new(learner, team));

    let handle = ProgressPoller::new(
        backend,
        host,
        config.progression.chain.clone(),
        launcher,
        PollerOptions::from_config(&config.poller),
    )
    .spawn();

    println!("Watching progress every {}s (Ctrl-C to stop)", config.poller.interval_secs);
    let mut updates = handle.subscribe();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                print_snapshot(&snapshot);
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn print_metrics(metrics: &AggregateMetrics) {
    println!("Sessions averaged:      {}", metrics.total_calls);
    println!("Overall performance:    {}", metrics.overall_performance);
    println!("Engagement:             {}", metrics.engagement);
    println!("Objection handling:     {}", metrics.objection_handling);
    println!("Information gathering:  {}", metrics.information_gathering);
    println!("Program explanation:    {}", metrics.program_explanation);
    println!("Closing skills:         {}", metrics.closing_skills);
    println!("Overall effectiveness:  {}", metrics.overall_effectiveness);
}

fn print_progress(progress: &ChainProgress) {
    match &progress.goals {
        Some(goals) => println!(
            "Learner {} (goal: overall >= {} over {} sessions)",
            progress.learner_id, goals.threshold, goals.window_size
        ),
        None => println!("Learner {} (goals unavailable, showing the first character only)", progress.learner_id),
    }
    println!();
    for character in &progress.characters {
        let state = if character.completed {
            "✓ completed"
        } else if character.unlocked {
            "▶ unlocked"
        } else {
            "🔒 locked"
        };
        let metrics = character
            .metrics
            .map(|m| format!("overall {:>3} over {:>3} session(s)", m.overall_performance, m.total_calls))
            .unwrap_or_else(|| "metrics unavailable".to_string());
        println!("  {}. {:<12} {:<14} {}", character.position + 1, character.character_id, state, metrics);
    }
}

fn print_snapshot(snapshot: &ProgressSnapshot) {
    let Some(learner) = &snapshot.learner_id else {
        println!("[tick {}] waiting for learner id", snapshot.tick);
        return;
    };
    let summary: Vec<String> = snapshot
        .characters
        .iter()
        .map(|c| {
            let icon = if c.completed == Some(true) {
                "✓"
            } else if c.unlocked {
                "▶"
            } else {
                "🔒"
            };
            let overall = c
                .metrics
                .map(|m| format!("{}/{}", m.overall_performance, m.total_calls))
                .unwrap_or_else(|| "?".to_string());
            format!("{} {} ({})", icon, c.character_id, overall)
        })
        .collect();
    let flag = if snapshot.degraded { " [degraded]" } else { "" };
    println!("[tick {}] {}: {}{}", snapshot.tick, learner, summary.join("  "), flag);
}
