//! Train command implementation.
//!
//! Builds an orchestrator around the simulated epoch runner and drives one session
//! to completion, streaming per-epoch progress to stdout.

use super::DatasetArgs;
use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tutor_training::{
    LogLevel, ProgressSink, SimulatedEpochRunner, StdoutProgressSink, TrainingConfiguration, TrainingOrchestrator,
    TrainingOutcome, TrainingSession,
};

#[derive(Debug)]
pub struct TrainOptions {
    pub config: Option<PathBuf>,
    pub name: String,
    pub description: String,
    pub epochs: Option<u32>,
    pub seed: Option<u64>,
    pub json: bool,
}

pub async fn execute(args: &DatasetArgs, options: TrainOptions) -> Result<()> {
    let mut config = match &options.config {
        Some(path) => TrainingConfiguration::load_from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => TrainingConfiguration::default(),
    };
    if let Some(epochs) = options.epochs {
        config.epochs = epochs;
    }
    if let Some(seed) = options.seed {
        config.seed = seed;
    }
    debug!(?config, "Resolved training configuration");

    let datasets = args.load()?;
    let orchestrator = TrainingOrchestrator::new(Arc::new(SimulatedEpochRunner::new(config.seed)));
    let handle = orchestrator.initialize_training(&options.name, &options.description, config, &datasets)?;

    if !options.json {
        println!("{}", "Training".bold().cyan());
        println!("  {} {}", "session:".dimmed(), handle.id());
        println!("  {} {}", "datasets:".dimmed(), datasets.len());
        println!();
    }

    let sink = StdoutProgressSink;
    let progress: Option<&dyn ProgressSink> = if options.json { None } else { Some(&sink) };
    let result = orchestrator.start_training(&handle, &datasets, progress).await;
    let session = handle.snapshot().await;

    if options.json {
        output_json(&session, result.as_ref().ok().copied())?;
    } else {
        output_human(&session, result.as_ref().ok());
    }

    if result.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

fn output_human(session: &TrainingSession, outcome: Option<&TrainingOutcome>) {
    println!();
    for log in session.logs_at(LogLevel::Warning) {
        println!("  {} {}", "⚠".yellow(), log.message.yellow());
    }

    match outcome {
        Some(TrainingOutcome::Completed { epochs }) => {
            println!("{}", format!("✓ Training completed after {epochs} epoch(s)").green());
        }
        Some(TrainingOutcome::EarlyStopped { epoch }) => {
            println!("{}", format!("✓ Early stopping at epoch {epoch}").green());
        }
        None => {
            let reason = session.error.as_deref().unwrap_or("unknown error");
            println!("{}", format!("✗ Training {}: {reason}", session.status).red());
            return;
        }
    }

    if let Some(loss) = session.best_validation_loss() {
        println!("  {} {loss:.4}", "best validation loss:".dimmed());
    }
    if let Some(best) = &session.best_model {
        println!("  {} {best}", "best model:".dimmed());
    }
    println!("  {} {}", "checkpoints:".dimmed(), session.checkpoints.len());
}

fn output_json(session: &TrainingSession, outcome: Option<TrainingOutcome>) -> Result<()> {
    #[derive(Serialize)]
    struct JsonOutput<'a> {
        #[serde(skip_serializing_if = "Option::is_none")]
        outcome: Option<TrainingOutcome>,
        session: &'a TrainingSession,
    }

    println!("{}", serde_json::to_string_pretty(&JsonOutput { outcome, session })?);
    Ok(())
}
