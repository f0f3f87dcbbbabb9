//! Tutor CLI - run and inspect fine-tuning sessions for the tutoring assistant
//!
//! Loads a TOML training configuration and JSONL datasets, then validates the
//! datasets or drives a full training session through the orchestrator.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{init_config, train, validate, DatasetArgs};

/// Tutor CLI - training pipeline for the tutoring assistant
#[derive(Parser, Debug)]
#[command(name = "tutor", author, version, about = "Tutor - training pipeline orchestration")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate datasets without training
    ///
    /// Reports sample counts, duplicates and quality per dataset. Exits non-zero when
    /// any dataset is rejected.
    Validate {
        #[command(flatten)]
        datasets: DatasetArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a training session
    Train {
        /// Path to the training configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        datasets: DatasetArgs,

        /// Session name
        #[arg(long, default_value = "tutor-training")]
        name: String,

        /// Session description
        #[arg(long, default_value = "")]
        description: String,

        /// Override the configured epoch count
        #[arg(long)]
        epochs: Option<u32>,

        /// Override the configured seed
        #[arg(long)]
        seed: Option<u64>,

        /// Output the final session as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default training configuration
    InitConfig {
        /// Destination path
        #[arg(default_value = "training.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Unrecognised names fall back to `INFO`.
fn parse_level(name: &str) -> Level {
    match name {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&args.log_level))
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Validate { datasets, json } => validate::execute(&datasets, json),
        Command::Train { config, datasets, name, description, epochs, seed, json } => {
            let options = train::TrainOptions { config, name, description, epochs, seed, json };
            train::execute(&datasets, options).await
        }
        Command::InitConfig { path, force } => init_config::execute(&path, force),
    }
}
