//! Init-config command implementation.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::Path;
use tutor_training::TrainingConfiguration;

pub fn execute(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    TrainingConfiguration::default()
        .save_to_file(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("{} {}", "✓ Wrote default configuration to".green(), path.display());
    Ok(())
}
