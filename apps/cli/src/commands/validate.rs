//! Validate command implementation.
//!
//! Runs the dataset validator over JSONL files and reports the outcome.

use super::DatasetArgs;
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tutor_training::{DatasetValidator, ValidationResult};

pub fn execute(args: &DatasetArgs, json: bool) -> Result<()> {
    let datasets = args.load()?;
    let result = DatasetValidator::default().validate(&datasets);

    if json {
        output_json(&datasets, &result)?;
    } else {
        output_human(&datasets, &result);
    }

    if !result.is_valid {
        std::process::exit(1);
    }
    Ok(())
}

fn output_human(datasets: &[tutor_training::Dataset], result: &ValidationResult) {
    println!("{}", "Dataset Validation".bold().cyan());
    println!();

    for dataset in datasets {
        println!("  {} ({} samples)", dataset.name.bold(), dataset.len());
        println!("    {} {}", "id:".dimmed(), dataset.id);
        if let Some(quality) = result.metrics.quality.get(&dataset.name) {
            println!(
                "    {} {:.2}  completeness {:.2}  consistency {:.2}  accuracy {:.2}  uniqueness {:.2}  validity {:.2}",
                "quality:".dimmed(),
                quality.overall_score,
                quality.completeness,
                quality.consistency,
                quality.accuracy,
                quality.uniqueness,
                quality.validity
            );
        }
    }
    println!();
    println!(
        "  Total: {}  Duplicates: {}  Missing: {}",
        result.metrics.total_samples, result.metrics.duplicate_samples, result.metrics.missing_samples
    );
    println!();

    for warning in &result.warnings {
        println!("  {} {}", "⚠".yellow(), warning.yellow());
    }
    for error in &result.errors {
        println!("  {} {}", "✗".red(), error.red());
    }
    if !result.warnings.is_empty() || !result.errors.is_empty() {
        println!();
    }

    if result.is_valid {
        println!("{}", "✓ Datasets are valid".green());
    } else {
        println!("{}", format!("✗ {} error(s) found", result.errors.len()).red());
    }
}

fn output_json(datasets: &[tutor_training::Dataset], result: &ValidationResult) -> Result<()> {
    #[derive(Serialize)]
    struct JsonDataset<'a> {
        id: &'a str,
        name: &'a str,
        samples: usize,
    }

    #[derive(Serialize)]
    struct JsonOutput<'a> {
        datasets: Vec<JsonDataset<'a>>,
        #[serde(flatten)]
        result: &'a ValidationResult,
    }

    let output = JsonOutput {
        datasets: datasets
            .iter()
            .map(|d| JsonDataset { id: &d.id.0, name: &d.name, samples: d.len() })
            .collect(),
        result,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
