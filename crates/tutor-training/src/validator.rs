//! Dataset validation.
//!
//! Validation never fails with an error: it always produces a `ValidationResult` and
//! leaves the abort decision to the caller.

use crate::dataset::{DataSample, Dataset, QualityMetrics};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Datasets smaller than this get a warning.
pub const MIN_RECOMMENDED_SAMPLES: usize = 100;
/// Datasets scoring below this are rejected.
pub const MIN_QUALITY_SCORE: f64 = 0.8;
/// Duplicate share above which a warning is emitted.
pub const MAX_DUPLICATE_RATIO: f64 = 0.1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub total_samples: usize,
    pub duplicate_samples: usize,
    pub missing_samples: usize,
    /// Quality per dataset, keyed by dataset name.
    pub quality: BTreeMap<String, QualityMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metrics: ValidationMetrics,
}

#[derive(Debug, Clone)]
pub struct DatasetValidator {
    min_samples: usize,
    min_quality: f64,
    max_duplicate_ratio: f64,
}

impl Default for DatasetValidator {
    fn default() -> Self {
        Self {
            min_samples: MIN_RECOMMENDED_SAMPLES,
            min_quality: MIN_QUALITY_SCORE,
            max_duplicate_ratio: MAX_DUPLICATE_RATIO,
        }
    }
}

impl DatasetValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self, datasets: &[Dataset]) -> ValidationResult {
        let mut result = ValidationResult { is_valid: true, ..Default::default() };

        if datasets.is_empty() {
            result.is_valid = false;
            result.errors.push("no datasets provided".to_string());
            return result;
        }

        for dataset in datasets {
            self.validate_one(dataset, &mut result);
        }

        debug!(
            datasets = datasets.len(),
            total = result.metrics.total_samples,
            duplicates = result.metrics.duplicate_samples,
            valid = result.is_valid,
            "Dataset validation finished"
        );
        result
    }

    fn validate_one(&self, dataset: &Dataset, result: &mut ValidationResult) {
        let total = dataset.samples.len();
        result.metrics.total_samples += total;

        if total == 0 {
            result.is_valid = false;
            result.errors.push(format!("Dataset {} has no samples", dataset.name));
            return;
        }

        if total < self.min_samples {
            result.warnings.push(format!(
                "Dataset {} has only {} samples, which may be insufficient for training",
                dataset.name, total
            ));
        }

        let quality = dataset
            .metadata
            .quality_metrics
            .clone()
            .unwrap_or_else(|| compute_quality_metrics(&dataset.samples));
        if quality.overall_score < self.min_quality {
            result.is_valid = false;
            result.errors.push(format!(
                "Dataset {} quality score {:.2} is below the required {:.2}",
                dataset.name, quality.overall_score, self.min_quality
            ));
        }
        result.metrics.quality.insert(dataset.name.clone(), quality);

        let duplicates = count_duplicates(&dataset.samples);
        result.metrics.duplicate_samples += duplicates;
        if duplicates as f64 / total as f64 > self.max_duplicate_ratio {
            result.warnings.push(format!(
                "Dataset {} has {} duplicate samples ({:.1}%)",
                dataset.name,
                duplicates,
                duplicates as f64 * 100.0 / total as f64
            ));
        }

        result.metrics.missing_samples += dataset.samples.iter().filter(|s| s.is_missing()).count();
    }
}

/// Number of samples whose content already appeared earlier in the sequence.
pub fn count_duplicates(samples: &[DataSample]) -> usize {
    let mut seen = HashSet::with_capacity(samples.len());
    samples.iter().filter(|s| !seen.insert(s.content_key())).count()
}

fn ratio(count: usize, total: usize) -> f64 {
    count as f64 / total as f64
}

fn has_control_chars(text: &str) -> bool {
    text.chars().any(|c| c.is_control() && c != '\n' && c != '\t' && c != '\r')
}

pub fn compute_quality_metrics(samples: &[DataSample]) -> QualityMetrics {
    let total = samples.len();
    if total == 0 {
        return QualityMetrics::default();
    }

    let complete = samples.iter().filter(|s| !s.is_missing()).count();
    let consistent = samples.iter().filter(|s| s.output.trim() != s.input.trim()).count();

    let scores: Vec<f64> = samples.iter().filter_map(|s| s.quality_score).collect();
    let accuracy = if scores.is_empty() {
        1.0
    } else {
        (scores.iter().sum::<f64>() / scores.len() as f64).clamp(0.0, 1.0)
    };

    let unique = total - count_duplicates(samples);
    let valid = samples
        .iter()
        .filter(|s| {
            let score_ok = s.quality_score.is_none_or(|q| (0.0..=1.0).contains(&q));
            let text_ok = !has_control_chars(&s.input)
                && !has_control_chars(&s.output)
                && s.context.as_deref().is_none_or(|c| !has_control_chars(c));
            score_ok && text_ok
        })
        .count();

    QualityMetrics::from_ratios(
        ratio(complete, total),
        ratio(consistent, total),
        accuracy,
        ratio(unique, total),
        ratio(valid, total),
    )
}
