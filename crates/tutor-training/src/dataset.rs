use crate::error::{TrainingError, TrainingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Stable identifier for a dataset (content hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub String);

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    QaPairs,
    Conversations,
    Documents,
    CodeExamples,
}

/// A single input/output training pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSample {
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
}

impl DataSample {
    #[must_use]
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            context: None,
            metadata: serde_json::Value::Null,
            quality_score: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }

    /// Key used for duplicate detection: input, output and context, ignoring metadata.
    pub(crate) fn content_key(&self) -> (&str, &str, Option<&str>) {
        (self.input.as_str(), self.output.as_str(), self.context.as_deref())
    }

    pub(crate) fn is_missing(&self) -> bool {
        self.input.trim().is_empty() || self.output.trim().is_empty()
    }
}

/// Five quality ratios in [0, 1] plus their mean.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub completeness: f64,
    pub consistency: f64,
    pub accuracy: f64,
    pub uniqueness: f64,
    pub validity: f64,
    pub overall_score: f64,
}

impl QualityMetrics {
    #[must_use]
    pub fn from_ratios(
        completeness: f64,
        consistency: f64,
        accuracy: f64,
        uniqueness: f64,
        validity: f64,
    ) -> Self {
        let overall_score = (completeness + consistency + accuracy + uniqueness + validity) / 5.0;
        Self { completeness, consistency, accuracy, uniqueness, validity, overall_score }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub size: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Externally assessed quality. When present the validator uses it instead of
    /// computing metrics from the samples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_metrics: Option<QualityMetrics>,
    #[serde(default)]
    pub preprocessing_status: PreprocessingStatus,
}

/// A named collection of samples. Owned by the caller; the engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub name: String,
    pub kind: DatasetKind,
    pub samples: Vec<DataSample>,
    pub metadata: DatasetMetadata,
}

impl Dataset {
    /// Build a dataset whose id is the content hash of `samples`.
    pub fn new(name: impl Into<String>, kind: DatasetKind, samples: Vec<DataSample>) -> TrainingResult<Self> {
        let id = compute_dataset_id(&samples)?;
        let now = Utc::now();
        Ok(Self {
            id,
            name: name.into(),
            kind,
            metadata: DatasetMetadata {
                size: samples.len(),
                created_at: now,
                updated_at: now,
                quality_metrics: None,
                preprocessing_status: PreprocessingStatus::Pending,
            },
            samples,
        })
    }

    #[must_use]
    pub fn with_quality_metrics(mut self, metrics: QualityMetrics) -> Self {
        self.metadata.quality_metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Load a dataset from a JSONL file (one `DataSample` per line).
    pub fn from_jsonl(name: impl Into<String>, kind: DatasetKind, path: &Path) -> TrainingResult<Self> {
        let samples = read_jsonl_samples(path)?;
        Self::new(name, kind, samples)
    }
}

pub fn compute_dataset_id(samples: &[DataSample]) -> TrainingResult<DatasetId> {
    let mut hasher = Sha256::new();

    for sample in samples {
        let bytes = serde_json::to_vec(sample)?;
        hasher.update(bytes);
        hasher.update(b"\n");
    }

    Ok(DatasetId(hex::encode(hasher.finalize())))
}

pub fn read_jsonl_samples(path: &Path) -> TrainingResult<Vec<DataSample>> {
    let contents = std::fs::read_to_string(path)?;
    let mut samples = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let sample: DataSample = serde_json::from_str(line).map_err(|e| {
            TrainingError::Dataset(format!("failed to parse jsonl line {}: {}", idx + 1, e))
        })?;
        samples.push(sample);
    }

    Ok(samples)
}

pub fn write_jsonl_samples(path: &Path, samples: &[DataSample]) -> TrainingResult<()> {
    let mut out = String::new();
    for sample in samples {
        out.push_str(&serde_json::to_string(sample)?);
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}
