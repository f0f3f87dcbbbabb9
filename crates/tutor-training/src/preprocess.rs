//! Dataset preprocessing: clean, extract features, augment, split.
//!
//! Every stage produces new samples; the input datasets are never touched.

use crate::config::TrainingConfiguration;
use crate::dataset::{DataSample, Dataset};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Produces extra samples derived from an existing one.
pub trait Augmenter: Send + Sync {
    fn augment(&self, sample: &DataSample) -> Vec<DataSample>;
}

/// Emits one extra sample per sample that carries context, with the context inlined
/// into the input.
#[derive(Debug, Default, Clone)]
pub struct ContextInliningAugmenter;

impl Augmenter for ContextInliningAugmenter {
    fn augment(&self, sample: &DataSample) -> Vec<DataSample> {
        let Some(context) = sample.context.as_deref().filter(|c| !c.trim().is_empty()) else {
            return Vec::new();
        };
        let mut metadata = sample.metadata.clone();
        merge_object(&mut metadata, "augmented", Value::Bool(true));
        vec![DataSample {
            input: format!("{context}\n\n{}", sample.input),
            output: sample.output.clone(),
            context: None,
            metadata,
            quality_score: sample.quality_score,
        }]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessStats {
    pub original_samples: usize,
    pub processed_samples: usize,
    pub removed_samples: usize,
    pub augmented_samples: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSplit {
    pub train: Vec<DataSample>,
    pub validation: Vec<DataSample>,
    pub test: Vec<DataSample>,
}

impl DataSplit {
    #[must_use]
    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreprocessedData {
    pub split: DataSplit,
    pub stats: PreprocessStats,
}

#[derive(Clone)]
pub struct DataPreprocessor {
    augmenter: Arc<dyn Augmenter>,
}

impl std::fmt::Debug for DataPreprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataPreprocessor").finish_non_exhaustive()
    }
}

impl Default for DataPreprocessor {
    fn default() -> Self {
        Self::new(Arc::new(ContextInliningAugmenter))
    }
}

impl DataPreprocessor {
    #[must_use]
    pub fn new(augmenter: Arc<dyn Augmenter>) -> Self {
        Self { augmenter }
    }

    /// Run every stage over each dataset, concatenate the results and split them.
    ///
    /// Augmentation only runs when `config.augment_data` is set. The shuffle is seeded
    /// from `config.seed`, so the same inputs always yield the same partitions.
    pub fn preprocess(&self, datasets: &[Dataset], config: &TrainingConfiguration) -> PreprocessedData {
        let mut stats = PreprocessStats::default();
        let mut all = Vec::new();

        for dataset in datasets {
            stats.original_samples += dataset.samples.len();

            let cleaned = clean(&dataset.samples);
            stats.removed_samples += dataset.samples.len().saturating_sub(cleaned.len());

            let mut featured = extract_features(&cleaned);
            if config.augment_data {
                let before = featured.len();
                featured = self.augment(featured);
                stats.augmented_samples += featured.len() - before;
            }
            all.extend(featured);
        }
        stats.processed_samples = all.len();

        let split = split_samples(
            all,
            config.train_split,
            config.validation_split,
            &mut StdRng::seed_from_u64(config.seed),
        );
        debug!(
            original = stats.original_samples,
            processed = stats.processed_samples,
            train = split.train.len(),
            validation = split.validation.len(),
            test = split.test.len(),
            "Preprocessing finished"
        );

        PreprocessedData { split, stats }
    }

    fn augment(&self, samples: Vec<DataSample>) -> Vec<DataSample> {
        let mut out = Vec::with_capacity(samples.len());
        for sample in samples {
            let extra = self.augmenter.augment(&sample);
            out.push(sample);
            out.extend(extra);
        }
        out
    }
}

/// Normalize line endings and surrounding whitespace. Keeps one sample per input sample.
pub fn clean(samples: &[DataSample]) -> Vec<DataSample> {
    samples
        .iter()
        .map(|s| DataSample {
            input: normalize_text(&s.input),
            output: normalize_text(&s.output),
            context: s.context.as_deref().map(normalize_text),
            metadata: s.metadata.clone(),
            quality_score: s.quality_score,
        })
        .collect()
}

fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").trim().to_string()
}

/// Attach derived features under `metadata.features`.
pub fn extract_features(samples: &[DataSample]) -> Vec<DataSample> {
    samples
        .iter()
        .map(|s| {
            let mut sample = s.clone();
            let features = json!({
                "input_chars": s.input.chars().count(),
                "output_chars": s.output.chars().count(),
                "input_words": s.input.split_whitespace().count(),
                "output_words": s.output.split_whitespace().count(),
                "has_context": s.context.is_some(),
            });
            merge_object(&mut sample.metadata, "features", features);
            sample
        })
        .collect()
}

fn merge_object(target: &mut Value, key: &str, value: Value) {
    if !target.is_object() {
        let previous = std::mem::take(target);
        let mut map = Map::new();
        if !previous.is_null() {
            map.insert("original".to_string(), previous);
        }
        *target = Value::Object(map);
    }
    if let Value::Object(map) = target {
        map.insert(key.to_string(), value);
    }
}

/// Shuffle and partition `samples`.
///
/// Train gets `floor(n * train_split)`, validation `floor(n * validation_split)` and test
/// takes the remainder, so the three partitions always sum to `n`.
pub fn split_samples(
    mut samples: Vec<DataSample>,
    train_split: f64,
    validation_split: f64,
    rng: &mut StdRng,
) -> DataSplit {
    samples.shuffle(rng);
    let n = samples.len();
    let train_len = ((n as f64 * train_split).floor() as usize).min(n);
    let validation_len = ((n as f64 * validation_split).floor() as usize).min(n - train_len);

    let mut rest = samples.split_off(train_len);
    let test = rest.split_off(validation_len);
    DataSplit { train: samples, validation: rest, test }
}
