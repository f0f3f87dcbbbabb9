//! Training configuration.
//!
//! `TrainingConfiguration` is the single read-only contract a caller hands to the
//! orchestrator. It can be built in code or loaded from a TOML file.

use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tolerance used when checking that the split fractions sum to one.
pub const SPLIT_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Gpt,
    Bert,
    T5,
    Llama,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Adam,
    Adamw,
    Sgd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerParams {
    #[serde(default = "default_beta1")]
    pub beta1: f64,
    #[serde(default = "default_beta2")]
    pub beta2: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,
    /// Only read by SGD.
    #[serde(default)]
    pub momentum: f64,
}

fn default_beta1() -> f64 {
    0.9
}

fn default_beta2() -> f64 {
    0.999
}

fn default_epsilon() -> f64 {
    1e-8
}

fn default_weight_decay() -> f64 {
    0.01
}

impl Default for OptimizerParams {
    fn default() -> Self {
        Self {
            beta1: default_beta1(),
            beta2: default_beta2(),
            epsilon: default_epsilon(),
            weight_decay: default_weight_decay(),
            momentum: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfiguration {
    pub model_family: ModelFamily,
    pub model_size: String,
    pub learning_rate: f64,
    pub batch_size: u32,
    pub epochs: u32,
    pub optimizer: OptimizerKind,
    pub dropout: f64,
    pub warmup_steps: u64,
    pub gradient_accumulation_steps: u32,
    pub max_grad_norm: f64,
    pub early_stopping_patience: u32,
    pub save_steps: u32,
    pub eval_steps: u32,
    pub train_split: f64,
    pub validation_split: f64,
    pub test_split: f64,
    pub mixed_precision: bool,
    pub gradient_checkpointing: bool,
    pub dataloader_num_workers: u32,
    /// Seeds the split shuffle and any seeded backend.
    pub seed: u64,
    pub augment_data: bool,
    pub optimizer_params: OptimizerParams,
}

impl Default for TrainingConfiguration {
    fn default() -> Self {
        Self {
            model_family: ModelFamily::Gpt,
            model_size: "small".to_string(),
            learning_rate: 5e-5,
            batch_size: 16,
            epochs: 3,
            optimizer: OptimizerKind::Adamw,
            dropout: 0.1,
            warmup_steps: 500,
            gradient_accumulation_steps: 1,
            max_grad_norm: 1.0,
            early_stopping_patience: 3,
            save_steps: 1,
            eval_steps: 1,
            train_split: 0.8,
            validation_split: 0.1,
            test_split: 0.1,
            mixed_precision: true,
            gradient_checkpointing: false,
            dataloader_num_workers: 4,
            seed: 42,
            augment_data: false,
            optimizer_params: OptimizerParams::default(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> TrainingError {
    TrainingError::InvalidConfig(msg.into())
}

fn ensure_positive(name: &str, value: f64) -> TrainingResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(format!("{name} must be > 0")));
    }
    Ok(())
}

fn ensure_fraction(name: &str, value: f64) -> TrainingResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(invalid(format!("{name} must be within [0, 1]")));
    }
    Ok(())
}

impl TrainingConfiguration {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.model_size.trim().is_empty() {
            return Err(invalid("model_size is required"));
        }
        ensure_positive("learning_rate", self.learning_rate)?;
        ensure_positive("max_grad_norm", self.max_grad_norm)?;
        ensure_positive("optimizer_params.epsilon", self.optimizer_params.epsilon)?;

        let counters = [
            ("batch_size", self.batch_size),
            ("epochs", self.epochs),
            ("gradient_accumulation_steps", self.gradient_accumulation_steps),
            ("early_stopping_patience", self.early_stopping_patience),
            ("save_steps", self.save_steps),
            ("eval_steps", self.eval_steps),
            ("dataloader_num_workers", self.dataloader_num_workers),
        ];
        for (name, value) in counters {
            if value == 0 {
                return Err(invalid(format!("{name} must be >= 1")));
            }
        }

        if !self.dropout.is_finite() || !(0.0..1.0).contains(&self.dropout) {
            return Err(invalid("dropout must be within [0, 1)"));
        }
        ensure_fraction("optimizer_params.beta1", self.optimizer_params.beta1)?;
        ensure_fraction("optimizer_params.beta2", self.optimizer_params.beta2)?;
        if self.optimizer_params.weight_decay < 0.0 || self.optimizer_params.momentum < 0.0 {
            return Err(invalid("weight_decay and momentum must be >= 0"));
        }

        ensure_fraction("train_split", self.train_split)?;
        ensure_fraction("validation_split", self.validation_split)?;
        ensure_fraction("test_split", self.test_split)?;
        let sum = self.train_split + self.validation_split + self.test_split;
        if (sum - 1.0).abs() > SPLIT_EPSILON {
            return Err(invalid(format!(
                "train/validation/test splits must sum to 1.0 (got {sum})"
            )));
        }
        Ok(())
    }

    /// Load a configuration from a TOML file. Missing keys take their defaults.
    pub fn load_from_file(path: &Path) -> TrainingResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_to_file(&self, path: &Path) -> TrainingResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
