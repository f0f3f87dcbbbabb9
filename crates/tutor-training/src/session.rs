//! Training session record and its status machine.

use crate::checkpoint::Checkpoint;
use crate::config::TrainingConfiguration;
use crate::dataset::DatasetId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier for a training session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, not started yet.
    Initializing,
    /// Epoch loop is active.
    Running,
    /// Waiting at an epoch boundary until resumed.
    Paused,
    /// All epochs ran, or early stopping ended the run.
    Completed,
    /// Validation failed or an epoch step raised an error.
    Failed,
    /// Stopped on request before finishing.
    Cancelled,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Checks if the session can move to `to`. Terminal statuses have no exits.
    #[must_use]
    #[allow(clippy::match_same_arms)]
    pub fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            (Self::Initializing, Self::Running | Self::Failed | Self::Cancelled) => true,
            (Self::Running, Self::Paused | Self::Completed | Self::Failed | Self::Cancelled) => true,
            (Self::Paused, Self::Running | Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingLog {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Per-epoch histories, appended in lock-step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricHistory {
    pub train_loss: Vec<f64>,
    pub validation_loss: Vec<f64>,
    pub train_accuracy: Vec<f64>,
    pub validation_accuracy: Vec<f64>,
    pub learning_rate: Vec<f64>,
}

/// One resource reading, each value a utilisation ratio or absolute figure as the
/// sampler defines it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub gpu: f64,
    pub memory: f64,
    pub cpu: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub gpu: Vec<f64>,
    pub memory: Vec<f64>,
    pub cpu: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSession {
    pub id: SessionId,
    pub name: String,
    pub description: String,
    pub status: SessionStatus,
    pub config: TrainingConfiguration,
    pub dataset_ids: Vec<DatasetId>,
    pub current_epoch: u32,
    pub total_epochs: u32,
    pub current_step: u64,
    pub total_steps: u64,
    pub metrics: MetricHistory,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub logs: Vec<TrainingLog>,
    pub checkpoints: Vec<Checkpoint>,
    pub best_model: Option<String>,
    pub error: Option<String>,
    pub resource_usage: ResourceUsage,
}

impl TrainingSession {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        config: TrainingConfiguration,
        dataset_ids: Vec<DatasetId>,
    ) -> Self {
        let total_epochs = config.epochs;
        Self {
            id: SessionId::new(),
            name: name.into(),
            description: description.into(),
            status: SessionStatus::Initializing,
            config,
            dataset_ids,
            current_epoch: 0,
            total_epochs,
            current_step: 0,
            total_steps: 0,
            metrics: MetricHistory::default(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            logs: Vec::new(),
            checkpoints: Vec::new(),
            best_model: None,
            error: None,
            resource_usage: ResourceUsage::default(),
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fraction of epochs completed, in [0, 1].
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.total_epochs == 0 {
            return 0.0;
        }
        f64::from(self.current_epoch) / f64::from(self.total_epochs)
    }

    #[must_use]
    pub fn best_validation_loss(&self) -> Option<f64> {
        self.metrics.validation_loss.iter().copied().reduce(f64::min)
    }

    pub fn logs_at(&self, level: LogLevel) -> impl Iterator<Item = &TrainingLog> {
        self.logs.iter().filter(move |l| l.level == level)
    }
}
