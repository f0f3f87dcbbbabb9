//! Per-epoch checkpoints.
//!
//! Checkpoints hold opaque artifact references; writing the artifacts themselves is the
//! job of whatever backend produced the model state.

use crate::error::{TrainingError, TrainingResult};
use crate::ledger::SessionLedger;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetrics {
    pub train_loss: f64,
    pub validation_loss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: u32,
    pub model_state: String,
    pub optimizer_state: String,
    pub metrics: CheckpointMetrics,
    pub timestamp: DateTime<Utc>,
}

/// Names the model and optimizer artifacts for a checkpoint.
pub trait CheckpointNaming: Send + Sync {
    fn model_state(&self, session: &SessionId, epoch: u32) -> String;
    fn optimizer_state(&self, session: &SessionId, epoch: u32) -> String;
}

/// `checkpoint_epoch_<n>.pt` / `optimizer_epoch_<n>.pt`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatNaming;

impl CheckpointNaming for FlatNaming {
    fn model_state(&self, _session: &SessionId, epoch: u32) -> String {
        format!("checkpoint_epoch_{epoch}.pt")
    }

    fn optimizer_state(&self, _session: &SessionId, epoch: u32) -> String {
        format!("optimizer_epoch_{epoch}.pt")
    }
}

/// Directory layout for checkpoint artifacts: `<root>/<session_id>/checkpoints/...`.
#[derive(Debug, Clone)]
pub struct TrainingLayout {
    root: PathBuf,
}

impl TrainingLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn session_dir(&self, session: &SessionId) -> PathBuf {
        self.root.join(session.0.as_str())
    }

    #[must_use]
    pub fn checkpoints_dir(&self, session: &SessionId) -> PathBuf {
        self.session_dir(session).join("checkpoints")
    }
}

impl CheckpointNaming for TrainingLayout {
    fn model_state(&self, session: &SessionId, epoch: u32) -> String {
        let name = FlatNaming.model_state(session, epoch);
        self.checkpoints_dir(session).join(name).to_string_lossy().into_owned()
    }

    fn optimizer_state(&self, session: &SessionId, epoch: u32) -> String {
        let name = FlatNaming.optimizer_state(session, epoch);
        self.checkpoints_dir(session).join(name).to_string_lossy().into_owned()
    }
}

#[derive(Clone)]
pub struct CheckpointStore {
    naming: Arc<dyn CheckpointNaming>,
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore").finish_non_exhaustive()
    }
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::new(Arc::new(FlatNaming))
    }
}

impl CheckpointStore {
    #[must_use]
    pub fn new(naming: Arc<dyn CheckpointNaming>) -> Self {
        Self { naming }
    }

    /// Epochs are 1-based, so `save_steps = 2` checkpoints epochs 2, 4, 6...
    #[must_use]
    pub fn is_due(epoch: u32, save_steps: u32) -> bool {
        save_steps > 0 && epoch % save_steps == 0
    }

    /// Snapshot the latest epoch metrics of the session into a new checkpoint and append it.
    pub fn save(&self, ledger: &mut SessionLedger<'_>, epoch: u32) -> TrainingResult<Checkpoint> {
        let session = ledger.session();
        let history = &session.metrics;
        let (Some(&train_loss), Some(&validation_loss)) =
            (history.train_loss.last(), history.validation_loss.last())
        else {
            return Err(TrainingError::Checkpoint(format!(
                "no metrics recorded before checkpointing epoch {epoch}"
            )));
        };

        let checkpoint = Checkpoint {
            epoch,
            model_state: self.naming.model_state(&session.id, epoch),
            optimizer_state: self.naming.optimizer_state(&session.id, epoch),
            metrics: CheckpointMetrics { train_loss, validation_loss },
            timestamp: Utc::now(),
        };
        debug!(epoch, model_state = %checkpoint.model_state, "Saving checkpoint");

        ledger.record_checkpoint(checkpoint.clone())?;
        Ok(checkpoint)
    }
}
