//! Training orchestration.
//!
//! `TrainingOrchestrator` wires validation, preprocessing, the epoch loop, checkpointing
//! and early stopping together. It holds no session state of its own: every run is
//! driven through an explicit `SessionHandle`, so one orchestrator can serve many
//! concurrent sessions.

use crate::checkpoint::CheckpointStore;
use crate::config::TrainingConfiguration;
use crate::dataset::Dataset;
use crate::early_stopping::{EarlyStoppingPolicy, PlateauEarlyStopping};
use crate::error::{TrainingError, TrainingResult};
use crate::handle::SessionHandle;
use crate::ledger::SessionLedger;
use crate::preprocess::{DataPreprocessor, PreprocessedData};
use crate::progress::ProgressSink;
use crate::runner::{EpochContext, EpochRunner, NoopResourceSampler, ResourceSampler};
use crate::session::{LogLevel, SessionId, SessionStatus, TrainingSession};
use crate::validator::DatasetValidator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrainingOutcome {
    /// Ran every configured epoch.
    Completed { epochs: u32 },
    /// The early-stopping policy ended the run after `epoch`.
    EarlyStopped { epoch: u32 },
}

/// Number of optimizer steps one epoch over `train_len` samples takes.
#[must_use]
pub fn steps_per_epoch(train_len: usize, batch_size: u32) -> u64 {
    (train_len as u64).div_ceil(u64::from(batch_size.max(1)))
}

pub struct TrainingOrchestrator {
    validator: DatasetValidator,
    preprocessor: DataPreprocessor,
    runner: Arc<dyn EpochRunner>,
    early_stopping: Arc<dyn EarlyStoppingPolicy>,
    checkpoints: CheckpointStore,
    sampler: Arc<dyn ResourceSampler>,
}

impl fmt::Debug for TrainingOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainingOrchestrator")
            .field("runner", &self.runner.id())
            .finish_non_exhaustive()
    }
}

impl TrainingOrchestrator {
    #[must_use]
    pub fn new(runner: Arc<dyn EpochRunner>) -> Self {
        Self {
            validator: DatasetValidator::default(),
            preprocessor: DataPreprocessor::default(),
            runner,
            early_stopping: Arc::new(PlateauEarlyStopping),
            checkpoints: CheckpointStore::default(),
            sampler: Arc::new(NoopResourceSampler),
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: DatasetValidator) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub fn with_preprocessor(mut self, preprocessor: DataPreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    #[must_use]
    pub fn with_early_stopping(mut self, policy: Arc<dyn EarlyStoppingPolicy>) -> Self {
        self.early_stopping = policy;
        self
    }

    #[must_use]
    pub fn with_checkpoint_store(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = store;
        self
    }

    #[must_use]
    pub fn with_resource_sampler(mut self, sampler: Arc<dyn ResourceSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Create a fresh session for `datasets`. Rejects an invalid configuration or an
    /// empty dataset list before any session exists.
    pub fn initialize_training(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        config: TrainingConfiguration,
        datasets: &[Dataset],
    ) -> TrainingResult<SessionHandle> {
        config.validate()?;
        if datasets.is_empty() {
            return Err(TrainingError::Dataset("at least one dataset is required".to_string()));
        }

        let dataset_ids = datasets.iter().map(|d| d.id.clone()).collect();
        let session = TrainingSession::new(name, description, config, dataset_ids);
        info!(
            session_id = %session.id,
            name = %session.name,
            datasets = datasets.len(),
            epochs = session.total_epochs,
            runner = self.runner.id(),
            "Training session initialized"
        );
        Ok(SessionHandle::new(session))
    }

    /// Run the session to a terminal status.
    ///
    /// On any failure the session is marked `failed` (or `cancelled`) with the error
    /// recorded, and the same error is returned.
    pub async fn start_training(
        &self,
        handle: &SessionHandle,
        datasets: &[Dataset],
        progress: Option<&dyn ProgressSink>,
    ) -> TrainingResult<TrainingOutcome> {
        let config = {
            let mut guard = handle.write().await;
            if guard.status != SessionStatus::Initializing || !handle.control().claim_run() {
                return Err(TrainingError::InvalidTransition {
                    from: guard.status,
                    to: SessionStatus::Running,
                });
            }
            let message = format!("Training session '{}' started", guard.name);
            SessionLedger::new(&mut guard).append_log(LogLevel::Info, message)?;
            guard.config.clone()
        };

        match self.run(handle, datasets, &config, progress).await {
            Ok(outcome) => Ok(outcome),
            Err(TrainingError::Cancelled) => {
                warn!(session_id = %handle.id(), "Training cancelled");
                let mut guard = handle.write().await;
                if !guard.is_terminal() {
                    SessionLedger::new(&mut guard).mark_cancelled()?;
                }
                Err(TrainingError::Cancelled)
            }
            Err(err) => {
                error!(session_id = %handle.id(), error = %err, "Training failed");
                let mut guard = handle.write().await;
                if !guard.is_terminal() {
                    if let Err(mark_err) = SessionLedger::new(&mut guard).mark_failed(err.to_string()) {
                        error!(session_id = %handle.id(), error = %mark_err, "Failed to record session failure");
                    }
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        handle: &SessionHandle,
        datasets: &[Dataset],
        config: &TrainingConfiguration,
        progress: Option<&dyn ProgressSink>,
    ) -> TrainingResult<TrainingOutcome> {
        let session_id = handle.id().clone();
        self.check_datasets(handle, datasets).await?;
        self.validate_datasets(handle, datasets).await?;

        {
            let mut guard = handle.write().await;
            let mut ledger = SessionLedger::new(&mut guard);
            ledger.mark_running()?;
            ledger.append_log(LogLevel::Info, "Preprocessing datasets")?;
        }

        let data = self.preprocessor.preprocess(datasets, config);
        let steps = steps_per_epoch(data.split.train.len(), config.batch_size);
        {
            let mut guard = handle.write().await;
            let mut ledger = SessionLedger::new(&mut guard);
            log_preprocessing(&mut ledger, &data)?;
            if data.split.train.is_empty() {
                return Err(TrainingError::Preprocess("training partition is empty".to_string()));
            }
            ledger.set_total_steps(steps * u64::from(config.epochs))?;
        }
        let patience = config.early_stopping_patience as usize;
        let control = handle.control();

        loop {
            if control.is_cancelled() {
                return Err(TrainingError::Cancelled);
            }
            if control.is_paused() {
                SessionLedger::new(&mut *handle.write().await).mark_paused()?;
                info!(session_id = %session_id, "Training paused");
                if !control.wait_until_resumed().await {
                    return Err(TrainingError::Cancelled);
                }
                SessionLedger::new(&mut *handle.write().await).mark_resumed()?;
                info!(session_id = %session_id, "Training resumed");
            }

            let (epoch, global_step) = {
                let mut guard = handle.write().await;
                let mut ledger = SessionLedger::new(&mut guard);
                let epoch = ledger.advance_epoch()?;
                ledger.append_log(LogLevel::Info, format!("Starting epoch {epoch}/{}", config.epochs))?;
                (epoch, guard.current_step)
            };

            let ctx = EpochContext {
                session_id: &session_id,
                epoch,
                total_epochs: config.epochs,
                global_step,
                steps_per_epoch: steps,
                config,
            };
            let train = self.runner.train_epoch(ctx, &data.split.train).await?;
            let validation = self.runner.validate_epoch(ctx, &data.split.validation).await?;
            ensure_finite_metrics(epoch, train.loss, validation.loss)?;

            let (snapshot, stop) = {
                let mut guard = handle.write().await;
                let mut ledger = SessionLedger::new(&mut guard);
                ledger.append_epoch_metrics(&train, &validation)?;
                ledger.advance_steps(steps)?;

                if CheckpointStore::is_due(epoch, config.save_steps) {
                    let checkpoint = self.checkpoints.save(&mut ledger, epoch)?;
                    ledger.append_log(
                        LogLevel::Info,
                        format!("Checkpoint saved for epoch {epoch}: {}", checkpoint.model_state),
                    )?;
                }
                if let Some(sample) = self.sampler.sample() {
                    ledger.record_resource_sample(sample)?;
                }

                let stop = self
                    .early_stopping
                    .should_stop(&ledger.session().metrics.validation_loss, patience);
                (TrainingSession::clone(&guard), stop)
            };

            info!(
                session_id = %session_id,
                epoch,
                train_loss = train.loss,
                validation_loss = validation.loss,
                train_accuracy = train.accuracy,
                validation_accuracy = validation.accuracy,
                "Epoch complete"
            );
            if let Some(sink) = progress {
                sink.on_progress(&snapshot);
            }

            if epoch >= config.epochs {
                break;
            }
            if stop {
                info!(session_id = %session_id, epoch, "Early stopping triggered");
                SessionLedger::new(&mut *handle.write().await).mark_completed(format!(
                    "Early stopping at epoch {epoch}: validation loss has not improved for {patience} epochs"
                ))?;
                return Ok(TrainingOutcome::EarlyStopped { epoch });
            }

            tokio::task::yield_now().await;
        }

        let mut guard = handle.write().await;
        let best = guard.best_validation_loss().unwrap_or(f64::NAN);
        SessionLedger::new(&mut guard).mark_completed(format!(
            "Training completed: {} epochs, best validation loss {best:.4}",
            config.epochs
        ))?;
        info!(session_id = %session_id, epochs = config.epochs, "Training completed");
        Ok(TrainingOutcome::Completed { epochs: config.epochs })
    }

    async fn check_datasets(&self, handle: &SessionHandle, datasets: &[Dataset]) -> TrainingResult<()> {
        let guard = handle.read().await;
        let supplied: Vec<_> = datasets.iter().map(|d| &d.id).collect();
        let expected: Vec<_> = guard.dataset_ids.iter().collect();
        if supplied != expected {
            return Err(TrainingError::Dataset(format!(
                "session {} was initialized with {} dataset(s) that do not match the {} supplied",
                session_label(&guard.id),
                expected.len(),
                supplied.len()
            )));
        }
        Ok(())
    }

    async fn validate_datasets(&self, handle: &SessionHandle, datasets: &[Dataset]) -> TrainingResult<()> {
        let result = self.validator.validate(datasets);

        let mut guard = handle.write().await;
        let mut ledger = SessionLedger::new(&mut guard);
        for warning in &result.warnings {
            warn!(session_id = %handle.id(), "{warning}");
            ledger.append_log(LogLevel::Warning, warning.clone())?;
        }
        if !result.is_valid {
            return Err(TrainingError::Validation(result.errors.join("; ")));
        }

        let metrics = &result.metrics;
        debug!(
            session_id = %handle.id(),
            total = metrics.total_samples,
            duplicates = metrics.duplicate_samples,
            missing = metrics.missing_samples,
            "Datasets validated"
        );
        ledger.append_log(
            LogLevel::Info,
            format!(
                "Validated {} dataset(s): {} samples, {} duplicates, {} missing",
                datasets.len(),
                metrics.total_samples,
                metrics.duplicate_samples,
                metrics.missing_samples
            ),
        )
    }
}

fn ensure_finite_metrics(epoch: u32, train_loss: f64, validation_loss: f64) -> TrainingResult<()> {
    if train_loss.is_finite() && validation_loss.is_finite() {
        return Ok(());
    }
    Err(TrainingError::Runner(format!(
        "non-finite loss at epoch {epoch} (train={train_loss}, validation={validation_loss})"
    )))
}

fn session_label(id: &SessionId) -> String {
    id.0.chars().take(8).collect()
}

fn log_preprocessing(ledger: &mut SessionLedger<'_>, data: &PreprocessedData) -> TrainingResult<()> {
    let stats = &data.stats;
    let split = &data.split;
    ledger.append_log(
        LogLevel::Info,
        format!(
            "Preprocessed {} samples into {} ({} removed, {} augmented); split train={} validation={} test={}",
            stats.original_samples,
            stats.processed_samples,
            stats.removed_samples,
            stats.augmented_samples,
            split.train.len(),
            split.validation.len(),
            split.test.len()
        ),
    )
}
