//! The only mutation surface for a `TrainingSession`.
//!
//! Every operation refuses to touch a session in a terminal status and returns
//! `TrainingError::SessionClosed` instead.

use crate::checkpoint::Checkpoint;
use crate::error::{TrainingError, TrainingResult};
use crate::runner::{EpochMetrics, EvalMetrics};
use crate::session::{LogLevel, ResourceSample, SessionStatus, TrainingLog, TrainingSession};
use chrono::Utc;
use tracing::debug;

#[derive(Debug)]
pub struct SessionLedger<'a> {
    session: &'a mut TrainingSession,
}

impl<'a> SessionLedger<'a> {
    pub fn new(session: &'a mut TrainingSession) -> Self {
        Self { session }
    }

    #[must_use]
    pub fn session(&self) -> &TrainingSession {
        self.session
    }

    fn ensure_open(&self) -> TrainingResult<()> {
        if self.session.status.is_terminal() {
            return Err(TrainingError::SessionClosed { status: self.session.status });
        }
        Ok(())
    }

    pub fn append_log(&mut self, level: LogLevel, message: impl Into<String>) -> TrainingResult<()> {
        self.ensure_open()?;
        self.session.logs.push(TrainingLog { timestamp: Utc::now(), level, message: message.into() });
        Ok(())
    }

    pub fn append_epoch_metrics(&mut self, train: &EpochMetrics, validation: &EvalMetrics) -> TrainingResult<()> {
        self.ensure_open()?;
        let history = &mut self.session.metrics;
        history.train_loss.push(train.loss);
        history.validation_loss.push(validation.loss);
        history.train_accuracy.push(train.accuracy);
        history.validation_accuracy.push(validation.accuracy);
        history.learning_rate.push(train.learning_rate);
        Ok(())
    }

    /// Move to the next epoch and return its 1-based index.
    pub fn advance_epoch(&mut self) -> TrainingResult<u32> {
        self.ensure_open()?;
        if self.session.current_epoch >= self.session.total_epochs {
            return Err(TrainingError::Runner(format!(
                "epoch {} exceeds configured total of {}",
                self.session.current_epoch + 1,
                self.session.total_epochs
            )));
        }
        self.session.current_epoch += 1;
        Ok(self.session.current_epoch)
    }

    pub fn set_total_steps(&mut self, total_steps: u64) -> TrainingResult<()> {
        self.ensure_open()?;
        self.session.total_steps = total_steps;
        Ok(())
    }

    pub fn advance_steps(&mut self, steps: u64) -> TrainingResult<()> {
        self.ensure_open()?;
        self.session.current_step = (self.session.current_step + steps).min(self.session.total_steps);
        Ok(())
    }

    /// Append a checkpoint and promote it to best model when its validation loss is the
    /// lowest seen among checkpoints. A non-finite loss is recorded but never promoted.
    pub fn record_checkpoint(&mut self, checkpoint: Checkpoint) -> TrainingResult<()> {
        self.ensure_open()?;
        let loss = checkpoint.metrics.validation_loss;
        let improves = loss.is_finite()
            && self
                .session
                .checkpoints
                .iter()
                .filter(|c| c.metrics.validation_loss.is_finite())
                .all(|c| loss < c.metrics.validation_loss);
        if improves {
            self.session.best_model = Some(checkpoint.model_state.clone());
        }
        self.session.checkpoints.push(checkpoint);
        Ok(())
    }

    pub fn record_resource_sample(&mut self, sample: ResourceSample) -> TrainingResult<()> {
        self.ensure_open()?;
        let usage = &mut self.session.resource_usage;
        usage.gpu.push(sample.gpu);
        usage.memory.push(sample.memory);
        usage.cpu.push(sample.cpu);
        Ok(())
    }

    fn transition(&mut self, to: SessionStatus) -> TrainingResult<()> {
        self.ensure_open()?;
        let from = self.session.status;
        if !from.can_transition_to(to) {
            return Err(TrainingError::InvalidTransition { from, to });
        }
        debug!(session_id = %self.session.id, %from, %to, "Session transition");

        let now = Utc::now();
        if to == SessionStatus::Running && self.session.started_at.is_none() {
            self.session.started_at = Some(now);
        }
        if to.is_terminal() {
            self.session.ended_at = Some(now);
        }
        self.session.status = to;
        Ok(())
    }

    pub fn mark_running(&mut self) -> TrainingResult<()> {
        self.transition(SessionStatus::Running)
    }

    pub fn mark_paused(&mut self) -> TrainingResult<()> {
        self.transition(SessionStatus::Paused)?;
        self.append_log(LogLevel::Info, format!("Training paused at epoch {}", self.session.current_epoch))
    }

    pub fn mark_resumed(&mut self) -> TrainingResult<()> {
        if self.session.status != SessionStatus::Paused {
            return Err(TrainingError::InvalidTransition {
                from: self.session.status,
                to: SessionStatus::Running,
            });
        }
        self.transition(SessionStatus::Running)?;
        self.append_log(LogLevel::Info, "Training resumed")
    }

    pub fn mark_completed(&mut self, message: impl Into<String>) -> TrainingResult<()> {
        self.append_log(LogLevel::Info, message)?;
        self.transition(SessionStatus::Completed)
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> TrainingResult<()> {
        let error = error.into();
        self.ensure_open()?;
        if !self.session.status.can_transition_to(SessionStatus::Failed) {
            return Err(TrainingError::InvalidTransition {
                from: self.session.status,
                to: SessionStatus::Failed,
            });
        }
        self.append_log(LogLevel::Error, error.clone())?;
        self.session.error = Some(error);
        self.transition(SessionStatus::Failed)
    }

    pub fn mark_cancelled(&mut self) -> TrainingResult<()> {
        self.append_log(
            LogLevel::Warning,
            format!("Training cancelled at epoch {}", self.session.current_epoch),
        )?;
        self.session.error = Some("training cancelled".to_string());
        self.transition(SessionStatus::Cancelled)
    }
}
