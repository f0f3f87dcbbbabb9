//! Pluggable epoch backends.
//!
//! The orchestrator never computes gradients itself. It hands each partition to an
//! `EpochRunner` and records whatever metrics come back.

use crate::config::TrainingConfiguration;
use crate::dataset::DataSample;
use crate::error::{TrainingError, TrainingResult};
use crate::session::{ResourceSample, SessionId};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub loss: f64,
    pub accuracy: f64,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

/// What a runner knows about the epoch it is asked to run.
#[derive(Debug, Clone, Copy)]
pub struct EpochContext<'a> {
    pub session_id: &'a SessionId,
    /// 1-based.
    pub epoch: u32,
    pub total_epochs: u32,
    /// Optimizer steps completed before this epoch.
    pub global_step: u64,
    pub steps_per_epoch: u64,
    pub config: &'a TrainingConfiguration,
}

#[async_trait]
pub trait EpochRunner: Send + Sync {
    fn id(&self) -> &'static str;

    async fn train_epoch(&self, ctx: EpochContext<'_>, train: &[DataSample]) -> TrainingResult<EpochMetrics>;

    async fn validate_epoch(&self, ctx: EpochContext<'_>, validation: &[DataSample]) -> TrainingResult<EvalMetrics>;
}

/// Produces plausible metrics without touching a model: loss decays exponentially with
/// seeded jitter, accuracy tracks loss, learning rate warms up linearly.
///
/// Jitter is drawn from an RNG keyed on the runner seed, the session's configured seed,
/// the epoch and the phase, so a session sees the same metrics no matter how many other
/// sessions share the runner.
#[derive(Debug, Clone)]
pub struct SimulatedEpochRunner {
    seed: u64,
    decay: f64,
    jitter: f64,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Train = 1,
    Validate = 2,
}

impl SimulatedEpochRunner {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { seed, decay: 0.35, jitter: 0.02 }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.abs();
        self
    }

    fn noise(&self, ctx: &EpochContext<'_>, phase: Phase) -> f64 {
        if self.jitter == 0.0 {
            return 0.0;
        }
        let key = self.seed
            ^ ctx.config.seed.rotate_left(17)
            ^ u64::from(ctx.epoch).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ phase as u64;
        StdRng::seed_from_u64(key).gen_range(-self.jitter..=self.jitter)
    }

    fn base_loss(&self, epoch: u32) -> f64 {
        2.0f64.mul_add((-self.decay * f64::from(epoch)).exp(), 0.1)
    }
}

/// Linear warmup to `config.learning_rate` over `warmup_steps`, constant afterwards.
#[must_use]
pub fn warmup_learning_rate(config: &TrainingConfiguration, step: u64) -> f64 {
    if config.warmup_steps == 0 || step >= config.warmup_steps {
        return config.learning_rate;
    }
    config.learning_rate * (step as f64 / config.warmup_steps as f64)
}

fn accuracy_for(loss: f64) -> f64 {
    (1.0 - loss / 2.5).clamp(0.0, 1.0)
}

#[async_trait]
impl EpochRunner for SimulatedEpochRunner {
    fn id(&self) -> &'static str {
        "simulated"
    }

    async fn train_epoch(&self, ctx: EpochContext<'_>, train: &[DataSample]) -> TrainingResult<EpochMetrics> {
        if train.is_empty() {
            return Err(TrainingError::Runner("training partition is empty".to_string()));
        }
        let loss = (self.base_loss(ctx.epoch) + self.noise(&ctx, Phase::Train)).max(0.0);
        let end_step = ctx.global_step + ctx.steps_per_epoch;
        Ok(EpochMetrics {
            loss,
            accuracy: accuracy_for(loss),
            learning_rate: warmup_learning_rate(ctx.config, end_step),
        })
    }

    async fn validate_epoch(&self, ctx: EpochContext<'_>, _validation: &[DataSample]) -> TrainingResult<EvalMetrics> {
        let loss = (self.base_loss(ctx.epoch).mul_add(1.05, 0.05) + self.noise(&ctx, Phase::Validate)).max(0.0);
        Ok(EvalMetrics { loss, accuracy: accuracy_for(loss) })
    }
}

/// Supplies one resource reading per epoch.
pub trait ResourceSampler: Send + Sync {
    fn sample(&self) -> Option<ResourceSample>;
}

/// Records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResourceSampler;

impl ResourceSampler for NoopResourceSampler {
    fn sample(&self) -> Option<ResourceSample> {
        None
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedResourceSampler(pub ResourceSample);

impl ResourceSampler for FixedResourceSampler {
    fn sample(&self) -> Option<ResourceSample> {
        Some(self.0)
    }
}
