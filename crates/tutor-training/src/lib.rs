//! Tutor Training
//!
//! Orchestration core for fine-tuning runs of the tutoring assistant:
//! - Validating datasets (`DatasetValidator`)
//! - Cleaning, augmenting and splitting samples (`DataPreprocessor`)
//! - Running the epoch loop with checkpoints and early stopping (`TrainingOrchestrator`)
//! - Tracking every run in an append-only `TrainingSession`
//!
//! Numerical training is delegated to an `EpochRunner` backend.

pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod early_stopping;
pub mod error;
pub mod handle;
pub mod ledger;
pub mod orchestrator;
pub mod preprocess;
pub mod progress;
pub mod runner;
pub mod session;
pub mod validator;

pub use checkpoint::{Checkpoint, CheckpointMetrics, CheckpointNaming, CheckpointStore, FlatNaming, TrainingLayout};
pub use config::{ModelFamily, OptimizerKind, OptimizerParams, TrainingConfiguration};
pub use dataset::{
    read_jsonl_samples, write_jsonl_samples, DataSample, Dataset, DatasetId, DatasetKind, DatasetMetadata,
    PreprocessingStatus, QualityMetrics,
};
pub use early_stopping::{EarlyStoppingPolicy, PlateauEarlyStopping};
pub use error::{TrainingError, TrainingResult};
pub use handle::{SessionControl, SessionHandle};
pub use ledger::SessionLedger;
pub use orchestrator::{steps_per_epoch, TrainingOrchestrator, TrainingOutcome};
pub use preprocess::{Augmenter, ContextInliningAugmenter, DataPreprocessor, DataSplit, PreprocessStats, PreprocessedData};
pub use progress::{ProgressSink, StdoutProgressSink};
pub use runner::{
    EpochContext, EpochMetrics, EpochRunner, EvalMetrics, FixedResourceSampler, NoopResourceSampler,
    ResourceSampler, SimulatedEpochRunner,
};
pub use session::{
    LogLevel, MetricHistory, ResourceSample, ResourceUsage, SessionId, SessionStatus, TrainingLog,
    TrainingSession,
};
pub use validator::{DatasetValidator, ValidationMetrics, ValidationResult};
