//! End-to-end tests for the training orchestrator
//!
//! These drive full sessions through validation, preprocessing and the epoch loop with
//! scripted runners, so every metric the session records is known in advance.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tutor_training::{
    DataSample, Dataset, DatasetKind, EpochContext, EpochMetrics, EpochRunner, EvalMetrics,
    FixedResourceSampler, LogLevel, QualityMetrics, ResourceSample, SessionStatus, TrainingConfiguration,
    TrainingError, TrainingOrchestrator, TrainingOutcome, TrainingResult, TrainingSession,
};

// Scripted runner: validation loss per epoch comes from `validation_losses`.
struct ScriptedRunner {
    validation_losses: Vec<f64>,
    fail_at: Option<u32>,
    train_calls: AtomicUsize,
}

impl ScriptedRunner {
    fn decreasing(epochs: usize) -> Self {
        Self::with_losses((0..epochs).map(|i| 1.0 / (i as f64 + 1.0)).collect())
    }

    fn with_losses(validation_losses: Vec<f64>) -> Self {
        Self { validation_losses, fail_at: None, train_calls: AtomicUsize::new(0) }
    }

    fn failing_at(mut self, epoch: u32) -> Self {
        self.fail_at = Some(epoch);
        self
    }
}

#[async_trait]
impl EpochRunner for ScriptedRunner {
    fn id(&self) -> &'static str {
        "scripted"
    }

    async fn train_epoch(&self, ctx: EpochContext<'_>, train: &[DataSample]) -> TrainingResult<EpochMetrics> {
        self.train_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(ctx.epoch) {
            return Err(TrainingError::Runner(format!("device lost during epoch {}", ctx.epoch)));
        }
        assert!(!train.is_empty());
        let loss = self.validation_losses[(ctx.epoch - 1) as usize] * 0.9;
        Ok(EpochMetrics { loss, accuracy: 1.0 - loss / 2.0, learning_rate: ctx.config.learning_rate })
    }

    async fn validate_epoch(&self, ctx: EpochContext<'_>, _validation: &[DataSample]) -> TrainingResult<EvalMetrics> {
        let loss = self.validation_losses[(ctx.epoch - 1) as usize];
        Ok(EvalMetrics { loss, accuracy: 1.0 - loss / 2.0 })
    }
}

fn faq_dataset(n: usize) -> Dataset {
    let samples = (0..n)
        .map(|i| DataSample::new(format!("How do I submit assignment {i}?"), format!("Upload it under week {i}.")))
        .collect();
    Dataset::new("course-faq", DatasetKind::QaPairs, samples).unwrap()
}

fn config(epochs: u32, save_steps: u32) -> TrainingConfiguration {
    TrainingConfiguration {
        epochs,
        save_steps,
        batch_size: 16,
        train_split: 0.8,
        validation_split: 0.1,
        test_split: 0.1,
        early_stopping_patience: 3,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_full_run_completes_with_checkpoints() {
    let orchestrator = TrainingOrchestrator::new(Arc::new(ScriptedRunner::decreasing(5)));
    let datasets = vec![faq_dataset(100)];
    let handle = orchestrator
        .initialize_training("faq-tuning", "weekly refresh", config(5, 2), &datasets)
        .unwrap();

    let seen: Arc<Mutex<Vec<(u32, usize)>>> = Arc::default();
    let sink = {
        let seen = Arc::clone(&seen);
        move |s: &TrainingSession| seen.lock().unwrap().push((s.current_epoch, s.metrics.train_loss.len()))
    };

    let outcome = orchestrator.start_training(&handle, &datasets, Some(&sink)).await.unwrap();
    assert_eq!(outcome, TrainingOutcome::Completed { epochs: 5 });

    let session = handle.snapshot().await;
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.current_epoch, 5);
    // 80 training samples / batch 16 = 5 steps per epoch
    assert_eq!(session.total_steps, 25);
    assert_eq!(session.current_step, 25);

    for history in [
        &session.metrics.train_loss,
        &session.metrics.validation_loss,
        &session.metrics.train_accuracy,
        &session.metrics.validation_accuracy,
        &session.metrics.learning_rate,
    ] {
        assert_eq!(history.len(), 5);
    }

    let epochs: Vec<u32> = session.checkpoints.iter().map(|c| c.epoch).collect();
    assert_eq!(epochs, vec![2, 4]);
    assert_eq!(session.checkpoints[0].model_state, "checkpoint_epoch_2.pt");
    assert_eq!(session.checkpoints[1].optimizer_state, "optimizer_epoch_4.pt");
    assert_eq!(session.best_model.as_deref(), Some("checkpoint_epoch_4.pt"));
    assert!(session.error.is_none());
    assert!(session.started_at.is_some() && session.ended_at.is_some());

    assert_eq!(*seen.lock().unwrap(), vec![(1, 1), (2, 2), (3, 3), (4, 4), (5, 5)]);
}

#[tokio::test]
async fn test_logs_narrate_the_run() {
    let orchestrator = TrainingOrchestrator::new(Arc::new(ScriptedRunner::decreasing(3)));
    let datasets = vec![faq_dataset(100)];
    let handle = orchestrator.initialize_training("narrated", "", config(3, 1), &datasets).unwrap();
    orchestrator.start_training(&handle, &datasets, None).await.unwrap();

    let session = handle.snapshot().await;
    assert_eq!(session.logs[0].level, LogLevel::Info);
    assert!(session.logs[0].message.contains("started"));
    let epoch_starts = session.logs.iter().filter(|l| l.message.starts_with("Starting epoch")).count();
    assert_eq!(epoch_starts, 3);
    let terminal = session.logs.iter().filter(|l| l.message.starts_with("Training completed")).count();
    assert_eq!(terminal, 1);
    assert!(session.logs.last().unwrap().message.starts_with("Training completed"));
    assert_eq!(session.logs_at(LogLevel::Error).count(), 0);
    assert!(session.logs.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn test_low_quality_dataset_fails_before_running() {
    let orchestrator = TrainingOrchestrator::new(Arc::new(ScriptedRunner::decreasing(5)));
    let forced = QualityMetrics::from_ratios(0.5, 0.5, 0.5, 0.5, 0.5);
    let datasets = vec![faq_dataset(100).with_quality_metrics(forced)];
    let handle = orchestrator.initialize_training("rejected", "", config(5, 2), &datasets).unwrap();

    let err = orchestrator.start_training(&handle, &datasets, None).await.unwrap_err();
    assert!(matches!(err, TrainingError::Validation(_)));
    assert!(err.to_string().contains("course-faq"));

    let session = handle.snapshot().await;
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.current_epoch, 0);
    assert!(session.started_at.is_none());
    assert!(session.error.as_deref().unwrap().contains("course-faq"));
    assert_eq!(session.logs_at(LogLevel::Error).count(), 1);
    assert!(session.checkpoints.is_empty());
}

#[tokio::test]
async fn test_checkpoint_schedule_follows_save_steps() {
    for (save_steps, expected) in [(1, (1..=10).collect::<Vec<u32>>()), (5, vec![5, 10]), (100, vec![])] {
        let mut cfg = config(10, save_steps);
        cfg.early_stopping_patience = 20;
        let orchestrator = TrainingOrchestrator::new(Arc::new(ScriptedRunner::decreasing(10)));
        let datasets = vec![faq_dataset(100)];
        let handle = orchestrator.initialize_training("schedule", "", cfg, &datasets).unwrap();
        orchestrator.start_training(&handle, &datasets, None).await.unwrap();

        let session = handle.snapshot().await;
        let epochs: Vec<u32> = session.checkpoints.iter().map(|c| c.epoch).collect();
        assert_eq!(epochs, expected, "save_steps={save_steps}");
    }
}

#[tokio::test]
async fn test_plateau_triggers_early_stop_as_success() {
    let runner = ScriptedRunner::with_losses(vec![1.0, 0.9, 0.95, 0.96, 0.97, 0.5, 0.4, 0.3]);
    let orchestrator = TrainingOrchestrator::new(Arc::new(runner));
    let datasets = vec![faq_dataset(100)];
    let handle = orchestrator.initialize_training("plateau", "", config(8, 1), &datasets).unwrap();

    let outcome = orchestrator.start_training(&handle, &datasets, None).await.unwrap();
    assert_eq!(outcome, TrainingOutcome::EarlyStopped { epoch: 4 });

    let session = handle.snapshot().await;
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.current_epoch, 4);
    assert_eq!(session.metrics.validation_loss.len(), 4);
    assert_eq!(session.best_model.as_deref(), Some("checkpoint_epoch_2.pt"));
    assert!(session.logs.last().unwrap().message.contains("Early stopping"));
    assert!(session.error.is_none());
}

#[tokio::test]
async fn test_runner_error_marks_session_failed() {
    let runner = Arc::new(ScriptedRunner::decreasing(5).failing_at(3));
    let orchestrator = TrainingOrchestrator::new(runner.clone());
    let datasets = vec![faq_dataset(100)];
    let handle = orchestrator.initialize_training("flaky", "", config(5, 1), &datasets).unwrap();

    let err = orchestrator.start_training(&handle, &datasets, None).await.unwrap_err();
    assert!(err.to_string().contains("device lost during epoch 3"));
    assert_eq!(runner.train_calls.load(Ordering::SeqCst), 3);

    let session = handle.snapshot().await;
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.metrics.train_loss.len(), 2);
    assert_eq!(session.checkpoints.len(), 2);
    assert!(session.error.as_deref().unwrap().contains("device lost"));
    assert_eq!(session.logs.last().unwrap().level, LogLevel::Error);
}

#[tokio::test]
async fn test_terminal_session_cannot_be_restarted() {
    let orchestrator = TrainingOrchestrator::new(Arc::new(ScriptedRunner::decreasing(2)));
    let datasets = vec![faq_dataset(100)];
    let handle = orchestrator.initialize_training("once", "", config(2, 1), &datasets).unwrap();
    orchestrator.start_training(&handle, &datasets, None).await.unwrap();
    let logs_before = handle.snapshot().await.logs.len();

    let err = orchestrator.start_training(&handle, &datasets, None).await.unwrap_err();
    assert!(matches!(err, TrainingError::InvalidTransition { from: SessionStatus::Completed, .. }));
    let session = handle.snapshot().await;
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.logs.len(), logs_before);
}

#[tokio::test]
async fn test_invalid_configuration_rejected_at_initialization() {
    let orchestrator = TrainingOrchestrator::new(Arc::new(ScriptedRunner::decreasing(2)));
    let mut cfg = config(2, 1);
    cfg.test_split = 0.3;
    let err = orchestrator.initialize_training("bad", "", cfg, &[faq_dataset(100)]).unwrap_err();
    assert!(matches!(err, TrainingError::InvalidConfig(_)));

    let err = orchestrator.initialize_training("empty", "", config(2, 1), &[]).unwrap_err();
    assert!(matches!(err, TrainingError::Dataset(_)));
}

#[tokio::test]
async fn test_mismatched_datasets_fail_the_session() {
    let orchestrator = TrainingOrchestrator::new(Arc::new(ScriptedRunner::decreasing(2)));
    let handle = orchestrator.initialize_training("mismatch", "", config(2, 1), &[faq_dataset(100)]).unwrap();

    let err = orchestrator.start_training(&handle, &[faq_dataset(120)], None).await.unwrap_err();
    assert!(matches!(err, TrainingError::Dataset(_)));
    assert_eq!(handle.status().await, SessionStatus::Failed);
}

#[tokio::test]
async fn test_cancel_stops_at_next_epoch_boundary() {
    let orchestrator = TrainingOrchestrator::new(Arc::new(ScriptedRunner::decreasing(6)));
    let datasets = vec![faq_dataset(100)];
    let handle = orchestrator.initialize_training("cancel-me", "", config(6, 1), &datasets).unwrap();

    let sink = {
        let handle = handle.clone();
        move |s: &TrainingSession| {
            if s.current_epoch == 2 {
                handle.cancel();
            }
        }
    };
    let err = orchestrator.start_training(&handle, &datasets, Some(&sink)).await.unwrap_err();
    assert!(matches!(err, TrainingError::Cancelled));

    let session = handle.snapshot().await;
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert_eq!(session.current_epoch, 2);
    assert_eq!(session.metrics.train_loss.len(), 2);
    assert!(session.logs.last().unwrap().message.contains("cancelled"));
}

#[tokio::test]
async fn test_pause_then_resume_finishes_run() {
    let orchestrator = TrainingOrchestrator::new(Arc::new(ScriptedRunner::decreasing(3)));
    let datasets = vec![faq_dataset(100)];
    let handle = orchestrator.initialize_training("pausable", "", config(3, 1), &datasets).unwrap();

    let sink = {
        let handle = handle.clone();
        move |s: &TrainingSession| {
            if s.current_epoch == 1 {
                handle.pause();
                let handle = handle.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    handle.resume();
                });
            }
        }
    };
    let outcome = orchestrator.start_training(&handle, &datasets, Some(&sink)).await.unwrap();
    assert_eq!(outcome, TrainingOutcome::Completed { epochs: 3 });

    let session = handle.snapshot().await;
    assert!(session.logs.iter().any(|l| l.message.contains("paused at epoch 1")));
    assert!(session.logs.iter().any(|l| l.message == "Training resumed"));
    assert_eq!(session.metrics.train_loss.len(), 3);
}

#[tokio::test]
async fn test_resource_samples_recorded_per_epoch() {
    let sample = ResourceSample { gpu: 0.7, memory: 0.5, cpu: 0.3 };
    let orchestrator = TrainingOrchestrator::new(Arc::new(ScriptedRunner::decreasing(4)))
        .with_resource_sampler(Arc::new(FixedResourceSampler(sample)));
    let datasets = vec![faq_dataset(100)];
    let handle = orchestrator.initialize_training("sampled", "", config(4, 1), &datasets).unwrap();
    orchestrator.start_training(&handle, &datasets, None).await.unwrap();

    let usage = handle.snapshot().await.resource_usage;
    assert_eq!(usage.gpu, vec![0.7; 4]);
    assert_eq!(usage.memory.len(), 4);
    assert_eq!(usage.cpu.len(), 4);
}

#[tokio::test]
async fn test_small_dataset_warning_is_logged_but_run_proceeds() {
    let orchestrator = TrainingOrchestrator::new(Arc::new(ScriptedRunner::decreasing(2)));
    let datasets = vec![faq_dataset(40)];
    let handle = orchestrator.initialize_training("small", "", config(2, 1), &datasets).unwrap();
    orchestrator.start_training(&handle, &datasets, None).await.unwrap();

    let session = handle.snapshot().await;
    assert_eq!(session.status, SessionStatus::Completed);
    let warnings: Vec<_> = session.logs_at(LogLevel::Warning).collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("course-faq"));
}

#[tokio::test]
async fn test_sessions_run_concurrently_on_one_orchestrator() {
    let orchestrator = TrainingOrchestrator::new(Arc::new(ScriptedRunner::decreasing(4)));
    let first = vec![faq_dataset(100)];
    let second = vec![faq_dataset(150)];
    let a = orchestrator.initialize_training("a", "", config(4, 2), &first).unwrap();
    let b = orchestrator.initialize_training("b", "", config(3, 3), &second).unwrap();

    let (ra, rb) = tokio::join!(
        orchestrator.start_training(&a, &first, None),
        orchestrator.start_training(&b, &second, None)
    );
    assert_eq!(ra.unwrap(), TrainingOutcome::Completed { epochs: 4 });
    assert_eq!(rb.unwrap(), TrainingOutcome::Completed { epochs: 3 });
    assert_ne!(a.id(), b.id());
    assert_eq!(a.snapshot().await.checkpoints.len(), 2);
    assert_eq!(b.snapshot().await.checkpoints.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_start_on_same_handle_is_rejected() {
    let orchestrator = Arc::new(TrainingOrchestrator::new(Arc::new(ScriptedRunner::decreasing(4))));
    let datasets = Arc::new(vec![faq_dataset(100)]);
    let handle = orchestrator.initialize_training("single-claim", "", config(4, 1), &datasets).unwrap();

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let orchestrator = Arc::clone(&orchestrator);
            let datasets = Arc::clone(&datasets);
            let handle = handle.clone();
            tokio::spawn(async move { orchestrator.start_training(&handle, &datasets, None).await })
        })
        .collect();

    let mut completed = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(outcome) => {
                assert_eq!(outcome, TrainingOutcome::Completed { epochs: 4 });
                completed += 1;
            }
            Err(TrainingError::InvalidTransition { to: SessionStatus::Running, .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((completed, rejected), (1, 1));

    let session = handle.snapshot().await;
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.error.is_none());
    assert_eq!(session.logs.iter().filter(|l| l.message.contains("started")).count(), 1);
    assert_eq!(session.logs.iter().filter(|l| l.message.starts_with("Training completed")).count(), 1);
    assert_eq!(session.logs_at(LogLevel::Error).count(), 0);
    assert_eq!(session.metrics.train_loss.len(), 4);
}

#[tokio::test]
async fn test_plateau_on_final_epoch_reports_completion() {
    let runner = ScriptedRunner::with_losses(vec![0.5, 0.5, 0.5]);
    let orchestrator = TrainingOrchestrator::new(Arc::new(runner));
    let datasets = vec![faq_dataset(100)];
    let handle = orchestrator.initialize_training("flat", "", config(3, 1), &datasets).unwrap();

    let outcome = orchestrator.start_training(&handle, &datasets, None).await.unwrap();
    assert_eq!(outcome, TrainingOutcome::Completed { epochs: 3 });

    let session = handle.snapshot().await;
    assert!(session.logs.last().unwrap().message.starts_with("Training completed"));
    assert!(!session.logs.iter().any(|l| l.message.contains("Early stopping")));
}

#[tokio::test]
async fn test_non_finite_loss_fails_the_session() {
    let runner = ScriptedRunner::with_losses(vec![0.5, f64::NAN, 0.3]);
    let orchestrator = TrainingOrchestrator::new(Arc::new(runner));
    let datasets = vec![faq_dataset(100)];
    let handle = orchestrator.initialize_training("diverged", "", config(3, 1), &datasets).unwrap();

    let err = orchestrator.start_training(&handle, &datasets, None).await.unwrap_err();
    assert!(matches!(err, TrainingError::Runner(_)));
    assert!(err.to_string().contains("epoch 2"));

    let session = handle.snapshot().await;
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.metrics.validation_loss, vec![0.5]);
    assert_eq!(session.checkpoints.len(), 1);
    assert_eq!(session.best_model.as_deref(), Some("checkpoint_epoch_1.pt"));
}
