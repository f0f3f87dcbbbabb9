use crate::session::TrainingSession;

/// Receives the session snapshot once per completed epoch.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, session: &TrainingSession);
}

impl<F> ProgressSink for F
where
    F: Fn(&TrainingSession) + Send + Sync,
{
    fn on_progress(&self, session: &TrainingSession) {
        self(session);
    }
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_progress(&self, session: &TrainingSession) {
        let epoch = session.current_epoch;
        let total = session.total_epochs;
        let train = session.metrics.train_loss.last().copied().unwrap_or(f64::NAN);
        let validation = session.metrics.validation_loss.last().copied().unwrap_or(f64::NAN);
        println!(
            "[train:{}] epoch {epoch}/{total} train_loss={train:.4} val_loss={validation:.4} step {}/{}",
            session.id, session.current_step, session.total_steps
        );
    }
}
