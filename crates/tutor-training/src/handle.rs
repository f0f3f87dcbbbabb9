//! Shared session handle and run control.

use crate::session::{SessionId, SessionStatus, TrainingSession};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;

/// Pause and cancellation signals for one run. Cloning shares the same signals.
#[derive(Clone)]
pub struct SessionControl {
    cancel: CancellationToken,
    paused: Arc<watch::Sender<bool>>,
    started: Arc<AtomicBool>,
}

impl fmt::Debug for SessionControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionControl")
            .field("cancelled", &self.is_cancelled())
            .field("paused", &self.is_paused())
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for SessionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionControl {
    #[must_use]
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            paused: Arc::new(paused),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claim the single run of this session. Only the first caller gets `true`.
    pub(crate) fn claim_run(&self) -> bool {
        !self.started.swap(true, Ordering::SeqCst)
    }

    /// Request a pause; honoured at the next epoch boundary.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Request cancellation; honoured at the next epoch boundary, including while paused.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until resumed or cancelled. Returns `true` if the run should continue.
    pub async fn wait_until_resumed(&self) -> bool {
        let mut rx = self.paused.subscribe();
        tokio::select! {
            () = self.cancel.cancelled() => false,
            res = rx.wait_for(|paused| !*paused) => res.is_ok() && !self.cancel.is_cancelled(),
        }
    }
}

/// Cheaply clonable handle to a session. Readers can snapshot it at any time, including
/// while the orchestrator is running it.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    session: Arc<RwLock<TrainingSession>>,
    control: SessionControl,
}

impl SessionHandle {
    #[must_use]
    pub fn new(session: TrainingSession) -> Self {
        Self {
            id: session.id.clone(),
            session: Arc::new(RwLock::new(session)),
            control: SessionControl::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn control(&self) -> &SessionControl {
        &self.control
    }

    pub async fn snapshot(&self) -> TrainingSession {
        self.session.read().await.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.session.read().await.status
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, TrainingSession> {
        self.session.read().await
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, TrainingSession> {
        self.session.write().await
    }
}
