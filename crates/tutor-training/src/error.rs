use crate::session::SessionStatus;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid training configuration: {0}")]
    InvalidConfig(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("dataset validation failed: {0}")]
    Validation(String),

    #[error("preprocessing error: {0}")]
    Preprocess(String),

    #[error("epoch runner error: {0}")]
    Runner(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// A mutation was attempted on a session that already reached a terminal status.
    #[error("session is closed (status: {status})")]
    SessionClosed { status: SessionStatus },

    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionStatus, to: SessionStatus },

    #[error("training cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
