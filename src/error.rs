use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs.
#[derive(Debug, Error)]
pub enum Error {
    /// Options were rejected before any thread was spawned.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The worker could not reserve its scratch buffer.
    #[error("failed to allocate a {samples}-sample scratch buffer")]
    Allocation { samples: usize },

    #[error("failed to spawn decoder worker thread")]
    Spawn(#[source] std::io::Error),

    #[error("decoder worker did not report ready within {0:?}")]
    StartupTimeout(Duration),

    /// The worker thread has exited or the stage was closed.
    #[error("decoder worker is no longer running")]
    WorkerGone,

    /// The handoff discipline between adapter and worker was broken. Always a bug.
    #[error("handoff protocol violation: {0}")]
    Protocol(String),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        Self::Other(Box::new(err))
    }
}
