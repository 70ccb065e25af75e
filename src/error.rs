use std::time::Duration;

use thiserror::Error;

use crate::event::{Role, WorkerId};

/// A blocking `put`/`get` gave up because the stop signal was raised.
///
/// Workers treat this as their normal exit path, not as a failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled by stop signal")]
pub struct Cancelled;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("buffer capacity must be at least 1")]
    ZeroCapacity,

    #[error("at least one producer is required")]
    NoProducers,

    #[error("at least one consumer is required")]
    NoConsumers,

    #[error("{role} delay range is inverted: min {min:?} > max {max:?}")]
    InvertedDelay {
        role: Role,
        min: Duration,
        max: Duration,
    },

    #[error("poll interval must be non-zero")]
    ZeroPollInterval,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("a session is already running")]
    AlreadyRunning,

    #[error("no session is running")]
    NotRunning,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("workers did not stop in time: {pending:?}")]
    StopTimeout { pending: Vec<WorkerId> },
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
