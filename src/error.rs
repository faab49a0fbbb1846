// src/error.rs

use partita_core::ConfigError;
use thiserror::Error;

/// Failures of the chain builder's lifecycle and worker pool
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,

    #[error("chain builder already initialized with {0} workers")]
    AlreadyInitialized(usize),

    #[error("chain builder has no worker contexts; call initialize() first")]
    NotInitialized,

    #[error("no input segment set")]
    NoInputSegment,

    #[error("worker {0} disconnected")]
    WorkerDisconnected(usize),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
