//! Dispatcher error types

use contracts::HandlerError;
use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler failed during synchronous dispatch
    #[error("handler for key '{key}' failed: {source}")]
    Handler {
        key: String,
        #[source]
        source: HandlerError,
    },

    /// `start_dispatching` called while the worker is running
    #[error("dispatcher '{worker}' is already running")]
    AlreadyRunning { worker: String },

    /// Worker thread name cannot be used as an OS thread name
    #[error("invalid worker thread name {worker:?}: {reason}")]
    InvalidWorkerName { worker: String, reason: &'static str },

    /// Worker thread could not be spawned
    #[error("failed to spawn worker thread '{worker}': {source}")]
    Spawn {
        worker: String,
        #[source]
        source: std::io::Error,
    },

    /// Worker thread panicked outside a handler
    #[error("worker thread '{worker}' panicked")]
    WorkerPanicked { worker: String },
}

impl DispatchError {
    /// Create a handler failure error
    pub fn handler(key: impl Into<String>, source: HandlerError) -> Self {
        Self::Handler {
            key: key.into(),
            source,
        }
    }
}
