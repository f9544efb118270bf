//! Error types for CLI operations.

use contracts::ContractError;
use dispatcher::DispatchError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse or validation error
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ContractError),

    /// Invalid command-line argument
    #[error("Invalid argument --{name}: {message}")]
    InvalidArgument { name: &'static str, message: String },

    /// Dispatcher lifecycle error
    #[error("Dispatcher error: {0}")]
    Dispatch(#[from] DispatchError),

    /// A producer thread panicked
    #[error("Producer thread {index} panicked")]
    ProducerPanicked { index: usize },

    /// Blocking task failed to complete
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn invalid_argument(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
