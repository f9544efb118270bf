//! Layered error definitions
//!
//! Categorized by source: config / handler

use thiserror::Error;

use crate::PayloadKind;

/// Unified error type for configuration and I/O
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error returned by a [`MessageHandler`](crate::MessageHandler) callback
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Payload did not have the kind the handler expected
    #[error("unexpected payload for key '{key}': expected {expected}, got {actual}")]
    UnexpectedPayload {
        key: String,
        expected: PayloadKind,
        actual: PayloadKind,
    },

    /// Handler refused to process the message
    #[error("handler rejected message for key '{key}': {reason}")]
    Rejected { key: String, reason: String },

    /// Handler-specific failure
    #[error("handler failed: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Create a rejection error
    pub fn rejected(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an arbitrary error
    pub fn other(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(error.into())
    }
}
