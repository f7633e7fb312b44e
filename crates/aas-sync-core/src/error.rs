//! Core error types

use thiserror::Error;

/// Errors raised by the core synchronization types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An access URL could not be parsed or is not usable for a service
    #[error("Invalid access URL '{url}': {reason}")]
    InvalidAccessUrl { url: String, reason: String },

    /// Construction-time misconfiguration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// An internal invariant did not hold (e.g. duplicate references in a snapshot)
    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),
}

impl CoreError {
    /// Whether this error must abort the current pipeline execution
    pub fn is_fatal(&self) -> bool {
        match self {
            CoreError::InvalidAccessUrl { .. } => false,
            CoreError::Configuration(_) | CoreError::InvariantViolation(_) => true,
        }
    }
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
