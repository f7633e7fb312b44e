//! Service layer error types

use aas_sync_core::{CoreError, PipelineFailure, Severity};
use thiserror::Error;

use crate::adapters::{ApplyError, FetchError};
use crate::registry::RegistryError;

/// Errors raised while synchronizing services
#[derive(Error, Debug)]
pub enum SyncError {
    /// Construction-time misconfiguration (e.g. basic auth without a password)
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Loading configuration from file or environment failed
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// The secret store has no value for a vault alias
    #[error("Secret not found for alias '{alias}'")]
    SecretNotFound { alias: String },

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Catalog update failed: {0}")]
    Apply(#[from] ApplyError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SyncError {
    /// Whether this error must abort the current tick
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Configuration(_) | SyncError::ConfigLoad(_) => true,
            SyncError::SecretNotFound { .. } | SyncError::Fetch(_) | SyncError::Apply(_) => false,
            SyncError::Registry(e) => e.is_fatal(),
            SyncError::Core(e) => e.is_fatal(),
        }
    }

    /// Pipeline failure with a severity matching this error
    pub fn to_failure(&self) -> PipelineFailure {
        let severity = if self.is_fatal() {
            Severity::Fatal
        } else {
            Severity::Warning
        };
        PipelineFailure::new(severity, self.to_string())
    }
}

/// Result type for service layer operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use aas_sync_core::AccessUrl;

    #[test]
    fn test_severity_taxonomy() {
        let url = AccessUrl::parse("https://svc:8443").unwrap();

        assert!(SyncError::Configuration("no password".into()).is_fatal());
        assert!(!SyncError::SecretNotFound { alias: "a".into() }.is_fatal());
        assert!(!SyncError::from(FetchError::Status(503)).is_fatal());
        assert!(!SyncError::from(ApplyError::Rejected("x".into())).is_fatal());
        assert!(!SyncError::from(RegistryError::NotRegistered(url.clone())).is_fatal());
        assert!(SyncError::from(RegistryError::SnapshotConflict(url)).is_fatal());
        assert!(SyncError::from(CoreError::InvariantViolation("dup".into())).is_fatal());
    }

    #[test]
    fn test_to_failure() {
        let failure = SyncError::SecretNotFound {
            alias: "svc-key".into(),
        }
        .to_failure();
        assert_eq!(failure.severity(), Severity::Warning);
        assert_eq!(failure.message(), "Secret not found for alias 'svc-key'");
    }
}
