//! Error types for the sync service.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::database::{LockError, RepositoryError};
use crate::messaging::MessagingError;

/// Failure of a sync cycle or of service setup
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl SyncError {
    /// True when a later redelivery of the same messages may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Lock(_)
                | Self::Repository(RepositoryError::Database(_))
                | Self::Repository(RepositoryError::LeaseLost { .. })
                | Self::Messaging(_)
        )
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
