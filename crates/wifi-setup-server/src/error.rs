//! Error types for the connection manager and its drivers.

use thiserror::Error;

use wifi_setup_core::{ConnectionState, CredentialsError, StoreError};

/// A radio or portal server operation failed.
///
/// This is the driver-level setup failure. It is logged by the manager and
/// reported to the result handler as [`crate::ConnectionOutcome::Failed`]
/// rather than returned from a control operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("radio driver error: {0}")]
    Radio(String),

    #[error("portal server error: {0}")]
    Server(String),
}

/// Errors returned by [`crate::ConnectionManager`] control operations.
///
/// Failures that happen after a request was accepted (radio setup, failed
/// association) are not returned here; they reach the result handler as
/// [`crate::ConnectionOutcome::Failed`]. There is therefore no radio error
/// variant: see [`DriverError`].
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("invalid credentials: {0}")]
    InvalidArgument(#[from] CredentialsError),

    #[error("no credentials stored")]
    NotFound,

    #[error("already connected or connecting")]
    AlreadyConnected,

    #[error("operation not allowed in state {0}")]
    InvalidState(ConnectionState),

    #[error("credential store access failed: {0}")]
    StoreAccessFailure(StoreError),

    #[error("connection manager has stopped")]
    Stopped,

    #[error("connection manager did not answer in time")]
    Unresponsive,
}

impl From<StoreError> for ManagerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ManagerError::NotFound,
            other => ManagerError::StoreAccessFailure(other),
        }
    }
}
