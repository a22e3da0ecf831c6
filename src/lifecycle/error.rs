//! Error types for the volume lifecycle coordinator.

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::identifier::IdentifierError;

/// Errors raised by [`super::VolumeLifecycleCoordinator`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LifecycleError {
    /// Raised before any remote call when an argument is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Raised when a resource disappears while the coordinator waits for it
    /// to reach a state.
    #[error("{resource} not found")]
    NotFound {
        /// Resource that went missing.
        resource: String,
    },
    /// Raised when a wait exhausts its attempt budget. The remote resource is
    /// left as it was.
    #[error("timed out waiting for {action} on {resource} after {attempts} attempts (last state: {last_state})")]
    Timeout {
        /// Operation being waited on.
        action: String,
        /// Resource handle.
        resource: String,
        /// Refreshes performed.
        attempts: u32,
        /// State observed last.
        last_state: String,
    },
    /// Raised when a wait is cancelled.
    #[error("{action} on {resource} cancelled")]
    Cancelled {
        /// Operation being waited on.
        action: String,
        /// Resource handle.
        resource: String,
    },
    /// Wrapper for gateway failures other than not-found.
    #[error("remote failure: {message}")]
    RemoteFailure {
        /// Message reported by the gateway.
        message: String,
    },
}

impl LifecycleError {
    pub(super) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<IdentifierError> for LifecycleError {
    fn from(value: IdentifierError) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}

impl From<GatewayError> for LifecycleError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::NotFound { resource } => Self::NotFound { resource },
            GatewayError::Remote { message } => Self::RemoteFailure { message },
        }
    }
}
