//! OFC driver error types.
//!
//! Every failure surfaced by a driver is a controller error from the point of
//! view of the orchestrator. The variants only refine *how* the controller
//! call failed so callers can log and classify it.

use std::time::Duration;
use thiserror::Error;

/// Error type for OFC driver operations.
#[derive(Debug, Clone, Error)]
pub enum OfcError {
    /// The request never produced a response (connect, DNS, broken pipe).
    #[error("OFC transport error during {operation}: {message}")]
    Transport {
        /// Remote operation being invoked.
        operation: String,
        /// Transport error message.
        message: String,
    },

    /// The controller answered with a fault.
    #[error("OFC fault during {operation}: {message}")]
    Fault {
        /// Remote operation being invoked.
        operation: String,
        /// Fault string reported by the controller.
        message: String,
    },

    /// The call did not complete within the configured timeout.
    #[error("OFC call {operation} timed out after {timeout:?}")]
    Timeout {
        /// Remote operation being invoked.
        operation: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The controller answered with something that could not be understood.
    #[error("Invalid OFC response to {operation}: {message}")]
    InvalidResponse {
        /// Remote operation being invoked.
        operation: String,
        /// Description of what was wrong.
        message: String,
    },

    /// The driver could not be constructed from its settings.
    #[error("Invalid OFC driver configuration: {message}")]
    Config {
        /// Error message.
        message: String,
    },
}

impl OfcError {
    /// Creates a transport error.
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a controller fault.
    pub fn fault(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fault {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns the remote operation this error relates to, if any.
    pub fn operation(&self) -> Option<&str> {
        match self {
            OfcError::Transport { operation, .. }
            | OfcError::Fault { operation, .. }
            | OfcError::Timeout { operation, .. }
            | OfcError::InvalidResponse { operation, .. } => Some(operation),
            OfcError::Config { .. } => None,
        }
    }

    /// Returns true if the call timed out.
    ///
    /// A timed out mutation may or may not have been applied by the
    /// controller, so the next call has to re-derive the controller state.
    pub fn is_timeout(&self) -> bool {
        matches!(self, OfcError::Timeout { .. })
    }
}

/// Result type for OFC driver operations.
pub type OfcResult<T> = Result<T, OfcError>;
