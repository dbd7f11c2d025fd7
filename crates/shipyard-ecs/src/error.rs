//! Error types for control plane calls.

use thiserror::Error;

/// Result type alias for control plane operations.
pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

/// Errors returned by a [`ControlPlane`](crate::ControlPlane).
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("service {service} not found in cluster {cluster}")]
    ServiceNotFound { cluster: String, service: String },

    #[error("task definition {revision} not found: {message}")]
    DescriptorNotFound { revision: String, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{code}: {message}")]
    Api { code: String, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

impl ControlPlaneError {
    /// Whether the request may have failed before reaching the orchestrator,
    /// or was rejected for load reasons, so that re-issuing it is sensible.
    pub fn is_transient(&self) -> bool {
        match self {
            ControlPlaneError::Transport(_) => true,
            ControlPlaneError::Api { code, .. } => matches!(
                code.as_str(),
                "ServerException" | "ThrottlingException" | "ServiceUnavailableException"
            ),
            _ => false,
        }
    }
}
