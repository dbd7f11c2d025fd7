//! Error types for descriptor handling and configuration.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building images, patching descriptors, or loading config.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("container named {container} not found in task definition {revision}")]
    ContainerNotFound { container: String, revision: String },

    #[error("container named {container} appears {count} times in task definition {revision}")]
    AmbiguousContainer {
        container: String,
        revision: String,
        count: usize,
    },

    #[error("invalid image reference: {0}")]
    InvalidImage(String),

    #[error("missing required configuration: {0}")]
    ConfigurationMissing(String),

    #[error("failed to read config: {0}")]
    ConfigRead(String),

    #[error("failed to parse config: {0}")]
    ConfigParse(String),
}
