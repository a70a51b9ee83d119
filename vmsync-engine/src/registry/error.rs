//! Registry error types.

use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Object addressed by ID does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Registry answered with a non-success status.
    #[error("api returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Could not reach the registry.
    #[error("transport: {0}")]
    Transport(String),

    /// Registry answered with something we could not interpret.
    #[error("decode: {0}")]
    Decode(String),

    /// Internal error.
    #[error("internal: {0}")]
    Internal(String),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
