//! Error types for the authorization engine

use thiserror::Error;

/// Authorization engine errors
///
/// An unknown principal is deliberately absent: it is answered with a
/// `NoApplicablePrincipalData` deny decision, not an error.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Malformed policy document, rejected at write time
    #[error("Validation error: {0}")]
    Validation(String),

    /// The external registry could not be reached or failed to answer
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// Whether this error means "could not determine" rather than a bad input
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AuthzError::RegistryUnavailable(_))
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
