//! Error types for the competency engine

use thiserror::Error;

/// Result type for competency operations
pub type Result<T> = std::result::Result<T, CompetencyError>;

/// Competency engine error types
///
/// Cloneable so a single remote fetch can hand the same outcome to every
/// caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompetencyError {
    /// Subject absent in the remote store
    #[error("Subject not found: {0}")]
    NotFound(String),

    /// Transient failure talking to the remote store
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Remote call exceeded its time budget
    #[error("Remote call timed out after {0}ms")]
    Timeout(u64),

    /// Pending update dropped after its final attempt
    #[error("Retry exhausted for {update} on {subject} after {attempts} attempts")]
    RetryExhausted {
        subject: String,
        update: String,
        attempts: u8,
    },

    /// Malformed caller input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Mutation attempted before the subject was loaded
    #[error("Subject not initialized: {0}")]
    NotInitialized(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CompetencyError {
    fn from(err: serde_json::Error) -> Self {
        CompetencyError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for CompetencyError {
    fn from(err: toml::de::Error) -> Self {
        CompetencyError::Config(err.to_string())
    }
}
