//! Store error types.

use thiserror::Error;

/// Store operation errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Index or alias does not exist
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Index already exists
    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    /// Engine unreachable, timing out or failing server-side
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Any other non-success response
    #[error("HTTP {status}: {reason}")]
    Http { status: u16, reason: String },

    /// Request or response body could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::IndexNotFound(_))
    }

    /// Check if this is an "already exists" error.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::IndexAlreadyExists(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(StoreError::IndexNotFound("sightline".to_string()).is_not_found());
        assert!(!StoreError::Unavailable("down".to_string()).is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::Http {
            status: 400,
            reason: "parsing_exception".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 400: parsing_exception");

        let err = StoreError::IndexAlreadyExists("sightline_entries-2024.01.01".to_string());
        assert!(err.is_already_exists());
        assert_eq!(
            err.to_string(),
            "Index already exists: sightline_entries-2024.01.01"
        );
    }
}
