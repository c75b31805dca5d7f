//! ============================================================================
//! Error Types - Failure taxonomy for the retrieval engine
//! ============================================================================
//! Provider, extraction and backend failures are recovered inside the
//! engine with deterministic fallbacks. Malformed input is surfaced.
//! ============================================================================

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors produced by the retrieval engine and its collaborators
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Metadata extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Vector backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SearchError {
    /// Whether the engine substitutes a fallback instead of failing the call
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SearchError::ProviderUnavailable(_)
                | SearchError::ExtractionFailed(_)
                | SearchError::BackendUnavailable(_)
                | SearchError::NotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(SearchError::ProviderUnavailable("quota".into()).is_recoverable());
        assert!(SearchError::BackendUnavailable("down".into()).is_recoverable());
        assert!(!SearchError::InvalidInput("bad".into()).is_recoverable());
        assert!(!SearchError::DimensionMismatch {
            expected: 4,
            actual: 3
        }
        .is_recoverable());
    }

    #[test]
    fn test_dimension_message() {
        let err = SearchError::DimensionMismatch {
            expected: 1536,
            actual: 768,
        };
        assert_eq!(
            err.to_string(),
            "Invalid vector dimension: expected 1536, got 768"
        );
    }
}
