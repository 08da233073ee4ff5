use thiserror::Error;

/// Failures surfaced by any [`crate::OrderRepository`] implementation.
///
/// Store-native errors are mapped onto these kinds at the repository boundary
/// and never leak past it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("order not found: {0}")]
    NotFound(String),

    #[error("already exists (unique violation): {0}")]
    AlreadyExists(String),

    #[error("validation failed (check violation): {0}")]
    Validation(String),

    #[error("missing required field (not null violation): {0}")]
    MissingField(String),

    #[error("internal failure: {0}")]
    InternalFailure(String),
}

impl RepositoryError {
    /// Infrastructure failures that may succeed on a later attempt.
    pub fn is_internal(&self) -> bool {
        matches!(self, RepositoryError::InternalFailure(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}
