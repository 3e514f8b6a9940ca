//! # DomainError
//!
//! Centralized error handling for the fragment core.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

/// The primary error type for all core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Resource absent or tombstoned (fragment, reply, category)
    #[error("{0} not found with ID {1}")]
    NotFound(&'static str, String),

    /// Actor is neither the owner nor an admin
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Status change not permitted from the current state
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Reply nesting beyond the permitted depth
    #[error("reply nesting exceeds {max} levels")]
    DepthExceeded { max: usize },

    /// Missing or malformed request fields (content, title, category)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Optimistic concurrency violation on save. Reload, mutate, save again.
    #[error("version conflict on fragment {id}: expected version {expected}, found {found}")]
    VersionConflict { id: String, expected: u64, found: u64 },

    /// Moderation call failed or timed out
    #[error("moderation classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    /// Infrastructure failure (e.g., DB down, serialization bug)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn fragment_not_found(id: impl ToString) -> Self {
        Self::NotFound("Fragment", id.to_string())
    }

    pub fn reply_not_found(id: impl ToString) -> Self {
        Self::NotFound("Reply", id.to_string())
    }

    pub fn category_not_found(id: impl ToString) -> Self {
        Self::NotFound("Category", id.to_string())
    }

    /// True for failures caused by the request rather than the system
    /// (the 4xx family at the HTTP boundary).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Internal(_) | Self::ClassifierUnavailable(_))
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// A specialized Result type for fragment core logic.
pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_entity() {
        let err = DomainError::reply_not_found("abc");
        assert_eq!(err.to_string(), "Reply not found with ID abc");
        assert!(err.is_client_error());
    }

    #[test]
    fn internal_is_not_a_client_error() {
        assert!(!DomainError::Internal("db down".into()).is_client_error());
        assert!(DomainError::VersionConflict { id: "f".into(), expected: 1, found: 2 }
            .is_version_conflict());
    }
}
