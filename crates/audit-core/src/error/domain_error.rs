//! Domain errors - error types for the domain layer

use thiserror::Error;

use crate::entities::ActionType;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum DomainError {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("{action} events require a target entity type")]
    MissingTargetEntity { action: ActionType },

    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    #[error("Changes must be a JSON object")]
    ChangesNotAnObject,

    // =========================================================================
    // Capture Errors
    // =========================================================================
    #[error("Failed to capture entity state: {0}")]
    CaptureError(String),

    // =========================================================================
    // Infrastructure Errors (wrapped)
    // =========================================================================
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DomainError {
    /// Get an error code string for API responses
    pub fn code(&self) -> &'static str {
        match self {
            // Validation
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::InvalidFilter(_) => "INVALID_FILTER",
            Self::MissingTargetEntity { .. } => "MISSING_TARGET_ENTITY",
            Self::UnknownActionType(_) => "UNKNOWN_ACTION_TYPE",
            Self::ChangesNotAnObject => "CHANGES_NOT_AN_OBJECT",

            // Capture
            Self::CaptureError(_) => "CAPTURE_ERROR",

            // Infrastructure
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::SerializationError(_) => "SERIALIZATION_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_)
                | Self::InvalidFilter(_)
                | Self::MissingTargetEntity { .. }
                | Self::UnknownActionType(_)
                | Self::ChangesNotAnObject
        )
    }

    /// Check if retrying the same operation may succeed
    ///
    /// Write contention and connectivity problems are transient; malformed
    /// events are not and must not be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::DatabaseError(_))
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = DomainError::InvalidFilter("bad range".to_string());
        assert_eq!(err.code(), "INVALID_FILTER");

        let err = DomainError::StoreUnavailable("locked".to_string());
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
    }

    #[test]
    fn test_is_validation() {
        assert!(DomainError::InvalidFilter("x".to_string()).is_validation());
        assert!(DomainError::MissingTargetEntity {
            action: ActionType::Update
        }
        .is_validation());
        assert!(!DomainError::DatabaseError("x".to_string()).is_validation());
    }

    #[test]
    fn test_is_transient() {
        assert!(DomainError::StoreUnavailable("busy".to_string()).is_transient());
        assert!(DomainError::DatabaseError("timeout".to_string()).is_transient());
        assert!(!DomainError::ChangesNotAnObject.is_transient());
        assert!(!DomainError::SerializationError("x".to_string()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = DomainError::MissingTargetEntity {
            action: ActionType::Export,
        };
        assert_eq!(err.to_string(), "EXPORT events require a target entity type");
    }
}
