//! Service layer error types
//!
//! Provides a unified error type for all service operations.

use audit_common::AppError;
use audit_core::DomainError;
use std::fmt;

/// Service layer error type
#[derive(Debug)]
pub enum ServiceError {
    /// Domain rule violation or store failure
    Domain(DomainError),

    /// Application error
    App(AppError),

    /// Resource not found
    NotFound { resource: &'static str, id: String },

    /// Validation error
    Validation(String),

    /// A retention run is already in progress
    PurgeConflict,

    /// Operator declined a live purge
    ConfirmationDeclined,

    /// Internal error
    Internal(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Domain(e) => write!(f, "{e}"),
            Self::App(e) => write!(f, "{e}"),
            Self::NotFound { resource, id } => write!(f, "{resource} not found: {id}"),
            Self::Validation(msg) => write!(f, "Validation error: {msg}"),
            Self::PurgeConflict => write!(f, "A retention cleanup is already running"),
            Self::ConfirmationDeclined => write!(f, "Purge was not confirmed"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Domain(e) => Some(e),
            Self::App(e) => Some(e),
            _ => None,
        }
    }
}

impl ServiceError {
    /// Create a not found error
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Domain(e) => {
                if e.is_validation() {
                    400
                } else if e.is_transient() {
                    503
                } else {
                    500
                }
            }
            Self::App(e) => e.status_code(),
            Self::NotFound { .. } => 404,
            Self::Validation(_) | Self::ConfirmationDeclined => 400,
            Self::PurgeConflict => 409,
            Self::Internal(_) => 500,
        }
    }

    /// Get the error code for API responses
    pub fn error_code(&self) -> &str {
        match self {
            Self::Domain(e) => e.code(),
            Self::App(e) => e.error_code(),
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::PurgeConflict => "PURGE_CONFLICT",
            Self::ConfirmationDeclined => "CONFIRMATION_DECLINED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl From<AppError> for ServiceError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Domain(e) => AppError::Domain(e),
            ServiceError::App(e) => e,
            ServiceError::NotFound { resource, id } => {
                AppError::NotFound(format!("{resource} {id}"))
            }
            ServiceError::Validation(msg) => AppError::Validation(msg),
            ServiceError::PurgeConflict => {
                AppError::Conflict("A retention cleanup is already running".to_string())
            }
            ServiceError::ConfirmationDeclined => {
                AppError::InvalidInput("Purge was not confirmed".to_string())
            }
            ServiceError::Internal(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = ServiceError::not_found("AuditEvent", "123");
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert!(err.to_string().contains("AuditEvent not found: 123"));
    }

    #[test]
    fn test_purge_conflict() {
        let err = ServiceError::PurgeConflict;
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.error_code(), "PURGE_CONFLICT");
        let app_err: AppError = err.into();
        assert_eq!(app_err.status_code(), 409);
    }

    #[test]
    fn test_confirmation_declined() {
        let err = ServiceError::ConfirmationDeclined;
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "CONFIRMATION_DECLINED");
    }

    #[test]
    fn test_domain_error_status() {
        let err = ServiceError::from(DomainError::InvalidFilter("from > to".to_string()));
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "INVALID_FILTER");

        let err = ServiceError::from(DomainError::StoreUnavailable("busy".to_string()));
        assert_eq!(err.status_code(), 503);
    }
}
