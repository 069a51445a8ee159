//! Error handling utilities for repositories

use audit_core::error::DomainError;
use sqlx::Error as SqlxError;

/// SQLSTATE codes worth retrying: serialization failure, deadlock, lock timeout
const RETRYABLE_SQLSTATES: &[&str] = &["40001", "40P01", "55P03"];

/// Convert SQLx error to DomainError
///
/// Connectivity and contention problems map to `StoreUnavailable`; constraint
/// violations map to `ValidationError` so callers do not retry them.
pub fn map_db_error(e: SqlxError) -> DomainError {
    match &e {
        SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) => {
            DomainError::StoreUnavailable(e.to_string())
        }
        SqlxError::Database(db_err) => {
            if db_err
                .code()
                .is_some_and(|code| RETRYABLE_SQLSTATES.iter().any(|c| *c == code))
            {
                DomainError::StoreUnavailable(e.to_string())
            } else if db_err.is_check_violation()
                || db_err.is_foreign_key_violation()
                || db_err.is_unique_violation()
            {
                DomainError::ValidationError(db_err.message().to_string())
            } else {
                DomainError::DatabaseError(e.to_string())
            }
        }
        _ => DomainError::DatabaseError(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(map_db_error(SqlxError::PoolTimedOut).is_transient());
        assert!(map_db_error(SqlxError::PoolClosed).is_transient());
    }

    #[test]
    fn test_row_not_found_is_database_error() {
        let err = map_db_error(SqlxError::RowNotFound);
        assert_eq!(err.code(), "DATABASE_ERROR");
    }
}
