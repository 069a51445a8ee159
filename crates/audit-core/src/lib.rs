//! # audit-core
//!
//! Domain layer containing the audit event entity, identifiers, the append-only
//! store trait, the secret sanitizer, and field-level diffs.
//! This crate has zero dependencies on infrastructure (database, web framework, etc.).

pub mod diff;
pub mod entities;
pub mod error;
pub mod sanitize;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    AFTER_HOURS_ACCESS, ActionType, AuditEvent, EXCESSIVE_ACCESS_DENIED, Finding,
    MULTIPLE_FAILED_LOGINS, NO_ENTITY, NewAuditEvent, NewAuditEventBuilder, Severity, UNKNOWN,
};
pub use error::DomainError;
pub use sanitize::Sanitizer;
pub use traits::{
    AuditFilter, AuditStore, DEFAULT_PURGE_BATCH, GroupKey, MAX_PAGE_SIZE, PageRequest,
    RepoResult, SortOrder,
};
pub use value_objects::{EntityId, EventId, IdParseError, TimeWindow};
