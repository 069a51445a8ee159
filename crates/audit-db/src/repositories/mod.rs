//! Repository implementations
//!
//! PostgreSQL implementation of the audit store port defined in audit-core.

mod audit_event;
mod error;

pub use audit_event::PgAuditStore;
pub use error::map_db_error;
