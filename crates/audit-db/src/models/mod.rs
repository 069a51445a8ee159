//! Database models - SQLx-compatible structs for PostgreSQL tables

mod audit_event;

pub use audit_event::{AuditEventModel, GroupCountModel, HourCountModel};
