//! Domain entities

mod action;
mod audit_event;
mod finding;

pub use action::ActionType;
pub use audit_event::{AuditEvent, NewAuditEvent, NewAuditEventBuilder, NO_ENTITY, UNKNOWN};
pub use finding::{
    AFTER_HOURS_ACCESS, EXCESSIVE_ACCESS_DENIED, Finding, MULTIPLE_FAILED_LOGINS, Severity,
};
