//! Request DTOs for API endpoints
//!
//! All request DTOs implement `Deserialize` and `Validate` for input validation.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use audit_core::entities::ActionType;
use audit_core::traits::{AuditFilter, PageRequest};
use audit_core::value_objects::{EntityId, TimeWindow};
use audit_core::DomainError;

// ============================================================================
// Event Queries
// ============================================================================

/// Query parameters for listing and exporting events
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct AuditEventQuery {
    pub actor_id: Option<i64>,
    pub subject_id: Option<i64>,

    /// Action type name, e.g. `UPDATE`
    pub action_type: Option<String>,

    #[validate(length(min = 1, max = 64, message = "Entity type must be 1-64 characters"))]
    pub entity_type: Option<String>,

    pub record_id: Option<i64>,

    #[validate(length(min = 1, max = 64, message = "IP must be 1-64 characters"))]
    pub ip: Option<String>,

    /// Inclusive lower bound (RFC 3339)
    pub from: Option<DateTime<Utc>>,

    /// Exclusive upper bound (RFC 3339)
    pub to: Option<DateTime<Utc>>,

    #[serde(default)]
    pub offset: u64,

    #[validate(range(min = 1, max = 1000, message = "Limit must be 1-1000"))]
    pub limit: Option<u32>,

    /// `asc` for oldest first; newest first otherwise
    pub order: Option<String>,
}

impl AuditEventQuery {
    /// Convert to a store filter
    ///
    /// # Errors
    /// Unknown action types and inverted ranges
    pub fn to_filter(&self) -> Result<AuditFilter, DomainError> {
        let action_type = self
            .action_type
            .as_deref()
            .map(str::parse::<ActionType>)
            .transpose()?;

        let filter = AuditFilter {
            actor_id: self.actor_id.map(EntityId::new),
            subject_id: self.subject_id.map(EntityId::new),
            action_type,
            target_entity_type: self.entity_type.clone(),
            target_record_id: self.record_id.map(EntityId::new),
            source_ip: self.ip.clone(),
            from: self.from,
            to: self.to,
        };
        filter.validate()?;
        Ok(filter)
    }

    pub fn page(&self) -> PageRequest {
        let page = PageRequest::new(self.offset, self.limit.unwrap_or(PageRequest::default().limit));
        match self.order.as_deref() {
            Some(order) if order.eq_ignore_ascii_case("asc") => page.oldest_first(),
            _ => page,
        }
    }
}

// ============================================================================
// Window Queries
// ============================================================================

/// Time window for statistics and findings
///
/// Either an explicit `from`/`to` range, or the trailing `days` up to `to`
/// (default now).
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct WindowQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,

    #[validate(range(min = 1, max = 3650, message = "Days must be 1-3650"))]
    pub days: Option<u32>,

    /// Size of top-N lists
    #[validate(range(min = 1, max = 100, message = "Top must be 1-100"))]
    pub top: Option<u32>,
}

impl WindowQuery {
    pub fn to_window(&self, default_days: u32) -> Result<TimeWindow, DomainError> {
        let end = self.to.unwrap_or_else(Utc::now);
        match self.from {
            Some(start) => TimeWindow::new(start, end),
            None => Ok(TimeWindow::trailing_days(
                end,
                self.days.unwrap_or(default_days),
            )),
        }
    }

    pub fn top(&self) -> u32 {
        self.top.unwrap_or(10)
    }
}
