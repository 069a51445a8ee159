//! Audit store port - append-only persistence for audit events
//!
//! The only mutating operations are [`AuditStore::append`] and the purge
//! family. There is no update method: once appended, an event
//! is never observed with different field values.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{ActionType, AuditEvent, NewAuditEvent};
use crate::error::DomainError;
use crate::value_objects::{EntityId, EventId, TimeWindow};

/// Result type for store operations
pub type RepoResult<T> = Result<T, DomainError>;

/// Batch size used by [`AuditStore::purge_before`]
pub const DEFAULT_PURGE_BATCH: u32 = 1000;

/// Hard upper bound for a single page
pub const MAX_PAGE_SIZE: u32 = 1000;

// ============================================================================
// Query types
// ============================================================================

/// Conjunctive filter over audit events; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub actor_id: Option<EntityId>,
    pub subject_id: Option<EntityId>,
    pub action_type: Option<ActionType>,
    pub target_entity_type: Option<String>,
    pub target_record_id: Option<EntityId>,
    pub source_ip: Option<String>,
    /// Inclusive lower bound
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    /// Filter restricted to a time window
    pub fn within(window: TimeWindow) -> Self {
        Self {
            from: Some(window.start),
            to: Some(window.end),
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: ActionType) -> Self {
        self.action_type = Some(action);
        self
    }

    /// Reject malformed ranges
    pub fn validate(&self) -> Result<(), DomainError> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(DomainError::InvalidFilter(format!(
                    "'from' ({from}) is after 'to' ({to})"
                )));
            }
        }
        if self
            .target_entity_type
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            return Err(DomainError::InvalidFilter(
                "target_entity_type must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// Evaluate the filter against an event
    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.actor_id.is_none_or(|a| event.actor_id == Some(a))
            && self.subject_id.is_none_or(|s| event.subject_id == Some(s))
            && self.action_type.is_none_or(|a| event.action_type == a)
            && self
                .target_entity_type
                .as_deref()
                .is_none_or(|t| event.target_entity_type == t)
            && self
                .target_record_id
                .is_none_or(|r| event.target_record_id == r)
            && self.source_ip.as_deref().is_none_or(|ip| event.source_ip == ip)
            && self.from.is_none_or(|from| event.timestamp >= from)
            && self.to.is_none_or(|to| event.timestamp < to)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Offset pagination over a filtered, time-ordered scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u32,
    pub order: SortOrder,
}

impl PageRequest {
    pub fn new(offset: u64, limit: u32) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, MAX_PAGE_SIZE),
            order: SortOrder::NewestFirst,
        }
    }

    pub fn oldest_first(mut self) -> Self {
        self.order = SortOrder::OldestFirst;
        self
    }

    /// Request following this one
    pub fn next(self) -> Self {
        Self {
            offset: self.offset + u64::from(self.limit),
            ..self
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, 50)
    }
}

/// Dimension for grouped counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    ActionType,
    Actor,
    Subject,
    SourceIp,
}

// ============================================================================
// Audit Store
// ============================================================================

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Durably append an event, returning its store-assigned id
    async fn append(&self, event: NewAuditEvent) -> RepoResult<EventId>;

    /// Delete at most `limit` of the oldest events with `timestamp < cutoff`
    async fn purge_batch(&self, cutoff: DateTime<Utc>, limit: u32) -> RepoResult<u64>;

    /// Delete every event with `timestamp < cutoff`
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> RepoResult<u64> {
        let mut total = 0;
        loop {
            let deleted = self.purge_batch(cutoff, DEFAULT_PURGE_BATCH).await?;
            total += deleted;
            if deleted < u64::from(DEFAULT_PURGE_BATCH) {
                return Ok(total);
            }
        }
    }

    /// Find a single event by id
    async fn find_by_id(&self, id: EventId) -> RepoResult<Option<AuditEvent>>;

    /// Filtered, ordered page of events; ties on timestamp are broken by id
    async fn find_by_filter(
        &self,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> RepoResult<Vec<AuditEvent>>;

    /// Number of events matching the filter
    async fn count_by_filter(&self, filter: &AuditFilter) -> RepoResult<u64>;

    /// Counts grouped by `key`, descending, at most `limit` groups
    ///
    /// Events with no value for the key (e.g. anonymous actors) are excluded.
    async fn count_grouped(
        &self,
        filter: &AuditFilter,
        key: GroupKey,
        limit: u32,
    ) -> RepoResult<Vec<(String, u64)>>;

    /// Event counts per UTC hour of day
    async fn hour_histogram(&self, filter: &AuditFilter) -> RepoResult<[u64; 24]>;

    /// Connectivity probe for readiness checks
    async fn ping(&self) -> RepoResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_filter_rejects_inverted_range() {
        let now = Utc::now();
        let filter = AuditFilter {
            from: Some(now),
            to: Some(now - Duration::days(1)),
            ..AuditFilter::default()
        };
        assert!(filter.validate().unwrap_err().is_validation());
    }

    #[test]
    fn test_filter_matches_half_open_range() {
        let now = Utc::now();
        let event = AuditEvent::from_new(
            EventId::new(1),
            NewAuditEvent::builder(ActionType::Logout)
                .timestamp(now)
                .build()
                .unwrap(),
        );

        let window = TimeWindow::new(now, now + Duration::seconds(1)).unwrap();
        assert!(AuditFilter::within(window).matches(&event));

        let window = TimeWindow::new(now - Duration::seconds(1), now).unwrap();
        assert!(!AuditFilter::within(window).matches(&event));
    }

    #[test]
    fn test_filter_on_action_and_actor() {
        let event = AuditEvent::from_new(
            EventId::new(1),
            NewAuditEvent::builder(ActionType::Logout)
                .actor(Some(EntityId::new(5)))
                .build()
                .unwrap(),
        );
        let filter = AuditFilter {
            actor_id: Some(EntityId::new(5)),
            ..AuditFilter::default()
        }
        .with_action(ActionType::Logout);
        assert!(filter.matches(&event));
        assert!(!filter.with_action(ActionType::Read).matches(&event));
    }

    #[test]
    fn test_page_request_clamps_limit() {
        assert_eq!(PageRequest::new(0, 0).limit, 1);
        assert_eq!(PageRequest::new(0, 50_000).limit, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(0, 10).next().offset, 10);
    }
}
