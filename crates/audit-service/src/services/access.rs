//! Access logger
//!
//! Decides which reads of watched entities are worth an audit row and
//! records them as READ or EXPORT events.

use serde::Serialize;
use serde_json::json;
use tracing::debug;

use audit_core::entities::ActionType;
use audit_core::value_objects::EntityId;

use crate::pipeline::SubmitOutcome;

use super::context::ServiceContext;
use super::recorder::{AuditRecorder, CallerContext, Target};
use super::subject::SubjectRule;

/// Shortest search string that can identify a person
const MIN_SEARCH_LEN: usize = 3;

/// Describes an exported file; its content is never recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactDescriptor {
    pub name: String,
    pub size_bytes: u64,
    pub format: String,
}

impl ArtifactDescriptor {
    pub fn new(name: impl Into<String>, size_bytes: u64, format: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            format: format.into(),
        }
    }
}

/// Kind of read being served
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessKind {
    /// A single record
    Detail { record_id: EntityId },
    /// A list or paginated page
    List,
    /// A free-text search
    Search { query: String },
    /// A download of one record or a bulk export (`record_id` zero)
    Export {
        record_id: EntityId,
        artifact: ArtifactDescriptor,
    },
}

/// Why an access was not logged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotWatched,
    Unsuccessful(u16),
    ListQuery,
    NonSpecificSearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Logged(SubmitOutcome),
    Skipped(SkipReason),
}

/// Check whether a search string plausibly targets one person
///
/// After trimming it must be at least 3 characters and either all digits,
/// contain `@`, or split on whitespace or `,` into at least two tokens.
pub fn is_subject_specific_search(query: &str) -> bool {
    let query = query.trim();
    if query.chars().count() < MIN_SEARCH_LEN {
        return false;
    }
    if query.chars().all(|c| c.is_ascii_digit()) || query.contains('@') {
        return true;
    }
    query
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .count()
        >= 2
}

/// Logs detail reads, subject-specific searches, and exports
#[derive(Debug, Clone)]
pub struct AccessLogger {
    ctx: ServiceContext,
}

impl AccessLogger {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Decide whether to log without recording anything
    pub fn classify(&self, entity_type: &str, kind: &AccessKind, status: u16) -> Option<SkipReason> {
        if !self.ctx.watched().is_watched(entity_type) {
            return Some(SkipReason::NotWatched);
        }
        if status >= 400 {
            return Some(SkipReason::Unsuccessful(status));
        }
        match kind {
            AccessKind::List => Some(SkipReason::ListQuery),
            AccessKind::Search { query } if !is_subject_specific_search(query) => {
                Some(SkipReason::NonSpecificSearch)
            }
            _ => None,
        }
    }

    /// Log an access once the response status is known
    ///
    /// `subject_id` is used when the caller knows it; self-referencing entities
    /// fall back to the record id.
    pub async fn log(
        &self,
        caller: &CallerContext,
        entity_type: &str,
        kind: AccessKind,
        status: u16,
        subject_id: Option<EntityId>,
    ) -> AccessDecision {
        if let Some(reason) = self.classify(entity_type, &kind, status) {
            debug!(entity = entity_type, reason = ?reason, "Access not logged");
            return AccessDecision::Skipped(reason);
        }

        let (action, record_id, changes) = match kind {
            AccessKind::Detail { record_id } => (ActionType::Read, record_id, json!({})),
            AccessKind::Search { query } => (
                ActionType::Read,
                EntityId::default(),
                json!({ "query_kind": "search", "query": query.trim() }),
            ),
            AccessKind::Export { record_id, artifact } => {
                (ActionType::Export, record_id, json!({ "artifact": artifact }))
            }
            AccessKind::List => return AccessDecision::Skipped(SkipReason::ListQuery),
        };

        let subject_id = subject_id.or_else(|| {
            let self_referencing = self
                .ctx
                .watched()
                .get(entity_type)
                .is_some_and(|w| w.subject == SubjectRule::SelfReference);
            (self_referencing && !record_id.is_zero()).then_some(record_id)
        });

        let outcome = AuditRecorder::new(&self.ctx)
            .record(
                caller,
                action,
                Target::new(entity_type, record_id),
                subject_id,
                changes,
            )
            .await;
        AccessDecision::Logged(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_specific_search() {
        assert!(is_subject_specific_search("555123"));
        assert!(is_subject_specific_search("bob@example.org"));
        assert!(is_subject_specific_search("Jane Doe"));
        assert!(is_subject_specific_search("Doe,Jane"));
        assert!(is_subject_specific_search("  12345  "));

        assert!(!is_subject_specific_search("jo"));
        assert!(!is_subject_specific_search("12"));
        assert!(!is_subject_specific_search("a@"));
        assert!(!is_subject_specific_search("smith"));
        assert!(!is_subject_specific_search("   "));
        assert!(!is_subject_specific_search("12a45"));
    }

    #[test]
    fn test_artifact_serializes_without_content() {
        let artifact = ArtifactDescriptor::new("patients.csv", 2048, "csv");
        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(
            value,
            json!({"name": "patients.csv", "size_bytes": 2048, "format": "csv"})
        );
    }
}
