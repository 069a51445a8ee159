//! Audit services
//!
//! This module contains the capture side (observer, access logger, recorder)
//! and the reporting side (query, anomaly, retention) of the audit trail.

pub mod access;
pub mod anomaly;
pub mod context;
pub mod error;
pub mod observer;
pub mod query;
pub mod recorder;
pub mod retention;
pub mod subject;

// Re-export all services for convenience
pub use access::{
    is_subject_specific_search, AccessDecision, AccessKind, AccessLogger, ArtifactDescriptor,
    SkipReason,
};
pub use anomaly::{AnomalyEngine, GroupCount, Statistics, FINDINGS_WINDOW_DAYS};
pub use context::{ServiceContext, ServiceContextBuilder};
pub use error::{ServiceError, ServiceResult};
pub use observer::{
    CaptureOutcome, ChangeObserver, EntityChange, EntityChangeObserver, EntitySnapshot,
};
pub use query::{AuditPage, AuditQueryService, CSV_HEADER};
pub use recorder::{AuditRecorder, CallerContext, Target};
pub use retention::{
    AlwaysConfirm, CleanupRequest, CleanupSummary, PurgeConfirmation, PurgePrompt,
    RetentionManager, RetentionScheduler, PURGE_TARGET,
};
pub use subject::{RelatedEntityResolver, SubjectRule, WatchedEntity, WatchedEntityRegistry};
