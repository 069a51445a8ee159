//! Retention manager
//!
//! Purges events older than the retention horizon in bounded batches and
//! records a single PURGE event per live run.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use audit_common::{RetentionSettings, DIAGNOSTICS_TARGET};
use audit_core::entities::{ActionType, NewAuditEvent};
use audit_core::traits::{AuditFilter, GroupKey, PageRequest};
use audit_core::value_objects::{EntityId, EventId};
use audit_core::{DomainError, DEFAULT_PURGE_BATCH};

use super::context::ServiceContext;
use super::error::{ServiceError, ServiceResult};

/// Target entity type of PURGE events
pub const PURGE_TARGET: &str = "audit_event";

/// Six years
pub const DEFAULT_RETENTION_DAYS: u32 = 2190;

/// Parameters of one cleanup run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupRequest {
    pub retention_days: u32,
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub force: bool,
    pub batch_size: u32,
}

impl Default for CleanupRequest {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            dry_run: false,
            force: false,
            batch_size: DEFAULT_PURGE_BATCH,
        }
    }
}

impl From<&RetentionSettings> for CleanupRequest {
    fn from(settings: &RetentionSettings) -> Self {
        Self {
            retention_days: settings.retention_days,
            batch_size: settings.batch_size,
            ..Self::default()
        }
    }
}

impl CleanupRequest {
    /// Events strictly older than the returned instant are eligible
    ///
    /// # Errors
    /// `Validation` if `retention_days` exceeds
    /// [`RetentionSettings::MAX_RETENTION_DAYS`] or the horizon is unrepresentable
    pub fn cutoff(&self, now: DateTime<Utc>) -> ServiceResult<DateTime<Utc>> {
        if self.retention_days > RetentionSettings::MAX_RETENTION_DAYS {
            return Err(ServiceError::validation(format!(
                "retention_days must be at most {}",
                RetentionSettings::MAX_RETENTION_DAYS
            )));
        }
        now.checked_sub_signed(chrono::Duration::days(i64::from(self.retention_days)))
            .ok_or_else(|| ServiceError::validation("retention horizon is out of range"))
    }
}

/// Result of a cleanup run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub run_id: Uuid,
    pub cutoff: DateTime<Utc>,
    pub dry_run: bool,
    /// Events deleted, or that would be deleted on a dry run
    pub count_deleted: u64,
    /// Eligible events per action type, counted before deletion
    pub count_by_action: BTreeMap<String, u64>,
    /// Oldest event left in the store after the run
    pub oldest_remaining: Option<DateTime<Utc>>,
    pub purge_event_id: Option<EventId>,
}

/// Confirmation collaborator for live runs without `force`
#[async_trait]
pub trait PurgeConfirmation: Send + Sync {
    async fn confirm(&self, prompt: &PurgePrompt) -> bool;
}

/// What the operator is asked to confirm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgePrompt {
    pub cutoff: DateTime<Utc>,
    pub count_eligible: u64,
}

impl std::fmt::Display for PurgePrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Permanently delete {} audit events recorded before {}?",
            self.count_eligible,
            self.cutoff.to_rfc3339()
        )
    }
}

/// Confirms every prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

#[async_trait]
impl PurgeConfirmation for AlwaysConfirm {
    async fn confirm(&self, _prompt: &PurgePrompt) -> bool {
        true
    }
}

/// Clears the running flag on drop
struct RunGuard<'a>(&'a std::sync::atomic::AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Retention manager service
pub struct RetentionManager<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> RetentionManager<'a> {
    /// Create a new RetentionManager
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Check whether a cleanup run is in progress
    pub fn is_running(&self) -> bool {
        self.ctx.retention_running().load(Ordering::SeqCst)
    }

    /// Run a cleanup
    ///
    /// # Errors
    /// - `PurgeConflict` if another run is in progress
    /// - `ConfirmationDeclined` if a live run was not confirmed
    /// - `Validation` for a zero batch size or an out-of-range retention
    /// - the store error if a batch fails; batches already deleted are still
    ///   recorded in a PURGE event marked `partial`
    #[instrument(skip(self, confirmation))]
    pub async fn cleanup(
        &self,
        request: CleanupRequest,
        confirmation: &dyn PurgeConfirmation,
    ) -> ServiceResult<CleanupSummary> {
        if request.batch_size == 0 {
            return Err(ServiceError::validation("batch_size must be at least 1"));
        }
        let cutoff = request.cutoff(Utc::now())?;

        let running = self.ctx.retention_running();
        if running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Retention cleanup already running, request rejected");
            return Err(ServiceError::PurgeConflict);
        }
        let _guard = RunGuard(running);

        let run_id = Uuid::new_v4();
        let store = self.ctx.store();
        let eligible = AuditFilter {
            to: Some(cutoff),
            ..AuditFilter::default()
        };

        let count_eligible = store.count_by_filter(&eligible).await?;
        let count_by_action: BTreeMap<String, u64> = store
            .count_grouped(&eligible, GroupKey::ActionType, ActionType::ALL.len() as u32)
            .await?
            .into_iter()
            .collect();

        if request.dry_run {
            info!(%run_id, %cutoff, count_eligible, "Retention dry run");
            return Ok(CleanupSummary {
                run_id,
                cutoff,
                dry_run: true,
                count_deleted: count_eligible,
                count_by_action,
                oldest_remaining: self.oldest_remaining().await?,
                purge_event_id: None,
            });
        }

        if !request.force {
            let prompt = PurgePrompt {
                cutoff,
                count_eligible,
            };
            if !confirmation.confirm(&prompt).await {
                info!(%run_id, "Retention cleanup declined");
                return Err(ServiceError::ConfirmationDeclined);
            }
        }

        let mut count_deleted = 0u64;
        let failure = loop {
            match store.purge_batch(cutoff, request.batch_size).await {
                Ok(deleted) => {
                    count_deleted += deleted;
                    if deleted < u64::from(request.batch_size) {
                        break None;
                    }
                }
                Err(e) => break Some(e),
            }
        };

        let purge_event_id = self
            .record_purge(run_id, cutoff, count_deleted, &request, failure.as_ref())
            .await;
        if let Some(e) = failure {
            error!(
                %run_id,
                %cutoff,
                count_deleted,
                error = %e,
                "Retention cleanup aborted after a failed batch"
            );
            return Err(e.into());
        }

        let oldest_remaining = self.oldest_remaining().await?;

        info!(
            %run_id,
            %cutoff,
            count_deleted,
            batch_size = request.batch_size,
            "Retention cleanup finished"
        );

        Ok(CleanupSummary {
            run_id,
            cutoff,
            dry_run: false,
            count_deleted,
            count_by_action,
            oldest_remaining,
            purge_event_id,
        })
    }

    /// Append the PURGE event directly, falling back to the pipeline
    async fn record_purge(
        &self,
        run_id: Uuid,
        cutoff: DateTime<Utc>,
        count_deleted: u64,
        request: &CleanupRequest,
        failure: Option<&DomainError>,
    ) -> Option<EventId> {
        let mut changes = json!({
            "run_id": run_id.to_string(),
            "cutoff": cutoff.to_rfc3339(),
            "count_deleted": count_deleted,
            "retention_days": request.retention_days,
            "batch_size": request.batch_size,
        });
        if let Some(e) = failure {
            changes["partial"] = json!(true);
            changes["error"] = json!(e.to_string());
        }

        let event = NewAuditEvent::builder(ActionType::Purge)
            .target(PURGE_TARGET, EntityId::default())
            .source_ip("localhost")
            .client_descriptor("retention-manager")
            .changes(changes)
            .build();

        let event = match event {
            Ok(event) => event,
            Err(e) => {
                error!(target: DIAGNOSTICS_TARGET, error = %e, "Failed to build PURGE event");
                return None;
            }
        };

        match self.ctx.store().append(event.clone()).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(
                    target: DIAGNOSTICS_TARGET,
                    error = %e,
                    "Direct PURGE append failed, handing to pipeline"
                );
                self.ctx.pipeline().submit(event).await;
                None
            }
        }
    }

    async fn oldest_remaining(&self) -> ServiceResult<Option<DateTime<Utc>>> {
        let page = PageRequest::new(0, 1).oldest_first();
        let oldest = self
            .ctx
            .store()
            .find_by_filter(&AuditFilter::default(), page)
            .await?;
        Ok(oldest.first().map(|event| event.timestamp))
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Runs forced cleanups on a fixed interval
#[derive(Debug)]
pub struct RetentionScheduler {
    handle: JoinHandle<()>,
}

impl RetentionScheduler {
    /// Spawn the scheduler; the first run happens one `interval` from now
    pub fn spawn(ctx: ServiceContext, interval: Duration, request: CleanupRequest) -> Self {
        let interval = interval.max(Duration::from_secs(1));
        let request = CleanupRequest {
            force: true,
            dry_run: false,
            ..request
        };

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match RetentionManager::new(&ctx).cleanup(request, &AlwaysConfirm).await {
                    Ok(summary) => info!(
                        run_id = %summary.run_id,
                        count_deleted = summary.count_deleted,
                        "Scheduled retention cleanup completed"
                    ),
                    Err(ServiceError::PurgeConflict) => {
                        warn!("Scheduled retention cleanup skipped, another run in progress");
                    }
                    Err(e) => error!(error = %e, "Scheduled retention cleanup failed"),
                }
            }
        });

        info!(
            interval_secs = interval.as_secs(),
            retention_days = request.retention_days,
            "Retention scheduler started"
        );
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}
