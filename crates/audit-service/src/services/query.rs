//! Audit query and export service

use std::io::Write;

use tracing::{info, instrument};

use audit_core::entities::AuditEvent;
use audit_core::traits::{AuditFilter, PageRequest};
use audit_core::value_objects::EventId;
use audit_core::MAX_PAGE_SIZE;

use super::context::ServiceContext;
use super::error::{ServiceError, ServiceResult};

/// Column header of CSV exports
pub const CSV_HEADER: &str =
    "timestamp,actor,action,target_entity_type,target_record_id,subject_id,ip,changes_json";

/// One page of events with the total match count
#[derive(Debug, Clone)]
pub struct AuditPage {
    pub events: Vec<AuditEvent>,
    pub total: u64,
    pub page: PageRequest,
}

impl AuditPage {
    pub fn has_more(&self) -> bool {
        self.page.offset + (self.events.len() as u64) < self.total
    }
}

/// Quote a CSV field when it contains a delimiter, quote or line break
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_row(event: &AuditEvent) -> ServiceResult<String> {
    let changes = serde_json::to_string(&event.changes)
        .map_err(|e| ServiceError::internal(format!("Failed to encode changes: {e}")))?;
    let fields = [
        event.timestamp.to_rfc3339(),
        event.actor_id.map(|id| id.to_string()).unwrap_or_default(),
        event.action_type.as_str().to_string(),
        event.target_entity_type.clone(),
        event.target_record_id.to_string(),
        event.subject_id.map(|id| id.to_string()).unwrap_or_default(),
        event.source_ip.clone(),
        changes,
    ];
    Ok(fields
        .iter()
        .map(|f| csv_escape(f))
        .collect::<Vec<_>>()
        .join(","))
}

/// Audit query service
pub struct AuditQueryService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> AuditQueryService<'a> {
    /// Create a new AuditQueryService
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Filtered page of events with the total match count
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &AuditFilter, page: PageRequest) -> ServiceResult<AuditPage> {
        filter.validate()?;
        let store = self.ctx.store();
        let events = store.find_by_filter(filter, page).await?;
        let total = store.count_by_filter(filter).await?;
        Ok(AuditPage {
            events,
            total,
            page,
        })
    }

    /// Single event by id
    #[instrument(skip(self))]
    pub async fn get(&self, id: EventId) -> ServiceResult<AuditEvent> {
        self.ctx
            .store()
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("AuditEvent", id.to_string()))
    }

    /// Write every matching event as CSV, oldest first; returns the row count
    #[instrument(skip(self, out))]
    pub async fn export_csv<W: Write + Send>(
        &self,
        filter: &AuditFilter,
        out: &mut W,
    ) -> ServiceResult<u64> {
        filter.validate()?;
        let io_err = |e: std::io::Error| ServiceError::internal(format!("CSV write failed: {e}"));

        writeln!(out, "{CSV_HEADER}").map_err(io_err)?;

        let mut page = PageRequest::new(0, MAX_PAGE_SIZE).oldest_first();
        let mut rows = 0u64;
        loop {
            let events = self.ctx.store().find_by_filter(filter, page).await?;
            for event in &events {
                writeln!(out, "{}", csv_row(event)?).map_err(io_err)?;
            }
            rows += events.len() as u64;
            if events.len() < page.limit as usize {
                break;
            }
            page = page.next();
        }
        out.flush().map_err(io_err)?;

        info!(rows, "Audit CSV export written");
        Ok(rows)
    }

    /// CSV export into memory
    pub async fn export_csv_bytes(&self, filter: &AuditFilter) -> ServiceResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.export_csv(filter, &mut buf).await?;
        Ok(buf)
    }
}
