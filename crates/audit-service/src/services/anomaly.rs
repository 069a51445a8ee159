//! Statistics and anomaly findings
//!
//! Read-only aggregations over a time window. Findings are threshold rules;
//! computing them has no side effects.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::instrument;

use audit_common::AnomalySettings;
use audit_core::entities::{
    ActionType, Finding, Severity, AFTER_HOURS_ACCESS, EXCESSIVE_ACCESS_DENIED,
    MULTIPLE_FAILED_LOGINS,
};
use audit_core::traits::{AuditFilter, GroupKey};
use audit_core::value_objects::TimeWindow;
use audit_core::MAX_PAGE_SIZE;

use super::context::ServiceContext;
use super::error::ServiceResult;

/// Default window for findings
pub const FINDINGS_WINDOW_DAYS: u32 = 7;

pub const FAILED_LOGIN_MEDIUM: u64 = 5;
pub const FAILED_LOGIN_HIGH: u64 = 10;
pub const ACCESS_DENIED_MEDIUM: u64 = 10;
pub const ACCESS_DENIED_HIGH: u64 = 50;

/// One bucket of a grouped count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub key: String,
    pub count: u64,
}

impl From<(String, u64)> for GroupCount {
    fn from((key, count): (String, u64)) -> Self {
        Self { key, count }
    }
}

/// Aggregate counts over a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub window: TimeWindow,
    pub total: u64,
    pub by_action_type: BTreeMap<String, u64>,
    pub top_actors: Vec<GroupCount>,
    pub top_subjects: Vec<GroupCount>,
    /// Events per UTC hour of day
    pub by_hour: [u64; 24],
}

/// Check whether a UTC hour falls inside the business-hours window
pub fn is_business_hour(settings: &AnomalySettings, hour: u32) -> bool {
    let (start, end) = (settings.business_hours_start, settings.business_hours_end);
    if start <= end {
        (start..end).contains(&hour)
    } else {
        hour >= start || hour < end
    }
}

/// Anomaly/statistics engine
pub struct AnomalyEngine<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> AnomalyEngine<'a> {
    /// Create a new AnomalyEngine
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Counts by action type, most active actors and most accessed subjects
    #[instrument(skip(self))]
    pub async fn statistics(&self, window: TimeWindow, top_n: u32) -> ServiceResult<Statistics> {
        let store = self.ctx.store();
        let filter = AuditFilter::within(window);
        let top_n = top_n.clamp(1, MAX_PAGE_SIZE);

        let total = store.count_by_filter(&filter).await?;
        let by_action_type = store
            .count_grouped(&filter, GroupKey::ActionType, ActionType::ALL.len() as u32)
            .await?
            .into_iter()
            .collect();
        let top_actors = store
            .count_grouped(&filter, GroupKey::Actor, top_n)
            .await?
            .into_iter()
            .map(GroupCount::from)
            .collect();
        let top_subjects = store
            .count_grouped(&filter, GroupKey::Subject, top_n)
            .await?
            .into_iter()
            .map(GroupCount::from)
            .collect();
        let by_hour = store.hour_histogram(&filter).await?;

        Ok(Statistics {
            window,
            total,
            by_action_type,
            top_actors,
            top_subjects,
            by_hour,
        })
    }

    /// Threshold findings, most severe first
    #[instrument(skip(self))]
    pub async fn findings(&self, window: TimeWindow) -> ServiceResult<Vec<Finding>> {
        let mut findings = self.failed_logins(window).await?;
        findings.extend(self.after_hours_reads(window).await?);
        findings.extend(self.access_denied(window).await?);
        findings.sort_by(|a, b| b.severity.cmp(&a.severity));
        Ok(findings)
    }

    async fn failed_logins(&self, window: TimeWindow) -> ServiceResult<Vec<Finding>> {
        let filter = AuditFilter::within(window).with_action(ActionType::LoginFailed);
        let by_ip = self
            .ctx
            .store()
            .count_grouped(&filter, GroupKey::SourceIp, MAX_PAGE_SIZE)
            .await?;

        Ok(by_ip
            .into_iter()
            .filter_map(|(ip, count)| {
                let severity = if count >= FAILED_LOGIN_HIGH {
                    Severity::High
                } else if count >= FAILED_LOGIN_MEDIUM {
                    Severity::Medium
                } else {
                    return None;
                };
                Some(Finding::new(
                    MULTIPLE_FAILED_LOGINS,
                    format!("{count} failed logins from {ip}"),
                    severity,
                ))
            })
            .collect())
    }

    async fn after_hours_reads(&self, window: TimeWindow) -> ServiceResult<Option<Finding>> {
        let settings = self.ctx.anomaly_settings();
        let filter = AuditFilter::within(window).with_action(ActionType::Read);
        let histogram = self.ctx.store().hour_histogram(&filter).await?;

        let after_hours: u64 = histogram
            .iter()
            .zip(0u32..)
            .filter(|(_, hour)| !is_business_hour(settings, *hour))
            .map(|(count, _)| count)
            .sum();

        Ok((after_hours > settings.after_hours_threshold).then(|| {
            Finding::new(
                AFTER_HOURS_ACCESS,
                format!(
                    "{after_hours} record reads outside {:02}:00-{:02}:00 UTC",
                    settings.business_hours_start, settings.business_hours_end
                ),
                Severity::Low,
            )
        }))
    }

    async fn access_denied(&self, window: TimeWindow) -> ServiceResult<Option<Finding>> {
        let filter = AuditFilter::within(window).with_action(ActionType::AccessDenied);
        let count = self.ctx.store().count_by_filter(&filter).await?;

        let severity = if count > ACCESS_DENIED_HIGH {
            Severity::High
        } else if count > ACCESS_DENIED_MEDIUM {
            Severity::Medium
        } else {
            return Ok(None);
        };
        Ok(Some(Finding::new(
            EXCESSIVE_ACCESS_DENIED,
            format!("{count} access denied events"),
            severity,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_hours() {
        let settings = AnomalySettings::default();
        assert!(is_business_hour(&settings, 8));
        assert!(is_business_hour(&settings, 17));
        assert!(!is_business_hour(&settings, 18));
        assert!(!is_business_hour(&settings, 3));
    }

    #[test]
    fn test_overnight_business_hours() {
        let settings = AnomalySettings {
            business_hours_start: 22,
            business_hours_end: 6,
            ..AnomalySettings::default()
        };
        assert!(is_business_hour(&settings, 23));
        assert!(is_business_hour(&settings, 2));
        assert!(!is_business_hour(&settings, 12));
    }
}
