//! PostgreSQL implementation of AuditStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use audit_core::entities::{AuditEvent, NewAuditEvent};
use audit_core::traits::{AuditFilter, AuditStore, GroupKey, PageRequest, RepoResult, SortOrder};
use audit_core::value_objects::EventId;

use crate::mappers::AuditEventInsert;
use crate::models::{AuditEventModel, GroupCountModel, HourCountModel};

use super::error::map_db_error;

const SELECT_COLUMNS: &str = "SELECT id, occurred_at, actor_id, action_type, target_entity_type, \
     target_record_id, subject_id, source_ip, client_descriptor, changes, reason \
     FROM audit_events WHERE TRUE";

/// PostgreSQL implementation of AuditStore
#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    /// Create a new PgAuditStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Append `AND ...` clauses for every set filter field
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &AuditFilter) {
    if let Some(actor) = filter.actor_id {
        qb.push(" AND actor_id = ").push_bind(actor.into_inner());
    }
    if let Some(subject) = filter.subject_id {
        qb.push(" AND subject_id = ").push_bind(subject.into_inner());
    }
    if let Some(action) = filter.action_type {
        qb.push(" AND action_type = ").push_bind(action.as_str());
    }
    if let Some(entity_type) = &filter.target_entity_type {
        qb.push(" AND target_entity_type = ")
            .push_bind(entity_type.clone());
    }
    if let Some(record) = filter.target_record_id {
        qb.push(" AND target_record_id = ")
            .push_bind(record.into_inner());
    }
    if let Some(ip) = &filter.source_ip {
        qb.push(" AND source_ip = ").push_bind(ip.clone());
    }
    if let Some(from) = filter.from {
        qb.push(" AND occurred_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND occurred_at < ").push_bind(to);
    }
}

/// Grouping expression for a key; never built from user input
fn group_expr(key: GroupKey) -> &'static str {
    match key {
        GroupKey::ActionType => "action_type",
        GroupKey::Actor => "actor_id::text",
        GroupKey::Subject => "subject_id::text",
        GroupKey::SourceIp => "source_ip",
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    #[instrument(skip(self, event), fields(action = %event.action_type))]
    async fn append(&self, event: NewAuditEvent) -> RepoResult<EventId> {
        event.validate()?;
        let row = AuditEventInsert::new(&event);

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO audit_events (
                occurred_at, actor_id, action_type, target_entity_type, target_record_id,
                subject_id, source_ip, client_descriptor, changes, reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(row.occurred_at)
        .bind(row.actor_id)
        .bind(row.action_type)
        .bind(row.target_entity_type)
        .bind(row.target_record_id)
        .bind(row.subject_id)
        .bind(row.source_ip)
        .bind(row.client_descriptor)
        .bind(row.changes)
        .bind(row.reason)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(EventId::new(id))
    }

    #[instrument(skip(self))]
    async fn purge_batch(&self, cutoff: DateTime<Utc>, limit: u32) -> RepoResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM audit_events
            WHERE id IN (
                SELECT id FROM audit_events
                WHERE occurred_at < $1
                ORDER BY occurred_at, id
                LIMIT $2
            )
            "#,
        )
        .bind(cutoff)
        .bind(i64::from(limit))
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: EventId) -> RepoResult<Option<AuditEvent>> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        qb.push(" AND id = ").push_bind(id.into_inner());

        let result = qb
            .build_query_as::<AuditEventModel>()
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        result.map(AuditEvent::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_filter(
        &self,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> RepoResult<Vec<AuditEvent>> {
        filter.validate()?;

        let mut qb = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        push_filter(&mut qb, filter);
        qb.push(match page.order {
            SortOrder::NewestFirst => " ORDER BY occurred_at DESC, id DESC",
            SortOrder::OldestFirst => " ORDER BY occurred_at ASC, id ASC",
        });
        qb.push(" LIMIT ").push_bind(i64::from(page.limit));
        qb.push(" OFFSET ")
            .push_bind(i64::try_from(page.offset).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<AuditEventModel>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        rows.into_iter().map(AuditEvent::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn count_by_filter(&self, filter: &AuditFilter) -> RepoResult<u64> {
        filter.validate()?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_events WHERE TRUE");
        push_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self))]
    async fn count_grouped(
        &self,
        filter: &AuditFilter,
        key: GroupKey,
        limit: u32,
    ) -> RepoResult<Vec<(String, u64)>> {
        filter.validate()?;
        let expr = group_expr(key);

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {expr} AS key, COUNT(*) AS count FROM audit_events WHERE {expr} IS NOT NULL"
        ));
        push_filter(&mut qb, filter);
        qb.push(" GROUP BY 1 ORDER BY 2 DESC, 1 ASC LIMIT ")
            .push_bind(i64::from(limit));

        let rows = qb
            .build_query_as::<GroupCountModel>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.key, row.count.max(0) as u64))
            .collect())
    }

    #[instrument(skip(self))]
    async fn hour_histogram(&self, filter: &AuditFilter) -> RepoResult<[u64; 24]> {
        filter.validate()?;

        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT EXTRACT(HOUR FROM occurred_at AT TIME ZONE 'UTC')::int AS hour, \
             COUNT(*) AS count FROM audit_events WHERE TRUE",
        );
        push_filter(&mut qb, filter);
        qb.push(" GROUP BY 1");

        let rows = qb
            .build_query_as::<HourCountModel>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        let mut histogram = [0u64; 24];
        for row in rows {
            if let Some(slot) = usize::try_from(row.hour).ok().and_then(|h| histogram.get_mut(h)) {
                *slot = row.count.max(0) as u64;
            }
        }
        Ok(histogram)
    }

    async fn ping(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }
}
