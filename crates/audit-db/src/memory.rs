//! In-memory audit store
//!
//! Used for tests, local development, and as the default backend when no
//! database URL is configured. Events live in a primary `BTreeMap` keyed by
//! id, with secondary indices mirroring the SQL schema's indices.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use parking_lot::RwLock;
use tracing::instrument;

use audit_core::entities::{ActionType, AuditEvent, NewAuditEvent};
use audit_core::traits::{AuditFilter, AuditStore, GroupKey, PageRequest, RepoResult, SortOrder};
use audit_core::value_objects::EventId;

type IdSet = BTreeSet<i64>;

#[derive(Default)]
struct Inner {
    next_id: i64,
    events: BTreeMap<i64, AuditEvent>,
    by_time: BTreeSet<(DateTime<Utc>, i64)>,
    by_actor: HashMap<i64, IdSet>,
    by_subject: HashMap<i64, IdSet>,
    by_target: HashMap<(String, i64), IdSet>,
    by_action: HashMap<ActionType, IdSet>,
}

impl Inner {
    fn insert(&mut self, event: AuditEvent) {
        let id = event.id.into_inner();
        self.by_time.insert((event.timestamp, id));
        if let Some(actor) = event.actor_id {
            self.by_actor.entry(actor.into_inner()).or_default().insert(id);
        }
        if let Some(subject) = event.subject_id {
            self.by_subject
                .entry(subject.into_inner())
                .or_default()
                .insert(id);
        }
        self.by_target
            .entry((
                event.target_entity_type.clone(),
                event.target_record_id.into_inner(),
            ))
            .or_default()
            .insert(id);
        self.by_action.entry(event.action_type).or_default().insert(id);
        self.events.insert(id, event);
    }

    fn remove(&mut self, id: i64) {
        let Some(event) = self.events.remove(&id) else {
            return;
        };
        self.by_time.remove(&(event.timestamp, id));
        if let Some(actor) = event.actor_id {
            remove_from(&mut self.by_actor, &actor.into_inner(), id);
        }
        if let Some(subject) = event.subject_id {
            remove_from(&mut self.by_subject, &subject.into_inner(), id);
        }
        remove_from(
            &mut self.by_target,
            &(event.target_entity_type, event.target_record_id.into_inner()),
            id,
        );
        remove_from(&mut self.by_action, &event.action_type, id);
    }

    /// Events matching the filter, ascending by `(timestamp, id)`
    fn scan<'a>(&'a self, filter: &AuditFilter) -> Vec<&'a AuditEvent> {
        let indexed: Option<&IdSet> = if let Some(actor) = filter.actor_id {
            Some(self.by_actor.get(&actor.into_inner()).unwrap_or(&EMPTY))
        } else if let Some(subject) = filter.subject_id {
            Some(self.by_subject.get(&subject.into_inner()).unwrap_or(&EMPTY))
        } else if let (Some(entity_type), Some(record)) =
            (&filter.target_entity_type, filter.target_record_id)
        {
            Some(
                self.by_target
                    .get(&(entity_type.clone(), record.into_inner()))
                    .unwrap_or(&EMPTY),
            )
        } else if let Some(action) = filter.action_type {
            Some(self.by_action.get(&action).unwrap_or(&EMPTY))
        } else {
            None
        };

        match indexed {
            Some(ids) => {
                let mut hits: Vec<&AuditEvent> = ids
                    .iter()
                    .filter_map(|id| self.events.get(id))
                    .filter(|event| filter.matches(event))
                    .collect();
                hits.sort_by_key(|event| (event.timestamp, event.id));
                hits
            }
            None => {
                let lower = filter
                    .from
                    .map_or(std::ops::Bound::Unbounded, |from| {
                        std::ops::Bound::Included((from, i64::MIN))
                    });
                let upper = filter
                    .to
                    .map_or(std::ops::Bound::Unbounded, |to| {
                        std::ops::Bound::Excluded((to, i64::MIN))
                    });
                self.by_time
                    .range((lower, upper))
                    .filter_map(|(_, id)| self.events.get(id))
                    .filter(|event| filter.matches(event))
                    .collect()
            }
        }
    }
}

static EMPTY: IdSet = BTreeSet::new();

fn remove_from<K: std::hash::Hash + Eq>(index: &mut HashMap<K, IdSet>, key: &K, id: i64) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

/// Append-only store backed by process memory
#[derive(Default)]
pub struct MemoryAuditStore {
    inner: RwLock<Inner>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events
    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored event, ordered by id
    pub fn snapshot(&self) -> Vec<AuditEvent> {
        self.inner.read().events.values().cloned().collect()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    #[instrument(skip(self, event), fields(action = %event.action_type))]
    async fn append(&self, event: NewAuditEvent) -> RepoResult<EventId> {
        event.validate()?;

        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = EventId::new(inner.next_id);
        inner.insert(AuditEvent::from_new(id, event));
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn purge_batch(&self, cutoff: DateTime<Utc>, limit: u32) -> RepoResult<u64> {
        let mut inner = self.inner.write();
        let victims: Vec<i64> = inner
            .by_time
            .range(..(cutoff, i64::MIN))
            .take(limit as usize)
            .map(|(_, id)| *id)
            .collect();

        for id in &victims {
            inner.remove(*id);
        }
        Ok(victims.len() as u64)
    }

    async fn find_by_id(&self, id: EventId) -> RepoResult<Option<AuditEvent>> {
        Ok(self.inner.read().events.get(&id.into_inner()).cloned())
    }

    #[instrument(skip(self))]
    async fn find_by_filter(
        &self,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> RepoResult<Vec<AuditEvent>> {
        filter.validate()?;

        let inner = self.inner.read();
        let hits = inner.scan(filter);
        let skip = usize::try_from(page.offset).unwrap_or(usize::MAX);
        let take = page.limit as usize;

        let page: Vec<AuditEvent> = match page.order {
            SortOrder::OldestFirst => hits.into_iter().skip(skip).take(take).cloned().collect(),
            SortOrder::NewestFirst => hits
                .into_iter()
                .rev()
                .skip(skip)
                .take(take)
                .cloned()
                .collect(),
        };
        Ok(page)
    }

    async fn count_by_filter(&self, filter: &AuditFilter) -> RepoResult<u64> {
        filter.validate()?;
        Ok(self.inner.read().scan(filter).len() as u64)
    }

    #[instrument(skip(self))]
    async fn count_grouped(
        &self,
        filter: &AuditFilter,
        key: GroupKey,
        limit: u32,
    ) -> RepoResult<Vec<(String, u64)>> {
        filter.validate()?;

        let inner = self.inner.read();
        let mut counts: HashMap<String, u64> = HashMap::new();
        for event in inner.scan(filter) {
            let group = match key {
                GroupKey::ActionType => Some(event.action_type.as_str().to_string()),
                GroupKey::Actor => event.actor_id.map(|id| id.to_string()),
                GroupKey::Subject => event.subject_id.map(|id| id.to_string()),
                GroupKey::SourceIp => Some(event.source_ip.clone()),
            };
            if let Some(group) = group {
                *counts.entry(group).or_default() += 1;
            }
        }

        let mut counts: Vec<(String, u64)> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(limit as usize);
        Ok(counts)
    }

    async fn hour_histogram(&self, filter: &AuditFilter) -> RepoResult<[u64; 24]> {
        filter.validate()?;

        let mut histogram = [0u64; 24];
        for event in self.inner.read().scan(filter) {
            histogram[event.timestamp.hour() as usize] += 1;
        }
        Ok(histogram)
    }
}
