//! Event store: the append-only change log embedded in each entity's
//! header, plus cross-entity querying.

use crate::error::Result;
use crate::store::EntityStore;
use crate::types::{Event, EventChange, EventType};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// A query result entry: the event plus the entity it belongs to, since
/// cross-entity queries need to report provenance.
#[derive(Debug, Clone)]
pub struct DatedEvent {
    pub entity_id: String,
    pub event: Event,
}

/// How to group [`EventStore::count`] results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Type,
    Actor,
    Id,
}

/// Optional filters shared by [`EventStore::events_for`] and
/// [`EventStore::query`].
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub types: Option<Vec<EventType>>,
    pub actors: Option<Vec<String>>,
    /// Restricts matches to entities whose id matches this glob pattern,
    /// e.g. `entity/team/*` or `entity/project/checkout-*`.
    pub path_glob: Option<String>,
}

impl EventFilter {
    fn matches(&self, entity_id: &str, event: &Event) -> bool {
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp > until {
                return false;
            }
        }
        if let Some(types) = &self.types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        if let Some(actors) = &self.actors {
            if !actors.contains(&event.actor) {
                return false;
            }
        }
        if let Some(pattern) = &self.path_glob {
            let matches_path = glob::Pattern::new(pattern).map(|p| p.matches(entity_id)).unwrap_or(false);
            if !matches_path {
                return false;
            }
        }
        true
    }
}

/// An LRU-ish cache of recently parsed entities, keyed by id. Bounded to
/// avoid unbounded growth during long orchestrator runs.
struct EntityCache {
    capacity: usize,
    order: Vec<String>,
    entries: HashMap<String, crate::types::EntityFile>,
}

impl EntityCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    fn get_or_load(
        &mut self,
        store: &EntityStore,
        id: &str,
    ) -> Result<crate::types::EntityFile> {
        if let Some(file) = self.entries.get(id) {
            return Ok(file.clone());
        }

        let file = store.read(id)?;
        self.insert(id.to_string(), file.clone());
        Ok(file)
    }

    fn insert(&mut self, id: String, file: crate::types::EntityFile) {
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.first().cloned() {
                self.entries.remove(&oldest);
                self.order.remove(0);
            }
        }
        self.order.push(id.clone());
        self.entries.insert(id, file);
    }

    fn invalidate(&mut self, id: &str) {
        self.entries.remove(id);
        self.order.retain(|x| x != id);
    }
}

const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Append-only event log over an [`EntityStore`].
pub struct EventStore<'a> {
    store: &'a EntityStore,
    cache: Arc<Mutex<EntityCache>>,
}

impl<'a> EventStore<'a> {
    pub fn new(store: &'a EntityStore) -> Self {
        Self {
            store,
            cache: Arc::new(Mutex::new(EntityCache::new(DEFAULT_CACHE_CAPACITY))),
        }
    }

    /// Appends an event to `entity_id`, bumping `version` and `updated`.
    /// Deduplicates on `(correlation_id, message)` only when both are
    /// present on an existing event; an event with no `correlation_id` is
    /// never treated as a duplicate.
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &self,
        entity_id: &str,
        event_type: EventType,
        message: &str,
        actor: &str,
        changes: Vec<EventChange>,
        correlation_id: Option<String>,
    ) -> Result<Event> {
        let mut cache = self.cache.lock().expect("event cache mutex poisoned");
        let mut file = cache.get_or_load(self.store, entity_id)?;

        if let Some(ref cid) = correlation_id {
            let is_dup = file
                .header
                .events
                .iter()
                .any(|e| e.correlation_id.as_deref() == Some(cid.as_str()) && e.message == message);
            if is_dup {
                tracing::debug!(entity_id, correlation_id = %cid, "skipping duplicate event append");
                return Ok(file
                    .header
                    .events
                    .iter()
                    .rev()
                    .find(|e| e.correlation_id.as_deref() == Some(cid.as_str()) && e.message == message)
                    .cloned()
                    .expect("just matched"));
            }
        }

        let now = Utc::now();
        let event = Event {
            event_id: format!("evt-{}", Uuid::new_v4()),
            timestamp: now,
            event_type,
            actor: actor.to_string(),
            message: message.to_string(),
            changes,
            correlation_id,
            metadata: None,
        };

        file.header.events.push(event.clone());
        file.header.version += 1;
        file.header.updated = now;

        self.store.write(entity_id, &file.header, &file.body)?;
        cache.invalidate(entity_id);

        tracing::info!(entity_id, version = file.header.version, event_type = %event.event_type, "appended event");
        Ok(event)
    }

    /// Filtered, time-sorted events for one entity.
    pub fn events_for(&self, entity_id: &str, filter: &EventFilter) -> Result<Vec<Event>> {
        let mut cache = self.cache.lock().expect("event cache mutex poisoned");
        let file = cache.get_or_load(self.store, entity_id)?;

        let mut events: Vec<Event> = file
            .header
            .events
            .into_iter()
            .filter(|e| filter.matches(entity_id, e))
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    /// Cross-entity query, newest first, bounded to `limit`, tie-broken by
    /// entity id.
    pub fn query(&self, filter: &EventFilter, limit: usize) -> Result<Vec<DatedEvent>> {
        let mut all = Vec::new();

        for id in self.store.list()? {
            let events = self.events_for(&id, filter)?;
            for event in events {
                all.push(DatedEvent {
                    entity_id: id.clone(),
                    event,
                });
            }
        }

        all.sort_by(|a, b| {
            b.event
                .timestamp
                .cmp(&a.event.timestamp)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        all.truncate(limit);
        Ok(all)
    }

    /// All events sharing a correlation id, across all entities.
    pub fn by_correlation(&self, correlation_id: &str) -> Result<Vec<DatedEvent>> {
        let all = self.query(&EventFilter::default(), usize::MAX)?;
        Ok(all
            .into_iter()
            .filter(|d| d.event.correlation_id.as_deref() == Some(correlation_id))
            .collect())
    }

    /// Timeline for one entity within an optional range.
    pub fn timeline(
        &self,
        entity_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>> {
        self.events_for(
            entity_id,
            &EventFilter {
                since,
                until,
                ..Default::default()
            },
        )
    }

    /// Counts cross-entity events grouped by type, actor, or entity id.
    pub fn count(&self, group_by: GroupBy, filter: &EventFilter) -> Result<HashMap<String, usize>> {
        let mut counts = HashMap::new();
        for dated in self.query(filter, usize::MAX)? {
            let key = match group_by {
                GroupBy::Type => dated.event.event_type.as_str().to_string(),
                GroupBy::Actor => dated.event.actor.clone(),
                GroupBy::Id => dated.entity_id.clone(),
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, EntityType, Status};
    use indexmap::IndexMap;

    fn sample_entity(id: &str) -> Entity {
        let now = Utc::now();
        Entity {
            schema_version: 2,
            id: id.to_string(),
            entity_type: EntityType::Project,
            version: 1,
            created: now,
            updated: now,
            name: "Checkout".to_string(),
            aliases: vec![],
            status: Status::Active,
            confidence: 1.0,
            valid_from: None,
            valid_to: None,
            relationships: vec![],
            events: vec![],
            orphan_reason: None,
            extra: IndexMap::new(),
        }
    }

    #[test]
    fn test_append_bumps_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/project/checkout", &sample_entity("entity/project/checkout"), "").unwrap();

        let events = EventStore::new(&store);
        events
            .append(
                "entity/project/checkout",
                EventType::FieldUpdate,
                "launched",
                "system/enricher",
                vec![],
                None,
            )
            .unwrap();

        let file = store.read("entity/project/checkout").unwrap();
        assert_eq!(file.header.version, 2);
        assert_eq!(file.header.events.len(), 1);
    }

    #[test]
    fn test_append_dedups_on_correlation_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/project/checkout", &sample_entity("entity/project/checkout"), "").unwrap();

        let events = EventStore::new(&store);
        let cid = Some("context-2026-07-28".to_string());
        events
            .append("entity/project/checkout", EventType::FieldUpdate, "noted in standup", "system", vec![], cid.clone())
            .unwrap();
        events
            .append("entity/project/checkout", EventType::FieldUpdate, "noted in standup", "system", vec![], cid)
            .unwrap();

        let file = store.read("entity/project/checkout").unwrap();
        assert_eq!(file.header.version, 2, "second append should have been a no-op");
        assert_eq!(file.header.events.len(), 1);
    }

    #[test]
    fn test_append_without_correlation_id_never_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/project/checkout", &sample_entity("entity/project/checkout"), "").unwrap();

        let events = EventStore::new(&store);
        events
            .append("entity/project/checkout", EventType::FieldUpdate, "same message", "system", vec![], None)
            .unwrap();
        events
            .append("entity/project/checkout", EventType::FieldUpdate, "same message", "system", vec![], None)
            .unwrap();

        let file = store.read("entity/project/checkout").unwrap();
        assert_eq!(file.header.version, 3);
        assert_eq!(file.header.events.len(), 2);
    }

    #[test]
    fn test_query_sorts_desc_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/project/checkout", &sample_entity("entity/project/checkout"), "").unwrap();
        store.write("entity/project/growth", &sample_entity("entity/project/growth"), "").unwrap();

        let events = EventStore::new(&store);
        events.append("entity/project/checkout", EventType::FieldUpdate, "first", "system", vec![], None).unwrap();
        events.append("entity/project/growth", EventType::FieldUpdate, "second", "system", vec![], None).unwrap();

        let results = events.query(&EventFilter::default(), 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].event.message, "second");
    }

    #[test]
    fn test_query_filters_by_path_glob() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/project/checkout", &sample_entity("entity/project/checkout"), "").unwrap();
        store.write("entity/team/payments", &sample_entity("entity/team/payments"), "").unwrap();

        let events = EventStore::new(&store);
        events.append("entity/project/checkout", EventType::FieldUpdate, "first", "system", vec![], None).unwrap();
        events.append("entity/team/payments", EventType::FieldUpdate, "second", "system", vec![], None).unwrap();

        let filter = EventFilter {
            path_glob: Some("entity/project/*".to_string()),
            ..Default::default()
        };
        let results = events.query(&filter, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity_id, "entity/project/checkout");
    }
}
