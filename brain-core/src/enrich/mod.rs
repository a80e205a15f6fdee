//! Enricher framework: pluggable sources that turn cached raw records into
//! entity events and relationship deltas, always through the event store.

pub mod sources;

use crate::error::Result;
use crate::events::EventStore;
use crate::resolver::CanonicalResolver;
use crate::store::EntityStore;
use crate::types::{EventChange, EventType, Relationship};
use serde_json::Value;
use std::path::Path;

/// Stats returned by a full inbox pass.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentStats {
    pub processed: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// A single source of enrichment, bound to one raw-record format.
///
/// Implementors never write to entities directly; `enrich` goes through
/// [`EventStore::append`] so every mutation is a logged, attributed event.
pub trait Enricher: Send + Sync {
    /// Stable source name, used as the event actor suffix
    /// (`system/<source_name>_enricher`) and the checkpoint key.
    fn source_name(&self) -> &str;

    /// Confidence weight attached to events this source produces.
    fn source_reliability(&self) -> f64;

    /// Enriches entities referenced by one raw record. Returns the number of
    /// entity fields updated (0 when no related entity resolved, or the
    /// record carried nothing new).
    fn enrich(&self, store: &EntityStore, resolver: &CanonicalResolver, record: &Value, dry_run: bool) -> Result<usize>;

    /// Processes every cached raw record in `dir` (this source's inbox
    /// directory), accumulating stats. Individual record failures increment
    /// `errors` and are logged, never propagated.
    fn enrich_from_inbox(
        &self,
        store: &EntityStore,
        resolver: &CanonicalResolver,
        dir: &Path,
        dry_run: bool,
    ) -> Result<EnrichmentStats> {
        let mut stats = EnrichmentStats::default();
        if !dir.exists() {
            return Ok(stats);
        }

        for entry in std::fs::read_dir(dir)? {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read inbox record");
                    stats.errors += 1;
                    continue;
                }
            };
            let parsed: Result<Value, _> = serde_json::from_str(&content);
            let records: Vec<Value> = match parsed {
                Ok(Value::Array(items)) => items,
                Ok(single) => vec![single],
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "malformed inbox record");
                    stats.errors += 1;
                    continue;
                }
            };

            for record in records {
                stats.processed += 1;
                if record.get("confidence").and_then(Value::as_str) == Some("low") {
                    stats.skipped += 1;
                    continue;
                }
                match self.enrich(store, resolver, &record, dry_run) {
                    Ok(updated) => stats.updated += updated,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "enrichment failed for record");
                        stats.errors += 1;
                    }
                }
            }
        }

        Ok(stats)
    }
}

/// Appends a `research_discovery` event carrying `message` and `confidence`
/// to `entity_id`, attributed to `source`. Shared by every source enricher.
pub(crate) fn append_discovery_event(
    store: &EntityStore,
    entity_id: &str,
    source: &str,
    message: &str,
    confidence: f64,
    correlation_id: Option<&str>,
) -> Result<()> {
    let events = EventStore::new(store);
    events.append(
        entity_id,
        EventType::ResearchDiscovery,
        message,
        &format!("system/{source}_enricher"),
        vec![EventChange {
            field: "events".into(),
            operation: "append".into(),
            value: serde_json::json!({"confidence": confidence}),
            old_value: None,
        }],
        correlation_id.map(|s| s.to_string()),
    )
}

/// Adds `rel_type -> target` to `subject_id` if not already present (by
/// `(type, target)`), then appends a `field_update` event describing the
/// delta. Writes the relationship first, without bumping `version`, so
/// `EventStore::append`'s own read-modify-write is the single point where
/// `version`/`updated` advance.
pub(crate) fn apply_relationship_delta(
    store: &EntityStore,
    subject_id: &str,
    rel_type: &str,
    target: &str,
    confidence: f64,
    source: &str,
) -> Result<bool> {
    let mut file = store.read(subject_id)?;
    let key = (rel_type.to_string(), target.to_string());
    if file.header.relationships.iter().any(|r| r.dedup_key() == key) {
        return Ok(false);
    }

    file.header.relationships.push(Relationship {
        rel_type: rel_type.to_string(),
        target: target.to_string(),
        since: None,
        last_verified: Some(chrono::Utc::now()),
        confidence,
        source: Some(format!("{source}_enricher")),
        strength: None,
    });
    store.write(subject_id, &file.header, &file.body)?;

    let events = EventStore::new(store);
    events.append(
        subject_id,
        EventType::FieldUpdate,
        &format!("added relationship {rel_type} -> {target} from {source}"),
        &format!("system/{source}_enricher"),
        vec![EventChange {
            field: "relationships".into(),
            operation: "add".into(),
            value: serde_json::json!({"type": rel_type, "target": target}),
            old_value: None,
        }],
        None,
    )?;

    Ok(true)
}
