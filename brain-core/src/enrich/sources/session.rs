//! Enriches entities from Claude Code research-session findings: a finding
//! naming one or more related entities becomes a research discovery event
//! on each, truncated to 200 characters the way `session_enricher.py` does.

use crate::enrich::{append_discovery_event, Enricher};
use crate::error::Result;
use crate::resolver::CanonicalResolver;
use crate::store::EntityStore;
use serde_json::Value;

const SOURCE_RELIABILITY: f64 = 0.75;

pub struct SessionEnricher;

impl SessionEnricher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SessionEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl Enricher for SessionEnricher {
    fn source_name(&self) -> &str {
        "session"
    }

    fn source_reliability(&self) -> f64 {
        SOURCE_RELIABILITY
    }

    fn enrich(
        &self,
        store: &EntityStore,
        resolver: &CanonicalResolver,
        record: &Value,
        dry_run: bool,
    ) -> Result<usize> {
        let finding_id = record.get("id").and_then(Value::as_str).unwrap_or("unknown");
        let title = record.get("title").and_then(Value::as_str).unwrap_or("");
        let finding = record.get("finding").and_then(Value::as_str).unwrap_or("");
        let truncated: String = finding.chars().take(200).collect();
        let message = format!("{title}: {truncated}");

        let related = record
            .get("related_entities")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut updated = 0;
        for entity_ref in related {
            let Some(reference) = entity_ref.as_str() else { continue };
            let Some(canonical) = resolver.resolve(reference) else {
                continue;
            };
            if !store.exists(&canonical) {
                continue;
            }
            if !dry_run {
                append_discovery_event(
                    store,
                    &canonical,
                    self.source_name(),
                    &message,
                    self.source_reliability(),
                    Some(finding_id),
                )?;
            }
            updated += 1;
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, EntityType, Status};
    use indexmap::IndexMap;

    fn entity(id: &str) -> Entity {
        let now = chrono::Utc::now();
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
    fn test_enrich_appends_discovery_event_for_related_entities() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/project/checkout", &entity("entity/project/checkout"), "").unwrap();
        let resolver = CanonicalResolver::build(&store).unwrap();

        let record = serde_json::json!({
            "id": "finding-1",
            "title": "Competitor launched similar feature",
            "finding": "Acme shipped one-click checkout last week.",
            "confidence": "high",
            "related_entities": ["checkout"],
        });

        let enricher = SessionEnricher::new();
        let updated = enricher.enrich(&store, &resolver, &record, false).unwrap();
        assert_eq!(updated, 1);

        let file = store.read("entity/project/checkout").unwrap();
        assert_eq!(file.header.events.len(), 1);
        assert_eq!(file.header.events[0].event_type.as_str(), "research_discovery");
    }

    #[test]
    fn test_dry_run_counts_but_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/project/checkout", &entity("entity/project/checkout"), "").unwrap();
        let resolver = CanonicalResolver::build(&store).unwrap();

        let record = serde_json::json!({
            "id": "finding-2",
            "title": "Note",
            "finding": "context",
            "related_entities": ["checkout"],
        });
        let enricher = SessionEnricher::new();
        let updated = enricher.enrich(&store, &resolver, &record, true).unwrap();
        assert_eq!(updated, 1);

        let file = store.read("entity/project/checkout").unwrap();
        assert!(file.header.events.is_empty(), "dry run must not write");
    }

    #[test]
    fn test_unresolvable_mention_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let resolver = CanonicalResolver::build(&store).unwrap();

        let record = serde_json::json!({
            "id": "finding-3",
            "title": "Note",
            "finding": "context",
            "related_entities": ["nonexistent"],
        });
        let enricher = SessionEnricher::new();
        let updated = enricher.enrich(&store, &resolver, &record, false).unwrap();
        assert_eq!(updated, 0);
    }
}
