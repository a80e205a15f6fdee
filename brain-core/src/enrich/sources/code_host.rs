//! Enriches entities from code-host records (e.g. GitHub PR/commit exports):
//! logs merged work as a research discovery and links the subject entity to
//! any repositories or projects it names via `relationships`.

use crate::enrich::{append_discovery_event, apply_relationship_delta, Enricher};
use crate::error::Result;
use crate::resolver::CanonicalResolver;
use crate::store::EntityStore;
use serde_json::Value;

const SOURCE_RELIABILITY: f64 = 0.80;

pub struct CodeHostEnricher;

impl CodeHostEnricher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CodeHostEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl Enricher for CodeHostEnricher {
    fn source_name(&self) -> &str {
        "code_host"
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
        let pr_id = record.get("id").and_then(Value::as_str).unwrap_or("unknown");
        let repo = record.get("repo").and_then(Value::as_str).unwrap_or("");
        let title = record.get("title").and_then(Value::as_str).unwrap_or("");
        let message = format!("{repo}#{pr_id}: {title}");

        let Some(subject_ref) = record.get("entity").and_then(Value::as_str) else {
            return Ok(0);
        };
        let Some(subject) = resolver.resolve(subject_ref) else {
            return Ok(0);
        };
        if !store.exists(&subject) {
            return Ok(0);
        }

        let mut updated = 0;
        if !dry_run {
            append_discovery_event(
                store,
                &subject,
                self.source_name(),
                &message,
                self.source_reliability(),
                Some(pr_id),
            )?;
            updated += 1;
        }

        for delta in record.get("relationships").and_then(Value::as_array).into_iter().flatten() {
            let Some(rel_type) = delta.get("type").and_then(Value::as_str) else {
                continue;
            };
            let Some(target_ref) = delta.get("target").and_then(Value::as_str) else {
                continue;
            };
            let Some(target) = resolver.resolve(target_ref) else {
                continue;
            };
            if dry_run {
                updated += 1;
                continue;
            }
            if apply_relationship_delta(
                store,
                &subject,
                rel_type,
                &target,
                self.source_reliability(),
                self.source_name(),
            )? {
                updated += 1;
            }
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
    fn test_enrich_logs_merged_pr() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/project/checkout", &entity("entity/project/checkout"), "").unwrap();
        let resolver = CanonicalResolver::build(&store).unwrap();

        let record = serde_json::json!({
            "id": "482",
            "repo": "checkout-service",
            "title": "add retry logic",
            "entity": "checkout",
        });

        let enricher = CodeHostEnricher::new();
        let updated = enricher.enrich(&store, &resolver, &record, false).unwrap();
        assert_eq!(updated, 1);

        let file = store.read("entity/project/checkout").unwrap();
        assert_eq!(file.header.events.len(), 1);
    }

    #[test]
    fn test_unresolvable_subject_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let resolver = CanonicalResolver::build(&store).unwrap();

        let record = serde_json::json!({"id": "1", "repo": "x", "title": "y", "entity": "ghost"});
        let enricher = CodeHostEnricher::new();
        let updated = enricher.enrich(&store, &resolver, &record, false).unwrap();
        assert_eq!(updated, 0);
    }
}
