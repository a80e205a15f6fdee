//! Enriches entities from issue-tracker records (e.g. Jira/Linear exports):
//! logs the issue as a research discovery on its subject entity and applies
//! any `relationships` the record names (e.g. a `blocks` link to another
//! tracked issue's entity).

use crate::enrich::{append_discovery_event, apply_relationship_delta, Enricher};
use crate::error::Result;
use crate::resolver::CanonicalResolver;
use crate::store::EntityStore;
use serde_json::Value;

const SOURCE_RELIABILITY: f64 = 0.80;

pub struct IssueTrackerEnricher;

impl IssueTrackerEnricher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IssueTrackerEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl Enricher for IssueTrackerEnricher {
    fn source_name(&self) -> &str {
        "issue_tracker"
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
        let issue_key = record.get("id").and_then(Value::as_str).unwrap_or("unknown");
        let title = record.get("title").and_then(Value::as_str).unwrap_or("");
        let status = record.get("status").and_then(Value::as_str).unwrap_or("");
        let message = format!("{issue_key} ({status}): {title}");

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
                Some(issue_key),
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
    fn test_enrich_logs_issue_and_applies_relationship_delta() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/project/checkout", &entity("entity/project/checkout"), "").unwrap();
        store.write("entity/project/payments", &entity("entity/project/payments"), "").unwrap();
        let resolver = CanonicalResolver::build(&store).unwrap();

        let record = serde_json::json!({
            "id": "PROJ-1",
            "title": "wire up payments",
            "status": "open",
            "entity": "checkout",
            "relationships": [{"type": "depends_on", "target": "payments"}],
        });

        let enricher = IssueTrackerEnricher::new();
        let updated = enricher.enrich(&store, &resolver, &record, false).unwrap();
        assert_eq!(updated, 2);

        let file = store.read("entity/project/checkout").unwrap();
        assert_eq!(file.header.relationships.len(), 1);
        assert_eq!(file.header.relationships[0].rel_type, "depends_on");
        assert_eq!(file.header.relationships[0].target, "entity/project/payments");
    }

    #[test]
    fn test_duplicate_relationship_delta_is_not_reapplied() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/project/checkout", &entity("entity/project/checkout"), "").unwrap();
        store.write("entity/project/payments", &entity("entity/project/payments"), "").unwrap();
        let resolver = CanonicalResolver::build(&store).unwrap();

        let record = serde_json::json!({
            "id": "PROJ-1",
            "title": "wire up payments",
            "status": "open",
            "entity": "checkout",
            "relationships": [{"type": "depends_on", "target": "payments"}],
        });

        let enricher = IssueTrackerEnricher::new();
        enricher.enrich(&store, &resolver, &record, false).unwrap();
        let second_record = serde_json::json!({
            "id": "PROJ-2",
            "title": "follow-up",
            "status": "open",
            "entity": "checkout",
            "relationships": [{"type": "depends_on", "target": "payments"}],
        });
        enricher.enrich(&store, &resolver, &second_record, false).unwrap();

        let file = store.read("entity/project/checkout").unwrap();
        assert_eq!(file.header.relationships.len(), 1, "duplicate relationship must not be re-added");
    }
}
