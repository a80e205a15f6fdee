//! Enriches entities from cached chat-platform messages (e.g. Slack-style
//! exports): a message mentioning one or more entities becomes a research
//! discovery event on each, keeping the message itself as context.

use crate::enrich::{append_discovery_event, Enricher};
use crate::error::Result;
use crate::resolver::CanonicalResolver;
use crate::store::EntityStore;
use serde_json::Value;

const SOURCE_RELIABILITY: f64 = 0.65;

pub struct ChatEnricher;

impl ChatEnricher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ChatEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl Enricher for ChatEnricher {
    fn source_name(&self) -> &str {
        "chat"
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
        let message_id = record.get("id").and_then(Value::as_str).unwrap_or("unknown");
        let channel = record.get("channel").and_then(Value::as_str).unwrap_or("");
        let text = record.get("text").and_then(Value::as_str).unwrap_or("");
        let truncated: String = text.chars().take(200).collect();
        let summary = format!("#{channel}: {truncated}");

        let mentions = record
            .get("mentions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut updated = 0;
        for mention in mentions {
            let Some(reference) = mention.as_str() else { continue };
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
                    &summary,
                    self.source_reliability(),
                    Some(message_id),
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
    fn test_enrich_appends_discovery_event_for_each_mention() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/project/checkout", &entity("entity/project/checkout"), "").unwrap();
        let resolver = CanonicalResolver::build(&store).unwrap();

        let record = serde_json::json!({
            "id": "msg-1",
            "channel": "eng",
            "text": "checkout is blocked on payments",
            "mentions": ["checkout"],
        });

        let enricher = ChatEnricher::new();
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

        let record = serde_json::json!({"id": "msg-2", "channel": "eng", "text": "note", "mentions": ["checkout"]});
        let enricher = ChatEnricher::new();
        let updated = enricher.enrich(&store, &resolver, &record, true).unwrap();
        assert_eq!(updated, 1);

        let file = store.read("entity/project/checkout").unwrap();
        assert!(file.header.events.is_empty(), "dry run must not write");
    }
}
