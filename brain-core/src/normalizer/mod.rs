//! Relationship normalizer: resolves every relationship target to its
//! canonical id, deduplicates by `(type, target)`, and flags unresolvable
//! targets as orphans without ever deleting them.

use crate::error::Result;
use crate::events::EventStore;
use crate::resolver::CanonicalResolver;
use crate::store::EntityStore;
use crate::types::{EventChange, EventType};
use std::collections::HashSet;

/// One `target` rewrite applied to a single entity.
#[derive(Debug, Clone)]
pub struct TargetChange {
    pub relationship_type: String,
    pub old_target: String,
    pub new_target: String,
}

/// Result of normalizing a single entity's relationships.
#[derive(Debug, Clone, Default)]
pub struct NormalizationResult {
    pub entity_id: String,
    pub original_count: usize,
    pub normalized_count: usize,
    pub duplicates_removed: usize,
    pub orphans_found: Vec<String>,
    pub changes: Vec<TargetChange>,
}

impl NormalizationResult {
    fn is_noop(&self) -> bool {
        self.changes.is_empty() && self.duplicates_removed == 0
    }
}

/// Result of a batch run over the whole store.
#[derive(Debug, Clone, Default)]
pub struct BatchNormalizationResult {
    pub total_entities: usize,
    pub entities_processed: usize,
    pub entities_modified: usize,
    pub relationships_normalized: usize,
    pub duplicates_removed: usize,
    pub orphan_targets: Vec<(String, String)>,
    pub errors: Vec<(String, String)>,
}

pub struct RelationshipNormalizer<'a> {
    store: &'a EntityStore,
    resolver: &'a CanonicalResolver,
}

impl<'a> RelationshipNormalizer<'a> {
    pub fn new(store: &'a EntityStore, resolver: &'a CanonicalResolver) -> Self {
        Self { store, resolver }
    }

    /// Normalizes one entity's relationships. When `dry_run` is false and at
    /// least one change was made, rewrites the entity and appends a single
    /// `normalization` event summarizing the change count.
    pub fn normalize_entity(&self, entity_id: &str, dry_run: bool) -> Result<NormalizationResult> {
        let mut file = self.store.read(entity_id)?;
        let original_count = file.header.relationships.len();

        let mut changes = Vec::new();
        let mut orphans = Vec::new();
        let mut resolved = Vec::with_capacity(original_count);

        for rel in file.header.relationships.drain(..) {
            if rel.target.is_empty() {
                continue;
            }
            match self.resolver.resolve(&rel.target) {
                Some(canonical) => {
                    if canonical != rel.target {
                        changes.push(TargetChange {
                            relationship_type: rel.rel_type.clone(),
                            old_target: rel.target.clone(),
                            new_target: canonical.clone(),
                        });
                    }
                    let mut rel = rel;
                    rel.target = canonical;
                    resolved.push(rel);
                }
                None => {
                    orphans.push(rel.target.clone());
                    resolved.push(rel);
                }
            }
        }

        let resolved_count = resolved.len();
        let mut seen = HashSet::new();
        let mut deduplicated = Vec::with_capacity(resolved_count);
        for rel in resolved {
            if seen.insert(rel.dedup_key()) {
                deduplicated.push(rel);
            }
        }
        let duplicates_removed = resolved_count - deduplicated.len();

        let result = NormalizationResult {
            entity_id: entity_id.to_string(),
            original_count,
            normalized_count: deduplicated.len(),
            duplicates_removed,
            orphans_found: orphans,
            changes,
        };

        if !dry_run && !result.is_noop() {
            // Persist the relationship rewrite without bumping `version`
            // ourselves: `EventStore::append` re-reads this write and is the
            // sole place that bumps `version`/`updated`, so every mutation
            // ends up attributed to exactly one event.
            file.header.relationships = deduplicated;
            self.store.write(entity_id, &file.header, &file.body)?;

            let mut counts_by_type: std::collections::BTreeMap<&str, usize> = std::collections::BTreeMap::new();
            for change in &result.changes {
                *counts_by_type.entry(change.relationship_type.as_str()).or_insert(0) += 1;
            }

            let events = EventStore::new(self.store);
            events.append(
                entity_id,
                EventType::Normalization,
                &format!("normalized {} relationship(s)", result.changes.len()),
                "system/relationship_normalizer",
                vec![EventChange {
                    field: "relationships".into(),
                    operation: "normalize".into(),
                    value: serde_json::json!(counts_by_type),
                    old_value: None,
                }],
                None,
            )?;
        }

        Ok(result)
    }

    /// Normalizes every entity in the store, calling `progress` after each
    /// one with `(processed, total)`.
    pub fn normalize_all(
        &self,
        dry_run: bool,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<BatchNormalizationResult> {
        let ids = self.store.list()?;
        let total = ids.len();
        let mut result = BatchNormalizationResult {
            total_entities: total,
            ..Default::default()
        };

        for id in ids {
            match self.normalize_entity(&id, dry_run) {
                Ok(entity_result) => {
                    result.entities_processed += 1;
                    if !entity_result.is_noop() {
                        result.entities_modified += 1;
                        result.relationships_normalized += entity_result.changes.len();
                        result.duplicates_removed += entity_result.duplicates_removed;
                    }
                    for orphan in entity_result.orphans_found {
                        result.orphan_targets.push((entity_result.entity_id.clone(), orphan));
                    }
                }
                Err(e) => {
                    result.entities_processed += 1;
                    result.errors.push((id, e.to_string()));
                }
            }
            progress(result.entities_processed, total);
        }

        tracing::info!(
            modified = result.entities_modified,
            orphans = result.orphan_targets.len(),
            "normalization pass complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, EntityType, Relationship, Status};
    use indexmap::IndexMap;

    fn sample_entity(id: &str, name: &str, relationships: Vec<Relationship>) -> Entity {
        let now = chrono::Utc::now();
        Entity {
            schema_version: 2,
            id: id.to_string(),
            entity_type: EntityType::Project,
            version: 1,
            created: now,
            updated: now,
            name: name.to_string(),
            aliases: vec![],
            status: Status::Active,
            confidence: 1.0,
            valid_from: None,
            valid_to: None,
            relationships,
            events: vec![],
            orphan_reason: None,
            extra: IndexMap::new(),
        }
    }

    fn rel(rel_type: &str, target: &str) -> Relationship {
        Relationship {
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            since: None,
            last_verified: None,
            confidence: 1.0,
            source: None,
            strength: None,
        }
    }

    #[test]
    fn test_normalize_rewrites_alias_target_to_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let mut alice = sample_entity("entity/person/alice", "Alice", vec![]);
        alice.aliases = vec!["ally".to_string()];
        store.write("entity/person/alice", &alice, "").unwrap();

        let checkout = sample_entity(
            "entity/project/checkout",
            "Checkout",
            vec![rel("owns", "ally")],
        );
        store.write("entity/project/checkout", &checkout, "").unwrap();

        let resolver = CanonicalResolver::build(&store).unwrap();
        let normalizer = RelationshipNormalizer::new(&store, &resolver);
        let result = normalizer.normalize_entity("entity/project/checkout", false).unwrap();

        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].new_target, "entity/person/alice");

        let file = store.read("entity/project/checkout").unwrap();
        assert_eq!(file.header.relationships[0].target, "entity/person/alice");
        assert_eq!(file.header.events.len(), 1);
        assert_eq!(file.header.version, 2);

        let value = &file.header.events[0].changes[0].value;
        assert_eq!(value, &serde_json::json!({"owns": 1}));
    }

    #[test]
    fn test_normalize_deduplicates_same_type_and_target() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let alice = sample_entity("entity/person/alice", "Alice", vec![]);
        store.write("entity/person/alice", &alice, "").unwrap();

        let checkout = sample_entity(
            "entity/project/checkout",
            "Checkout",
            vec![
                rel("owns", "entity/person/alice"),
                rel("owns", "entity/person/alice"),
            ],
        );
        store.write("entity/project/checkout", &checkout, "").unwrap();

        let resolver = CanonicalResolver::build(&store).unwrap();
        let normalizer = RelationshipNormalizer::new(&store, &resolver);
        let result = normalizer.normalize_entity("entity/project/checkout", false).unwrap();

        assert_eq!(result.duplicates_removed, 1);
        let file = store.read("entity/project/checkout").unwrap();
        assert_eq!(file.header.relationships.len(), 1);
    }

    #[test]
    fn test_unresolvable_target_becomes_orphan_and_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let checkout = sample_entity(
            "entity/project/checkout",
            "Checkout",
            vec![rel("depends_on", "entity/project/ghost")],
        );
        store.write("entity/project/checkout", &checkout, "").unwrap();

        let resolver = CanonicalResolver::build(&store).unwrap();
        let normalizer = RelationshipNormalizer::new(&store, &resolver);
        let result = normalizer.normalize_entity("entity/project/checkout", true).unwrap();

        assert_eq!(result.orphans_found, vec!["entity/project/ghost".to_string()]);
        let file = store.read("entity/project/checkout").unwrap();
        assert_eq!(file.header.relationships.len(), 1, "dry run must not remove orphan edge");
    }

    #[test]
    fn test_dry_run_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let alice = sample_entity("entity/person/alice", "Alice", vec![]);
        store.write("entity/person/alice", &alice, "").unwrap();

        let checkout = sample_entity(
            "entity/project/checkout",
            "Checkout",
            vec![rel("owns", "entity/person/alice")],
        );
        store.write("entity/project/checkout", &checkout, "").unwrap();

        let resolver = CanonicalResolver::build(&store).unwrap();
        let normalizer = RelationshipNormalizer::new(&store, &resolver);
        normalizer.normalize_entity("entity/project/checkout", true).unwrap();

        let file = store.read("entity/project/checkout").unwrap();
        assert_eq!(file.header.version, 1, "dry run must not bump version");
    }
}
