//! Relationship decay monitor: a read-only staleness report. Never mutates
//! entities; confidence decay is computed at read time, not persisted.
//!
//! TKS-derived temporal decay formula: `conf(t) = max(floor, base * (1 -
//! decay_rate * weeks_since_reference))`.

use crate::error::Result;
use crate::store::EntityStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Per-relationship-type staleness thresholds, in days. Types not listed
/// fall back to `"default"`.
pub fn staleness_threshold(rel_type: &str, overrides: &HashMap<String, u32>) -> u32 {
    if let Some(days) = overrides.get(rel_type) {
        return *days;
    }
    match rel_type {
        "reports_to" => 90,
        "manages" => 90,
        "member_of" => 60,
        "owns" => 60,
        "works_with" => 45,
        "collaborates_with" => 45,
        "depends_on" => 30,
        "blocks" => 14,
        "related_to" => 90,
        "similar_to" => 120,
        _ => overrides.get("default").copied().unwrap_or(90),
    }
}

/// A relationship flagged as stale.
#[derive(Debug, Clone)]
pub struct StaleRelationship {
    pub entity_id: String,
    pub entity_type: String,
    pub relationship_type: String,
    pub target: String,
    pub base_confidence: f64,
    pub decayed_confidence: f64,
    pub last_verified: Option<DateTime<Utc>>,
    pub days_stale: i64,
    pub source: Option<String>,
}

/// Summary report over every relationship in the store.
#[derive(Debug, Clone, Default)]
pub struct DecayReport {
    pub total_entities: usize,
    pub total_relationships: usize,
    pub stale_relationships: usize,
    pub avg_confidence: f64,
    pub avg_decayed_confidence: f64,
    pub stale_by_type: HashMap<String, usize>,
    pub stale_list: Vec<StaleRelationship>,
}

pub struct DecayMonitor<'a> {
    store: &'a EntityStore,
    decay_rate: f64,
    confidence_floor: f64,
    staleness_overrides: HashMap<String, u32>,
}

impl<'a> DecayMonitor<'a> {
    pub fn new(
        store: &'a EntityStore,
        decay_rate: f64,
        confidence_floor: f64,
        staleness_overrides: HashMap<String, u32>,
    ) -> Self {
        Self {
            store,
            decay_rate,
            confidence_floor,
            staleness_overrides,
        }
    }

    /// Computes decayed confidence for a single relationship as of `as_of`.
    /// With no reference date (`since`/`last_verified` both absent), applies
    /// a flat 30% penalty rather than treating it as maximally stale.
    pub fn compute_decay(
        &self,
        base_confidence: f64,
        reference: Option<DateTime<Utc>>,
        as_of: DateTime<Utc>,
    ) -> f64 {
        let Some(reference) = reference else {
            return self.confidence_floor.max(base_confidence * 0.7);
        };

        let days_stale = (as_of - reference).num_days();
        if days_stale <= 0 {
            return base_confidence;
        }

        let weeks_stale = days_stale as f64 / 7.0;
        let decayed = base_confidence * (1.0 - self.decay_rate * weeks_stale);
        decayed.max(self.confidence_floor).min(base_confidence)
    }

    /// Scans every relationship across the store, as of `as_of` (default:
    /// now), optionally overriding every type's threshold with a single
    /// `threshold_days`.
    pub fn scan(
        &self,
        as_of: Option<DateTime<Utc>>,
        threshold_days: Option<u32>,
    ) -> Result<DecayReport> {
        let check_date = as_of.unwrap_or_else(Utc::now);

        let mut total_entities = 0usize;
        let mut total_relationships = 0usize;
        let mut confidence_sum = 0.0;
        let mut decayed_sum = 0.0;
        let mut stale_by_type: HashMap<String, usize> = HashMap::new();
        let mut stale_list = Vec::new();

        for id in self.store.list()? {
            let Ok(file) = self.store.read(&id) else {
                continue;
            };
            if file.header.relationships.is_empty() {
                continue;
            }
            total_entities += 1;

            for rel in &file.header.relationships {
                total_relationships += 1;

                let reference = rel.decay_reference();
                let decayed = self.compute_decay(rel.confidence, reference, check_date);

                confidence_sum += rel.confidence;
                decayed_sum += decayed;

                let threshold = threshold_days
                    .unwrap_or_else(|| staleness_threshold(&rel.rel_type, &self.staleness_overrides));

                let days_stale = reference
                    .map(|r| (check_date - r).num_days())
                    .unwrap_or(999);

                if days_stale > threshold as i64 {
                    stale_list.push(StaleRelationship {
                        entity_id: id.clone(),
                        entity_type: file.header.entity_type.to_string(),
                        relationship_type: rel.rel_type.clone(),
                        target: rel.target.clone(),
                        base_confidence: rel.confidence,
                        decayed_confidence: (decayed * 1000.0).round() / 1000.0,
                        last_verified: rel.last_verified,
                        days_stale,
                        source: rel.source.clone(),
                    });
                    *stale_by_type.entry(rel.rel_type.clone()).or_insert(0) += 1;
                }
            }
        }

        stale_list.sort_by(|a, b| b.days_stale.cmp(&a.days_stale));

        let round3 = |v: f64| (v * 1000.0).round() / 1000.0;
        Ok(DecayReport {
            total_entities,
            total_relationships,
            stale_relationships: stale_list.len(),
            avg_confidence: if total_relationships > 0 {
                round3(confidence_sum / total_relationships as f64)
            } else {
                0.0
            },
            avg_decayed_confidence: if total_relationships > 0 {
                round3(decayed_sum / total_relationships as f64)
            } else {
                0.0
            },
            stale_by_type,
            stale_list,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, EntityType, Relationship, Status};
    use chrono::Duration;
    use indexmap::IndexMap;

    fn entity_with_rel(id: &str, rel: Relationship) -> Entity {
        let now = Utc::now();
        Entity {
            schema_version: 2,
            id: id.to_string(),
            entity_type: EntityType::Person,
            version: 1,
            created: now,
            updated: now,
            name: "Name".to_string(),
            aliases: vec![],
            status: Status::Active,
            confidence: 1.0,
            valid_from: None,
            valid_to: None,
            relationships: vec![rel],
            events: vec![],
            orphan_reason: None,
            extra: IndexMap::new(),
        }
    }

    #[test]
    fn test_staleness_threshold_known_and_default() {
        let overrides = HashMap::new();
        assert_eq!(staleness_threshold("blocks", &overrides), 14);
        assert_eq!(staleness_threshold("similar_to", &overrides), 120);
        assert_eq!(staleness_threshold("unlisted_type", &overrides), 90);
    }

    #[test]
    fn test_staleness_threshold_override_wins() {
        let mut overrides = HashMap::new();
        overrides.insert("blocks".to_string(), 7);
        assert_eq!(staleness_threshold("blocks", &overrides), 7);
    }

    #[test]
    fn test_compute_decay_no_reference_applies_flat_penalty() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let monitor = DecayMonitor::new(&store, 0.01, 0.3, HashMap::new());
        let decayed = monitor.compute_decay(1.0, None, Utc::now());
        assert_eq!(decayed, 0.7);
    }

    #[test]
    fn test_compute_decay_respects_floor() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let monitor = DecayMonitor::new(&store, 0.5, 0.3, HashMap::new());
        let old = Utc::now() - Duration::days(365);
        let decayed = monitor.compute_decay(1.0, Some(old), Utc::now());
        assert_eq!(decayed, 0.3);
    }

    #[test]
    fn test_scan_flags_stale_relationship() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();

        let stale_rel = Relationship {
            rel_type: "blocks".to_string(),
            target: "entity/project/other".to_string(),
            since: None,
            last_verified: Some(Utc::now() - Duration::days(30)),
            confidence: 0.9,
            source: None,
            strength: None,
        };
        store.write("entity/person/alice", &entity_with_rel("entity/person/alice", stale_rel), "").unwrap();

        let monitor = DecayMonitor::new(&store, 0.01, 0.3, HashMap::new());
        let report = monitor.scan(None, None).unwrap();

        assert_eq!(report.total_relationships, 1);
        assert_eq!(report.stale_relationships, 1);
        assert_eq!(report.stale_by_type.get("blocks"), Some(&1));
        assert_eq!(report.stale_list[0].entity_id, "entity/person/alice");
    }

    #[test]
    fn test_scan_does_not_mutate_entity() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let rel = Relationship {
            rel_type: "owns".to_string(),
            target: "entity/project/other".to_string(),
            since: None,
            last_verified: Some(Utc::now() - Duration::days(100)),
            confidence: 0.9,
            source: None,
            strength: None,
        };
        store.write("entity/person/alice", &entity_with_rel("entity/person/alice", rel), "").unwrap();

        let monitor = DecayMonitor::new(&store, 0.01, 0.3, HashMap::new());
        monitor.scan(None, None).unwrap();

        let file = store.read("entity/person/alice").unwrap();
        assert_eq!(file.header.version, 1, "scan must be read-only");
    }
}
