//! Assembles the whole-graph roll-up: counts by type/status, orphan
//! distribution, top stale relationships, recently updated entities.
//!
//! Distinct from brain-core's inverted content index (`brain_core::index`):
//! this walks the already-materialized entity store and registry to build a
//! summary for humans, not a search structure for queries.

use anyhow::{Context, Result};
use brain_core::decay::DecayMonitor;
use brain_core::reports::{OrphanAnalyzer, StaleEntityDetector};
use brain_core::store::EntityStore;
use brain_core::EntityType;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub struct TopStaleRelationship {
    pub entity_id: String,
    pub relationship_type: String,
    pub target: String,
    pub decayed_confidence: f64,
    pub days_stale: i64,
}

pub struct RecentEntity {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub name: String,
    pub updated: DateTime<Utc>,
}

pub struct IndexReport {
    pub generated_at: DateTime<Utc>,
    pub total_entities: usize,
    pub by_type: HashMap<String, usize>,
    pub by_status: HashMap<String, usize>,
    pub total_orphans: usize,
    pub orphans_by_reason: HashMap<String, usize>,
    pub total_stale_entities: usize,
    pub stale_by_action: HashMap<String, usize>,
    pub top_stale_relationships: Vec<TopStaleRelationship>,
    pub recently_updated: Vec<RecentEntity>,
}

const TOP_STALE_LIMIT: usize = 10;
const RECENT_LIMIT: usize = 10;

pub fn generate(store: &EntityStore, decay_rate: f64, confidence_floor: f64) -> Result<IndexReport> {
    let mut by_type: HashMap<String, usize> = HashMap::new();
    let mut by_status: HashMap<String, usize> = HashMap::new();
    let mut recent: Vec<RecentEntity> = Vec::new();
    let mut total_entities = 0usize;

    for id in store.list().context("failed to list entities")? {
        let Ok(file) = store.read(&id) else { continue };
        let entity = &file.header;
        total_entities += 1;
        *by_type.entry(entity.entity_type.to_string()).or_insert(0) += 1;
        *by_status.entry(entity.status.as_str().to_string()).or_insert(0) += 1;
        recent.push(RecentEntity {
            entity_id: id,
            entity_type: entity.entity_type,
            name: entity.name.clone(),
            updated: entity.updated,
        });
    }
    recent.sort_by(|a, b| b.updated.cmp(&a.updated));
    recent.truncate(RECENT_LIMIT);

    let orphans = OrphanAnalyzer::new(store).analyze(None).context("failed to analyze orphans")?;

    let stale_entities = StaleEntityDetector::new(store)
        .detect(None, None, None)
        .context("failed to detect stale entities")?;
    let stale_summary = StaleEntityDetector::new(store).summarize(&stale_entities);

    let decay = DecayMonitor::new(store, decay_rate, confidence_floor, HashMap::new());
    let decay_report = decay.scan(None, None).context("failed to scan relationship decay")?;
    let mut top_stale_relationships: Vec<TopStaleRelationship> = decay_report
        .stale_list
        .iter()
        .map(|r| TopStaleRelationship {
            entity_id: r.entity_id.clone(),
            relationship_type: r.relationship_type.clone(),
            target: r.target.clone(),
            decayed_confidence: r.decayed_confidence,
            days_stale: r.days_stale,
        })
        .collect();
    top_stale_relationships.sort_by(|a, b| b.days_stale.cmp(&a.days_stale));
    top_stale_relationships.truncate(TOP_STALE_LIMIT);

    Ok(IndexReport {
        generated_at: Utc::now(),
        total_entities,
        by_type,
        by_status,
        total_orphans: orphans.total_orphans,
        orphans_by_reason: orphans.orphans_by_reason,
        total_stale_entities: stale_summary.total_stale,
        stale_by_action: stale_summary.by_action,
        top_stale_relationships,
        recently_updated: recent,
    })
}
