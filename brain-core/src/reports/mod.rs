//! Read-only reporters over the store: extraction hints, orphan analysis,
//! and stale-entity detection. None of these mutate entities except the
//! orphan analyzer's explicit `mark_*`/`clear_connected` operations, each of
//! which logs a `field_update` event.
//!
//! Ported from `extraction_hints.py`, `orphan_analyzer.py`, and
//! `stale_entity_detector.py`.

use crate::error::Result;
use crate::events::EventStore;
use crate::store::EntityStore;
use crate::types::{EntityType, EventChange, EventType, OrphanReason, Status};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

// ---------------------------------------------------------------------
// Extraction hints
// ---------------------------------------------------------------------

/// Priority label attached to a missing-field hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(type, field) -> [source, priority]`, mirroring the static mapping an
/// enrichment planner uses to decide which source to run for a given gap.
fn field_sources(entity_type: EntityType, field: &str) -> Option<(&'static [&'static str], Priority)> {
    use EntityType::*;
    use Priority::*;
    let table: &[(&str, Priority, &[&str])] = match entity_type {
        Person => &[
            ("email", Medium, &["hr_system", "chat:user_lookup", "document_store:directory"]),
            ("manager", High, &["hr_system", "document_store:org_chart"]),
            ("team", High, &["hr_system", "issue_tracker:project_membership"]),
            ("role", High, &["hr_system", "document_store:org_chart"]),
            ("relationships", High, &["issue_tracker:project_membership", "code_host:pr_reviewers", "chat:channel_members"]),
        ],
        Team => &[
            ("owner", High, &["hr_system", "document_store:team_page", "issue_tracker:project_lead"]),
            ("members", High, &["hr_system", "chat:channel_members"]),
            ("mission", Medium, &["document_store:team_charter"]),
            ("relationships", High, &["issue_tracker:related_projects"]),
        ],
        Squad => &[
            ("owner", High, &["hr_system", "document_store:squad_page"]),
            ("members", High, &["hr_system", "chat:channel_members"]),
            ("tech_stack", Medium, &["code_host:repo_languages"]),
            ("relationships", High, &["issue_tracker:related_projects", "code_host:repo_dependencies"]),
        ],
        Project => &[
            ("owner", High, &["issue_tracker:project_lead", "document_store:project_page"]),
            ("team", High, &["issue_tracker:project_membership"]),
            ("status", High, &["issue_tracker:project_status"]),
            ("target_date", Medium, &["issue_tracker:versions", "document_store:roadmap"]),
            ("relationships", Medium, &["issue_tracker:linked_projects"]),
        ],
        Domain => &[
            ("owner", High, &["document_store:domain_page"]),
            ("systems", Medium, &["document_store:architecture_docs", "code_host:repo_topics"]),
            ("relationships", Medium, &["document_store:domain_page", "code_host:repo_dependencies"]),
        ],
        Experiment => &[
            ("owner", High, &["issue_tracker:assignee"]),
            ("hypothesis", High, &["document_store:experiment_plan"]),
            ("status", High, &["issue_tracker:status"]),
            ("results", High, &["document_store:experiment_results"]),
        ],
        System => &[
            ("owner", High, &["code_host:repo_owner"]),
            ("tech_stack", Medium, &["code_host:repo_languages"]),
            ("dependencies", High, &["code_host:package_manifest"]),
            ("relationships", High, &["code_host:repo_dependencies"]),
        ],
        Brand => &[
            ("owner", High, &["document_store:brand_page"]),
            ("market", Medium, &["document_store:market_analysis"]),
            ("status", Medium, &["issue_tracker:brand_project_status"]),
        ],
    };
    table.iter().find(|(f, _, _)| *f == field).map(|(_, p, s)| (*s, *p))
}

/// Field names each entity type is expected to carry, beyond `$relationships`.
fn expected_fields(entity_type: EntityType) -> &'static [&'static str] {
    use EntityType::*;
    match entity_type {
        Person => &["email", "manager", "team", "role"],
        Team => &["owner", "members", "mission"],
        Squad => &["owner", "members", "tech_stack"],
        Project => &["owner", "team", "status", "target_date"],
        Domain => &["owner", "systems"],
        Experiment => &["owner", "hypothesis", "status", "results"],
        System => &["owner", "tech_stack", "dependencies"],
        Brand => &["owner", "market", "status"],
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionHint {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub field: String,
    pub priority: Priority,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionHintsReport {
    pub total_entities: usize,
    pub entities_with_gaps: usize,
    pub total_hints: usize,
    pub high_priority_hints: usize,
    pub hints_by_source: HashMap<String, usize>,
    pub hints_by_field: HashMap<String, usize>,
    pub hints: Vec<ExtractionHint>,
}

pub struct ExtractionHintsGenerator<'a> {
    store: &'a EntityStore,
}

impl<'a> ExtractionHintsGenerator<'a> {
    pub fn new(store: &'a EntityStore) -> Self {
        Self { store }
    }

    /// Generates hints, optionally restricted to one entity type or priority.
    pub fn generate(&self, type_filter: Option<EntityType>, priority_filter: Option<Priority>) -> Result<ExtractionHintsReport> {
        let mut report = ExtractionHintsReport::default();

        for id in self.store.list()? {
            let Ok(file) = self.store.read(&id) else { continue };
            let entity = &file.header;
            if let Some(t) = type_filter {
                if entity.entity_type != t {
                    continue;
                }
            }
            report.total_entities += 1;

            let mut entity_hints = Vec::new();
            for field in expected_fields(entity.entity_type) {
                if entity.extra.get(*field).is_some_and(|v| !is_empty_value(v)) {
                    continue;
                }
                let Some((sources, priority)) = field_sources(entity.entity_type, field) else { continue };
                if let Some(wanted) = priority_filter {
                    if wanted.rank() != priority.rank() {
                        continue;
                    }
                }
                entity_hints.push(ExtractionHint {
                    entity_id: id.clone(),
                    entity_type: entity.entity_type,
                    field: field.to_string(),
                    priority,
                    sources: sources.iter().map(|s| s.to_string()).collect(),
                });
            }

            if !entity.has_relationships() {
                if let Some((sources, priority)) = field_sources(entity.entity_type, "relationships") {
                    if priority_filter.map_or(true, |w| w.rank() == priority.rank()) {
                        entity_hints.push(ExtractionHint {
                            entity_id: id.clone(),
                            entity_type: entity.entity_type,
                            field: "relationships".to_string(),
                            priority,
                            sources: sources.iter().map(|s| s.to_string()).collect(),
                        });
                    }
                }
            }

            if !entity_hints.is_empty() {
                report.entities_with_gaps += 1;
                for hint in &entity_hints {
                    for source in &hint.sources {
                        let key = source.split(':').next().unwrap_or(source).to_string();
                        *report.hints_by_source.entry(key).or_insert(0) += 1;
                    }
                    *report.hints_by_field.entry(hint.field.clone()).or_insert(0) += 1;
                    if hint.priority == Priority::High {
                        report.high_priority_hints += 1;
                    }
                }
                report.hints.extend(entity_hints);
            }
        }

        report.hints.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then_with(|| a.entity_type.as_str().cmp(b.entity_type.as_str()))
                .then_with(|| a.field.cmp(&b.field))
        });
        report.total_hints = report.hints.len();

        Ok(report)
    }

    /// Hints relevant to one enrichment source, e.g. `"issue_tracker"`.
    pub fn for_source(&self, source: &str, limit: usize) -> Result<Vec<ExtractionHint>> {
        let report = self.generate(None, None)?;
        Ok(report
            .hints
            .into_iter()
            .filter(|h| h.sources.iter().any(|s| s.starts_with(source)))
            .take(limit)
            .collect())
    }
}

fn is_empty_value(v: &serde_json::Value) -> bool {
    match v {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

// ---------------------------------------------------------------------
// Orphan analyzer
// ---------------------------------------------------------------------

/// Entity types that are legitimately standalone by default; callers may
/// pass a different set to `mark_standalone`.
pub const DEFAULT_STANDALONE_TYPES: &[EntityType] = &[EntityType::Domain, EntityType::Brand];

#[derive(Debug, Clone)]
pub struct OrphanDetail {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub name: String,
    pub reason: Option<OrphanReason>,
}

#[derive(Debug, Clone, Default)]
pub struct OrphanAnalysis {
    pub total_entities: usize,
    pub total_orphans: usize,
    pub orphans_by_type: HashMap<String, usize>,
    pub orphans_by_reason: HashMap<String, usize>,
    pub orphan_details: Vec<OrphanDetail>,
}

pub struct OrphanAnalyzer<'a> {
    store: &'a EntityStore,
}

impl<'a> OrphanAnalyzer<'a> {
    pub fn new(store: &'a EntityStore) -> Self {
        Self { store }
    }

    pub fn analyze(&self, type_filter: Option<EntityType>) -> Result<OrphanAnalysis> {
        let mut analysis = OrphanAnalysis::default();

        for id in self.store.list()? {
            let Ok(file) = self.store.read(&id) else { continue };
            let entity = &file.header;
            if let Some(t) = type_filter {
                if entity.entity_type != t {
                    continue;
                }
            }
            analysis.total_entities += 1;

            if entity.has_relationships() {
                continue;
            }
            analysis.total_orphans += 1;
            *analysis.orphans_by_type.entry(entity.entity_type.to_string()).or_insert(0) += 1;
            let reason_key = entity.orphan_reason.map(|r| r.to_string()).unwrap_or_else(|| "untracked".to_string());
            *analysis.orphans_by_reason.entry(reason_key).or_insert(0) += 1;

            analysis.orphan_details.push(OrphanDetail {
                entity_id: id,
                entity_type: entity.entity_type,
                name: entity.name.clone(),
                reason: entity.orphan_reason,
            });
        }

        Ok(analysis)
    }

    /// Marks every orphan lacking a reason as `pending_enrichment`.
    pub fn mark_pending(&self, dry_run: bool) -> Result<usize> {
        self.mark_where(dry_run, OrphanReason::PendingEnrichment, |entity| {
            !entity.has_relationships() && entity.orphan_reason.is_none()
        })
    }

    /// Marks orphans of `types` (default [`DEFAULT_STANDALONE_TYPES`]) as `standalone`.
    pub fn mark_standalone(&self, types: Option<&[EntityType]>, dry_run: bool) -> Result<usize> {
        let types = types.unwrap_or(DEFAULT_STANDALONE_TYPES);
        self.mark_where(dry_run, OrphanReason::Standalone, |entity| {
            !entity.has_relationships() && types.contains(&entity.entity_type)
        })
    }

    /// Marks specific entities (named by id) as `no_external_data`, called
    /// after an enrichment pass over them finds nothing.
    pub fn mark_no_external_data(&self, entity_ids: &[String], dry_run: bool) -> Result<usize> {
        let ids: std::collections::HashSet<&str> = entity_ids.iter().map(|s| s.as_str()).collect();
        let mut updated = 0;
        for id in self.store.list()? {
            if !ids.contains(id.as_str()) {
                continue;
            }
            let mut file = self.store.read(&id)?;
            if file.header.has_relationships() {
                continue;
            }
            file.header.orphan_reason = Some(OrphanReason::NoExternalData);
            updated += self.persist_reason_change(&id, &mut file, dry_run, OrphanReason::NoExternalData.to_string(), None)?;
        }
        Ok(updated)
    }

    /// Clears `orphan_reason` for entities that now have relationships.
    pub fn clear_connected(&self, dry_run: bool) -> Result<usize> {
        let mut updated = 0;
        for id in self.store.list()? {
            let mut file = self.store.read(&id)?;
            if !file.header.has_relationships() || file.header.orphan_reason.is_none() {
                continue;
            }
            let old = file.header.orphan_reason.take().unwrap();
            if !dry_run {
                self.store.write(&id, &file.header, &file.body)?;
                let events = EventStore::new(self.store);
                events.append(
                    &id,
                    EventType::FieldUpdate,
                    "cleared orphan reason (now connected)",
                    "system/orphan_analyzer",
                    vec![EventChange {
                        field: "orphan_reason".into(),
                        operation: "clear".into(),
                        value: serde_json::Value::Null,
                        old_value: Some(serde_json::json!(old.to_string())),
                    }],
                    None,
                )?;
            }
            updated += 1;
        }
        Ok(updated)
    }

    fn mark_where(&self, dry_run: bool, reason: OrphanReason, predicate: impl Fn(&crate::types::Entity) -> bool) -> Result<usize> {
        let mut updated = 0;
        for id in self.store.list()? {
            let mut file = self.store.read(&id)?;
            if !predicate(&file.header) {
                continue;
            }
            file.header.orphan_reason = Some(reason);
            updated += self.persist_reason_change(&id, &mut file, dry_run, reason.to_string(), None)?;
        }
        Ok(updated)
    }

    fn persist_reason_change(
        &self,
        id: &str,
        file: &mut crate::types::EntityFile,
        dry_run: bool,
        new_value: String,
        old_value: Option<String>,
    ) -> Result<usize> {
        if dry_run {
            return Ok(1);
        }
        self.store.write(id, &file.header, &file.body)?;
        let events = EventStore::new(self.store);
        events.append(
            id,
            EventType::FieldUpdate,
            &format!("marked orphan reason: {new_value}"),
            "system/orphan_analyzer",
            vec![EventChange {
                field: "orphan_reason".into(),
                operation: "set".into(),
                value: serde_json::json!(new_value),
                old_value: old_value.map(|v| serde_json::json!(v)),
            }],
            None,
        )?;
        Ok(1)
    }
}

// ---------------------------------------------------------------------
// Stale-entity detector
// ---------------------------------------------------------------------

fn staleness_threshold_days(entity_type: EntityType) -> i64 {
    match entity_type {
        EntityType::Person => 90,
        EntityType::Team | EntityType::Squad => 60,
        EntityType::Project => 30,
        EntityType::Experiment => 14,
        EntityType::Domain | EntityType::Brand => 180,
        EntityType::System => 90,
    }
}

#[derive(Debug, Clone)]
pub struct StaleEntity {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub days_stale: i64,
    pub reasons: Vec<String>,
    pub recommended_action: String,
}

#[derive(Debug, Clone, Default)]
pub struct StaleSummary {
    pub total_stale: usize,
    pub average_days_stale: i64,
    pub by_type: HashMap<String, usize>,
    pub by_action: HashMap<String, usize>,
    pub oldest: Option<String>,
    pub oldest_days: i64,
}

pub struct StaleEntityDetector<'a> {
    store: &'a EntityStore,
}

impl<'a> StaleEntityDetector<'a> {
    pub fn new(store: &'a EntityStore) -> Self {
        Self { store }
    }

    /// Detects stale entities as of `as_of` (default now), sorted by
    /// `days_stale` descending. An explicit `threshold_override` replaces
    /// every type's default threshold.
    pub fn detect(&self, as_of: Option<DateTime<Utc>>, type_filter: Option<EntityType>, threshold_override: Option<i64>) -> Result<Vec<StaleEntity>> {
        let now = as_of.unwrap_or_else(Utc::now);
        let mut stale = Vec::new();

        for id in self.store.list()? {
            let Ok(file) = self.store.read(&id) else { continue };
            let entity = &file.header;
            if let Some(t) = type_filter {
                if entity.entity_type != t {
                    continue;
                }
            }

            let threshold = threshold_override.unwrap_or_else(|| staleness_threshold_days(entity.entity_type));
            let days_stale = (now - entity.updated).num_days();

            let mut reasons = Vec::new();
            let mut action = "review".to_string();

            if days_stale > threshold {
                reasons.push(format!("not updated in {days_stale} days (threshold: {threshold})"));
                action = "update".to_string();
            }
            if entity.status.is_terminal() {
                reasons.push(format!("status is '{}'", entity.status.as_str()));
                action = "archive_or_remove".to_string();
            }
            if let Some(valid_to) = entity.valid_to {
                if valid_to < now {
                    reasons.push("validity period has ended".to_string());
                    action = "archive_or_remove".to_string();
                }
            }
            if entity.events.is_empty() && days_stale > 30 {
                reasons.push("no change events recorded".to_string());
            }
            if entity.confidence < 0.3 {
                reasons.push(format!("very low confidence ({})", entity.confidence));
            }

            if reasons.is_empty() {
                continue;
            }
            stale.push(StaleEntity {
                entity_id: id,
                entity_type: entity.entity_type,
                days_stale,
                reasons,
                recommended_action: action,
            });
        }

        stale.sort_by(|a, b| b.days_stale.cmp(&a.days_stale));
        Ok(stale)
    }

    pub fn summarize(&self, stale: &[StaleEntity]) -> StaleSummary {
        if stale.is_empty() {
            return StaleSummary::default();
        }
        let mut by_type = HashMap::new();
        let mut by_action = HashMap::new();
        let mut total_days = 0i64;
        for entity in stale {
            *by_type.entry(entity.entity_type.to_string()).or_insert(0) += 1;
            *by_action.entry(entity.recommended_action.clone()).or_insert(0) += 1;
            total_days += entity.days_stale;
        }
        StaleSummary {
            total_stale: stale.len(),
            average_days_stale: total_days / stale.len() as i64,
            by_type,
            by_action,
            oldest: stale.first().map(|e| e.entity_id.clone()),
            oldest_days: stale.first().map(|e| e.days_stale).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, Relationship};
    use indexmap::IndexMap;

    fn entity(id: &str, entity_type: EntityType, status: Status, updated: DateTime<Utc>, relationships: Vec<Relationship>) -> Entity {
        Entity {
            schema_version: 2,
            id: id.to_string(),
            entity_type,
            version: 1,
            created: updated,
            updated,
            name: "Name".to_string(),
            aliases: vec![],
            status,
            confidence: 1.0,
            valid_from: None,
            valid_to: None,
            relationships,
            events: vec![],
            orphan_reason: None,
            extra: IndexMap::new(),
        }
    }

    #[test]
    fn test_extraction_hints_flags_missing_owner_and_relationships() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/project/checkout", &entity("entity/project/checkout", EntityType::Project, Status::Active, Utc::now(), vec![]), "").unwrap();

        let generator = ExtractionHintsGenerator::new(&store);
        let report = generator.generate(None, None).unwrap();

        assert_eq!(report.entities_with_gaps, 1);
        assert!(report.hints.iter().any(|h| h.field == "owner"));
        assert!(report.hints.iter().any(|h| h.field == "relationships"));
        assert!(report.high_priority_hints > 0);
    }

    #[test]
    fn test_orphan_analyzer_mark_pending_logs_event() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/project/checkout", &entity("entity/project/checkout", EntityType::Project, Status::Active, Utc::now(), vec![]), "").unwrap();

        let analyzer = OrphanAnalyzer::new(&store);
        let updated = analyzer.mark_pending(false).unwrap();
        assert_eq!(updated, 1);

        let file = store.read("entity/project/checkout").unwrap();
        assert_eq!(file.header.orphan_reason, Some(OrphanReason::PendingEnrichment));
        assert_eq!(file.header.events.len(), 1);
        assert_eq!(file.header.version, 2);
    }

    #[test]
    fn test_orphan_analyzer_clear_connected() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let mut e = entity("entity/project/checkout", EntityType::Project, Status::Active, Utc::now(), vec![]);
        e.orphan_reason = Some(OrphanReason::PendingEnrichment);
        e.relationships = vec![Relationship {
            rel_type: "owns".to_string(),
            target: "entity/person/alice".to_string(),
            since: None,
            last_verified: None,
            confidence: 1.0,
            source: None,
            strength: None,
        }];
        store.write("entity/project/checkout", &e, "").unwrap();

        let analyzer = OrphanAnalyzer::new(&store);
        let updated = analyzer.clear_connected(false).unwrap();
        assert_eq!(updated, 1);

        let file = store.read("entity/project/checkout").unwrap();
        assert_eq!(file.header.orphan_reason, None);
    }

    #[test]
    fn test_stale_detector_flags_old_and_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let old = Utc::now() - chrono::Duration::days(200);
        store.write("entity/project/stale-one", &entity("entity/project/stale-one", EntityType::Project, Status::Archived, old, vec![]), "").unwrap();
        store.write("entity/project/fresh-one", &entity("entity/project/fresh-one", EntityType::Project, Status::Active, Utc::now(), vec![]), "").unwrap();

        let detector = StaleEntityDetector::new(&store);
        let stale = detector.detect(None, None, None).unwrap();

        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].entity_id, "entity/project/stale-one");
        assert_eq!(stale[0].recommended_action, "archive_or_remove");

        let summary = detector.summarize(&stale);
        assert_eq!(summary.total_stale, 1);
        assert_eq!(summary.oldest.as_deref(), Some("entity/project/stale-one"));
    }

    #[test]
    fn test_stale_detector_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let old = Utc::now() - chrono::Duration::days(200);
        store.write("entity/project/stale-one", &entity("entity/project/stale-one", EntityType::Project, Status::Active, old, vec![]), "").unwrap();

        let detector = StaleEntityDetector::new(&store);
        detector.detect(None, None, None).unwrap();

        let file = store.read("entity/project/stale-one").unwrap();
        assert_eq!(file.header.version, 1);
    }
}
