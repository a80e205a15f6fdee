//! Core domain types for the brain entity graph.
//!
//! These types describe the canonical data model: typed entities with
//! append-only event logs, relationships resolved to canonical ids, and the
//! denormalized records (registry, content index) that make lookup fast.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Entity** | A typed record with a canonical id and an event log |
//! | **Relationship** | A directed, typed edge from one entity to another's canonical id |
//! | **Event** | One recorded change to an entity's fields or relationships |
//! | **Registry** | A denormalized per-entity summary used for O(1) lookup |
//! | **Alias** | Any alternative reference (name variant, handle, path) for an entity |

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The closed set of entity types (v2 schema).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Team,
    Squad,
    Project,
    Domain,
    Experiment,
    System,
    Brand,
}

impl EntityType {
    /// All variants, in declaration order, for validation and closed-set checks.
    pub const ALL: [EntityType; 8] = [
        EntityType::Person,
        EntityType::Team,
        EntityType::Squad,
        EntityType::Project,
        EntityType::Domain,
        EntityType::Experiment,
        EntityType::System,
        EntityType::Brand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Team => "team",
            EntityType::Squad => "squad",
            EntityType::Project => "project",
            EntityType::Domain => "domain",
            EntityType::Experiment => "experiment",
            EntityType::System => "system",
            EntityType::Brand => "brand",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(EntityType::Person),
            "team" => Ok(EntityType::Team),
            "squad" => Ok(EntityType::Squad),
            "project" => Ok(EntityType::Project),
            "domain" => Ok(EntityType::Domain),
            "experiment" => Ok(EntityType::Experiment),
            "system" => Ok(EntityType::System),
            "brand" => Ok(EntityType::Brand),
            other => Err(format!("unknown entity type: {}", other)),
        }
    }
}

/// Lifecycle tag. `Other` preserves any value the closed set doesn't name,
/// since spec.md lists this as an open-ended "lifecycle tag" rather than a
/// closed set (unlike `EntityType`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Active,
    Archived,
    Deprecated,
    Other(String),
}

impl Serialize for Status {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "active" => Status::Active,
            "archived" => Status::Archived,
            "deprecated" => Status::Deprecated,
            _ => Status::Other(s),
        })
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Active
    }
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Active => "active",
            Status::Archived => "archived",
            Status::Deprecated => "deprecated",
            Status::Other(s) => s,
        }
    }

    /// Whether this status is a terminal state for the stale-entity detector.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Archived | Status::Deprecated)
    }
}

/// Why an entity currently has no relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanReason {
    PendingEnrichment,
    NoExternalData,
    Standalone,
    EnrichmentFailed,
}

impl OrphanReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrphanReason::PendingEnrichment => "pending_enrichment",
            OrphanReason::NoExternalData => "no_external_data",
            OrphanReason::Standalone => "standalone",
            OrphanReason::EnrichmentFailed => "enrichment_failed",
        }
    }
}

impl std::fmt::Display for OrphanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, typed edge to another entity's canonical id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified: Option<DateTime<Utc>>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Relative decay weight for graph expansion (`query::graph`); `None`
    /// falls back to the query engine's default of 0.5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
}

impl Relationship {
    /// The timestamp decay calculations anchor on: `last_verified`, falling
    /// back to `since`.
    pub fn decay_reference(&self) -> Option<DateTime<Utc>> {
        self.last_verified.or(self.since)
    }

    /// Identity for duplicate detection: same type + target after
    /// normalization.
    pub fn dedup_key(&self) -> (String, String) {
        (self.rel_type.clone(), self.target.clone())
    }
}

fn default_confidence() -> f64 {
    1.0
}

/// One field-level change within an [`Event`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventChange {
    pub field: String,
    pub operation: String,
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<serde_json::Value>,
}

/// One recorded change to an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub actor: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<EventChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// The kind of change an [`Event`] records. `Other` preserves any value not
/// in the set spec.md names explicitly, since new event sources can mint
/// new types without a schema bump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    FieldUpdate,
    ResearchDiscovery,
    Normalization,
    Migration,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::FieldUpdate => "field_update",
            EventType::ResearchDiscovery => "research_discovery",
            EventType::Normalization => "normalization",
            EventType::Migration => "migration",
            EventType::Other(s) => s,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "field_update" => EventType::FieldUpdate,
            "research_discovery" => EventType::ResearchDiscovery,
            "normalization" => EventType::Normalization,
            "migration" => EventType::Migration,
            _ => EventType::Other(s),
        })
    }
}

/// The on-disk entity header. Serialized as the structured block at the top
/// of an entity file; `IndexMap` preserves declared key order end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub schema_version: u32,
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub version: u64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphan_reason: Option<OrphanReason>,
    /// Fields present in the header that this schema version doesn't name.
    /// Preserved verbatim across read-write cycles per spec.md §6.
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl Entity {
    /// Whether `relationships` is non-empty; an entity in this state must
    /// not carry `orphan_reason` (invariant 6).
    pub fn has_relationships(&self) -> bool {
        !self.relationships.is_empty()
    }

    /// Slug portion of `entity/<type>/<slug>`.
    pub fn slug(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }
}

/// A parsed entity file: header plus free-form body text used only for
/// content indexing.
#[derive(Debug, Clone)]
pub struct EntityFile {
    pub header: Entity,
    pub body: String,
}

/// A denormalized per-entity summary, stored in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(rename = "ref")]
    pub path: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub status: Status,
    pub version: u64,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    pub relationships_count: usize,
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_roundtrip() {
        for t in EntityType::ALL {
            let s = t.as_str();
            let parsed: EntityType = s.parse().unwrap();
            assert_eq!(parsed, t);
        }
    }

    #[test]
    fn test_entity_type_rejects_unknown() {
        assert!("widget".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_status_default_is_active() {
        assert_eq!(Status::default(), Status::Active);
    }

    #[test]
    fn test_status_terminal() {
        assert!(Status::Archived.is_terminal());
        assert!(Status::Deprecated.is_terminal());
        assert!(!Status::Active.is_terminal());
    }

    #[test]
    fn test_relationship_dedup_key() {
        let a = Relationship {
            rel_type: "reports_to".into(),
            target: "entity/person/alice".into(),
            since: None,
            last_verified: None,
            confidence: 1.0,
            source: None,
            strength: None,
        };
        let b = Relationship {
            rel_type: "reports_to".into(),
            target: "entity/person/alice".into(),
            since: None,
            last_verified: None,
            confidence: 0.5,
            source: Some("manual".into()),
            strength: None,
        };
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_entity_slug() {
        let e = make_entity("entity/person/alice-smith");
        assert_eq!(e.slug(), "alice-smith");
    }

    #[test]
    fn test_has_relationships() {
        let mut e = make_entity("entity/team/payments");
        assert!(!e.has_relationships());
        e.relationships.push(Relationship {
            rel_type: "owns".into(),
            target: "entity/project/checkout".into(),
            since: None,
            last_verified: None,
            confidence: 1.0,
            source: None,
            strength: None,
        });
        assert!(e.has_relationships());
    }

    fn make_entity(id: &str) -> Entity {
        let now = Utc::now();
        Entity {
            schema_version: 2,
            id: id.to_string(),
            entity_type: EntityType::Person,
            version: 1,
            created: now,
            updated: now,
            name: "Test".to_string(),
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
}
