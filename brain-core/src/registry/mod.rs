//! Registry builder: a denormalized, O(1)-lookup summary of every entity,
//! rebuilt by walking the entity store.

use crate::atomic::write_atomic;
use crate::error::{Error, Result};
use crate::store::EntityStore;
use crate::types::{EntityType, RegistryEntry, Status};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const REGISTRY_FILE_NAME: &str = "registry.json";
const SCHEMA: &str = "brain://registry/v2";
const VERSION: &str = "2.0";

/// The on-disk registry document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    pub schema: String,
    pub version: String,
    pub generated: DateTime<Utc>,
    pub entities: IndexMap<String, RegistryEntry>,
    pub alias_index: IndexMap<String, String>,
    pub stats: HashMap<String, serde_json::Value>,
}

impl Registry {
    fn path(root: &Path) -> std::path::PathBuf {
        root.join(REGISTRY_FILE_NAME)
    }

    /// Loads the registry from its default location under `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(Self::path(root)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound("registry.json".to_string())
            } else {
                Error::Io(e)
            }
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes the registry atomically to its default location under `root`.
    pub fn save(&self, root: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(&Self::path(root), &json)
    }

    /// Rebuilds the registry by walking `store`. When `incremental` is true
    /// and an existing registry is supplied, entries for entities whose
    /// files are unreadable during this pass are preserved from the prior
    /// snapshot rather than dropped.
    pub fn rebuild(store: &EntityStore, incremental: Option<&Registry>) -> Result<Self> {
        let mut entities = IndexMap::new();
        let mut alias_index = IndexMap::new();

        let mut total = 0usize;
        let mut by_type: HashMap<String, usize> = HashMap::new();
        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut v2_count = 0usize;

        for id in store.list()? {
            total += 1;
            let entry = match store.read(&id) {
                Ok(file) => {
                    if file.header.schema_version >= 2 {
                        v2_count += 1;
                    }
                    let entity_type = file.header.entity_type;
                    let status = file.header.status.clone();

                    for alias in &file.header.aliases {
                        alias_index.insert(alias.to_lowercase(), slug_of(&id));
                    }
                    alias_index.insert(file.header.name.to_lowercase(), slug_of(&id));

                    RegistryEntry {
                        path: format!("{}.md", id),
                        entity_type,
                        status,
                        version: file.header.version,
                        updated: file.header.updated,
                        aliases: file.header.aliases.clone(),
                        role: None,
                        team: None,
                        owner: None,
                        relationships_count: file.header.relationships.len(),
                        confidence: file.header.confidence,
                    }
                }
                Err(e) => {
                    tracing::warn!(entity_id = %id, error = %e, "fabricating reduced-confidence registry entry");
                    match incremental.and_then(|r| r.entities.get(&slug_of(&id))) {
                        Some(prior) => prior.clone(),
                        None => fabricate_entry(&id),
                    }
                }
            };

            *by_type.entry(entry.entity_type.to_string()).or_insert(0) += 1;
            *by_status.entry(entry.status.as_str().to_string()).or_insert(0) += 1;
            entities.insert(slug_of(&id), entry);
        }

        let mut stats = HashMap::new();
        stats.insert("total".to_string(), serde_json::json!(total));
        stats.insert("by_type".to_string(), serde_json::json!(by_type));
        stats.insert("by_status".to_string(), serde_json::json!(by_status));
        stats.insert("v2_format".to_string(), serde_json::json!(v2_count));

        tracing::info!(total, v2_count, "registry rebuilt");

        Ok(Self {
            schema: SCHEMA.to_string(),
            version: VERSION.to_string(),
            generated: Utc::now(),
            entities,
            alias_index,
            stats,
        })
    }
}

fn slug_of(id: &str) -> String {
    id.rsplit('/').next().unwrap_or(id).to_string()
}

fn fabricate_entry(id: &str) -> RegistryEntry {
    let entity_type = id
        .split('/')
        .nth(1)
        .and_then(|t| t.parse::<EntityType>().ok())
        .unwrap_or(EntityType::Project);

    RegistryEntry {
        path: format!("{}.md", id),
        entity_type,
        status: Status::Active,
        version: 0,
        updated: Utc::now(),
        aliases: Vec::new(),
        role: None,
        team: None,
        owner: None,
        relationships_count: 0,
        confidence: 0.1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, EntityType as ET};
    use indexmap::IndexMap as IM;

    fn sample_entity(id: &str) -> Entity {
        let now = Utc::now();
        Entity {
            schema_version: 2,
            id: id.to_string(),
            entity_type: ET::Team,
            version: 3,
            created: now,
            updated: now,
            name: "Payments".to_string(),
            aliases: vec!["pay-team".to_string()],
            status: Status::Active,
            confidence: 0.95,
            valid_from: None,
            valid_to: None,
            relationships: vec![],
            events: vec![],
            orphan_reason: None,
            extra: IM::new(),
        }
    }

    #[test]
    fn test_rebuild_populates_entities_and_alias_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/team/payments", &sample_entity("entity/team/payments"), "").unwrap();

        let registry = Registry::rebuild(&store, None).unwrap();
        assert_eq!(registry.entities.len(), 1);
        assert!(registry.entities.contains_key("payments"));
        assert_eq!(
            registry.alias_index.get("pay-team"),
            Some(&"payments".to_string())
        );
        assert_eq!(registry.stats["total"], serde_json::json!(1));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store.write("entity/team/payments", &sample_entity("entity/team/payments"), "").unwrap();
        let registry = Registry::rebuild(&store, None).unwrap();
        registry.save(dir.path()).unwrap();

        let loaded = Registry::load(dir.path()).unwrap();
        assert_eq!(loaded.schema, SCHEMA);
        assert_eq!(loaded.entities.len(), 1);
    }

    #[test]
    fn test_fabricates_entry_for_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let path = dir.path().join("entity/person/broken.md");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "no header here").unwrap();

        let registry = Registry::rebuild(&store, None).unwrap();
        let entry = registry.entities.get("broken").unwrap();
        assert_eq!(entry.confidence, 0.1);
        assert_eq!(entry.entity_type, ET::Person);
    }
}
