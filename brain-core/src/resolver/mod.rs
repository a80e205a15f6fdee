//! Canonical reference resolver.
//!
//! Builds an in-memory `ref_lower -> canonical_id` map covering every way an
//! entity can be referred to (its id, slug, file path, file stem, aliases,
//! display name), then resolves any reference against that map plus a fixed
//! set of normalization variants. Persisted to a cache file with a 24-hour
//! TTL so repeated CLI invocations don't rebuild it from scratch.

use crate::atomic::write_atomic;
use crate::error::Result;
use crate::store::EntityStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const CACHE_FILE_NAME: &str = "resolver_cache.json";
const CACHE_MAX_AGE_HOURS: i64 = 24;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheData {
    built_at: Option<DateTime<Utc>>,
    index: HashMap<String, String>,
    reverse_index: HashMap<String, Vec<String>>,
}

/// Resolves any human-written reference to a canonical entity id.
pub struct CanonicalResolver {
    root: std::path::PathBuf,
    index: HashMap<String, String>,
    reverse_index: HashMap<String, HashSet<String>>,
}

/// Aggregate counts returned by [`CanonicalResolver::stats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverStats {
    pub total_entities: usize,
    pub total_references: usize,
    pub avg_refs_per_entity: usize,
}

impl CanonicalResolver {
    /// Builds the index fresh from the store, ignoring any cache.
    pub fn build(store: &EntityStore) -> Result<Self> {
        let mut index = HashMap::new();
        let mut reverse_index: HashMap<String, HashSet<String>> = HashMap::new();

        for id in store.list()? {
            let file = match store.read(&id) {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(entity_id = %id, error = %e, "skipping unreadable entity during resolver build");
                    continue;
                }
            };

            let refs = all_refs(&id, &file.header);
            let entry = reverse_index.entry(id.clone()).or_default();
            for r in refs {
                let lower = r.to_lowercase();
                if !lower.is_empty() {
                    index.insert(lower, id.clone());
                    entry.insert(r);
                }
            }
        }

        tracing::info!(entities = reverse_index.len(), references = index.len(), "resolver index built");

        Ok(Self {
            root: store.root().to_path_buf(),
            index,
            reverse_index,
        })
    }

    /// Builds from cache if present and fresh, otherwise rebuilds from the
    /// store and persists a fresh cache. Cache corruption is treated as a
    /// miss: rebuild silently rather than surfacing an error.
    pub fn open(store: &EntityStore) -> Result<Self> {
        if let Some(cached) = Self::load_cache(store.root()) {
            return Ok(Self {
                root: store.root().to_path_buf(),
                index: cached.index,
                reverse_index: cached
                    .reverse_index
                    .into_iter()
                    .map(|(k, v)| (k, v.into_iter().collect()))
                    .collect(),
            });
        }

        let resolver = Self::build(store)?;
        resolver.save_cache()?;
        Ok(resolver)
    }

    fn cache_path(root: &std::path::Path) -> std::path::PathBuf {
        root.join(CACHE_FILE_NAME)
    }

    fn load_cache(root: &std::path::Path) -> Option<CacheData> {
        let content = std::fs::read_to_string(Self::cache_path(root)).ok()?;
        let data: CacheData = serde_json::from_str(&content).ok()?;
        let built_at = data.built_at?;
        let age_hours = (Utc::now() - built_at).num_minutes() as f64 / 60.0;
        if age_hours > CACHE_MAX_AGE_HOURS as f64 {
            return None;
        }
        Some(data)
    }

    fn save_cache(&self) -> Result<()> {
        let data = CacheData {
            built_at: Some(Utc::now()),
            index: self.index.clone(),
            reverse_index: self
                .reverse_index
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&data)?;
        write_atomic(&Self::cache_path(&self.root), &json)
    }

    /// Forces a rebuild, bypassing and overwriting the cache.
    pub fn rebuild(store: &EntityStore) -> Result<Self> {
        let resolver = Self::build(store)?;
        resolver.save_cache()?;
        Ok(resolver)
    }

    /// Resolves `reference` to a canonical id, case-insensitively, trying a
    /// fixed set of normalization variants when the exact lowercase form
    /// doesn't hit.
    pub fn resolve(&self, reference: &str) -> Option<String> {
        if reference.is_empty() {
            return None;
        }

        let ref_lower = reference.trim().to_lowercase();
        if let Some(id) = self.index.get(&ref_lower) {
            return Some(id.clone());
        }

        let mut variations = vec![
            ref_lower.replace('_', "-"),
            ref_lower.replace('-', "_"),
            ref_lower.replace(' ', "-"),
            ref_lower.replace(' ', "_"),
            strip_non_slug_chars(&ref_lower),
        ];

        if reference.contains('/') {
            if let Some((without_ext, _)) = reference.rsplit_once('.') {
                variations.push(without_ext.to_lowercase());
            }
            if let Some(filename) = reference.rsplit('/').next() {
                variations.push(filename.to_lowercase());
                if let Some((stem, _)) = filename.rsplit_once('.') {
                    variations.push(stem.to_lowercase());
                }
            }
        }

        variations.into_iter().find_map(|v| self.index.get(&v).cloned())
    }

    /// Resolves, reporting whether the reference is currently unresolvable
    /// (an orphan).
    pub fn resolve_or_flag(&self, reference: &str) -> (Option<String>, bool) {
        let resolved = self.resolve(reference);
        let is_orphan = resolved.is_none();
        (resolved, is_orphan)
    }

    /// All known reference strings for a canonical id.
    pub fn all_references(&self, canonical_id: &str) -> Vec<String> {
        self.reverse_index
            .get(canonical_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Approximate matches for `reference`, scored and sorted descending.
    /// Reporting-only: never used for implicit resolution.
    pub fn find_similar(&self, reference: &str, max_results: usize) -> Vec<(String, f64)> {
        let ref_lower = reference.trim().to_lowercase();
        let mut best: HashMap<String, f64> = HashMap::new();

        for (indexed_ref, canonical_id) in &self.index {
            let score = similarity_score(&ref_lower, indexed_ref);
            if score > 0.5 {
                let entry = best.entry(canonical_id.clone()).or_insert(0.0);
                if score > *entry {
                    *entry = score;
                }
            }
        }

        let mut results: Vec<(String, f64)> = best.into_iter().collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(max_results);
        results
    }

    pub fn stats(&self) -> ResolverStats {
        let total_entities = self.reverse_index.len();
        let total_references = self.index.len();
        ResolverStats {
            total_entities,
            total_references,
            avg_refs_per_entity: if total_entities == 0 {
                0
            } else {
                total_references / total_entities
            },
        }
    }
}

fn strip_non_slug_chars(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '-').collect()
}

/// Enumerates every reference format for an entity: id, slug, aliases, name.
/// Path/stem variants are the caller's responsibility to add where a
/// filesystem path is available (the resolver only ever sees parsed
/// headers, so it works from `id` rather than a `Path`).
fn all_refs(id: &str, header: &crate::types::Entity) -> Vec<String> {
    let mut refs = vec![id.to_string()];

    if let Some(slug) = id.rsplit('/').next() {
        refs.push(slug.to_string());
        refs.push(slug.replace('-', "_"));
        refs.push(slug.replace('-', " "));
    }

    refs.push(header.name.clone());
    for alias in &header.aliases {
        refs.push(alias.clone());
    }

    let mut seen = HashSet::new();
    refs.retain(|r| {
        let lower = r.to_lowercase();
        !lower.is_empty() && seen.insert(lower)
    });

    refs
}

/// Ported from `canonical_resolver.py::_similarity_score`.
fn similarity_score(s1: &str, s2: &str) -> f64 {
    if s1 == s2 {
        return 1.0;
    }

    if s2.contains(s1) || s1.contains(s2) {
        return 0.8;
    }

    let common_len = s1
        .chars()
        .zip(s2.chars())
        .take_while(|(a, b)| a == b)
        .count();

    if common_len > 3 {
        let max_len = s1.chars().count().max(s2.chars().count()) as f64;
        return 0.6 + (common_len as f64 / max_len) * 0.3;
    }

    let words1: HashSet<&str> = s1.split('-').collect();
    let words2: HashSet<&str> = s2.split('-').collect();
    if !words1.is_empty() && !words2.is_empty() {
        let overlap = words1.intersection(&words2).count();
        let denom = words1.len().max(words2.len()) as f64;
        if overlap > 0 {
            return 0.5 + (overlap as f64 / denom) * 0.3;
        }
    }

    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, EntityType, Status};
    use chrono::Utc;
    use indexmap::IndexMap;

    fn sample_entity(id: &str, name: &str, aliases: Vec<&str>) -> Entity {
        let now = Utc::now();
        Entity {
            schema_version: 2,
            id: id.to_string(),
            entity_type: EntityType::Person,
            version: 1,
            created: now,
            updated: now,
            name: name.to_string(),
            aliases: aliases.into_iter().map(String::from).collect(),
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
    fn test_resolve_by_slug_and_alias() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store
            .write(
                "entity/person/jane-smith",
                &sample_entity("entity/person/jane-smith", "Jane Smith", vec!["JS", "jane"]),
                "",
            )
            .unwrap();

        let resolver = CanonicalResolver::build(&store).unwrap();

        assert_eq!(
            resolver.resolve("jane-smith"),
            Some("entity/person/jane-smith".to_string())
        );
        assert_eq!(
            resolver.resolve("JS"),
            Some("entity/person/jane-smith".to_string())
        );
        assert_eq!(
            resolver.resolve("jane_smith"),
            Some("entity/person/jane-smith".to_string())
        );
    }

    #[test]
    fn test_resolve_unknown_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let resolver = CanonicalResolver::build(&store).unwrap();
        assert_eq!(resolver.resolve("nobody"), None);
    }

    #[test]
    fn test_similarity_score_exact_substring_prefix() {
        assert_eq!(similarity_score("abc", "abc"), 1.0);
        assert_eq!(similarity_score("abc", "abcdef"), 0.8);
        assert!(similarity_score("jane-smi", "jane-smith") > 0.6);
        assert_eq!(similarity_score("zzz", "qqq"), 0.0);
    }

    #[test]
    fn test_find_similar_excludes_low_scores() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store
            .write(
                "entity/person/jane-smith",
                &sample_entity("entity/person/jane-smith", "Jane Smith", vec![]),
                "",
            )
            .unwrap();
        let resolver = CanonicalResolver::build(&store).unwrap();

        let results = resolver.find_similar("jane-smithe", 5);
        assert!(results.iter().any(|(id, _)| id == "entity/person/jane-smith"));

        let results = resolver.find_similar("completely-unrelated-zzz", 5);
        assert!(results.is_empty());
    }

    #[test]
    fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store
            .write(
                "entity/person/jane-smith",
                &sample_entity("entity/person/jane-smith", "Jane Smith", vec!["JS"]),
                "",
            )
            .unwrap();
        let resolver = CanonicalResolver::build(&store).unwrap();
        let stats = resolver.stats();
        assert_eq!(stats.total_entities, 1);
        assert!(stats.total_references >= 2);
    }
}
