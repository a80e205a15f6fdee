//! On-disk entity store: one file per entity, a YAML header block followed
//! by a free-form body used only for content indexing.
//!
//! Entity files live at `<root>/<id>.md` where `id` has the shape
//! `entity/<type>/<slug>`, so `entity/person/alice` is stored at
//! `<root>/entity/person/alice.md`. Reserved top-level artifacts
//! (`.snapshots`, `registry.json`, `index.json`, `.enrichment_checkpoint.*`,
//! `.brainrc`, `README*`) are never treated as entities.

use crate::atomic::write_atomic;
use crate::error::{Error, Result};
use crate::types::{Entity, EntityFile};
use std::path::{Path, PathBuf};

const HEADER_DELIMITER: &str = "---";

/// Reserved top-level names that enumeration must skip.
const RESERVED: &[&str] = &[
    ".snapshots",
    ".git",
    "registry.json",
    "index.json",
    "schema",
];

fn is_reserved(path: &Path, root: &Path) -> bool {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components().any(|c| {
        let s = c.as_os_str().to_string_lossy();
        s.starts_with('.') || RESERVED.contains(&s.as_ref())
    })
}

/// File-backed store for entities under a brain root directory.
pub struct EntityStore {
    root: PathBuf,
}

impl EntityStore {
    /// Opens a store rooted at `root`. Does not require the directory to
    /// already exist; it is created lazily on first write.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self { root: root.into() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the canonical id → file path mapping for every entity file
    /// found under the root, skipping reserved non-entity paths.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let pattern = format!("{}/**/*.md", self.root.display());
        let mut ids = Vec::new();

        for entry in glob::glob(&pattern).map_err(|e| Error::Malformed {
            what: "glob pattern".into(),
            message: e.to_string(),
        })? {
            let path = entry.map_err(|e| Error::Io(e.into()))?;
            if is_reserved(&path, &self.root) {
                continue;
            }
            if let Some(id) = self.id_for_path(&path) {
                ids.push(id);
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Whether an entity file exists for `id`.
    pub fn exists(&self, id: &str) -> bool {
        self.path_for_id(id).is_file()
    }

    /// Reads and parses the entity file for `id`.
    pub fn read(&self, id: &str) -> Result<EntityFile> {
        let path = self.path_for_id(id);
        self.read_path(&path)
    }

    /// Reads and parses an entity file at an explicit path (used by the
    /// registry builder and migrator, which walk paths directly).
    pub fn read_path(&self, path: &Path) -> Result<EntityFile> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;

        parse_entity_file(&content).map_err(|message| Error::Malformed {
            what: path.display().to_string(),
            message,
        })
    }

    /// Writes an entity's header and body as a whole-file rewrite.
    pub fn write(&self, id: &str, header: &Entity, body: &str) -> Result<()> {
        let path = self.path_for_id(id);
        self.write_path(&path, header, body)
    }

    /// Writes an entity file at an explicit path (used by the migrator,
    /// which may relocate files during a v1 → v2 rewrite).
    pub fn write_path(&self, path: &Path, header: &Entity, body: &str) -> Result<()> {
        let rendered = render_entity_file(header, body)?;
        write_atomic(path, rendered.as_bytes())?;
        tracing::debug!(
            entity_id = %header.id,
            version = header.version,
            path = %path.display(),
            "wrote entity"
        );
        Ok(())
    }

    /// Maps a canonical id to its on-disk path.
    pub fn path_for_id(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.md", id))
    }

    fn id_for_path(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let without_ext = rel.with_extension("");
        Some(without_ext.to_string_lossy().replace('\\', "/"))
    }
}

/// Parses a `---\n<yaml>\n---\n<body>` entity file.
pub fn parse_entity_file(content: &str) -> std::result::Result<EntityFile, String> {
    let rest = content
        .strip_prefix(HEADER_DELIMITER)
        .ok_or_else(|| "missing header delimiter".to_string())?;
    let rest = rest.strip_prefix('\n').unwrap_or(rest);

    let end = rest
        .find(&format!("\n{}", HEADER_DELIMITER))
        .ok_or_else(|| "unterminated header".to_string())?;

    let yaml = &rest[..end];
    let after = &rest[end + 1 + HEADER_DELIMITER.len()..];
    let body = after.strip_prefix('\n').unwrap_or(after);

    let header: Entity =
        serde_yaml::from_str(yaml).map_err(|e| format!("invalid header: {}", e))?;

    Ok(EntityFile {
        header,
        body: body.to_string(),
    })
}

/// Renders an entity header + body back into file form.
pub fn render_entity_file(header: &Entity, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(header)?;
    Ok(format!("{HEADER_DELIMITER}\n{yaml}{HEADER_DELIMITER}\n{body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityType, Status};
    use chrono::Utc;
    use indexmap::IndexMap;

    fn sample_entity(id: &str) -> Entity {
        let now = Utc::now();
        Entity {
            schema_version: 2,
            id: id.to_string(),
            entity_type: EntityType::Person,
            version: 1,
            created: now,
            updated: now,
            name: "Alice".to_string(),
            aliases: vec!["ally".to_string()],
            status: Status::Active,
            confidence: 0.9,
            valid_from: None,
            valid_to: None,
            relationships: vec![],
            events: vec![],
            orphan_reason: None,
            extra: IndexMap::new(),
        }
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let entity = sample_entity("entity/person/alice");

        store.write("entity/person/alice", &entity, "Alice's notes.").unwrap();
        let read_back = store.read("entity/person/alice").unwrap();

        assert_eq!(read_back.header.id, "entity/person/alice");
        assert_eq!(read_back.header.name, "Alice");
        assert_eq!(read_back.body, "Alice's notes.");
    }

    #[test]
    fn test_list_skips_reserved_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store
            .write("entity/person/alice", &sample_entity("entity/person/alice"), "")
            .unwrap();

        std::fs::create_dir_all(dir.path().join(".snapshots")).unwrap();
        std::fs::write(dir.path().join(".snapshots/junk.md"), "not an entity").unwrap();

        let ids = store.list().unwrap();
        assert_eq!(ids, vec!["entity/person/alice".to_string()]);
    }

    #[test]
    fn test_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        assert!(!store.exists("entity/person/alice"));
        store
            .write("entity/person/alice", &sample_entity("entity/person/alice"), "")
            .unwrap();
        assert!(store.exists("entity/person/alice"));
    }

    #[test]
    fn test_read_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let err = store.read("entity/person/ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_malformed_header_is_an_error_not_a_partial_parse() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let path = dir.path().join("entity/person/broken.md");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not a header at all").unwrap();

        let err = store.read_path(&path).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }
}
