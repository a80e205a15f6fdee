//! Schema migrator and validator.
//!
//! Detection, validation, and v1 → v2 migration operate on raw YAML rather
//! than the strict [`crate::types::Entity`] struct, since a v1 file or a
//! malformed v2 file must be diagnosable rather than simply rejected.

use crate::error::Result;
use crate::events::EventStore;
use crate::store::EntityStore;
use crate::types::{EntityType, EventChange, EventType};
use chrono::Utc;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

const V2_REQUIRED_FIELDS: &[&str] = &[
    "schema_version",
    "id",
    "type",
    "version",
    "created",
    "updated",
    "name",
];

/// Directory-name -> entity type fallback for v1 trees that predate the
/// `entity/<type>/<slug>` canonical layout, mirroring
/// `canonical_resolver.py::TYPE_FROM_DIR` (singular and plural spellings),
/// narrowed to our closed `EntityType` set.
const TYPE_FROM_DIR: &[(&str, EntityType)] = &[
    ("people", EntityType::Person),
    ("persons", EntityType::Person),
    ("person", EntityType::Person),
    ("teams", EntityType::Team),
    ("team", EntityType::Team),
    ("squads", EntityType::Squad),
    ("squad", EntityType::Squad),
    ("domains", EntityType::Domain),
    ("domain", EntityType::Domain),
    ("systems", EntityType::System),
    ("system", EntityType::System),
    ("brands", EntityType::Brand),
    ("brand", EntityType::Brand),
    ("experiments", EntityType::Experiment),
    ("experiment", EntityType::Experiment),
    ("projects", EntityType::Project),
    ("project", EntityType::Project),
];

/// Detected schema generation of an entity file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1,
    V2,
    Unknown,
}

/// Severity of a [`ValidationIssue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub path: PathBuf,
    pub schema_version: SchemaVersion,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn parse_raw(content: &str) -> Option<(Value, String)> {
    let rest = content.strip_prefix("---")?;
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let end = rest.find("\n---")?;
    let yaml = &rest[..end];
    let body = rest[end + 4..].strip_prefix('\n').unwrap_or(&rest[end + 4..]);
    let value: Value = serde_yaml::from_str(yaml).ok()?;
    Some((value, body.to_string()))
}

fn detect_version(value: &Value) -> SchemaVersion {
    let has = |key: &str| value.get(key).is_some();
    if has("schema_version") && has("id") {
        SchemaVersion::V2
    } else {
        SchemaVersion::Unknown
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(str::to_string)
}

/// Walks every path component looking for a directory name in
/// [`TYPE_FROM_DIR`], the way `_infer_canonical_id` walks `entity_path.parts`.
fn infer_type_from_path(path: &Path) -> Option<EntityType> {
    path.components().find_map(|c| {
        let name = c.as_os_str().to_str()?.to_lowercase();
        TYPE_FROM_DIR
            .iter()
            .find(|(dir, _)| *dir == name)
            .map(|(_, t)| *t)
    })
}

fn is_valid_timestamp(value: &Value) -> bool {
    match value.as_str() {
        Some(s) => is_rfc3339(s),
        None => false,
    }
}

fn is_rfc3339(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(&s.replace('Z', "+00:00")).is_ok()
}

/// Validates entity files against the v1/v2 schema rules.
pub struct Validator;

impl Validator {
    pub fn validate_file(path: &Path) -> ValidationResult {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                return ValidationResult {
                    path: path.to_path_buf(),
                    schema_version: SchemaVersion::Unknown,
                    errors: vec![ValidationIssue {
                        field: "file".into(),
                        message: format!("cannot read file: {}", e),
                        severity: Severity::Error,
                    }],
                    warnings: vec![],
                    entity_type: None,
                    entity_id: None,
                }
            }
        };

        let Some((value, body)) = parse_raw(&content) else {
            let schema_version = if content.starts_with("---") {
                SchemaVersion::V1
            } else {
                SchemaVersion::Unknown
            };
            return ValidationResult {
                path: path.to_path_buf(),
                schema_version,
                errors: vec![ValidationIssue {
                    field: "frontmatter".into(),
                    message: "no valid frontmatter found".into(),
                    severity: Severity::Error,
                }],
                warnings: vec![],
                entity_type: None,
                entity_id: None,
            };
        };

        match detect_version(&value) {
            SchemaVersion::V2 => Self::validate_v2(path, &value, &body),
            _ => Self::validate_v1(path, &value, &body),
        }
    }

    fn validate_v2(path: &Path, value: &Value, body: &str) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for field in V2_REQUIRED_FIELDS {
            if value.get(*field).is_none() {
                errors.push(ValidationIssue {
                    field: field.to_string(),
                    message: format!("required field '{}' is missing", field),
                    severity: Severity::Error,
                });
            }
        }

        let entity_type = str_field(value, "type");
        if let Some(t) = &entity_type {
            if t.parse::<EntityType>().is_err() {
                errors.push(ValidationIssue {
                    field: "type".into(),
                    message: format!("invalid entity type: {}", t),
                    severity: Severity::Error,
                });
            }
        }

        if let Some(version) = value.get("version") {
            if version.as_u64().is_none() {
                errors.push(ValidationIssue {
                    field: "version".into(),
                    message: "version must be a non-negative integer".into(),
                    severity: Severity::Error,
                });
            }
        }

        if let Some(confidence) = value.get("confidence") {
            match confidence.as_f64() {
                Some(c) if !(0.0..=1.0).contains(&c) => errors.push(ValidationIssue {
                    field: "confidence".into(),
                    message: format!("confidence must be between 0 and 1, got {}", c),
                    severity: Severity::Error,
                }),
                None => errors.push(ValidationIssue {
                    field: "confidence".into(),
                    message: "confidence must be a number".into(),
                    severity: Severity::Error,
                }),
                _ => {}
            }
        }

        match value.get("relationships") {
            Some(Value::Sequence(items)) => {
                for (i, rel) in items.iter().enumerate() {
                    if !matches!(rel, Value::Mapping(_)) {
                        errors.push(ValidationIssue {
                            field: format!("relationships[{}]", i),
                            message: "each relationship must be an object".into(),
                            severity: Severity::Error,
                        });
                        continue;
                    }
                    let has_type = rel.get("type").is_some();
                    let has_target = rel.get("target").is_some();
                    if !has_type || !has_target {
                        errors.push(ValidationIssue {
                            field: format!("relationships[{}]", i),
                            message: "relationship must have 'type' and 'target'".into(),
                            severity: Severity::Error,
                        });
                    }
                }
            }
            Some(_) => errors.push(ValidationIssue {
                field: "relationships".into(),
                message: "relationships must be a list".into(),
                severity: Severity::Error,
            }),
            None => {}
        }

        if let Some(events) = value.get("events") {
            if !matches!(events, Value::Sequence(_)) {
                errors.push(ValidationIssue {
                    field: "events".into(),
                    message: "events must be a list".into(),
                    severity: Severity::Error,
                });
            }
        }

        for field in ["created", "updated"] {
            if let Some(v) = value.get(field) {
                if !is_valid_timestamp(v) {
                    errors.push(ValidationIssue {
                        field: field.to_string(),
                        message: format!("invalid timestamp format: {:?}", v),
                        severity: Severity::Error,
                    });
                }
            }
        }

        if value.get("description").is_none() {
            warnings.push(ValidationIssue {
                field: "description".into(),
                message: "entity has no description".into(),
                severity: Severity::Warning,
            });
        }
        if value.get("tags").is_none() {
            warnings.push(ValidationIssue {
                field: "tags".into(),
                message: "entity has no tags".into(),
                severity: Severity::Warning,
            });
        }
        if body.trim().is_empty() {
            warnings.push(ValidationIssue {
                field: "body".into(),
                message: "entity has no body content".into(),
                severity: Severity::Warning,
            });
        }

        ValidationResult {
            path: path.to_path_buf(),
            schema_version: SchemaVersion::V2,
            errors,
            warnings,
            entity_type,
            entity_id: str_field(value, "id"),
        }
    }

    fn validate_v1(path: &Path, value: &Value, _body: &str) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if matches!(value, Value::Null) {
            errors.push(ValidationIssue {
                field: "frontmatter".into(),
                message: "entity has no frontmatter".into(),
                severity: Severity::Error,
            });
        }

        if str_field(value, "type").is_none() && str_field(value, "name").is_none() {
            warnings.push(ValidationIssue {
                field: "type".into(),
                message: "entity missing 'type' or 'name' field".into(),
                severity: Severity::Warning,
            });
        }

        warnings.push(ValidationIssue {
            field: "schema_version".into(),
            message: "entity is v1 format - consider migration to v2".into(),
            severity: Severity::Info,
        });

        ValidationResult {
            path: path.to_path_buf(),
            schema_version: SchemaVersion::V1,
            errors,
            warnings,
            entity_type: str_field(value, "type"),
            entity_id: None,
        }
    }

    /// Validates every `.md` file reachable through `store`.
    pub fn validate_all(store: &EntityStore) -> Result<Vec<ValidationResult>> {
        let mut results = Vec::new();
        for id in store.list()? {
            results.push(Self::validate_file(&store.path_for_id(&id)));
        }
        Ok(results)
    }
}

/// Aggregate status across the whole store, for the `status` CLI subcommand.
#[derive(Debug, Clone, Default)]
pub struct MigrationStatus {
    pub total: usize,
    pub v1_count: usize,
    pub v2_count: usize,
    pub unknown_count: usize,
}

/// Outcome of a migration run.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub migrated: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub backup_path: Option<PathBuf>,
}

/// Drives v1 → v2 migration and rollback.
pub struct Migrator<'a> {
    store: &'a EntityStore,
}

impl<'a> Migrator<'a> {
    pub fn new(store: &'a EntityStore) -> Self {
        Self { store }
    }

    pub fn status(&self) -> Result<MigrationStatus> {
        let mut status = MigrationStatus::default();
        for id in self.store.list()? {
            status.total += 1;
            let result = Validator::validate_file(&self.store.path_for_id(&id));
            match result.schema_version {
                SchemaVersion::V1 => status.v1_count += 1,
                SchemaVersion::V2 => status.v2_count += 1,
                SchemaVersion::Unknown => status.unknown_count += 1,
            }
        }
        Ok(status)
    }

    /// Runs migration over every v1 entity. Unless `skip_backup`, copies the
    /// whole store to a timestamped backup directory first so `rollback` can
    /// restore it. `force` re-migrates entities already at v2 that fail
    /// validation (rare; normally a no-op).
    pub fn migrate(&self, dry_run: bool, skip_backup: bool, force: bool) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();

        if !dry_run && !skip_backup {
            report.backup_path = Some(self.backup()?);
        }

        for id in self.store.list()? {
            let path = self.store.path_for_id(&id);
            let validation = Validator::validate_file(&path);

            let needs_migration = matches!(validation.schema_version, SchemaVersion::V1)
                || (force && matches!(validation.schema_version, SchemaVersion::Unknown));

            if !needs_migration {
                report.skipped.push(id);
                continue;
            }

            if dry_run {
                tracing::info!(entity_id = %id, "would migrate v1 -> v2");
                report.migrated.push(id);
                continue;
            }

            match self.migrate_one(&id, &path) {
                Ok(()) => report.migrated.push(id),
                Err(e) => report.failed.push((id, e.to_string())),
            }
        }

        tracing::info!(
            migrated = report.migrated.len(),
            failed = report.failed.len(),
            "migration pass complete"
        );
        Ok(report)
    }

    fn migrate_one(&self, id: &str, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        let (value, body) = parse_raw(&content).unwrap_or((Value::Null, content.clone()));

        let name = str_field(&value, "name")
            .or_else(|| str_field(&value, "title"))
            .unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| id.to_string())
            });

        let entity_type = str_field(&value, "type")
            .and_then(|t| t.parse::<EntityType>().ok())
            .or_else(|| infer_type_from_path(path))
            .unwrap_or(EntityType::Project);

        let now = Utc::now();
        let header = crate::types::Entity {
            schema_version: 2,
            id: id.to_string(),
            entity_type,
            version: 1,
            created: now,
            updated: now,
            name,
            aliases: Vec::new(),
            status: crate::types::Status::Active,
            confidence: 0.5,
            valid_from: None,
            valid_to: None,
            relationships: Vec::new(),
            events: Vec::new(),
            orphan_reason: Some(crate::types::OrphanReason::PendingEnrichment),
            extra: indexmap::IndexMap::new(),
        };

        self.store.write_path(path, &header, &body)?;

        let events = EventStore::new(self.store);
        events.append(
            id,
            EventType::Migration,
            "migrated from v1 to v2",
            "system/migrator",
            vec![EventChange {
                field: "schema_version".into(),
                operation: "set".into(),
                value: serde_json::json!(2),
                old_value: None,
            }],
            None,
        )?;

        Ok(())
    }

    fn backup(&self) -> Result<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let backup_dir = self.store.root().join(".backups").join(timestamp);
        copy_dir_recursive(self.store.root(), &backup_dir)?;
        tracing::info!(backup = %backup_dir.display(), "created pre-migration backup");
        Ok(backup_dir)
    }

    /// Restores the store from a prior backup directory, overwriting current
    /// entity files.
    pub fn rollback(&self, backup_path: &Path) -> Result<()> {
        copy_dir_recursive(backup_path, self.store.root())?;
        tracing::warn!(backup = %backup_path.display(), "rolled back migration from backup");
        Ok(())
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            if from.file_name().and_then(|n| n.to_str()) == Some(".backups") {
                continue;
            }
            copy_dir_recursive(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}
