//! Snapshot manager: point-in-time, compressed dumps of the registry (and
//! optionally all entity headers), with retention cleanup.

use crate::atomic::write_atomic;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::store::EntityStore;
use chrono::{DateTime, NaiveDate, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const SNAPSHOTS_DIR: &str = ".snapshots";
const LATEST_POINTER: &str = "latest";

/// A single snapshot's contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_version: String,
    pub created: DateTime<Utc>,
    pub kind: SnapshotKind,
    pub registry: Option<Registry>,
    /// entity id -> raw header JSON, only populated when `kind` is `Full`.
    pub entities: Option<std::collections::HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Registry,
    Full,
}

/// Metadata about a snapshot file, for `list()`.
#[derive(Debug, Clone)]
pub struct SnapshotMeta {
    pub path: PathBuf,
    pub date: String,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: u64,
    pub compressed: bool,
}

pub struct SnapshotManager<'a> {
    root: &'a Path,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(root: &'a Path) -> Self {
        Self { root }
    }

    fn snapshots_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    /// Creates a snapshot. `include_entities` dumps every entity header
    /// alongside the registry; `compress` writes gzip (`.json.gz`) instead
    /// of plain `.json`.
    pub fn create(
        &self,
        store: &EntityStore,
        include_entities: bool,
        compress: bool,
    ) -> Result<PathBuf> {
        let now = Utc::now();
        let date_str = now.format("%Y-%m-%d").to_string();
        let time_str = now.format("%H%M%S").to_string();

        let dir = self.snapshots_dir().join(&date_str);
        std::fs::create_dir_all(&dir)?;

        let registry = Registry::load(self.root).ok();

        let entities = if include_entities {
            let mut map = std::collections::HashMap::new();
            for id in store.list()? {
                if let Ok(file) = store.read(&id) {
                    map.insert(id, serde_json::to_value(&file.header)?);
                }
            }
            Some(map)
        } else {
            None
        };

        let snapshot = Snapshot {
            snapshot_version: "1.0".to_string(),
            created: now,
            kind: if include_entities {
                SnapshotKind::Full
            } else {
                SnapshotKind::Registry
            },
            registry,
            entities,
        };

        let json = serde_json::to_vec(&snapshot)?;
        let file_name = format!("snapshot-{}", time_str);
        let path = if compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&json)?;
            let compressed = encoder.finish()?;
            let path = dir.join(format!("{}.json.gz", file_name));
            write_atomic(&path, &compressed)?;
            path
        } else {
            let path = dir.join(format!("{}.json", file_name));
            write_atomic(&path, &json)?;
            path
        };

        let latest = self.snapshots_dir().join(LATEST_POINTER);
        let relative = path
            .strip_prefix(self.snapshots_dir())
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();
        write_atomic(&latest, relative.as_bytes())?;

        tracing::info!(path = %path.display(), include_entities, compress, "created snapshot");
        Ok(path)
    }

    /// Returns the closest snapshot at or before `at`. `None` falls back to
    /// `latest`.
    pub fn get(&self, at: Option<DateTime<Utc>>) -> Result<Option<Snapshot>> {
        let Some(at) = at else {
            return self.get_latest();
        };

        let target_date = at.format("%Y-%m-%d").to_string();
        let dir = self.snapshots_dir();
        if !dir.exists() {
            return Ok(None);
        }

        let mut dates: Vec<String> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        dates.sort();
        dates.reverse();

        let chosen = dates.into_iter().find(|d| d.as_str() <= target_date.as_str());
        let Some(chosen) = chosen else {
            return Ok(None);
        };

        self.latest_in_dir(&dir.join(chosen))
    }

    fn get_latest(&self) -> Result<Option<Snapshot>> {
        let latest = self.snapshots_dir().join(LATEST_POINTER);
        if !latest.is_file() {
            return Ok(None);
        }
        let relative = std::fs::read_to_string(&latest)?;
        let path = self.snapshots_dir().join(relative.trim());
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(self.load_snapshot(&path)?))
    }

    fn latest_in_dir(&self, dir: &Path) -> Result<Option<Snapshot>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("snapshot-"))
            })
            .collect();
        files.sort();
        match files.pop() {
            Some(path) => Ok(Some(self.load_snapshot(&path)?)),
            None => Ok(None),
        }
    }

    fn load_snapshot(&self, path: &Path) -> Result<Snapshot> {
        let bytes = std::fs::read(path)?;
        let json = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            let mut decoder = GzDecoder::new(&bytes[..]);
            let mut out = String::new();
            decoder.read_to_string(&mut out)?;
            out
        } else {
            String::from_utf8(bytes).map_err(|e| Error::Malformed {
                what: path.display().to_string(),
                message: e.to_string(),
            })?
        };
        Ok(serde_json::from_str(&json)?)
    }

    /// Lists available snapshots with basic file metadata.
    pub fn list(&self) -> Result<Vec<SnapshotMeta>> {
        let dir = self.snapshots_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut result = Vec::new();
        let mut date_dirs: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir() && p.file_name().and_then(|n| n.to_str()) != Some(LATEST_POINTER))
            .collect();
        date_dirs.sort();

        for date_dir in date_dirs {
            let date_name = date_dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            if NaiveDate::parse_from_str(&date_name, "%Y-%m-%d").is_err() {
                continue;
            }

            let mut files: Vec<PathBuf> = std::fs::read_dir(&date_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with("snapshot-"))
                })
                .collect();
            files.sort();

            for path in files {
                let Some(time_part) = parse_time_component(&path) else {
                    continue;
                };
                let Some(timestamp) = combine_date_time(&date_name, &time_part) else {
                    continue;
                };
                let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                let compressed = path.extension().and_then(|e| e.to_str()) == Some("gz");
                result.push(SnapshotMeta {
                    path,
                    date: date_name.clone(),
                    timestamp,
                    size_bytes,
                    compressed,
                });
            }
        }

        Ok(result)
    }

    /// Removes dailies older than `retention_days`, keeping the first
    /// snapshot of each month indefinitely when `keep_monthly` is set.
    pub fn cleanup(
        &self,
        retention_days: i64,
        keep_monthly: bool,
        dry_run: bool,
    ) -> Result<Vec<PathBuf>> {
        let dir = self.snapshots_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let mut removed = Vec::new();
        let mut seen_months = std::collections::HashSet::new();

        let mut date_dirs: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir() && p.file_name().and_then(|n| n.to_str()) != Some(LATEST_POINTER))
            .collect();
        date_dirs.sort();

        for date_dir in date_dirs {
            let date_name = date_dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let Ok(dir_date) = NaiveDate::parse_from_str(&date_name, "%Y-%m-%d") else {
                continue;
            };

            let month_key = dir_date.format("%Y-%m").to_string();
            let first_of_month = seen_months.insert(month_key);
            if first_of_month && keep_monthly {
                continue;
            }

            let dir_datetime = dir_date.and_hms_opt(0, 0, 0).unwrap().and_utc();
            if dir_datetime < cutoff {
                if dry_run {
                    tracing::info!(dir = %date_dir.display(), "would remove snapshot directory");
                } else {
                    std::fs::remove_dir_all(&date_dir)?;
                }
                removed.push(date_dir);
            }
        }

        Ok(removed)
    }
}

fn parse_time_component(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let stem = stem.strip_suffix(".json").unwrap_or(stem);
    stem.strip_prefix("snapshot-").map(|s| s.to_string())
}

fn combine_date_time(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let naive = chrono::NaiveDateTime::parse_from_str(
        &format!("{} {}", date, time),
        "%Y-%m-%d %H%M%S",
    )
    .ok()?;
    Some(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let manager = SnapshotManager::new(dir.path());

        let path = manager.create(&store, false, true).unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "gz");

        let snapshot = manager.get(None).unwrap().unwrap();
        assert_eq!(snapshot.kind, SnapshotKind::Registry);
    }

    #[test]
    fn test_create_uncompressed() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let manager = SnapshotManager::new(dir.path());

        let path = manager.create(&store, false, false).unwrap();
        assert_eq!(path.extension().unwrap(), "json");
    }

    #[test]
    fn test_list_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let manager = SnapshotManager::new(dir.path());
        manager.create(&store, false, true).unwrap();

        let list = manager.list().unwrap();
        assert_eq!(list.len(), 1);
        assert!(list[0].compressed);
    }

    #[test]
    fn test_cleanup_dry_run_does_not_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let manager = SnapshotManager::new(dir.path());
        manager.create(&store, false, true).unwrap();

        let removed = manager.cleanup(0, false, true).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(manager.list().unwrap().len(), 1, "dry run must not delete");
    }
}
