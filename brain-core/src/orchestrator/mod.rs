//! Enrichment orchestrator: runs every registered [`Enricher`] over its inbox
//! in a fixed order, fanning batches out across a small worker pool, rate
//! limiting outbound calls, and checkpointing progress so a run can resume.
//!
//! Ported from `enrichment_pipeline.py`'s `EnrichmentPipeline`, using
//! `std::thread`/`std::sync::mpsc` in place of Python's `ThreadPoolExecutor`:
//! brain-core has no async runtime dependency of its own, and a handful of
//! blocking file reads per batch does not warrant pulling tokio into this
//! crate just for the orchestrator.

use crate::atomic::write_atomic;
use crate::enrich::sources::create_all_enrichers;
use crate::enrich::Enricher;
use crate::error::Result;
use crate::resolver::CanonicalResolver;
use crate::store::EntityStore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const DEFAULT_MAX_WORKERS: usize = 4;
const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 60;
const CHECKPOINT_FILE_NAME: &str = ".enrichment_checkpoint.json";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_workers: usize,
    pub batch_size: usize,
    pub rate_limit_per_minute: u32,
    pub checkpoint_path: PathBuf,
    pub inbox_root: PathBuf,
}

impl OrchestratorConfig {
    pub fn new(root: &Path) -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
            checkpoint_path: root.join(CHECKPOINT_FILE_NAME),
            inbox_root: root.join("inbox"),
        }
    }
}

/// Resumable progress, checkpointed to disk after every batch.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineProgress {
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_checkpoint: Option<chrono::DateTime<chrono::Utc>>,
    pub total_entities: usize,
    pub processed_entities: usize,
    pub successful: usize,
    pub failed: usize,
    pub sources_completed: Vec<String>,
    pub current_source: Option<String>,
    pub last_entity_id: Option<String>,
}

/// Summary returned at the end of (or after canceling) a run.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationReport {
    pub progress: PipelineProgress,
    pub canceled: bool,
    pub source_errors: Vec<(String, String)>,
}

/// Sliding 60-second request-rate limiter, shared across worker threads.
struct RateLimiter {
    max_per_minute: u32,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute,
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Blocks the calling thread until a slot in the 60-second window opens.
    fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().unwrap();
                let now = Instant::now();
                while window.front().is_some_and(|t| now.duration_since(*t) >= Duration::from_secs(60)) {
                    window.pop_front();
                }
                if (window.len() as u32) < self.max_per_minute {
                    window.push_back(now);
                    None
                } else {
                    let oldest = *window.front().unwrap();
                    Some(Duration::from_secs(60).saturating_sub(now.duration_since(oldest)))
                }
            };
            match wait {
                None => return,
                Some(d) if d.is_zero() => continue,
                Some(d) => std::thread::sleep(d),
            }
        }
    }
}

/// Per-entity mutexes so two workers never write the same entity file at
/// once, keyed by canonical id.
#[derive(Default)]
struct EntityLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

pub struct EnrichmentOrchestrator<'a> {
    store: &'a EntityStore,
    resolver: &'a CanonicalResolver,
    config: OrchestratorConfig,
}

impl<'a> EnrichmentOrchestrator<'a> {
    pub fn new(store: &'a EntityStore, resolver: &'a CanonicalResolver, config: OrchestratorConfig) -> Self {
        Self { store, resolver, config }
    }

    /// Runs every enricher's inbox pass in order. `sources` restricts which
    /// ones run (by `source_name()`); `None` runs all. `cancel` is polled
    /// between batches; when set, the current checkpoint is saved and the
    /// run stops with `report.canceled == true` rather than erroring.
    pub fn run(
        &self,
        sources: Option<&[String]>,
        resume: bool,
        dry_run: bool,
        cancel: &AtomicBool,
    ) -> Result<OrchestrationReport> {
        let enrichers = create_all_enrichers();
        let mut progress = if resume && self.config.checkpoint_path.exists() {
            self.load_checkpoint().unwrap_or_default()
        } else {
            PipelineProgress::default()
        };
        if progress.started_at.is_none() {
            progress.started_at = Some(chrono::Utc::now());
        }

        progress.total_entities = self.store.list()?.len();

        let rate_limiter = RateLimiter::new(self.config.rate_limit_per_minute);
        let locks = EntityLocks::default();
        let mut source_errors = Vec::new();
        let mut canceled = false;

        for enricher in &enrichers {
            let name = enricher.source_name();
            if let Some(wanted) = sources {
                if !wanted.iter().any(|s| s == name) {
                    continue;
                }
            }
            if progress.sources_completed.iter().any(|s| s == name) {
                tracing::info!(source = name, "skipping already-completed source");
                continue;
            }
            if cancel.load(Ordering::Relaxed) {
                canceled = true;
                self.save_checkpoint(&progress)?;
                break;
            }

            progress.current_source = Some(name.to_string());
            tracing::info!(source = name, "enrichment source starting");

            let inbox_dir = self.config.inbox_root.join(name);
            match self.process_source(enricher.as_ref(), &inbox_dir, dry_run, &rate_limiter, &locks, &mut progress, cancel) {
                Ok(stopped_early) => {
                    if stopped_early {
                        canceled = true;
                        self.save_checkpoint(&progress)?;
                        break;
                    }
                    progress.sources_completed.push(name.to_string());
                }
                Err(e) => {
                    tracing::warn!(source = name, error = %e, "enrichment source failed, moving on");
                    source_errors.push((name.to_string(), e.to_string()));
                }
            }
            self.save_checkpoint(&progress)?;
        }

        if canceled {
            tracing::warn!("enrichment run canceled");
        } else {
            progress.current_source = None;
            tracing::info!(
                processed = progress.processed_entities,
                successful = progress.successful,
                failed = progress.failed,
                "enrichment run complete"
            );
        }

        Ok(OrchestrationReport { progress, canceled, source_errors })
    }

    /// Processes one source's inbox in fixed-size batches. Returns `Ok(true)`
    /// if canceled mid-source.
    #[allow(clippy::too_many_arguments)]
    fn process_source(
        &self,
        enricher: &dyn Enricher,
        inbox_dir: &Path,
        dry_run: bool,
        rate_limiter: &RateLimiter,
        locks: &EntityLocks,
        progress: &mut PipelineProgress,
        cancel: &AtomicBool,
    ) -> Result<bool> {
        if !inbox_dir.exists() {
            tracing::info!(dir = %inbox_dir.display(), "no inbox data for source");
            return Ok(false);
        }

        let records = self.load_records(inbox_dir)?;
        for batch in records.chunks(self.config.batch_size) {
            if cancel.load(Ordering::Relaxed) {
                return Ok(true);
            }

            if self.config.max_workers > 1 {
                std::thread::scope(|scope| {
                    let (tx, rx) = std::sync::mpsc::channel();
                    let chunks = split_evenly(batch, self.config.max_workers);
                    for chunk in chunks {
                        let tx = tx.clone();
                        scope.spawn(|| {
                            for record in chunk {
                                rate_limiter.acquire();
                                let outcome = self.enrich_one(enricher, record, dry_run, locks);
                                tx.send(outcome).ok();
                            }
                        });
                    }
                    drop(tx);
                    for outcome in rx {
                        self.record_outcome(progress, outcome);
                    }
                });
            } else {
                for record in batch {
                    rate_limiter.acquire();
                    let outcome = self.enrich_one(enricher, record, dry_run, locks);
                    self.record_outcome(progress, outcome);
                }
            }
        }

        Ok(false)
    }

    fn enrich_one(
        &self,
        enricher: &dyn Enricher,
        record: &serde_json::Value,
        dry_run: bool,
        locks: &EntityLocks,
    ) -> (String, Result<usize>) {
        let entity_ref = record
            .get("entity")
            .and_then(serde_json::Value::as_str)
            .or_else(|| {
                record
                    .get("mentions")
                    .and_then(serde_json::Value::as_array)
                    .and_then(|m| m.first())
                    .and_then(serde_json::Value::as_str)
            })
            .unwrap_or("unknown");
        let lock_key = self.resolver.resolve(entity_ref).unwrap_or_else(|| entity_ref.to_string());
        let guard = locks.lock_for(&lock_key);
        let _held = guard.lock().unwrap();
        (lock_key, enricher.enrich(self.store, self.resolver, record, dry_run))
    }

    fn record_outcome(&self, progress: &mut PipelineProgress, outcome: (String, Result<usize>)) {
        let (entity_id, result) = outcome;
        progress.processed_entities += 1;
        progress.last_entity_id = Some(entity_id);
        match result {
            Ok(_) => progress.successful += 1,
            Err(_) => progress.failed += 1,
        }
    }

    fn load_records(&self, dir: &Path) -> Result<Vec<serde_json::Value>> {
        let mut records = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else { continue };
            match serde_json::from_str::<serde_json::Value>(&content) {
                Ok(serde_json::Value::Array(items)) => records.extend(items),
                Ok(single) => records.push(single),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping malformed inbox record"),
            }
        }
        Ok(records)
    }

    fn save_checkpoint(&self, progress: &PipelineProgress) -> Result<()> {
        let mut progress = progress.clone();
        progress.last_checkpoint = Some(chrono::Utc::now());
        let bytes = serde_json::to_vec_pretty(&progress)?;
        write_atomic(&self.config.checkpoint_path, &bytes)
    }

    fn load_checkpoint(&self) -> Result<PipelineProgress> {
        let content = std::fs::read_to_string(&self.config.checkpoint_path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn split_evenly<T: Clone>(items: &[T], parts: usize) -> Vec<Vec<T>> {
    let mut out: Vec<Vec<T>> = (0..parts.max(1)).map(|_| Vec::new()).collect();
    for (i, item) in items.iter().enumerate() {
        out[i % out.len()].push(item.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_record(dir: &Path, name: &str, value: serde_json::Value) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), serde_json::to_vec(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_run_processes_chat_inbox_and_checkpoints() {
        use crate::types::{Entity, EntityType, Status};
        use indexmap::IndexMap;

        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let now = chrono::Utc::now();
        let entity = Entity {
            schema_version: 2,
            id: "entity/project/checkout".to_string(),
            entity_type: EntityType::Project,
            version: 1,
            created: now,
            updated: now,
            name: "Checkout".to_string(),
            aliases: vec![],
            status: Status::Active,
            confidence: 1.0,
            valid_from: None,
            valid_to: None,
            relationships: vec![],
            events: vec![],
            orphan_reason: None,
            extra: IndexMap::new(),
        };
        store.write("entity/project/checkout", &entity, "").unwrap();
        let resolver = CanonicalResolver::build(&store).unwrap();

        let mut config = OrchestratorConfig::new(dir.path());
        config.max_workers = 2;
        write_record(
            &config.inbox_root.join("chat"),
            "msg-1.json",
            serde_json::json!({"id": "msg-1", "channel": "eng", "text": "ping", "mentions": ["checkout"]}),
        );

        let orchestrator = EnrichmentOrchestrator::new(&store, &resolver, config.clone());
        let cancel = AtomicBool::new(false);
        let report = orchestrator
            .run(Some(&["chat".to_string()]), false, false, &cancel)
            .unwrap();

        assert!(!report.canceled);
        assert_eq!(report.progress.processed_entities, 1);
        assert_eq!(report.progress.successful, 1);
        assert!(report.progress.sources_completed.contains(&"chat".to_string()));
        assert!(config.checkpoint_path.exists());

        let file = store.read("entity/project/checkout").unwrap();
        assert_eq!(file.header.events.len(), 1);
    }

    #[test]
    fn test_resume_skips_completed_sources() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let resolver = CanonicalResolver::build(&store).unwrap();
        let config = OrchestratorConfig::new(dir.path());

        let mut progress = PipelineProgress::default();
        progress.sources_completed.push("chat".to_string());
        let bytes = serde_json::to_vec_pretty(&progress).unwrap();
        write_atomic(&config.checkpoint_path, &bytes).unwrap();

        write_record(
            &config.inbox_root.join("chat"),
            "msg-1.json",
            serde_json::json!({"id": "msg-1", "channel": "eng", "text": "ping", "mentions": ["nobody"]}),
        );

        let orchestrator = EnrichmentOrchestrator::new(&store, &resolver, config);
        let cancel = AtomicBool::new(false);
        let report = orchestrator
            .run(Some(&["chat".to_string()]), true, false, &cancel)
            .unwrap();

        assert_eq!(report.progress.processed_entities, 0, "resumed run must skip completed source");
    }

    #[test]
    fn test_cancel_stops_run_and_saves_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let resolver = CanonicalResolver::build(&store).unwrap();
        let config = OrchestratorConfig::new(dir.path());

        let orchestrator = EnrichmentOrchestrator::new(&store, &resolver, config.clone());
        let cancel = AtomicBool::new(true);
        let report = orchestrator.run(None, false, false, &cancel).unwrap();

        assert!(report.canceled);
        assert!(config.checkpoint_path.exists() || report.progress.sources_completed.is_empty());
    }
}
