//! Pre-flight boot validator: checks the store's basic health before a batch
//! job (orchestrator run, migration, snapshot) starts, returning a
//! structured pass/fail report rather than failing loudly mid-job.
//!
//! Ported from `tools/boot/boot_orchestrator.py`'s validation section, pared
//! down to the checks that are this crate's concern: the boot orchestrator's
//! other steps (context fetch, Slack post, master sheet sync) belong to
//! callers outside brain-core.

use crate::registry::Registry;
use crate::store::EntityStore;
use std::path::Path;

/// Matches the private `resolver::CACHE_FILE_NAME`; kept as a literal here
/// rather than exposed from `resolver` since this is the only other reader.
const RESOLVER_CACHE_FILE_NAME: &str = "resolver_cache.json";
const SNAPSHOT_DIR_NAME: &str = ".snapshots";
const PROBE_FILE_NAME: &str = ".boot_probe";

#[derive(Debug, Clone)]
pub struct BootCheck {
    pub name: String,
    pub passed: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct BootReport {
    pub checks: Vec<BootCheck>,
}

impl BootReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

pub struct BootValidator<'a> {
    store: &'a EntityStore,
}

impl<'a> BootValidator<'a> {
    pub fn new(store: &'a EntityStore) -> Self {
        Self { store }
    }

    /// Runs every check, continuing past individual failures so the report
    /// always covers all four checks.
    pub fn run_preflight(&self) -> BootReport {
        let checks = vec![
            self.check_root_writable(),
            self.check_registry_loads(),
            self.check_resolver_cache(),
            self.check_snapshot_dir_writable(),
        ];
        BootReport { checks }
    }

    fn check_root_writable(&self) -> BootCheck {
        let root = self.store.root();
        let name = "root path exists and is writable".to_string();

        if let Err(e) = std::fs::create_dir_all(root) {
            return BootCheck { name, passed: false, message: format!("cannot create root {}: {e}", root.display()) };
        }
        match probe_writable(root) {
            Ok(()) => BootCheck { name, passed: true, message: format!("{} is writable", root.display()) },
            Err(e) => BootCheck { name, passed: false, message: e },
        }
    }

    fn check_registry_loads(&self) -> BootCheck {
        let name = "registry loads".to_string();
        let path = self.store.root().join("registry.json");
        if !path.exists() {
            return BootCheck { name, passed: true, message: "no registry.json yet (will be built on first rebuild)".to_string() };
        }
        match Registry::load(self.store.root()) {
            Ok(registry) => BootCheck { name, passed: true, message: format!("registry loaded ({} entities)", registry.entities.len()) },
            Err(e) => BootCheck { name, passed: false, message: format!("registry.json is corrupt: {e}") },
        }
    }

    fn check_resolver_cache(&self) -> BootCheck {
        let name = "resolver cache is not corrupt".to_string();
        let path = self.store.root().join(RESOLVER_CACHE_FILE_NAME);
        if !path.exists() {
            return BootCheck { name, passed: true, message: "no resolver cache yet (will be built on first resolve)".to_string() };
        }
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => return BootCheck { name, passed: false, message: format!("cannot read resolver cache: {e}") },
        };
        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(_) => BootCheck { name, passed: true, message: "resolver cache parses".to_string() },
            Err(e) => BootCheck { name, passed: false, message: format!("resolver cache is corrupt: {e}") },
        }
    }

    fn check_snapshot_dir_writable(&self) -> BootCheck {
        let name = "snapshot directory is writable".to_string();
        let dir = self.store.root().join(SNAPSHOT_DIR_NAME);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            return BootCheck { name, passed: false, message: format!("cannot create {}: {e}", dir.display()) };
        }
        match probe_writable(&dir) {
            Ok(()) => BootCheck { name, passed: true, message: format!("{} is writable", dir.display()) },
            Err(e) => BootCheck { name, passed: false, message: e },
        }
    }
}

fn probe_writable(dir: &Path) -> std::result::Result<(), String> {
    let probe = dir.join(PROBE_FILE_NAME);
    std::fs::write(&probe, b"boot probe").map_err(|e| format!("{} is not writable: {e}", dir.display()))?;
    std::fs::remove_file(&probe).map_err(|e| format!("could not remove probe file: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_passes_on_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let validator = BootValidator::new(&store);
        let report = validator.run_preflight();
        assert!(report.passed(), "{:?}", report.checks);
        assert_eq!(report.checks.len(), 4);
    }

    #[test]
    fn test_preflight_flags_corrupt_registry() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("registry.json"), b"not json").unwrap();

        let validator = BootValidator::new(&store);
        let report = validator.run_preflight();
        assert!(!report.passed());
        let registry_check = report.checks.iter().find(|c| c.name.contains("registry")).unwrap();
        assert!(!registry_check.passed);
    }

    #[test]
    fn test_preflight_flags_corrupt_resolver_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join(RESOLVER_CACHE_FILE_NAME), b"{not valid json").unwrap();

        let validator = BootValidator::new(&store);
        let report = validator.run_preflight();
        assert!(!report.passed());
    }
}
