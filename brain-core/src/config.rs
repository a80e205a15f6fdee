//! Configuration loading and bootstrap
//!
//! Configuration is loaded from `~/.config/brain/config.toml`, overridden by
//! `BRAIN_ROOT`/`BRAIN_USER` and a single on-disk `.brainrc` key-value file
//! read once at startup. There is no other process-wide state: everything
//! else is either a per-process cache or derived from the brain root path.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration struct.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Enrichment orchestrator tunables.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Decay monitor tunables.
    #[serde(default)]
    pub decay: DecayConfig,

    /// Content index tunables (stopword/synonym overrides).
    #[serde(default)]
    pub index: IndexConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Brain root directory. Resolved by [`Config::resolve_root`], not read
    /// directly from the TOML file in normal operation.
    #[serde(skip)]
    pub root: Option<PathBuf>,
}

/// Orchestrator configuration: worker count, batch size, rate limit.
#[derive(Debug, Deserialize)]
pub struct OrchestratorConfig {
    /// Number of concurrent enrichment workers.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Records per batch passed to each enricher call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Minimum milliseconds between outbound enrichment calls, per worker.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    /// Checkpoint file path, relative to the brain root unless absolute.
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            batch_size: default_batch_size(),
            rate_limit_ms: default_rate_limit_ms(),
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

fn default_max_workers() -> usize {
    4
}

fn default_batch_size() -> usize {
    20
}

fn default_rate_limit_ms() -> u64 {
    250
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from(".enrichment_checkpoint.json")
}

/// Decay monitor configuration.
#[derive(Debug, Deserialize)]
pub struct DecayConfig {
    /// Weekly decay rate applied to confidence.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,

    /// Floor below which decayed confidence never falls.
    #[serde(default = "default_decay_floor")]
    pub floor: f64,

    /// Per-relationship-type staleness threshold overrides, in days.
    #[serde(default)]
    pub staleness_overrides: HashMap<String, u32>,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            decay_rate: default_decay_rate(),
            floor: default_decay_floor(),
            staleness_overrides: HashMap::new(),
        }
    }
}

fn default_decay_rate() -> f64 {
    0.01
}

fn default_decay_floor() -> f64 {
    0.3
}

/// Content index configuration: overridable stopword/synonym sources.
#[derive(Debug, Deserialize, Default)]
pub struct IndexConfig {
    /// Path to a newline-delimited stop-word file overriding the built-in
    /// defaults. `None` uses [`crate::index::DEFAULT_STOPWORDS`].
    pub stopwords_path: Option<PathBuf>,

    /// Path to a TOML synonym-table file overriding the built-in defaults.
    /// `None` uses [`crate::index::IndexVocab`]'s compiled-in synonym groups.
    pub synonyms_path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of rotated log files to keep.
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Loads configuration from the default path, then resolves the brain
    /// root from `BRAIN_ROOT`/`.brainrc`/XDG defaults in that order.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if !config_path.exists() {
            tracing::info!(path = ?config_path, "no config file found, using defaults");
            Config::default()
        } else {
            Self::load_from(&config_path)?
        };

        config.root = Some(Self::resolve_root()?);
        Ok(config)
    }

    /// Loads configuration from a specific path. Does not resolve `root`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Resolves the brain root directory: `BRAIN_ROOT` env var, then a
    /// `root` key in `.brainrc`, then an XDG data directory default.
    ///
    /// This is the single place process-wide state is read, per the
    /// "no global state by design" note: everything downstream is derived
    /// from this path or is a freely-invalidated per-process cache.
    pub fn resolve_root() -> Result<PathBuf> {
        if let Ok(root) = std::env::var("BRAIN_ROOT") {
            return Ok(PathBuf::from(root));
        }

        if let Some(root) = Self::read_brainrc()?.get("root") {
            return Ok(PathBuf::from(root));
        }

        Ok(Self::data_dir())
    }

    /// Resolves the active user: `BRAIN_USER` env var, then a `user` key in
    /// `.brainrc`, then the OS user name.
    pub fn resolve_user() -> Result<String> {
        if let Ok(user) = std::env::var("BRAIN_USER") {
            return Ok(user);
        }

        if let Some(user) = Self::read_brainrc()?.get("user") {
            return Ok(user.clone());
        }

        Ok(whoami())
    }

    /// Reads the on-disk `.brainrc` key-value file (`key = value` per line,
    /// `#` comments, blank lines ignored). Missing file is not an error.
    fn read_brainrc() -> Result<HashMap<String, String>> {
        let path = Self::brainrc_path();
        let mut map = HashMap::new();

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(map),
            Err(e) => return Err(Error::Io(e)),
        };

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                map.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        Ok(map)
    }

    /// Returns the default config file path.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("brain")
            .join("config.toml")
    }

    /// Returns the `.brainrc` file path.
    pub fn brainrc_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".brainrc")
    }

    /// Returns the default brain-root data directory.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("brain")
    }

    /// Returns the state directory path (for logs).
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("brain")
    }

    /// Returns the log file path.
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("brain.log")
    }

    /// Returns the resolved brain root, falling back to [`Self::data_dir`]
    /// if `load`/`resolve_root` was never called.
    pub fn root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(Self::data_dir)
    }
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.orchestrator.max_workers, 4);
        assert_eq!(config.decay.decay_rate, 0.01);
        assert_eq!(config.decay.floor, 0.3);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[orchestrator]
max_workers = 8
batch_size = 50

[decay]
decay_rate = 0.02

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.orchestrator.max_workers, 8);
        assert_eq!(config.orchestrator.batch_size, 50);
        assert_eq!(config.decay.decay_rate, 0.02);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_resolve_root_from_env() {
        std::env::set_var("BRAIN_ROOT", "/tmp/brain-test-root");
        let root = Config::resolve_root().unwrap();
        assert_eq!(root, PathBuf::from("/tmp/brain-test-root"));
        std::env::remove_var("BRAIN_ROOT");
    }
}
