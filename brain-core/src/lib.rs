//! # brain-core
//!
//! Core library for brain - a personal knowledge-graph engine for product
//! managers.
//!
//! This library provides:
//! - Domain types for entities, relationships, and events
//! - A file-backed entity store with versioned headers
//! - Canonical reference resolution, registry, and inverted content index
//! - The BRAIN+GRAPH query engine (keyword search + graph expansion)
//! - An enrichment orchestrator driving pluggable source enrichers
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Layer 0 (Raw):** Cached records from out-of-scope source collectors
//! - **Layer 1 (Canonical):** Entity files under the brain root, full event history
//! - **Layer 2 (Derived):** Registry, content index, snapshots, reports (regenerable)
//!
//! ## Example
//!
//! ```rust,no_run
//! use brain_core::{Config, store::EntityStore};
//!
//! let config = Config::load().expect("failed to load config");
//! let store = EntityStore::open(config.root()).expect("failed to open store");
//! let ids = store.list().expect("failed to list entities");
//! ```

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

mod atomic;

pub mod boot;
pub mod config;
pub mod decay;
pub mod enrich;
pub mod error;
pub mod events;
pub mod format;
pub mod index;
pub mod logging;
pub mod migration;
pub mod normalizer;
pub mod orchestrator;
pub mod query;
pub mod registry;
pub mod reports;
pub mod resolver;
pub mod snapshot;
pub mod store;
pub mod types;
