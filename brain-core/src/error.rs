//! Error types for brain-core

use thiserror::Error;

/// Main error type for the brain-core library.
///
/// Variants correspond to the abstract error kinds the engine is specified
/// against: callers that need to branch on kind (rather than message) should
/// match on these variants, not on formatted text.
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced entity/file absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Header unparseable, required field missing, or an invariant is broken.
    #[error("malformed {what}: {message}")]
    Malformed { what: String, message: String },

    /// Duplicate relationship, duplicate event, or a concurrent-write
    /// collision.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A state-machine transition or operation requires a prior step.
    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),

    /// The outbound rate limiter engaged. Not surfaced by the orchestrator
    /// (it blocks instead); kept for callers that want to observe it.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Underlying filesystem or compression failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any error from an out-of-scope collaborator (API call, credential
    /// test, raw-record fetch).
    #[error("external error: {0}")]
    External(String),

    /// Operation was canceled (signal or timeout).
    #[error("canceled: {0}")]
    Canceled(String),

    /// YAML front-matter parse/serialize error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parse/serialize error (registry, content index, checkpoint,
    /// snapshot files).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML config parse error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for brain-core.
pub type Result<T> = std::result::Result<T, Error>;
