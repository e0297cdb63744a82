//! Engine error type.
//!
//! Most failures in the engine degrade instead of erroring: malformed edges
//! are dropped, collaborator failures fall back to hub labels. `EngineError`
//! covers the cases a caller can act on.

use thiserror::Error;

/// Errors surfaced to the host.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A drag or lookup named a node key that is not in the current graph.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// The stored label cache could not be decoded.
    #[error("label cache decode failed: {0}")]
    CacheDecode(#[from] serde_json::Error),

    /// The stored label cache was written by a different schema version.
    #[error("label cache schema version {found}, expected {expected}")]
    CacheVersion { found: u32, expected: u32 },

    /// The cache storage collaborator failed.
    #[error("cache storage: {0}")]
    Storage(String),

    /// A configuration value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
