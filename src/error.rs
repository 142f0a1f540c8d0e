//! Error types for georep
//!
//! Uses `thiserror` for ergonomic error definitions. Precondition violations
//! fail fast and are never retried; resolution and apply failures are
//! recoverable and isolated to a single identity group within a tick.

use thiserror::Error;

/// Main error type for replication operations
#[derive(Error, Debug)]
pub enum GeorepError {
    /// `replicate` was called with an empty target set
    #[error("event has no target regions")]
    NoTargetRegions,

    /// The resolver was invoked on a group too small to conflict
    #[error("conflict group needs at least 2 events, got {0}")]
    ConflictGroupTooSmall(usize),

    /// A region referenced by id is not in the registry
    #[error("region not found: {0}")]
    RegionNotFound(String),

    /// The engine's tick loop was started twice
    #[error("engine is already running")]
    AlreadyRunning,

    /// The engine was stopped without having been started
    #[error("engine is not running")]
    NotRunning,

    /// A merge strategy was applied to a payload it cannot merge
    #[error("unsupported payload for merge: {0}")]
    UnsupportedPayload(String),

    /// The apply callback reported a failure
    #[error("apply callback failed: {0}")]
    ApplyFailed(String),
}

/// Result type alias for replication operations
pub type Result<T> = std::result::Result<T, GeorepError>;

impl GeorepError {
    /// Returns true if this error is a caller-side precondition violation
    /// rather than a recoverable processing failure.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            GeorepError::NoTargetRegions | GeorepError::ConflictGroupTooSmall(_)
        )
    }
}
