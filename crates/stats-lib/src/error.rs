//! Error types for collection, extraction and merging
//!
//! Backend errors live in [`crate::sync::SyncError`] and cycle-level failures
//! in [`crate::pipeline::PipelineError`].

use thiserror::Error;

/// Result type alias for stats operations.
pub type Result<T> = std::result::Result<T, StatsError>;

/// Errors raised while collecting or normalizing statistics.
#[derive(Error, Debug)]
pub enum StatsError {
    #[error("invalid identifier {raw:?}: {reason}")]
    InvalidIdentifier { raw: String, reason: &'static str },

    #[error("failed to connect to {target} ({address}): {reason}")]
    Connect {
        target: String,
        address: String,
        reason: String,
    },

    #[error("not connected to {target}")]
    NotConnected { target: String },

    #[error("no stats data returned from {target}")]
    EmptyPayload { target: String },

    #[error("cluster {0} not found in topology")]
    UnknownCluster(String),

    #[error("stats tree conversion failed: {0}")]
    Tree(#[from] serde_json::Error),
}
