//! Error types for Tether.
//!
//! Failures inside an effect body are panics and unwind to whoever
//! triggered the run. The errors here cover the fallible edges of the
//! public API: explicit re-runs, JSON conversion and configuration.

use thiserror::Error;

use crate::reactive::{ComputationId, EntityId};

/// Errors reported by the reactive runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    #[error("effect {id} has been disposed")]
    Disposed {
        id: ComputationId,
    },

    #[error("effect {id} is already running")]
    AlreadyRunning {
        id: ComputationId,
    },

    #[error("expected a JSON object, found {found}")]
    NotAnObject {
        found: &'static str,
    },

    #[error("record {id} contains itself and cannot be serialized")]
    CyclicRecord {
        id: EntityId,
    },

    #[error("invalid runtime configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },

    #[error("failed to parse runtime configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Result type alias for reactive operations.
pub type Result<T> = std::result::Result<T, ReactiveError>;
