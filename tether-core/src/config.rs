//! Runtime Configuration
//!
//! The reactive runtime has a small number of knobs, all concerned with
//! what happens when a write reaches an effect that is still running.
//! Configuration is per thread, like the rest of the runtime state, and is
//! installed with [`Runtime::configure`](crate::reactive::Runtime::configure).
//!
//! # Example
//!
//! ```rust,ignore
//! let config = RuntimeConfig::from_json_str(r#"{ "reentry": "coalesce" }"#)?;
//! Runtime::configure(config)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// What to do when an effect is notified while it is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentryPolicy {
    /// Drop the notification. The running pass already sees the new value
    /// for anything it reads after the write.
    #[default]
    Skip,

    /// Remember the notification and run the effect again once the current
    /// pass finishes. Repeated notifications during one pass collapse into a
    /// single extra run.
    Coalesce,
}

/// Per-thread configuration of the reactive runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Handling of self-triggering writes.
    pub reentry: ReentryPolicy,

    /// Upper bound on back-to-back coalesced re-runs of one effect.
    /// Only consulted under [`ReentryPolicy::Coalesce`].
    pub max_coalesced_reruns: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            reentry: ReentryPolicy::Skip,
            max_coalesced_reruns: 100,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a configuration from JSON. Missing fields take
    /// their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can be used by the runtime.
    pub fn validate(&self) -> Result<()> {
        if self.max_coalesced_reruns == 0 {
            return Err(ReactiveError::InvalidConfig {
                reason: "max_coalesced_reruns must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
