//! Identity types for the reactive system.
//!
//! A computation is anything that can be re-run when a value it read
//! changes. Observable entities (records and ref cells) get their own
//! identifiers so the dependency store never has to hold them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a computation.
///
/// Each effect gets a unique ID when created and keeps it across every
/// re-run. The ID is what the dependency store records as a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputationId(u64);

impl ComputationId {
    /// Generate a new unique computation ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ComputationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unique identifier for an observable entity (a record or a ref cell).
///
/// Two structurally equal records still have distinct entity IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    /// Generate a new unique entity ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A computation that the runtime can re-run and dispose.
///
/// The dependency store only deals in this trait, so it does not need to
/// know what kind of computation it is notifying.
pub trait Computation {
    /// Get the computation's stable ID.
    fn id(&self) -> ComputationId;

    /// Re-run the computation because one of its dependencies changed.
    fn schedule(&self);

    /// Stop the computation permanently.
    fn dispose(&self);
}
