//! Reactive Primitives
//!
//! This module implements the core reactive system: reactive records, ref
//! cells and effects, tied together by a dependency store.
//!
//! # Concepts
//!
//! ## Records and proxies
//!
//! A [`Record`] is a plain mutable map of fields. [`wrap`] returns its
//! [`Reactive`] proxy. Field reads through the proxy inside an effect are
//! tracked per field; field writes re-run exactly the effects that read the
//! written field in their latest run.
//!
//! ## Refs
//!
//! A [`Ref`] is a container for a single value. It is tracked as one slot,
//! for when wrapping a whole record is unnecessary.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation. It runs once when created
//! and again, synchronously, whenever something it read changes.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies automatically. When a record field or a ref is read, we
//! check whether an effect is running and, if so, record the dependency in
//! the [`Runtime`].
//!
//! Everything is single-threaded: handles are `!Send` and all runtime state
//! lives in thread-locals.

mod context;
mod effect;
mod proxy;
mod ref_cell;
mod runtime;
mod subscriber;
mod value;

pub use effect::{run_effect, Effect, EffectState};
pub use proxy::{wrap, Reactive, Record, Target};
pub use ref_cell::{create_ref, Ref};
pub use runtime::{DepKey, Runtime};
pub use subscriber::{Computation, ComputationId, EntityId};
pub use value::Value;
