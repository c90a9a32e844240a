//! Tether Core
//!
//! This crate provides a fine-grained reactivity engine. It tracks which
//! computations read which pieces of state and re-runs them, synchronously,
//! when that state changes.
//!
//! It implements:
//!
//! - Reactive records, observed field by field through proxies
//! - Ref cells holding a single observable value
//! - Effects with automatic dependency tracking, disposal and ownership
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: reactive primitives and the dependency store
//! - `config`: per-thread runtime configuration
//! - `error`: error types
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_core::reactive::{create_ref, run_effect};
//!
//! let a = create_ref(1);
//! let b = create_ref(2);
//!
//! let sum = run_effect({
//!     let (a, b) = (a.clone(), b.clone());
//!     move || println!("sum = {}", a.get() + b.get())
//! });
//! // prints "sum = 3"
//!
//! a.set(3);
//! // Effect re-runs before `set` returns, prints "sum = 5"
//!
//! sum.dispose();
//! b.set(10);
//! // Prints nothing
//! ```

pub mod config;
pub mod error;
pub mod reactive;

pub use config::{ReentryPolicy, RuntimeConfig};
pub use error::{ReactiveError, Result};
pub use reactive::{create_ref, run_effect, wrap, Effect, Reactive, Record, Ref, Runtime, Target, Value};
