//! Reactive Runtime
//!
//! The runtime is the dependency store that connects observable entities
//! (records and ref cells) with the computations that read them.
//!
//! # How It Works
//!
//! 1. When an effect is created, it registers with the runtime.
//!
//! 2. When a running effect reads an entity, the runtime records
//!    `(entity, key) -> effect`.
//!
//! 3. When an entity is written, the runtime:
//!    a. Looks up the subscribers of `(entity, key)`
//!    b. Takes a snapshot of them and releases its own state
//!    c. Schedules each subscriber, in subscription order
//!
//! 4. Before an effect re-runs, its old subscriptions are cleared through a
//!    reverse index, so only the reads of the latest run count.
//!
//! # Lifetimes
//!
//! The store is keyed by [`EntityId`] and never holds an entity. Entities
//! call [`Runtime::forget_entity`] from their `Drop`, which releases their
//! per-key maps. Registered computations, on the other hand, are held
//! strongly until they are disposed.
//!
//! # Threading
//!
//! All state is thread-local. Nothing here is shared between threads, so
//! there is no locking; instead the store is careful never to keep a borrow
//! alive while user code (an effect body, a destructor) can run.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexSet;
use smallvec::SmallVec;
use tracing::trace;

use super::context::ReactiveContext;
use super::subscriber::{Computation, ComputationId, EntityId};
use crate::config::RuntimeConfig;
use crate::error::Result;

/// The observable slot of an entity that a computation read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A named field of a record.
    Field(String),

    /// The single slot of a ref cell.
    Value,

    /// The set of keys of a record (insertions and removals).
    Keys,
}

impl DepKey {
    /// Shorthand for a field key.
    pub fn field(name: &str) -> Self {
        Self::Field(name.to_string())
    }
}

type Subscribers = IndexSet<ComputationId>;
type ReadList = SmallVec<[(EntityId, DepKey); 4]>;

#[derive(Default)]
struct DependencyStore {
    /// entity -> key -> subscribers.
    entities: HashMap<EntityId, HashMap<DepKey, Subscribers>>,

    /// computation -> the entries it is a member of.
    reads: HashMap<ComputationId, ReadList>,

    /// Live computations.
    registry: HashMap<ComputationId, Rc<dyn Computation>>,

    /// owner -> effects created during the owner's current run.
    children: HashMap<ComputationId, SmallVec<[ComputationId; 2]>>,

    config: RuntimeConfig,
}

thread_local! {
    static STORE: RefCell<DependencyStore> = RefCell::new(DependencyStore::default());
}

/// The per-thread reactive runtime.
///
/// This is a namespace over thread-local state; it has no instances.
/// Outside the crate it only offers introspection, `notify` and
/// configuration; subscriptions and the registry are managed by effects:
///
/// ```compile_fail
/// use tether_core::reactive::{ComputationId, Runtime};
///
/// Runtime::unregister(ComputationId::new());
/// ```
pub struct Runtime;

impl Runtime {
    /// Register a computation so it can be notified. The runtime keeps it
    /// alive until it is unregistered.
    pub(crate) fn register(computation: Rc<dyn Computation>) {
        let id = computation.id();
        STORE.with(|store| {
            store.borrow_mut().registry.insert(id, computation);
        });
    }

    /// Unregister a computation and drop every subscription it holds.
    pub(crate) fn unregister(id: ComputationId) {
        Self::clear_subscriptions(id);

        // Dropped after the borrow ends: it may be the last handle, and its
        // destructor can reach back into the store.
        let removed = STORE
            .try_with(|store| {
                let mut store = store.borrow_mut();
                store.children.remove(&id);
                store.registry.remove(&id)
            })
            .ok()
            .flatten();
        drop(removed);
    }

    /// Check whether a computation is registered (created and not disposed).
    pub fn is_registered(id: ComputationId) -> bool {
        STORE.with(|store| store.borrow().registry.contains_key(&id))
    }

    /// Record that `computation` read `(entity, key)`.
    ///
    /// Idempotent. Ignored for computations that are not registered, so a
    /// disposed effect cannot pick up new subscriptions.
    pub(crate) fn record(entity: EntityId, key: DepKey, computation: ComputationId) {
        STORE.with(|store| {
            let mut store = store.borrow_mut();
            if !store.registry.contains_key(&computation) {
                return;
            }

            let inserted = store
                .entities
                .entry(entity)
                .or_default()
                .entry(key.clone())
                .or_default()
                .insert(computation);

            if inserted {
                trace!(%entity, ?key, %computation, "recorded dependency");
                store.reads.entry(computation).or_default().push((entity, key));
            }
        });
    }

    /// Record a read of `(entity, key)` by the active computation, if any.
    pub(crate) fn track(entity: EntityId, key: DepKey) {
        if let Some(computation) = ReactiveContext::current() {
            Self::record(entity, key, computation);
        }
    }

    /// Remove a computation from every entry it is subscribed to.
    ///
    /// Called before each run so reads from an earlier execution path do
    /// not keep the computation subscribed.
    pub(crate) fn clear_subscriptions(computation: ComputationId) {
        let _ = STORE.try_with(|store| {
            let mut store = store.borrow_mut();
            let Some(reads) = store.reads.remove(&computation) else {
                return;
            };

            for (entity, key) in reads {
                let Some(keys) = store.entities.get_mut(&entity) else {
                    continue;
                };
                if let Some(subscribers) = keys.get_mut(&key) {
                    subscribers.shift_remove(&computation);
                    if subscribers.is_empty() {
                        keys.remove(&key);
                    }
                }
                if keys.is_empty() {
                    store.entities.remove(&entity);
                }
            }
        });
    }

    /// Notify every computation subscribed to `(entity, key)`.
    ///
    /// Subscribers run in the order they subscribed. The set is copied
    /// before anything runs, so a re-run that disposes or re-subscribes
    /// other computations does not disturb this pass.
    pub fn notify(entity: EntityId, key: &DepKey) {
        let subscribers: SmallVec<[Rc<dyn Computation>; 4]> = STORE.with(|store| {
            let store = store.borrow();
            let Some(ids) = store.entities.get(&entity).and_then(|keys| keys.get(key)) else {
                return SmallVec::new();
            };
            ids.iter()
                .filter_map(|id| store.registry.get(id).cloned())
                .collect()
        });

        if subscribers.is_empty() {
            return;
        }

        trace!(%entity, ?key, count = subscribers.len(), "notifying subscribers");

        for computation in subscribers {
            computation.schedule();
        }
    }

    /// Drop everything recorded for an entity.
    ///
    /// Called from the entity's destructor. Stale entries in the reverse
    /// index are skipped the next time they are cleared.
    pub(crate) fn forget_entity(entity: EntityId) {
        let _ = STORE.try_with(|store| {
            // An entity can be dropped while the store is borrowed (for
            // example from inside a destructor the store triggered); its
            // map is then released when its subscribers are cleared.
            if let Ok(mut store) = store.try_borrow_mut() {
                store.entities.remove(&entity);
            }
        });
    }

    /// Make `child` owned by `owner`. Owned effects are disposed when the
    /// owner re-runs or is disposed.
    pub(crate) fn adopt(owner: ComputationId, child: ComputationId) {
        STORE.with(|store| {
            store.borrow_mut().children.entry(owner).or_default().push(child);
        });
    }

    /// Dispose every effect created during `owner`'s previous run.
    pub(crate) fn dispose_children(owner: ComputationId) {
        let children: SmallVec<[Rc<dyn Computation>; 2]> = STORE
            .try_with(|store| {
                let mut store = store.borrow_mut();
                let ids = store.children.remove(&owner).unwrap_or_default();
                ids.iter()
                    .filter_map(|id| store.registry.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();

        for child in children {
            child.dispose();
        }
    }

    /// Number of computations subscribed to `(entity, key)`.
    pub fn subscriber_count(entity: EntityId, key: &DepKey) -> usize {
        STORE.with(|store| {
            store
                .borrow()
                .entities
                .get(&entity)
                .and_then(|keys| keys.get(key))
                .map_or(0, |subscribers| subscribers.len())
        })
    }

    /// Number of `(entity, key)` entries a computation is subscribed to.
    pub fn dependency_count(computation: ComputationId) -> usize {
        STORE.with(|store| store.borrow().reads.get(&computation).map_or(0, |reads| reads.len()))
    }

    /// Check if we're inside a running computation.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Install a configuration for this thread.
    pub fn configure(config: RuntimeConfig) -> Result<()> {
        config.validate()?;
        STORE.with(|store| store.borrow_mut().config = config);
        Ok(())
    }

    /// The configuration in effect on this thread.
    pub fn config() -> RuntimeConfig {
        STORE.with(|store| store.borrow().config)
    }
}
