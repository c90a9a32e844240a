//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately and synchronously
//!    to establish its initial dependencies.
//!
//! 2. When any dependency changes, the effect re-runs before the write that
//!    changed it returns.
//!
//! 3. Before every run, the effect drops its old subscriptions and tracks
//!    new ones during execution. A branch that is no longer taken stops
//!    triggering the effect.
//!
//! # Lifecycle
//!
//! `Created -> Running -> Idle <-> Running -> Disposed`. Disposal is
//! terminal and idempotent. A registered effect is kept alive by the
//! runtime until it is disposed; dropping the last [`Effect`] handle does
//! not stop it.
//!
//! # Re-entry
//!
//! A write made by an effect to something it read earlier in the same run
//! would naively re-run the effect from inside itself. The runtime detects
//! this and follows [`ReentryPolicy`]: skip the notification (default) or
//! coalesce it into one extra run after the current one finishes.
//!
//! # Ownership
//!
//! An effect created while another effect is running belongs to it. Owned
//! effects are disposed when their owner re-runs or is disposed, so a body
//! that creates effects does not pile up copies of them.
//!
//! # Ordering
//!
//! Subscribers of one write run in subscription order. There is no
//! topological sort: an effect reachable through two paths from one write
//! may run once per path.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::subscriber::{Computation, ComputationId};
use crate::config::ReentryPolicy;
use crate::error::{ReactiveError, Result};

/// Lifecycle state of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    /// Constructed, first run not started yet.
    Created,

    /// The body is executing.
    Running,

    /// Waiting for a dependency to change.
    Idle,

    /// Permanently stopped.
    Disposed,
}

struct EffectInner {
    id: ComputationId,

    /// The body; taken out when the effect is disposed so its captures
    /// are released.
    body: RefCell<Option<Box<dyn FnMut()>>>,

    state: Cell<EffectState>,

    /// Set when a coalesced notification arrived during the current run.
    pending: Cell<bool>,

    run_count: Cell<usize>,
}

/// Marks the effect as running for the duration of one pass and undoes it
/// on drop, including when the body panics.
struct RunGuard<'a> {
    effect: &'a EffectInner,
    _ctx: ReactiveContext,
}

impl<'a> RunGuard<'a> {
    fn enter(effect: &'a EffectInner) -> Self {
        effect.state.set(EffectState::Running);
        Self {
            effect,
            _ctx: ReactiveContext::enter(effect.id),
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let effect = self.effect;
        effect.run_count.set(effect.run_count.get() + 1);

        if effect.state.get() == EffectState::Disposed {
            // Disposed from inside its own body: drop anything it read or
            // created after the dispose call, then release the body.
            Runtime::clear_subscriptions(effect.id);
            Runtime::dispose_children(effect.id);
            effect.release_body();
        } else {
            effect.state.set(EffectState::Idle);
        }
    }
}

/// Disposes an effect whose first run unwinds, since its creator never
/// receives a handle to it.
struct FirstRunGuard<'a> {
    effect: &'a EffectInner,
    armed: bool,
}

impl FirstRunGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FirstRunGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(effect = %self.effect.id, "first run panicked, disposing effect");
            self.effect.dispose();
        }
    }
}

impl EffectInner {
    fn execute(&self) {
        match self.state.get() {
            EffectState::Disposed => return,
            EffectState::Running => {
                self.reenter();
                return;
            }
            EffectState::Created | EffectState::Idle => {}
        }

        self.pending.set(false);
        let limit = Runtime::config().max_coalesced_reruns;
        let mut reruns = 0;

        loop {
            self.run_once();

            if !self.pending.replace(false) || self.state.get() == EffectState::Disposed {
                break;
            }
            if reruns == limit {
                warn!(effect = %self.id, limit, "effect kept re-triggering itself, giving up");
                break;
            }
            reruns += 1;
        }
    }

    fn run_once(&self) {
        Runtime::dispose_children(self.id);
        Runtime::clear_subscriptions(self.id);

        let _guard = RunGuard::enter(self);
        trace!(effect = %self.id, "running effect");

        let mut body = self.body.borrow_mut();
        if let Some(body) = body.as_mut() {
            body();
        }
    }

    fn reenter(&self) {
        match Runtime::config().reentry {
            ReentryPolicy::Skip => {
                trace!(effect = %self.id, "skipping re-entrant trigger");
            }
            ReentryPolicy::Coalesce => {
                trace!(effect = %self.id, "deferring re-entrant trigger");
                self.pending.set(true);
            }
        }
    }

    fn release_body(&self) {
        // Still borrowed while the body runs; the run guard releases it then.
        let body = match self.body.try_borrow_mut() {
            Ok(mut body) => body.take(),
            Err(_) => None,
        };
        drop(body);
    }
}

impl Computation for EffectInner {
    fn id(&self) -> ComputationId {
        self.id
    }

    fn schedule(&self) {
        self.execute();
    }

    fn dispose(&self) {
        if self.state.get() == EffectState::Disposed {
            return;
        }
        self.state.set(EffectState::Disposed);
        self.pending.set(false);
        debug!(effect = %self.id, "disposing effect");

        Runtime::dispose_children(self.id);
        Runtime::unregister(self.id);
        self.release_body();
    }
}

/// A side-effecting computation that re-runs when its dependencies change.
///
/// Cloning an `Effect` creates a new handle to the **same** effect.
///
/// # Example
///
/// ```rust,ignore
/// let count = create_ref(0);
///
/// let effect = run_effect({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// effect.dispose();
/// count.set(6);  // Prints nothing
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect and run it immediately.
    ///
    /// If the body panics, the effect is disposed and the panic propagates
    /// out of this call.
    pub fn new<F>(body: F) -> Self
    where
        F: FnMut() + 'static,
    {
        let inner = Rc::new(EffectInner {
            id: ComputationId::new(),
            body: RefCell::new(Some(Box::new(body))),
            state: Cell::new(EffectState::Created),
            pending: Cell::new(false),
            run_count: Cell::new(0),
        });

        Runtime::register(inner.clone());
        if let Some(owner) = ReactiveContext::current() {
            Runtime::adopt(owner, inner.id);
        }
        debug!(effect = %inner.id, "created effect");

        let first_run = FirstRunGuard {
            effect: &inner,
            armed: true,
        };
        inner.execute();
        first_run.disarm();

        Self { inner }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> ComputationId {
        self.inner.id
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> EffectState {
        self.inner.state.get()
    }

    /// Force the effect to run again.
    ///
    /// Does nothing once disposed. Called from inside the effect's own
    /// body, it follows the re-entry policy like any other trigger.
    pub fn rerun(&self) {
        self.inner.execute();
    }

    /// Like [`Effect::rerun`], but reports why the effect did not run.
    pub fn try_rerun(&self) -> Result<()> {
        match self.inner.state.get() {
            EffectState::Disposed => Err(ReactiveError::Disposed { id: self.inner.id }),
            EffectState::Running => Err(ReactiveError::AlreadyRunning { id: self.inner.id }),
            EffectState::Created | EffectState::Idle => {
                self.inner.execute();
                Ok(())
            }
        }
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again, whatever its former
    /// dependencies do. Disposing twice is a no-op.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.state.get() == EffectState::Disposed
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of `(entity, key)` entries the latest run read.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.id)
    }
}

/// Create an effect and run it immediately. Shorthand for [`Effect::new`].
pub fn run_effect<F>(body: F) -> Effect
where
    F: FnMut() + 'static,
{
    Effect::new(body)
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::reactive::Ref;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn counter() -> (Rc<Cell<usize>>, impl FnMut() + 'static) {
        let runs = Rc::new(Cell::new(0));
        let body = {
            let runs = runs.clone();
            move || runs.set(runs.get() + 1)
        };
        (runs, body)
    }

    #[test]
    fn effect_runs_on_creation() {
        let (runs, body) = counter();
        let effect = Effect::new(body);

        // Effect should have run once on creation
        assert_eq!(runs.get(), 1);
        assert_eq!(effect.state(), EffectState::Idle);
    }

    #[test]
    fn effect_runs_on_rerun() {
        let (runs, body) = counter();
        let effect = Effect::new(body);

        effect.rerun();
        assert_eq!(runs.get(), 2);

        effect.try_rerun().unwrap();
        assert_eq!(runs.get(), 3);
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let (runs, body) = counter();
        let effect = Effect::new(body);

        effect.dispose();
        assert!(effect.is_disposed());
        assert!(!Runtime::is_registered(effect.id()));

        effect.rerun();
        assert_eq!(runs.get(), 1);

        let err = effect.try_rerun().unwrap_err();
        assert!(matches!(err, ReactiveError::Disposed { id } if id == effect.id()));

        // Disposing again is a no-op
        effect.dispose();
        assert_eq!(effect.state(), EffectState::Disposed);
    }

    #[test]
    fn dispose_releases_the_body() {
        let probe = Rc::new(());
        let effect = Effect::new({
            let probe = probe.clone();
            move || {
                let _probe = &probe;
            }
        });
        assert_eq!(Rc::strong_count(&probe), 2);

        effect.dispose();
        assert_eq!(Rc::strong_count(&probe), 1);
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|| {});
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());

        effect1.rerun();
        assert_eq!(effect2.run_count(), 2);

        effect1.dispose();
        assert!(effect2.is_disposed());
    }

    #[test]
    fn dropping_the_handle_keeps_the_effect() {
        let cell = Ref::new(0);
        let (runs, mut body) = counter();

        drop(Effect::new({
            let cell = cell.clone();
            move || {
                cell.get();
                body();
            }
        }));

        cell.set(1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn stale_subscriptions_are_cleared() {
        let flag = Ref::new(true);
        let a = Ref::new(0);
        let b = Ref::new(0);

        let effect = Effect::new({
            let (flag, a, b) = (flag.clone(), a.clone(), b.clone());
            move || {
                if flag.get() {
                    a.get();
                } else {
                    b.get();
                }
            }
        });
        assert_eq!(effect.dependency_count(), 2);
        assert_eq!(a.subscriber_count(), 1);

        flag.set(false);
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn self_trigger_is_skipped() {
        let count = Ref::new(0);

        let effect = Effect::new({
            let count = count.clone();
            move || count.set(count.get() + 1)
        });

        assert_eq!(count.get_untracked(), 1);
        assert_eq!(effect.run_count(), 1);

        // An outside write still triggers it, once.
        count.set(10);
        assert_eq!(count.get_untracked(), 11);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn self_trigger_coalesces_until_stable() {
        Runtime::configure(RuntimeConfig {
            reentry: ReentryPolicy::Coalesce,
            ..RuntimeConfig::default()
        })
        .unwrap();

        let count = Ref::new(0);
        let effect = Effect::new({
            let count = count.clone();
            move || {
                let n = count.get();
                count.set((n + 1).min(3));
            }
        });

        // 0 -> 1 -> 2 -> 3, then a pass that writes 3 over 3 and settles.
        assert_eq!(count.get_untracked(), 3);
        assert_eq!(effect.run_count(), 4);
        assert_eq!(effect.state(), EffectState::Idle);
    }

    #[test]
    fn coalesced_reruns_are_bounded() {
        Runtime::configure(RuntimeConfig {
            reentry: ReentryPolicy::Coalesce,
            max_coalesced_reruns: 5,
        })
        .unwrap();

        let count = Ref::new(0);
        let effect = Effect::new({
            let count = count.clone();
            move || count.set(count.get() + 1)
        });

        assert_eq!(effect.run_count(), 6);
        assert_eq!(count.get_untracked(), 6);
    }

    #[test]
    fn rerun_from_inside_body_is_reported() {
        let slot: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));
        let seen = Rc::new(RefCell::new(None));

        let effect = Effect::new({
            let slot = slot.clone();
            let seen = seen.clone();
            move || {
                if let Some(me) = slot.borrow().as_ref() {
                    *seen.borrow_mut() = Some(me.try_rerun());
                }
            }
        });
        *slot.borrow_mut() = Some(effect.clone());

        effect.rerun();
        let result = seen.borrow_mut().take().unwrap();
        assert!(matches!(result, Err(ReactiveError::AlreadyRunning { .. })));
        assert_eq!(effect.run_count(), 2);

        // Break the handle cycle.
        slot.borrow_mut().take();
        effect.dispose();
    }

    #[test]
    fn dispose_from_inside_body() {
        let slot: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));
        let cell = Ref::new(0);

        let effect = Effect::new({
            let slot = slot.clone();
            let cell = cell.clone();
            move || {
                let value = cell.get();
                if value > 0 {
                    if let Some(me) = slot.borrow().as_ref() {
                        me.dispose();
                    }
                    // Reads after disposal must not resubscribe.
                    cell.get();
                }
            }
        });
        *slot.borrow_mut() = Some(effect.clone());

        cell.set(1);
        assert!(effect.is_disposed());
        assert_eq!(cell.subscriber_count(), 0);
        assert_eq!(effect.run_count(), 2);

        cell.set(2);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn panicking_body_restores_bookkeeping() {
        let fail = Ref::new(false);
        let other = Ref::new(0);

        let effect = Effect::new({
            let (fail, other) = (fail.clone(), other.clone());
            move || {
                if fail.get() {
                    panic!("effect body failed");
                }
                other.get();
            }
        });

        let result = catch_unwind(AssertUnwindSafe(|| fail.set(true)));
        assert!(result.is_err());

        assert_eq!(ReactiveContext::depth(), 0);
        assert_eq!(effect.state(), EffectState::Idle);
        assert_eq!(effect.run_count(), 2);

        // The failed pass only read `fail`.
        assert_eq!(other.subscriber_count(), 0);
        assert_eq!(fail.subscriber_count(), 1);

        fail.set(false);
        assert_eq!(effect.run_count(), 3);
        assert_eq!(other.subscriber_count(), 1);
    }

    #[test]
    fn panic_on_first_run_disposes_the_effect() {
        let cell = Ref::new(0);
        let captured = Rc::new(());

        let result = catch_unwind(AssertUnwindSafe(|| {
            Effect::new({
                let cell = cell.clone();
                let captured = captured.clone();
                move || {
                    let _captured = &captured;
                    cell.get();
                    panic!("first run failed");
                }
            })
        }));
        assert!(result.is_err());

        assert_eq!(ReactiveContext::depth(), 0);
        assert_eq!(cell.subscriber_count(), 0);
        assert_eq!(Rc::strong_count(&captured), 1);

        // Nothing is left to re-run.
        cell.set(1);
    }

    #[test]
    fn children_created_after_self_dispose_are_disposed() {
        let slot: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));
        let trigger = Ref::new(0);
        let inner_dep = Ref::new(0);
        let child_runs = Rc::new(Cell::new(0));

        let outer = Effect::new({
            let (slot, trigger, inner_dep) = (slot.clone(), trigger.clone(), inner_dep.clone());
            let child_runs = child_runs.clone();
            move || {
                if trigger.get() == 0 {
                    return;
                }
                if let Some(me) = slot.borrow().as_ref() {
                    me.dispose();
                }

                let inner_dep = inner_dep.clone();
                let child_runs = child_runs.clone();
                Effect::new(move || {
                    inner_dep.get();
                    child_runs.set(child_runs.get() + 1);
                });
            }
        });
        *slot.borrow_mut() = Some(outer.clone());

        trigger.set(1);
        assert!(outer.is_disposed());
        assert_eq!(child_runs.get(), 1);
        assert_eq!(inner_dep.subscriber_count(), 0);

        inner_dep.set(5);
        assert_eq!(child_runs.get(), 1);

        slot.borrow_mut().take();
    }

    #[test]
    fn nested_effect_is_owned_by_its_parent() {
        let outer_dep = Ref::new(0);
        let inner_dep = Ref::new(0);
        let inner_runs = Rc::new(Cell::new(0));
        let outer_runs = Rc::new(Cell::new(0));

        let outer = Effect::new({
            let (outer_dep, inner_dep) = (outer_dep.clone(), inner_dep.clone());
            let (outer_runs, inner_runs) = (outer_runs.clone(), inner_runs.clone());
            move || {
                outer_dep.get();
                outer_runs.set(outer_runs.get() + 1);

                let before = ReactiveContext::current();
                let inner_dep = inner_dep.clone();
                let inner_runs = inner_runs.clone();
                Effect::new(move || {
                    inner_dep.get();
                    inner_runs.set(inner_runs.get() + 1);
                });

                // Control is back in the outer effect.
                assert_eq!(ReactiveContext::current(), before);
            }
        });
        assert_eq!((outer_runs.get(), inner_runs.get()), (1, 1));

        inner_dep.set(1);
        assert_eq!((outer_runs.get(), inner_runs.get()), (1, 2));

        // The outer re-run replaces the inner effect instead of adding one.
        outer_dep.set(1);
        assert_eq!((outer_runs.get(), inner_runs.get()), (2, 3));
        assert_eq!(inner_dep.subscriber_count(), 1);

        inner_dep.set(2);
        assert_eq!((outer_runs.get(), inner_runs.get()), (2, 4));

        outer.dispose();
        assert_eq!(inner_dep.subscriber_count(), 0);
        inner_dep.set(3);
        assert_eq!(inner_runs.get(), 4);
    }
}
