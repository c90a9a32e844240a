//! Ref Cell Implementation
//!
//! A [`Ref`] is a single observable value. It is the lightweight
//! alternative to wrapping a whole record when only one value needs to be
//! observed.
//!
//! # How Refs Work
//!
//! 1. When a ref is read within a running effect, the effect subscribes to
//!    the ref's single slot.
//!
//! 2. When the ref is set to a different value, every subscribed effect
//!    re-runs before `set` returns.
//!
//! 3. Setting a value equal to the current one does nothing.
//!
//! # Lifetime
//!
//! Refs are never destroyed explicitly. When the last handle is dropped the
//! runtime forgets the ref's subscriptions.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::runtime::{DepKey, Runtime};
use super::EntityId;

struct RefInner<T> {
    entity: EntityId,
    value: RefCell<T>,
}

impl<T> Drop for RefInner<T> {
    fn drop(&mut self) {
        Runtime::forget_entity(self.entity);
    }
}

/// An observable single-value container.
///
/// # Example
///
/// ```rust,ignore
/// let count = create_ref(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (re-runs dependent effects)
/// count.set(5);
/// ```
pub struct Ref<T> {
    inner: Rc<RefInner<T>>,
}

impl<T> Ref<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new ref with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefInner {
                entity: EntityId::new(),
                value: RefCell::new(value),
            }),
        }
    }

    /// Get the ref's entity ID.
    pub fn id(&self) -> EntityId {
        self.inner.entity
    }

    /// Get the current value.
    ///
    /// If called within a running effect, this also subscribes the effect.
    pub fn get(&self) -> T {
        Runtime::track(self.inner.entity, DepKey::Value);
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Call `f` with the current value, subscribing like [`Ref::get`].
    ///
    /// `f` sees a snapshot, so it may write any ref, this one included.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.get())
    }

    /// Set a new value and re-run dependents if it differs from the current
    /// one.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }

        Runtime::notify(self.inner.entity, &DepKey::Value);
    }

    /// Update the value using a function of the current value.
    ///
    /// `f` runs on a snapshot; writes it makes are overwritten by its result.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.get_untracked());
        self.set(new_value);
    }

    /// Get the number of effects subscribed to this ref.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.entity, &DepKey::Value)
    }

    /// Check whether two handles refer to the same ref.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

/// Create a new ref. Shorthand for [`Ref::new`].
pub fn create_ref<T>(value: T) -> Ref<T>
where
    T: Clone + PartialEq + 'static,
{
    Ref::new(value)
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Ref<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.inner.entity)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
