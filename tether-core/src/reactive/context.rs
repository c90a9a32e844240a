//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a record field or a ref
//! cell is read, the current computation becomes a subscriber of it.
//!
//! # Implementation
//!
//! We use a thread-local stack of computation IDs. Running an effect pushes
//! its ID; the guard returned by [`ReactiveContext::enter`] pops it on drop.
//! The top of the stack is the active computation.
//!
//! The stack is what makes nested effects work: an effect created inside
//! another effect's body pushes on top of its parent, and when it finishes
//! the parent is current again. Because popping happens in `Drop`, a
//! panicking body still leaves the stack balanced.
//!
//! Only the effect runner enters contexts.

use std::cell::RefCell;

use super::ComputationId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ComputationId>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
pub(crate) struct ReactiveContext {
    computation: ComputationId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given computation.
    ///
    /// While this context is active, reads register the computation as a
    /// dependent. The context is exited when the returned guard is dropped.
    pub(crate) fn enter(computation: ComputationId) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(computation));
        Self { computation }
    }

    /// Check if there is an active reactive context.
    pub(crate) fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the currently running computation, if any.
    pub(crate) fn current() -> Option<ComputationId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().copied())
    }

    /// Depth of the context stack.
    #[cfg(test)]
    pub(crate) fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // The stack may already be gone during thread teardown.
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();

            debug_assert_eq!(
                popped,
                Some(self.computation),
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.computation,
                popped
            );
        });
    }
}
