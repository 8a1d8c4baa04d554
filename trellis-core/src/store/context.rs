//! Dispatch Context
//!
//! Tracks which stores are dispatching on the current thread, so a reducer
//! or subscriber that dispatches back into its own store is rejected instead
//! of deadlocking on the dispatch lock.
//!
//! # Implementation
//!
//! A thread-local stack holds one entry per dispatch in progress. Entering a
//! dispatch pushes `(store, action kind)`; the returned guard pops it when
//! dropped, including during unwinding. Dispatching into a *different* store
//! from a subscriber is allowed and simply nests.

use std::cell::RefCell;

use super::StoreId;

thread_local! {
    static DISPATCH_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone)]
struct ContextEntry {
    store: StoreId,
    kind: String,
}

/// Guard marking a dispatch in progress on this thread.
pub(crate) struct DispatchContext {
    store: StoreId,
}

impl DispatchContext {
    /// Mark `store` as dispatching `kind` until the guard drops.
    pub(crate) fn enter(store: StoreId, kind: &str) -> Self {
        DISPATCH_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                store,
                kind: kind.to_string(),
            });
        });

        Self { store }
    }

    /// The action kind `store` is currently dispatching on this thread, if any.
    pub(crate) fn active(store: StoreId) -> Option<String> {
        DISPATCH_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .rev()
                .find(|entry| entry.store == store)
                .map(|entry| entry.kind.clone())
        })
    }

    /// Number of nested dispatches on this thread.
    #[cfg(test)]
    fn depth() -> usize {
        DISPATCH_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for DispatchContext {
    fn drop(&mut self) {
        DISPATCH_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.store, self.store,
                    "DispatchContext mismatch: expected {:?}, got {:?}",
                    self.store, entry.store
                );
            }
        });
    }
}
