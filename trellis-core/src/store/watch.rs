//! Watch Implementation
//!
//! A [`Watch`] is a subscriber scoped to one selector: its callback runs only
//! when the selected value changes.
//!
//! # How Watches Work
//!
//! 1. When created, the selector is evaluated once against the current
//!    state to record a baseline. The callback does not run. If the
//!    selector fails here, no watch is created and the error is returned.
//!
//! 2. After every committed dispatch the selector is evaluated again. Since
//!    selectors are usually memoized this is a cache hit unless one of its
//!    inputs changed.
//!
//! 3. If the new value differs from the last one under the watch's
//!    equality strategy, the baseline is replaced and the callback runs.
//!
//! # Differences from a Plain Subscription
//!
//! - Subscriptions run on every commit; watches only on a selected change.
//! - Subscriptions see the whole state; watches see the selected value.
//! - A watch can be disposed from any clone, and tracks how often it ran.
//!
//! A selector error during notification is reported like any other
//! subscriber failure, in the dispatch's
//! [`DispatchOutcome`](super::DispatchOutcome).

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::subscriber::{SubscriberId, Subscription};
use super::Store;
use crate::error::{BoxError, SelectError};
use crate::selector::{Equality, Selector};

/// A callback bound to a selector's changes.
///
/// Created with [`Store::watch`] or [`Store::watch_with`]. Clones share the
/// same registration, counters and disposal state.
#[derive(Clone)]
pub struct Watch {
    subscription: Arc<Subscription>,

    /// Whether the watch has been disposed.
    disposed: Arc<AtomicBool>,

    /// Number of times the callback has run.
    run_count: Arc<AtomicUsize>,
}

impl Watch {
    pub(crate) fn attach<S, Sel, E, F>(
        store: &Store<S>,
        selector: Sel,
        equality: E,
        callback: F,
    ) -> Result<Self, SelectError>
    where
        S: Send + Sync + 'static,
        Sel: Selector<S> + 'static,
        E: Equality<Sel::Output> + 'static,
        F: Fn(&Sel::Output) + Send + Sync + 'static,
    {
        let disposed = Arc::new(AtomicBool::new(false));
        let run_count = Arc::new(AtomicUsize::new(0));
        let last = Mutex::new(selector.select(&store.get_state(), &())?);

        let disposed_clone = Arc::clone(&disposed);
        let run_count_clone = Arc::clone(&run_count);
        let notify = move |state: &Arc<S>| -> Result<(), BoxError> {
            if disposed_clone.load(Ordering::SeqCst) {
                return Ok(());
            }

            let value = selector.select(state, &())?;
            {
                let mut last = last.lock();
                if equality.equal(&*last, &value) {
                    return Ok(());
                }
                *last = value.clone();
            }

            run_count_clone.fetch_add(1, Ordering::SeqCst);
            callback(&value);
            Ok(())
        };
        let subscription = store.register(Box::new(notify));

        Ok(Self {
            subscription: Arc::new(subscription),
            disposed,
            run_count,
        })
    }

    /// The subscriber ID backing this watch.
    pub fn id(&self) -> SubscriberId {
        self.subscription.id()
    }

    /// Dispose of the watch.
    ///
    /// After disposal the callback will not run again, even if a
    /// notification is already in flight.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.subscription.unsubscribe();
    }

    /// Check if the watch has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the callback has run.
    pub fn run_count(&self) -> usize {
        self.run_count.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
