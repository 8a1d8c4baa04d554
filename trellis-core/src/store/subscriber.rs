//! Subscriber Registry
//!
//! An ordered list of change callbacks, notified after every committed
//! dispatch.
//!
//! # How Notification Works
//!
//! 1. The registry clones the current list of entries (a cheap snapshot of
//!    `Arc`s) and releases its lock.
//!
//! 2. Each entry still marked active is called in registration order with
//!    the new state.
//!
//! 3. A callback that returns an error or panics is recorded and the loop
//!    moves on to the next one.
//!
//! Because the loop runs over a snapshot, callbacks may subscribe or
//! unsubscribe freely. A subscriber added mid-notification first runs on the
//! next dispatch. A subscriber removed mid-notification is skipped if it had
//! not been reached yet, and never runs twice.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::error::{panic_message, BoxError, SubscriberError};

/// Unique identifier for a subscriber.
///
/// Each subscription (plain callback or watch) gets a unique ID when
/// registered. IDs are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber#{}", self.0)
    }
}

/// Type-erased change callback.
pub(crate) type Callback<S> = Box<dyn Fn(&Arc<S>) -> Result<(), BoxError> + Send + Sync>;

struct Entry<S> {
    id: SubscriberId,
    active: AtomicBool,
    callback: Callback<S>,
}

/// Ordered collection of change callbacks.
pub(crate) struct SubscriberRegistry<S> {
    entries: RwLock<Vec<Arc<Entry<S>>>>,
}

impl<S> SubscriberRegistry<S> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Append a callback.
    pub(crate) fn add(&self, callback: Callback<S>) -> SubscriberId {
        let id = SubscriberId::new();
        self.entries.write().push(Arc::new(Entry {
            id,
            active: AtomicBool::new(true),
            callback,
        }));
        id
    }

    /// Remove a callback. Returns `false` if it was already gone.
    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        let mut entries = self.entries.write();
        match entries.iter().position(|entry| entry.id == id) {
            Some(index) => {
                let entry = entries.remove(index);
                entry.active.store(false, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Call every active callback with `state`.
    ///
    /// Returns how many callbacks were invoked and the failures among them.
    pub(crate) fn notify(&self, state: &Arc<S>) -> (usize, Vec<SubscriberError>) {
        let snapshot: SmallVec<[Arc<Entry<S>>; 8]> = self.entries.read().iter().cloned().collect();

        let mut notified = 0;
        let mut errors = Vec::new();

        for entry in snapshot {
            if !entry.active.load(Ordering::SeqCst) {
                continue;
            }
            notified += 1;

            match catch_unwind(AssertUnwindSafe(|| (entry.callback)(state))) {
                Ok(Ok(())) => {}
                Ok(Err(source)) => errors.push(SubscriberError::Failed {
                    id: entry.id,
                    source,
                }),
                Err(payload) => errors.push(SubscriberError::Panicked {
                    id: entry.id,
                    message: panic_message(payload.as_ref()),
                }),
            }
        }

        (notified, errors)
    }
}

/// Removal hook held weakly by a [`Subscription`].
pub(crate) trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: SubscriberId) -> bool;
}

impl<S> Unsubscribe for SubscriberRegistry<S>
where
    S: Send + Sync,
{
    fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.remove(id)
    }
}

/// Handle to a registered callback.
///
/// Dropping a `Subscription` does **not** unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe) or convert it with
/// [`into_guard`](Self::into_guard). A forgotten subscription keeps its
/// callback alive for as long as the store lives.
#[must_use = "dropping a Subscription keeps the callback registered"]
pub struct Subscription {
    id: SubscriberId,
    registry: Weak<dyn Unsubscribe>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, registry: Weak<dyn Unsubscribe>) -> Self {
        Self { id, registry }
    }

    /// The subscriber's ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove the callback from the store.
    ///
    /// Safe to call from inside a notification and safe to call more than
    /// once. Returns `true` only for the call that actually removed it.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.unsubscribe(self.id),
            None => false,
        }
    }

    /// Turn this handle into a guard that unsubscribes when dropped.
    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard { subscription: self }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("store_alive", &(self.registry.strong_count() > 0))
            .finish()
    }
}

/// Scoped subscription; see [`Subscription::into_guard`].
#[derive(Debug)]
#[must_use = "dropping a SubscriptionGuard unsubscribes immediately"]
pub struct SubscriptionGuard {
    subscription: Subscription,
}

impl SubscriptionGuard {
    /// The ID of the guarded subscriber.
    pub fn id(&self) -> SubscriberId {
        self.subscription.id()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    fn counting(counter: &Arc<AtomicI32>) -> Callback<i32> {
        let counter = Arc::clone(counter);
        Box::new(move |_: &Arc<i32>| -> Result<(), BoxError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn notify_runs_in_registration_order() {
        let registry = SubscriberRegistry::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            registry.add(Box::new(move |_: &Arc<i32>| -> Result<(), BoxError> {
                order.lock().push(label);
                Ok(())
            }));
        }

        let (notified, errors) = registry.notify(&Arc::new(1));
        assert_eq!(notified, 3);
        assert!(errors.is_empty());
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn failures_do_not_stop_other_subscribers() {
        let registry = SubscriberRegistry::new();
        let count = Arc::new(AtomicI32::new(0));

        let failing = registry.add(Box::new(|_: &Arc<i32>| -> Result<(), BoxError> {
            Err("boom".into())
        }));
        let panicking = registry.add(Box::new(|_: &Arc<i32>| -> Result<(), BoxError> {
            panic!("kaboom")
        }));
        registry.add(counting(&count));

        let (notified, errors) = registry.notify(&Arc::new(1));

        assert_eq!(notified, 3);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].subscriber(), failing);
        assert!(matches!(
            &errors[1],
            SubscriberError::Panicked { id, message } if *id == panicking && message == "kaboom"
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SubscriberRegistry::<i32>::new();
        let count = Arc::new(AtomicI32::new(0));
        let id = registry.add(counting(&count));

        assert_eq!(registry.len(), 1);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.len(), 0);

        registry.notify(&Arc::new(1));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn removal_during_notify_skips_pending_entry() {
        let registry = Arc::new(SubscriberRegistry::<i32>::new());
        let count = Arc::new(AtomicI32::new(0));

        // Reserve the ID of the second subscriber before the first exists.
        let victim = Arc::new(parking_lot::Mutex::new(None::<SubscriberId>));

        let registry_clone = Arc::clone(&registry);
        let victim_clone = Arc::clone(&victim);
        registry.add(Box::new(move |_: &Arc<i32>| -> Result<(), BoxError> {
            if let Some(id) = *victim_clone.lock() {
                registry_clone.remove(id);
            }
            Ok(())
        }));
        *victim.lock() = Some(registry.add(counting(&count)));

        let (notified, _) = registry.notify(&Arc::new(1));
        assert_eq!(notified, 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn addition_during_notify_waits_for_next_round() {
        let registry = Arc::new(SubscriberRegistry::<i32>::new());
        let count = Arc::new(AtomicI32::new(0));

        let registry_clone = Arc::clone(&registry);
        let count_clone = Arc::clone(&count);
        let added = Arc::new(AtomicBool::new(false));
        registry.add(Box::new(move |_: &Arc<i32>| -> Result<(), BoxError> {
            if !added.swap(true, Ordering::SeqCst) {
                registry_clone.add(counting(&count_clone));
            }
            Ok(())
        }));

        assert_eq!(registry.notify(&Arc::new(1)).0, 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert_eq!(registry.notify(&Arc::new(2)).0, 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_unsubscribes_on_drop() {
        let registry = Arc::new(SubscriberRegistry::<i32>::new());
        let count = Arc::new(AtomicI32::new(0));
        let id = registry.add(counting(&count));

        let weak: Weak<dyn Unsubscribe> = Arc::downgrade(&registry) as Weak<dyn Unsubscribe>;
        let guard = Subscription::new(id, weak).into_guard();
        assert_eq!(guard.id(), id);
        assert_eq!(registry.len(), 1);

        drop(guard);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn subscription_outliving_registry_is_inert() {
        let registry = Arc::new(SubscriberRegistry::<i32>::new());
        let id = registry.add(Box::new(|_: &Arc<i32>| -> Result<(), BoxError> { Ok(()) }));
        let weak: Weak<dyn Unsubscribe> = Arc::downgrade(&registry) as Weak<dyn Unsubscribe>;
        let subscription = Subscription::new(id, weak);

        drop(registry);
        assert!(!subscription.unsubscribe());
    }
}
