//! Subscription handles.
//!
//! A [`Subscription`] is the live instance produced by subscribing an
//! [`Effect`](crate::Effect). It owns a single state cell that moves from
//! active to terminated exactly once, either through [`Subscription::finish`]
//! (the producer completed) or [`Subscription::cancel`] (someone asked it to
//! stop). Both paths may race; exactly one wins and runs the teardown
//! callbacks.
//!
//! Teardowns run outside of every lock, in reverse registration order, so a
//! teardown may freely cancel other subscriptions or touch the registry.

use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

const ACTIVE: u8 = 0;
const FINISHED: u8 = 1;
const CANCELLED: u8 = 2;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// How a subscription reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The producer completed on its own.
    Finished,
    /// The subscription was cancelled or disposed before completing.
    Cancelled,
}

type Teardown = Box<dyn FnOnce(Termination) + Send>;

struct Inner {
    key: u64,
    state: AtomicU8,
    teardowns: Mutex<SmallVec<[Teardown; 4]>>,
}

/// Handle to one running effect instance.
///
/// Clones share the same state; cancelling any clone cancels them all.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<Inner>,
}

impl Subscription {
    /// Creates a fresh, active subscription with no teardowns.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                key: NEXT_KEY.fetch_add(1, Ordering::Relaxed),
                state: AtomicU8::new(ACTIVE),
                teardowns: Mutex::new(SmallVec::new()),
            }),
        }
    }

    /// Creates a subscription that has already finished.
    pub fn finished() -> Self {
        let subscription = Self::new();
        subscription.finish();
        subscription
    }

    /// Process-unique key identifying this subscription.
    pub fn key(&self) -> u64 {
        self.inner.key
    }

    /// Returns `true` until the subscription finishes or is cancelled.
    pub fn is_active(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == ACTIVE
    }

    /// Returns how the subscription terminated, if it has.
    pub fn termination(&self) -> Option<Termination> {
        match self.inner.state.load(Ordering::Acquire) {
            FINISHED => Some(Termination::Finished),
            CANCELLED => Some(Termination::Cancelled),
            _ => None,
        }
    }

    /// Marks the subscription cancelled.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn cancel(&self) -> bool {
        self.terminate(CANCELLED)
    }

    /// Marks the subscription finished.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn finish(&self) -> bool {
        self.terminate(FINISHED)
    }

    /// Caller-initiated unsubscribe. Takes the same path as [`cancel`](Self::cancel).
    pub fn dispose(&self) {
        self.cancel();
    }

    /// Registers a callback to run when the subscription terminates.
    ///
    /// If the subscription has already terminated the callback runs
    /// immediately on the calling thread.
    pub fn on_terminate<F>(&self, teardown: F)
    where
        F: FnOnce(Termination) + Send + 'static,
    {
        {
            let mut teardowns = self
                .inner
                .teardowns
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.is_active() {
                teardowns.push(Box::new(teardown));
                return;
            }
        }

        if let Some(termination) = self.termination() {
            teardown(termination);
        }
    }

    /// Registers a callback that only runs if the subscription is cancelled.
    pub fn on_cancel<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_terminate(move |termination| {
            if termination == Termination::Cancelled {
                teardown();
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn teardown_count(&self) -> usize {
        self.inner
            .teardowns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Wraps the subscription so dropping the guard disposes it.
    #[must_use = "dropping the guard disposes the subscription immediately"]
    pub fn guard(self) -> SubscriptionGuard {
        SubscriptionGuard(Some(self))
    }

    /// Moves the subscription into a set that disposes its members on drop.
    pub fn store(self, set: &mut SubscriptionSet) {
        set.insert(self);
    }

    fn terminate(&self, target: u8) -> bool {
        if self
            .inner
            .state
            .compare_exchange(ACTIVE, target, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // Taken after the state flip: any `on_terminate` racing with us either
        // pushed before this lock (and is drained here) or observes the new
        // state and runs its callback itself.
        let teardowns = std::mem::take(
            &mut *self
                .inner
                .teardowns
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let termination = if target == CANCELLED {
            Termination::Cancelled
        } else {
            Termination::Finished
        };
        for teardown in teardowns.into_iter().rev() {
            teardown(termination);
        }
        true
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.inner.key == other.inner.key
    }
}

impl Eq for Subscription {}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.inner.key)
            .field("termination", &self.termination())
            .finish()
    }
}

/// Disposes the wrapped subscription when dropped.
#[derive(Debug)]
pub struct SubscriptionGuard(Option<Subscription>);

impl SubscriptionGuard {
    /// Releases the subscription without disposing it.
    pub fn disarm(mut self) -> Subscription {
        self.0.take().unwrap_or_default()
    }

    /// The guarded subscription.
    pub fn subscription(&self) -> Option<&Subscription> {
        self.0.as_ref()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(subscription) = self.0.take() {
            subscription.dispose();
        }
    }
}

/// A bag of subscriptions disposed together on [`clear`](Self::clear) or drop.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subscription: Subscription) {
        self.subscriptions.retain(Subscription::is_active);
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Disposes every stored subscription.
    pub fn clear(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.dispose();
        }
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce(Termination) + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = count.clone();
        (count, move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_first_terminal_action_wins() {
        let subscription = Subscription::new();
        let (count, teardown) = counter();
        subscription.on_terminate(teardown);

        assert!(subscription.finish());
        assert!(!subscription.cancel());
        assert!(!subscription.finish());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(subscription.termination(), Some(Termination::Finished));
    }

    #[test]
    fn test_teardowns_run_in_reverse_order() {
        let subscription = Subscription::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            subscription.on_terminate(move |_| order.lock().unwrap().push(n));
        }

        subscription.cancel();
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn test_late_teardown_runs_immediately() {
        let subscription = Subscription::new();
        subscription.cancel();

        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        subscription.on_terminate(move |t| *slot.lock().unwrap() = Some(t));

        assert_eq!(*seen.lock().unwrap(), Some(Termination::Cancelled));
    }

    #[test]
    fn test_on_cancel_skips_finished() {
        let subscription = Subscription::new();
        let (count, teardown) = counter();
        subscription.on_cancel(move || teardown(Termination::Cancelled));

        subscription.finish();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_teardown_may_cancel_another_subscription() {
        let first = Subscription::new();
        let second = Subscription::new();
        let other = second.clone();
        first.on_terminate(move |_| {
            other.cancel();
        });

        first.cancel();
        assert_eq!(second.termination(), Some(Termination::Cancelled));
    }

    #[test]
    fn test_racing_cancel_and_finish_tear_down_once() {
        for _ in 0..200 {
            let subscription = Subscription::new();
            let (count, teardown) = counter();
            subscription.on_terminate(teardown);

            let a = subscription.clone();
            let b = subscription.clone();
            let t1 = thread::spawn(move || a.cancel());
            let t2 = thread::spawn(move || b.finish());
            let won = [t1.join().unwrap(), t2.join().unwrap()];

            assert_eq!(won.iter().filter(|w| **w).count(), 1);
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_guard_disposes_on_drop() {
        let subscription = Subscription::new();
        drop(subscription.clone().guard());
        assert_eq!(subscription.termination(), Some(Termination::Cancelled));

        let kept = Subscription::new();
        let released = kept.clone().guard().disarm();
        assert!(released.is_active());
    }

    #[test]
    fn test_set_clear_disposes_members() {
        let mut set = SubscriptionSet::new();
        let a = Subscription::new();
        let b = Subscription::new();
        a.clone().store(&mut set);
        b.clone().store(&mut set);
        assert_eq!(set.len(), 2);

        set.clear();
        assert!(set.is_empty());
        assert!(!a.is_active());
        assert!(!b.is_active());
    }
}
