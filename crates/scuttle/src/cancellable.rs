//! The `cancellable` operator.
//!
//! Wrapping an effect with [`Effect::cancellable`] gives each of its
//! subscriptions a scope handle registered under an id. The scope leaves the
//! registry exactly once, whichever comes first:
//!
//! - the inner effect completes,
//! - `cancel(id)` reaches the scope through the registry,
//! - the downstream subscription is disposed.
//!
//! Cancellation is silent: downstream sees an ordinary completion.

use crate::effect::{Effect, Sink};
use crate::id::EffectId;
use crate::subscription::Subscription;

impl<T: Send + 'static> Effect<T> {
    /// Makes every subscription of this effect cancellable by `id`.
    ///
    /// With `cancel_in_flight`, subscribing first cancels whatever is
    /// already running under `id`, so the new subscription replaces it.
    pub fn cancellable(self, id: impl Into<EffectId>, cancel_in_flight: bool) -> Effect<T> {
        let id = id.into();
        Effect::new(move |sink: Sink<T>| {
            let registry = sink.registry().clone();
            if cancel_in_flight {
                registry.cancel_all(&id);
            }

            let scope = Subscription::new();

            // Teardowns run in reverse order: the inner producer's cleanup
            // first, then unregistration, then the downstream completion.
            let downstream = sink.clone();
            scope.on_terminate(move |_| {
                downstream.complete();
            });
            let (slot, owner, member) = (id.clone(), registry.clone(), scope.clone());
            scope.on_terminate(move |_| owner.unregister(&slot, &member));

            let cascade = scope.clone();
            sink.on_terminate(move |_| {
                cascade.cancel();
            });

            // Registered before the inner effect starts, so a producer that
            // completes synchronously still unregisters.
            registry.register(id.clone(), scope.clone());

            let forward = sink.clone();
            self.start(sink.child(scope, move |value| {
                forward.send(value);
            }));
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::CancellationRegistry;
    use crate::subject::Subject;
    use crate::subscription::Termination;
    use crate::{Effect, EffectId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Hash, PartialEq, Eq)]
    struct CancelToken;

    fn token() -> EffectId {
        EffectId::new(CancelToken)
    }

    #[test]
    fn test_synchronous_completion_unregisters() {
        let registry = Arc::new(CancellationRegistry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        Effect::just(1)
            .cancellable(1, false)
            .subscribe_in(&registry, move |v| sink.lock().unwrap().push(v), || {});

        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registered_while_running() {
        let registry = Arc::new(CancellationRegistry::new());
        let subject = Subject::<i32>::new();

        let subscription = subject
            .effect()
            .cancellable(token(), false)
            .subscribe_in(&registry, |_| {}, || {});
        assert_eq!(registry.active_count(&token()), 1);

        subject.finish();
        assert_eq!(subscription.termination(), Some(Termination::Finished));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dispose_unregisters_and_stops_values() {
        let registry = Arc::new(CancellationRegistry::new());
        let subject = Subject::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let completions = Arc::new(AtomicUsize::new(0));
        let sink = seen.clone();
        let done = completions.clone();

        let subscription = subject.effect().cancellable(token(), false).subscribe_in(
            &registry,
            move |v| sink.lock().unwrap().push(v),
            move || {
                done.fetch_add(1, Ordering::SeqCst);
            },
        );

        subject.send(1);
        subscription.dispose();
        subject.send(2);

        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(subject.subscriber_count(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_cancel_completes_downstream_silently() {
        let registry = Arc::new(CancellationRegistry::new());
        let subject = Subject::<i32>::new();
        let completions = Arc::new(AtomicUsize::new(0));
        let done = completions.clone();

        let subscription = subject.effect().cancellable(token(), false).subscribe_in(
            &registry,
            |_| {},
            move || {
                done.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert_eq!(registry.cancel_all(&token()), 1);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        // Downstream sees a completion, not a cancellation.
        assert_eq!(subscription.termination(), Some(Termination::Finished));
        assert_eq!(subject.subscriber_count(), 0);
    }

    #[test]
    fn test_without_cancel_in_flight_subscriptions_accumulate() {
        let registry = Arc::new(CancellationRegistry::new());
        let subject = Subject::<i32>::new();
        let effect = subject.effect().cancellable("id", false);

        let first = effect.subscribe_in(&registry, |_| {}, || {});
        let second = effect.subscribe_in(&registry, |_| {}, || {});

        assert!(first.is_active());
        assert!(second.is_active());
        assert_eq!(registry.active_count(&"id".into()), 2);
    }

    #[test]
    fn test_cancel_in_flight_replaces_previous() {
        let registry = Arc::new(CancellationRegistry::new());
        let subject = Subject::<i32>::new();
        let effect = subject.effect().cancellable("id", true);

        let first = effect.subscribe_in(&registry, |_| {}, || {});
        let second = effect.subscribe_in(&registry, |_| {}, || {});

        assert!(!first.is_active());
        assert!(second.is_active());
        assert_eq!(registry.active_count(&"id".into()), 1);
        assert_eq!(subject.subscriber_count(), 1);
    }

    #[test]
    fn test_nested_wraps_leave_registry_empty() {
        let registry = Arc::new(CancellationRegistry::new());
        let mut effect = Effect::<()>::never().cancellable(1, false);
        for _ in 0..fastrand::usize(1..=100) {
            effect = effect.cancellable(1, false);
        }

        let subscription = effect.subscribe_in(&registry, |_| {}, || {});
        assert!(registry.contains(&EffectId::from(1)));

        subscription.dispose();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_double_wrap_cancelled_by_id() {
        let registry = Arc::new(CancellationRegistry::new());
        let subject = Subject::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let _subscription = subject
            .effect()
            .cancellable(token(), false)
            .cancellable(token(), false)
            .subscribe_in(&registry, move |v| sink.lock().unwrap().push(v), || {});

        subject.send(1);
        registry.cancel_all(&token());
        subject.send(2);

        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert!(registry.is_empty());
    }
}
