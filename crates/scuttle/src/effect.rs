//! Effects and sinks.
//!
//! An [`Effect`] is a description of how to start a producer, not a running
//! computation. Subscribing it creates a fresh [`Subscription`] and hands the
//! producer a [`Sink`] bound to that subscription. The producer pushes values
//! with [`Sink::send`], signals completion with [`Sink::complete`], and hooks
//! its own cleanup with [`Sink::on_cancel`].
//!
//! A sink stops delivering the moment its subscription terminates, so a value
//! sent after cancellation is dropped. Every subscriber gets exactly one
//! completion callback, whether the producer finished or was cancelled.
//!
//! ```
//! use scuttle_core::{CancellationRegistry, Effect};
//! use std::sync::{Arc, Mutex};
//!
//! let registry = Arc::new(CancellationRegistry::new());
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//!
//! let _subscription = Effect::from_iter([1, 2, 3])
//!     .map(|n| n * 10)
//!     .subscribe_in(&registry, move |n| sink.lock().unwrap().push(n), || {});
//!
//! assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30]);
//! ```

use crate::registry::CancellationRegistry;
use crate::subscription::{Subscription, Termination};
use std::fmt;
use std::sync::Arc;

type Start<T> = Arc<dyn Fn(Sink<T>) + Send + Sync>;
type Deliver<T> = Arc<dyn Fn(T) + Send + Sync>;

// ============================================================================
// Sink
// ============================================================================

/// The producer's side of one subscription.
pub struct Sink<T> {
    handle: Subscription,
    deliver: Deliver<T>,
    registry: Arc<CancellationRegistry>,
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            deliver: self.deliver.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<T: Send + 'static> Sink<T> {
    pub(crate) fn new<F>(
        handle: Subscription,
        registry: Arc<CancellationRegistry>,
        deliver: F,
    ) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            handle,
            deliver: Arc::new(deliver),
            registry,
        }
    }

    /// Delivers a value downstream.
    ///
    /// Returns `false` without delivering once the subscription has
    /// terminated.
    pub fn send(&self, value: T) -> bool {
        if !self.handle.is_active() {
            return false;
        }
        (self.deliver)(value);
        true
    }

    /// Signals normal completion.
    ///
    /// Returns `false` if the subscription had already terminated.
    pub fn complete(&self) -> bool {
        self.handle.finish()
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    /// Runs `teardown` only if the subscription is cancelled.
    pub fn on_cancel<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.on_cancel(teardown);
    }

    /// Runs `teardown` however the subscription terminates.
    pub fn on_terminate<F>(&self, teardown: F)
    where
        F: FnOnce(Termination) + Send + 'static,
    {
        self.handle.on_terminate(teardown);
    }

    /// The subscription this sink delivers for.
    pub fn handle(&self) -> &Subscription {
        &self.handle
    }

    /// The registry every operator of this subscription chain shares.
    pub fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }

    /// A sink with its own subscription that forwards into this one.
    ///
    /// The child is not linked to the parent's lifecycle; operators wire that
    /// up themselves.
    pub(crate) fn child<U, F>(&self, handle: Subscription, deliver: F) -> Sink<U>
    where
        U: Send + 'static,
        F: Fn(U) + Send + Sync + 'static,
    {
        Sink::new(handle, self.registry.clone(), deliver)
    }

    /// A sink on the same subscription that transforms values first.
    fn contramap<U, F>(&self, transform: F) -> Sink<U>
    where
        U: Send + 'static,
        F: Fn(U) -> T + Send + Sync + 'static,
    {
        let downstream = self.clone();
        Sink::new(self.handle.clone(), self.registry.clone(), move |value| {
            downstream.send(transform(value));
        })
    }
}

impl<T> fmt::Debug for Sink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink").field("handle", &self.handle).finish()
    }
}

// ============================================================================
// Effect
// ============================================================================

/// A description of an asynchronous producer of zero or more values followed
/// by one completion.
pub struct Effect<T> {
    start: Start<T>,
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            start: self.start.clone(),
        }
    }
}

impl<T> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Effect<T> {
    /// Builds an effect from a producer.
    ///
    /// `start` runs once per subscription. It may emit synchronously, or
    /// move the sink to another thread or timer and emit later.
    pub fn new<F>(start: F) -> Self
    where
        F: Fn(Sink<T>) + Send + Sync + 'static,
    {
        Self {
            start: Arc::new(start),
        }
    }

    /// Completes immediately without emitting.
    pub fn none() -> Self {
        Self::new(|sink| {
            sink.complete();
        })
    }

    /// Never emits and never completes on its own.
    pub fn never() -> Self {
        Self::new(|_sink| {})
    }

    /// Emits one value, then completes.
    pub fn just(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::new(move |sink| {
            sink.send(value.clone());
            sink.complete();
        })
    }

    /// Emits each value in order, then completes.
    ///
    /// Stops early if the subscription is cancelled mid-way.
    pub fn from_iter<I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Clone + Sync,
    {
        let values: Arc<[T]> = values.into_iter().collect();
        Self::new(move |sink| {
            for value in values.iter() {
                if !sink.send(value.clone()) {
                    return;
                }
            }
            sink.complete();
        })
    }

    /// Builds the effect lazily, once per subscription.
    pub fn deferred<F>(make: F) -> Self
    where
        F: Fn() -> Effect<T> + Send + Sync + 'static,
    {
        Self::new(move |sink| make().start(sink))
    }

    /// Runs `work` on subscription and completes without emitting.
    pub fn fire_and_forget<F>(work: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::new(move |sink| {
            work();
            sink.complete();
        })
    }

    /// Transforms every value.
    pub fn map<U, F>(self, transform: F) -> Effect<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let transform = Arc::new(transform);
        Effect::new(move |sink: Sink<U>| {
            let transform = transform.clone();
            self.start(sink.contramap(move |value| transform(value)));
        })
    }

    /// Starts the producer on an existing sink.
    pub(crate) fn start(&self, sink: Sink<T>) {
        if sink.is_active() {
            (self.start)(sink);
        }
    }

    /// Subscribes against an explicit registry.
    ///
    /// Every `cancellable` and `cancel` in this chain resolves ids against
    /// `registry`. `on_complete` runs exactly once when the subscription
    /// finishes or is cancelled, after all of its teardowns.
    pub fn subscribe_in<V, C>(
        &self,
        registry: &Arc<CancellationRegistry>,
        on_value: V,
        on_complete: C,
    ) -> Subscription
    where
        V: Fn(T) + Send + Sync + 'static,
        C: FnOnce() + Send + 'static,
    {
        let handle = Subscription::new();
        // Registered first so it runs last.
        handle.on_terminate(move |_| on_complete());
        self.start(Sink::new(handle.clone(), registry.clone(), on_value));
        handle
    }

    /// Subscribes against the global registry.
    pub fn subscribe<V, C>(&self, on_value: V, on_complete: C) -> Subscription
    where
        V: Fn(T) + Send + Sync + 'static,
        C: FnOnce() + Send + 'static,
    {
        self.subscribe_in(&CancellationRegistry::global(), on_value, on_complete)
    }
}
