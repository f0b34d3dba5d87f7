//! Schedulers: where delayed work runs.
//!
//! Operators that need time take any [`Scheduler`]. The core ships a
//! tokio-backed scheduler and an immediate one; `scuttle-testing` provides a
//! virtual-time scheduler for deterministic tests.

use crate::effect::Effect;
use crate::error::{Result, ScuttleError};
use crate::subscription::Subscription;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::trace;

/// A unit of scheduled work.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Runs work now or after a delay.
///
/// The returned subscription represents the scheduled work: cancelling it
/// before the work runs guarantees the work never runs. It finishes when
/// the work starts.
pub trait Scheduler: Send + Sync + 'static {
    fn schedule_after(&self, delay: Duration, work: Work) -> Subscription;

    fn schedule(&self, work: Work) -> Subscription {
        self.schedule_after(Duration::ZERO, work)
    }
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn schedule_after(&self, delay: Duration, work: Work) -> Subscription {
        (**self).schedule_after(delay, work)
    }
}

// ============================================================================
// Tokio
// ============================================================================

/// Schedules work as tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime the caller is running on.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| ScuttleError::NoRuntime)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, work: Work) -> Subscription {
        let scheduled = Subscription::new();
        let task = scheduled.clone();
        let join = self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if task.finish() {
                work();
            }
        });
        scheduled.on_cancel(move || {
            trace!(?delay, "dropping cancelled work");
            join.abort();
        });
        scheduled
    }
}

// ============================================================================
// Immediate
// ============================================================================

/// Runs work synchronously on the calling thread, ignoring delays.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule_after(&self, _delay: Duration, work: Work) -> Subscription {
        let scheduled = Subscription::new();
        scheduled.finish();
        work();
        scheduled
    }
}

// ============================================================================
// Future-backed effects
// ============================================================================

impl<T: Send + 'static> Effect<T> {
    /// Runs a future per subscription on the scheduler's runtime, emits its
    /// output and completes. Cancelling aborts the task.
    pub fn task<F, Fut>(scheduler: &TokioScheduler, make: F) -> Effect<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let handle = scheduler.handle.clone();
        Effect::new(move |sink| {
            let future = make();
            let target = sink.clone();
            let join = handle.spawn(async move {
                let value = future.await;
                target.send(value);
                target.complete();
            });
            sink.on_cancel(move || join.abort());
        })
    }
}
