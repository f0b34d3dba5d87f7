//! Testing utilities for scuttle.
//!
//! - [`TestScheduler`]: a virtual clock. Work runs only when the test
//!   advances time, so delayed effects become deterministic.
//! - [`Recorder`]: subscribes an effect and records what it emits.
//!
//! ```
//! use scuttle_core::{CancellationRegistry, Effect};
//! use scuttle_testing::{Recorder, TestScheduler};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let scheduler = TestScheduler::new();
//! let registry = Arc::new(CancellationRegistry::new());
//! let recorder = Recorder::subscribe(
//!     &Effect::just(1).delay(Duration::from_secs(1), scheduler.clone()),
//!     &registry,
//! );
//!
//! assert!(recorder.values().is_empty());
//! scheduler.advance(Duration::from_secs(1));
//! assert_eq!(recorder.values(), vec![1]);
//! assert!(recorder.is_complete());
//! ```

use scuttle_core::{CancellationRegistry, Effect, Scheduler, Subscription, Work};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

// ============================================================================
// TestScheduler
// ============================================================================

struct Job {
    work: Work,
    handle: Subscription,
}

#[derive(Default)]
struct Clock {
    now: Duration,
    next_seq: u64,
    /// Keyed by (deadline, scheduling order).
    jobs: BTreeMap<(Duration, u64), Job>,
}

/// Virtual-time scheduler.
///
/// Work scheduled for the same instant runs in the order it was scheduled.
/// Work never runs while the clock is locked, so it may schedule more work
/// or cancel pending work.
#[derive(Clone, Default)]
pub struct TestScheduler {
    clock: Arc<Mutex<Clock>>,
}

impl TestScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since the scheduler was created.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of scheduled jobs that have not run yet.
    pub fn pending(&self) -> usize {
        self.lock().jobs.len()
    }

    /// Moves the clock forward by `by`, running all work that comes due.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        while let Some(job) = self.pop_due(Some(target)) {
            Self::run_job(job);
        }
        let mut clock = self.lock();
        if clock.now < target {
            clock.now = target;
        }
    }

    /// Runs until no work is pending, advancing the clock as needed.
    pub fn run(&self) {
        while let Some(job) = self.pop_due(None) {
            Self::run_job(job);
        }
    }

    fn pop_due(&self, until: Option<Duration>) -> Option<Job> {
        let mut clock = self.lock();
        let (&(deadline, seq), _) = clock.jobs.iter().next()?;
        if until.is_some_and(|until| deadline > until) {
            return None;
        }
        clock.now = clock.now.max(deadline);
        clock.jobs.remove(&(deadline, seq))
    }

    fn run_job(job: Job) {
        if job.handle.finish() {
            (job.work)();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for TestScheduler {
    fn schedule_after(&self, delay: Duration, work: Work) -> Subscription {
        let handle = Subscription::new();
        let key = {
            let mut clock = self.lock();
            let key = (clock.now + delay, clock.next_seq);
            clock.next_seq += 1;
            clock.jobs.insert(
                key,
                Job {
                    work,
                    handle: handle.clone(),
                },
            );
            key
        };

        let clock = self.clock.clone();
        handle.on_cancel(move || {
            trace!(deadline = ?key.0, "dropping cancelled work");
            // Dropped outside the lock: the job's closure may own sinks whose
            // drop touches other state.
            let removed = clock
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .jobs
                .remove(&key);
            drop(removed);
        });
        handle
    }
}

impl fmt::Debug for TestScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.lock();
        f.debug_struct("TestScheduler")
            .field("now", &clock.now)
            .field("pending", &clock.jobs.len())
            .finish()
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Records the values and completions of one subscription.
pub struct Recorder<T> {
    values: Arc<Mutex<Vec<T>>>,
    completions: Arc<AtomicUsize>,
    subscription: Subscription,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    /// Subscribes `effect` against `registry` and starts recording.
    pub fn subscribe(effect: &Effect<T>, registry: &Arc<CancellationRegistry>) -> Self {
        let values = Arc::new(Mutex::new(Vec::new()));
        let completions = Arc::new(AtomicUsize::new(0));

        let sink = values.clone();
        let done = completions.clone();
        let subscription = effect.subscribe_in(
            registry,
            move |value| {
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(value);
            },
            move || {
                done.fetch_add(1, Ordering::SeqCst);
            },
        );

        Self {
            values,
            completions,
            subscription,
        }
    }

    pub fn values(&self) -> Vec<T> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many times the completion callback ran. Never more than one.
    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.completions() > 0
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Disposes the recorded subscription.
    pub fn dispose(&self) {
        self.subscription.dispose();
    }
}

impl<T: fmt::Debug> fmt::Debug for Recorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("values", &self.values)
            .field("completions", &self.completions)
            .field("subscription", &self.subscription)
            .finish()
    }
}
