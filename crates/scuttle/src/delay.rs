//! Time-shifting operators.
//!
//! [`Effect::delay`] shifts every value and the completion by a fixed
//! duration. [`Effect::delay_subscription`] postpones subscribing the
//! upstream at all, which is how "cancel after a delay" is composed:
//!
//! ```ignore
//! Effect::<()>::cancel("search").delay_subscription(Duration::from_millis(300), scheduler)
//! ```

use crate::effect::{Effect, Sink};
use crate::scheduler::Scheduler;
use crate::subscription::{Subscription, Termination};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

enum Pending<T> {
    Value(T),
    Complete,
}

struct MailboxState<T> {
    queue: VecDeque<Pending<T>>,
    /// Deliveries whose timer has fired but which have not run yet.
    due: usize,
    draining: bool,
    /// Timers that have not fired yet, by scheduling order.
    timers: HashMap<u64, Subscription>,
    next_timer: u64,
}

/// Serializes delayed deliveries for one subscription.
///
/// Each timer firing releases exactly one queued event, oldest first, so
/// values keep their order even on schedulers that run timers in parallel.
/// Delivery happens with the lock released; a delivery that re-enters the
/// mailbox only bumps `due` and the active drainer picks it up.
struct Mailbox<T> {
    state: Mutex<MailboxState<T>>,
    sink: Sink<T>,
}

impl<T: Send + 'static> Mailbox<T> {
    fn new(sink: Sink<T>) -> Self {
        Self {
            state: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                due: 0,
                draining: false,
                timers: HashMap::new(),
                next_timer: 0,
            }),
            sink,
        }
    }

    fn push(&self, event: Pending<T>) {
        self.lock().queue.push_back(event);
    }

    fn release_one(&self) {
        {
            let mut state = self.lock();
            state.due += 1;
            if state.draining {
                return;
            }
            state.draining = true;
        }

        loop {
            let event = {
                let mut state = self.lock();
                if state.due == 0 {
                    state.draining = false;
                    return;
                }
                state.due -= 1;
                match state.queue.pop_front() {
                    Some(event) => event,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };

            match event {
                Pending::Value(value) => {
                    self.sink.send(value);
                }
                Pending::Complete => {
                    self.sink.complete();
                }
            }
        }
    }

    /// Cancels every timer that has not fired yet.
    fn cancel_timers(&self) {
        let timers = std::mem::take(&mut self.lock().timers);
        for timer in timers.into_values() {
            timer.cancel();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MailboxState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn schedule_release<T, S>(mailbox: &Arc<Mailbox<T>>, scheduler: &S, after: Duration)
where
    T: Send + 'static,
    S: Scheduler + ?Sized,
{
    let target = mailbox.clone();
    let task = scheduler.schedule_after(after, Box::new(move || target.release_one()));

    let slot = {
        let mut state = mailbox.lock();
        if !mailbox.sink.is_active() {
            None
        } else {
            let slot = state.next_timer;
            state.next_timer += 1;
            state.timers.insert(slot, task.clone());
            Some(slot)
        }
    };

    let Some(slot) = slot else {
        task.cancel();
        return;
    };

    // Runs right away if the timer already fired.
    let owner: Weak<Mailbox<T>> = Arc::downgrade(mailbox);
    task.on_terminate(move |_| {
        if let Some(owner) = owner.upgrade() {
            let removed = owner.lock().timers.remove(&slot);
            drop(removed);
        }
    });
}

impl<T: Send + 'static> Effect<T> {
    /// Delivers each value, and the completion, `after` later on `scheduler`.
    ///
    /// Cancelling the subscription drops deliveries that have not happened
    /// yet.
    pub fn delay<S: Scheduler>(self, after: Duration, scheduler: S) -> Effect<T> {
        let scheduler = Arc::new(scheduler);
        Effect::new(move |sink: Sink<T>| {
            let mailbox = Arc::new(Mailbox::new(sink.clone()));
            let pending = mailbox.clone();
            sink.on_cancel(move || pending.cancel_timers());

            let upstream = Subscription::new();
            let cascade = upstream.clone();
            sink.on_terminate(move |_| {
                cascade.cancel();
            });

            let (finished_into, finish_scheduler) = (mailbox.clone(), scheduler.clone());
            upstream.on_terminate(move |termination| {
                if termination == Termination::Finished {
                    finished_into.push(Pending::Complete);
                    schedule_release(&finished_into, &*finish_scheduler, after);
                }
            });

            let value_scheduler = scheduler.clone();
            self.start(sink.child(upstream, move |value| {
                mailbox.push(Pending::Value(value));
                schedule_release(&mailbox, &*value_scheduler, after);
            }));
        })
    }

    /// Subscribes the upstream only after `after` has elapsed on `scheduler`.
    ///
    /// Cancelling before then means the upstream never starts.
    pub fn delay_subscription<S: Scheduler>(self, after: Duration, scheduler: S) -> Effect<T> {
        let scheduler = Arc::new(scheduler);
        Effect::new(move |sink: Sink<T>| {
            let upstream = self.clone();
            let target = sink.clone();
            let task = scheduler.schedule_after(after, Box::new(move || upstream.start(target)));
            sink.on_cancel(move || {
                task.cancel();
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::CancellationRegistry;
    use crate::scheduler::{ImmediateScheduler, Scheduler, Work};
    use crate::subject::Subject;
    use crate::subscription::Subscription;
    use crate::Effect;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Holds scheduled work until `run_all`, keeping every timer handle.
    #[derive(Clone, Default)]
    struct RecordingScheduler {
        jobs: Arc<Mutex<Vec<(Subscription, Work)>>>,
    }

    impl RecordingScheduler {
        fn timers(&self) -> Vec<Subscription> {
            self.jobs.lock().unwrap().iter().map(|(h, _)| h.clone()).collect()
        }

        fn run_all(&self) {
            let jobs = std::mem::take(&mut *self.jobs.lock().unwrap());
            for (handle, work) in jobs {
                if handle.finish() {
                    work();
                }
            }
        }
    }

    impl Scheduler for RecordingScheduler {
        fn schedule_after(&self, _delay: Duration, work: Work) -> Subscription {
            let handle = Subscription::new();
            self.jobs.lock().unwrap().push((handle.clone(), work));
            handle
        }
    }

    #[test]
    fn test_delay_on_immediate_scheduler_keeps_order() {
        let registry = Arc::new(CancellationRegistry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let completions = Arc::new(AtomicUsize::new(0));
        let (sink, done) = (seen.clone(), completions.clone());

        Effect::from_iter([1, 2, 3])
            .delay(Duration::from_secs(1), ImmediateScheduler)
            .subscribe_in(
                &registry,
                move |v| sink.lock().unwrap().push(v),
                move || {
                    done.fetch_add(1, Ordering::SeqCst);
                },
            );

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reentrant_send_during_delayed_delivery() {
        let registry = Arc::new(CancellationRegistry::new());
        let subject = Subject::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let (sink, echo) = (seen.clone(), subject.clone());
        let _subscription = subject
            .effect()
            .delay(Duration::ZERO, ImmediateScheduler)
            .subscribe_in(
                &registry,
                move |v: i32| {
                    sink.lock().unwrap().push(v);
                    if v < 3 {
                        echo.send(v + 1);
                    }
                },
                || {},
            );

        subject.send(1);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_long_lived_delay_keeps_teardowns_bounded() {
        let registry = Arc::new(CancellationRegistry::new());
        let subject = Subject::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        let subscription = subject
            .effect()
            .delay(Duration::ZERO, ImmediateScheduler)
            .subscribe_in(
                &registry,
                move |_: i32| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                || {},
            );

        let before = subscription.teardown_count();
        for n in 0..10_000 {
            subject.send(n);
        }
        assert_eq!(seen.load(Ordering::SeqCst), 10_000);
        assert_eq!(subscription.teardown_count(), before);
    }

    #[test]
    fn test_cancel_drops_pending_timers() {
        let registry = Arc::new(CancellationRegistry::new());
        let subject = Subject::new();
        let scheduler = RecordingScheduler::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        let subscription = subject
            .effect()
            .delay(Duration::from_secs(1), scheduler.clone())
            .subscribe_in(
                &registry,
                move |_: i32| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                || {},
            );

        let before = subscription.teardown_count();
        subject.send(1);
        subject.send(2);
        assert_eq!(subscription.teardown_count(), before);

        subscription.dispose();
        assert!(scheduler.timers().iter().all(|timer| !timer.is_active()));
        scheduler.run_all();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_delay_subscription_starts_upstream_later() {
        let registry = Arc::new(CancellationRegistry::new());
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();

        Effect::<()>::fire_and_forget(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .delay_subscription(Duration::from_secs(1), ImmediateScheduler)
        .subscribe_in(&registry, |_| {}, || {});

        assert_eq!(started.load(Ordering::SeqCst), 1);
    }
}
