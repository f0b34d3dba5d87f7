//! The `merge` operator.
//!
//! A merged subscription owns one child subscription per input. Values are
//! forwarded as they arrive. The parent completes when the last child
//! terminates; cancelling the parent cancels every child still running.
//!
//! A child cancelled through the registry counts as completed: cancellation
//! is a silent completion everywhere in scuttle.

use crate::effect::{Effect, Sink};
use crate::subscription::Subscription;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

impl<T: Send + 'static> Effect<T> {
    /// Runs all `effects` concurrently as one effect.
    pub fn merge<I>(effects: I) -> Effect<T>
    where
        I: IntoIterator<Item = Effect<T>>,
    {
        let effects: Arc<[Effect<T>]> = effects.into_iter().collect();
        Effect::new(move |sink: Sink<T>| {
            if effects.is_empty() {
                sink.complete();
                return;
            }

            let remaining = Arc::new(AtomicUsize::new(effects.len()));
            for effect in effects.iter() {
                if !sink.is_active() {
                    break;
                }

                let child = Subscription::new();

                let parent = sink.clone();
                let remaining = remaining.clone();
                child.on_terminate(move |_| {
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        parent.complete();
                    }
                });

                let cascade = child.clone();
                sink.on_terminate(move |_| {
                    cascade.cancel();
                });

                let forward = sink.clone();
                effect.start(sink.child(child, move |value| {
                    forward.send(value);
                }));
            }
        })
    }

    /// Merges this effect with one other.
    pub fn merge_with(self, other: Effect<T>) -> Effect<T> {
        Effect::merge([self, other])
    }
}
