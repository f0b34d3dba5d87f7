//! A passthrough subject: push values into every current subscriber.

use crate::effect::{Effect, Sink};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct SubjectState<T> {
    subscribers: Vec<Sink<T>>,
    finished: bool,
}

/// Multicasts values sent to it to every active subscriber of its effect.
///
/// Subscribers only see values sent after they subscribed. Once finished,
/// current subscribers complete and new ones complete immediately.
pub struct Subject<T> {
    state: Arc<Mutex<SubjectState<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Subject<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SubjectState {
                subscribers: Vec::new(),
                finished: false,
            })),
        }
    }

    /// Sends `value` to every current subscriber.
    pub fn send(&self, value: T) {
        let subscribers = self.lock().subscribers.clone();
        for subscriber in subscribers {
            subscriber.send(value.clone());
        }
    }

    /// Completes every current and future subscriber.
    pub fn finish(&self) {
        let subscribers = {
            let mut state = self.lock();
            state.finished = true;
            std::mem::take(&mut state.subscribers)
        };
        for subscriber in subscribers {
            subscriber.complete();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// The subject as an effect.
    pub fn effect(&self) -> Effect<T> {
        let state = self.state.clone();
        Effect::new(move |sink: Sink<T>| {
            {
                let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
                if !guard.finished {
                    guard.subscribers.push(sink.clone());
                    drop(guard);

                    let key = sink.handle().key();
                    let state = state.clone();
                    sink.on_terminate(move |_| {
                        state
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .subscribers
                            .retain(|s| s.handle().key() != key);
                    });
                    return;
                }
            }
            sink.complete();
        })
    }

    fn lock(&self) -> MutexGuard<'_, SubjectState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}
