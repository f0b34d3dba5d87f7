//! # Scuttle
//!
//! Identifier-scoped cancellation for asynchronous effects.
//!
//! ## Core Concepts
//!
//! - [`Effect`] = a description of a producer (zero or more values, then one completion)
//! - [`Subscription`] = one running instance of an effect
//! - [`EffectId`] = a tag grouping subscriptions for mass cancellation
//! - [`CancellationRegistry`] = which subscriptions are running under which id
//!
//! The key principle: **every subscription terminates exactly once**. Completion,
//! cancellation by id and disposal all race to the same state cell; one wins,
//! the others are no-ops.
//!
//! ## Architecture
//!
//! ```text
//! effect.cancellable(id, cancel_in_flight)
//!     │
//!     ▼ subscribe_in(&registry, ..)
//! Subscription (outer) ◄──────────── dispose()
//!     │
//!     ├─► cancel_in_flight? ─► registry.cancel_all(id)
//!     │
//!     ├─► scope = Subscription::new()
//!     │       │
//!     │       ▼ register(id, scope)
//!     │   CancellationRegistry ◄──────── Effect::cancel(id)
//!     │       │                               │
//!     │       │                               ▼ cancel_all(id)
//!     │       │                          scope.cancel()
//!     │       ▼
//!     └─► inner.start(sink bound to scope)
//!             │
//!             ├─► send(v) ─► outer (while scope active)
//!             └─► complete() ─► unregister ─► outer completes
//! ```
//!
//! ## Key Invariants
//!
//! 1. **An id is registered only while one of its subscriptions is active**
//! 2. **No terminated subscription stays in the registry**
//! 3. **No value is delivered after cancellation takes effect**
//! 4. **Cancellation is silent** - subscribers see an ordinary completion
//! 5. **No callback runs under a lock** - teardowns may re-enter the registry
//!
//! ## Example
//!
//! ```
//! use scuttle_core::{CancellationRegistry, Effect, Subject};
//! use std::sync::{Arc, Mutex};
//!
//! let registry = Arc::new(CancellationRegistry::new());
//! let subject = Subject::new();
//! let values = Arc::new(Mutex::new(Vec::new()));
//!
//! let sink = values.clone();
//! let _subscription = subject
//!     .effect()
//!     .cancellable("search", false)
//!     .subscribe_in(&registry, move |v| sink.lock().unwrap().push(v), || {});
//!
//! subject.send(1);
//! Effect::<()>::cancel("search").subscribe_in(&registry, |_| {}, || {});
//! subject.send(2);
//!
//! assert_eq!(*values.lock().unwrap(), vec![1]);
//! assert!(registry.is_empty());
//! ```
//!
//! ## What This Is Not
//!
//! Scuttle is **not** a reactive-streams operator library. It carries the
//! operators identifier-scoped cancellation needs (`cancellable`, `cancel`,
//! `merge`) plus the few constructors and time shifts used to build them.

// Core modules
mod cancel;
mod cancellable;
mod delay;
mod effect;
mod error;
mod id;
mod merge;
mod registry;
mod scheduler;
mod stream;
mod subject;
mod subscription;


// Re-export identifier and registry types
pub use id::EffectId;
pub use registry::CancellationRegistry;

// Re-export subscription types
pub use subscription::{Subscription, SubscriptionGuard, SubscriptionSet, Termination};

// Re-export effect types
pub use effect::{Effect, Sink};
pub use stream::EffectStream;
pub use subject::Subject;

// Re-export scheduling types
pub use scheduler::{ImmediateScheduler, Scheduler, TokioScheduler, Work};

// Re-export error types
pub use error::{Result, ScuttleError};
