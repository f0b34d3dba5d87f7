//! The cancellation registry.
//!
//! Maps each [`EffectId`] to the subscriptions currently running under it.
//! An id is present only while at least one of its subscriptions is active;
//! `unregister` drops the entry as soon as its last handle leaves.
//!
//! Every mutation happens inside one shard lock of the underlying
//! [`DashMap`]. No callback ever runs while a shard is locked: `cancel_all`
//! removes the entry first and cancels the snapshot afterwards, so a
//! teardown that cancels another id (or the same one) cannot deadlock.

use crate::error::{Result, ScuttleError};
use crate::id::EffectId;
use crate::subscription::Subscription;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use smallvec::SmallVec;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

type Handles = SmallVec<[Subscription; 2]>;

static GLOBAL: OnceLock<Arc<CancellationRegistry>> = OnceLock::new();

/// Thread-safe map from effect id to active subscriptions.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    entries: DashMap<EffectId, Handles>,
}

impl CancellationRegistry {
    /// Creates an empty, isolated registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an isolated registry with a fixed number of shards.
    pub fn with_shards(shards: usize) -> Result<Self> {
        if shards < 2 || !shards.is_power_of_two() {
            return Err(ScuttleError::InvalidShardAmount(shards));
        }
        Ok(Self {
            entries: DashMap::with_shard_amount(shards),
        })
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> Arc<Self> {
        GLOBAL.get_or_init(|| Arc::new(Self::new())).clone()
    }

    /// Adds `handle` to the set for `id`.
    ///
    /// Registering a handle twice under the same id is a no-op. A handle
    /// that terminated concurrently with its registration is removed again,
    /// so a terminated handle never stays in the registry.
    pub fn register(&self, id: EffectId, handle: Subscription) {
        let key = handle.key();
        trace!(?id, key, "register");
        {
            let mut handles = self.entries.entry(id.clone()).or_default();
            if !handles.iter().any(|h| h.key() == key) {
                handles.push(handle.clone());
            }
        }

        if !handle.is_active() {
            self.unregister(&id, &handle);
        }
    }

    /// Removes `handle` from the set for `id`, dropping the entry once empty.
    ///
    /// Unknown ids and handles are ignored; completion and cancellation race
    /// to unregister the same handle.
    pub fn unregister(&self, id: &EffectId, handle: &Subscription) {
        let key = handle.key();
        if let Entry::Occupied(mut entry) = self.entries.entry(id.clone()) {
            entry.get_mut().retain(|h| h.key() != key);
            if entry.get().is_empty() {
                entry.remove();
            }
            trace!(?id, key, "unregister");
        }
    }

    /// Cancels every subscription registered under `id`.
    ///
    /// Returns how many subscriptions were cancelled by this call.
    pub fn cancel_all(&self, id: &EffectId) -> usize {
        let Some((_, handles)) = self.entries.remove(id) else {
            return 0;
        };

        let cancelled = handles.iter().filter(|h| h.cancel()).count();
        if cancelled > 0 {
            debug!(?id, cancelled, "cancelled subscriptions");
        }
        cancelled
    }

    /// Cancels the subscriptions of several ids.
    pub fn cancel_many<I>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = EffectId>,
    {
        ids.into_iter().map(|id| self.cancel_all(&id)).sum()
    }

    /// Number of ids that currently have live subscriptions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &EffectId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of live subscriptions registered under `id`.
    pub fn active_count(&self, id: &EffectId) -> usize {
        self.entries.get(id).map_or(0, |handles| handles.len())
    }

    /// Snapshot of the ids that currently have live subscriptions.
    pub fn ids(&self) -> Vec<EffectId> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}
