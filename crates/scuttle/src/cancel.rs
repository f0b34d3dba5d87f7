//! The `cancel` operator.

use crate::effect::Effect;
use crate::id::EffectId;

impl<T: Send + 'static> Effect<T> {
    /// An effect that, when subscribed, cancels every subscription running
    /// under `id` and then completes without emitting.
    ///
    /// Cancelling an id with nothing registered is a no-op.
    pub fn cancel(id: impl Into<EffectId>) -> Effect<T> {
        let id = id.into();
        Effect::new(move |sink| {
            sink.registry().cancel_all(&id);
            sink.complete();
        })
    }

    /// Like [`Effect::cancel`] for several ids at once.
    pub fn cancel_many<I>(ids: I) -> Effect<T>
    where
        I: IntoIterator,
        I::Item: Into<EffectId>,
    {
        let ids: Vec<EffectId> = ids.into_iter().map(Into::into).collect();
        Effect::new(move |sink| {
            sink.registry().cancel_many(ids.iter().cloned());
            sink.complete();
        })
    }
}
