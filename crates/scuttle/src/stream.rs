//! Consuming effects from async code.

use crate::effect::Effect;
use crate::registry::CancellationRegistry;
use crate::subscription::{Subscription, SubscriptionGuard};
use futures::channel::mpsc::{self, UnboundedReceiver};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// The values of one effect subscription as a [`Stream`].
///
/// The stream ends when the effect completes or is cancelled. Dropping it
/// disposes the subscription.
pub struct EffectStream<T> {
    receiver: UnboundedReceiver<T>,
    guard: SubscriptionGuard,
}

impl<T> EffectStream<T> {
    /// The subscription feeding this stream.
    pub fn subscription(&self) -> Option<&Subscription> {
        self.guard.subscription()
    }
}

impl<T> Stream for EffectStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.receiver.poll_next_unpin(cx)
    }
}

impl<T: Send + 'static> Effect<T> {
    /// Subscribes against the global registry and streams the values.
    pub fn into_stream(self) -> EffectStream<T> {
        self.into_stream_in(&CancellationRegistry::global())
    }

    /// Subscribes against `registry` and streams the values.
    pub fn into_stream_in(self, registry: &Arc<CancellationRegistry>) -> EffectStream<T> {
        let (sender, receiver) = mpsc::unbounded();
        let closer = sender.clone();
        let subscription = self.subscribe_in(
            registry,
            move |value| {
                // A closed receiver means the stream was dropped.
                let _ = sender.unbounded_send(value);
            },
            move || closer.close_channel(),
        );
        EffectStream {
            receiver,
            guard: subscription.guard(),
        }
    }
}
