//! # Pull-to-Refresh Demo
//!
//! A counter screen that fetches a fact about the current number. Refreshing
//! again while a fetch is running replaces it; the cancel button stops it.
//! Both come down to one id:
//!
//! - `Refresh` returns the fetch wrapped in `cancellable(RefreshId, true)`
//! - `CancelRefresh` returns `Effect::cancel(RefreshId)`

use anyhow::Result;
use scuttle_core::{CancellationRegistry, Effect, EffectId, SubscriptionSet, TokioScheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How long the live fact service takes to answer.
pub const DEFAULT_FETCH_DELAY: Duration = Duration::from_millis(500);

// ============================================================================
// State & Actions
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct State {
    count: i64,
    fact: Option<String>,
    is_loading: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Increment,
    Decrement,
    Refresh,
    CancelRefresh,
    FactResponse(String),
}

/// Cancellation id of the in-flight fact request.
#[derive(Debug, Hash, PartialEq, Eq)]
struct RefreshId;

// ============================================================================
// Environment
// ============================================================================

type FetchFact = Arc<dyn Fn(i64) -> Effect<String> + Send + Sync>;

#[derive(Clone)]
struct Environment {
    fetch: FetchFact,
}

impl Environment {
    fn live(scheduler: TokioScheduler) -> Self {
        Self {
            fetch: Arc::new(move |n: i64| {
                Effect::task(&scheduler, move || async move {
                    tokio::time::sleep(DEFAULT_FETCH_DELAY).await;
                    format!("{n} is a good number.")
                })
            }),
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

fn reduce(state: &mut State, action: Action, env: &Environment) -> Effect<Action> {
    match action {
        Action::Increment => {
            state.count += 1;
            Effect::none()
        }
        Action::Decrement => {
            state.count -= 1;
            Effect::none()
        }
        Action::Refresh => {
            state.fact = None;
            state.is_loading = true;
            (env.fetch)(state.count)
                .map(Action::FactResponse)
                .cancellable(EffectId::new(RefreshId), true)
        }
        Action::CancelRefresh => {
            state.is_loading = false;
            Effect::cancel(EffectId::new(RefreshId))
        }
        Action::FactResponse(fact) => {
            state.is_loading = false;
            state.fact = Some(fact);
            Effect::none()
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Runs the reducer and feeds effect output back in as actions.
struct Store {
    state: State,
    env: Environment,
    registry: Arc<CancellationRegistry>,
    actions_tx: mpsc::UnboundedSender<Action>,
    actions_rx: mpsc::UnboundedReceiver<Action>,
    subscriptions: SubscriptionSet,
}

impl Store {
    fn new(env: Environment, registry: Arc<CancellationRegistry>) -> Self {
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        Self {
            state: State::default(),
            env,
            registry,
            actions_tx,
            actions_rx,
            subscriptions: SubscriptionSet::new(),
        }
    }

    fn state(&self) -> &State {
        &self.state
    }

    fn send(&mut self, action: Action) {
        info!(?action, "send");
        let effect = reduce(&mut self.state, action, &self.env);
        let tx = self.actions_tx.clone();
        effect
            .subscribe_in(
                &self.registry,
                move |action| {
                    let _ = tx.send(action);
                },
                || {},
            )
            .store(&mut self.subscriptions);
    }

    /// Waits for the next action produced by an effect and reduces it.
    async fn receive(&mut self) -> Option<Action> {
        let action = self.actions_rx.recv().await?;
        self.send(action.clone());
        Some(action)
    }

    /// Reduces every effect action that is already waiting.
    fn receive_pending(&mut self) -> Vec<Action> {
        let mut received = Vec::new();
        while let Ok(action) = self.actions_rx.try_recv() {
            self.send(action.clone());
            received.push(action);
        }
        received
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let env = Environment::live(TokioScheduler::current()?);
    let mut store = Store::new(env, CancellationRegistry::global());

    store.send(Action::Increment);
    store.send(Action::Refresh);
    store.receive().await;
    info!(state = ?store.state(), "refreshed");

    store.send(Action::Increment);
    store.send(Action::Decrement);
    store.send(Action::Refresh);
    tokio::time::sleep(DEFAULT_FETCH_DELAY / 2).await;
    store.send(Action::CancelRefresh);
    tokio::time::sleep(DEFAULT_FETCH_DELAY).await;
    let late = store.receive_pending();
    info!(state = ?store.state(), late = late.len(), "cancelled");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scuttle_testing::TestScheduler;

    fn immediate() -> Environment {
        Environment {
            fetch: Arc::new(|n: i64| Effect::just(format!("{n} is a good number."))),
        }
    }

    fn delayed(scheduler: &TestScheduler) -> Environment {
        let scheduler = scheduler.clone();
        Environment {
            fetch: Arc::new(move |n: i64| {
                Effect::just(format!("{n} is a good number."))
                    .delay(Duration::from_secs(1), scheduler.clone())
            }),
        }
    }

    #[test]
    fn test_refresh() {
        let registry = Arc::new(CancellationRegistry::new());
        let mut store = Store::new(immediate(), registry.clone());

        store.send(Action::Increment);
        assert_eq!(store.state().count, 1);

        store.send(Action::Refresh);
        assert!(store.state().is_loading);

        assert_eq!(
            store.receive_pending(),
            vec![Action::FactResponse("1 is a good number.".to_string())]
        );
        assert!(!store.state().is_loading);
        assert_eq!(store.state().fact.as_deref(), Some("1 is a good number."));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_refresh_cancellation() {
        let registry = Arc::new(CancellationRegistry::new());
        let scheduler = TestScheduler::new();
        let mut store = Store::new(delayed(&scheduler), registry.clone());

        store.send(Action::Refresh);
        assert!(store.state().is_loading);
        assert!(registry.contains(&EffectId::new(RefreshId)));

        store.send(Action::CancelRefresh);
        assert!(!store.state().is_loading);

        scheduler.run();
        assert!(store.receive_pending().is_empty());
        assert_eq!(store.state().fact, None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_refreshing_again_replaces_the_request() {
        let registry = Arc::new(CancellationRegistry::new());
        let scheduler = TestScheduler::new();
        let mut store = Store::new(delayed(&scheduler), registry.clone());

        store.send(Action::Refresh);
        store.send(Action::Increment);
        store.send(Action::Refresh);
        assert_eq!(registry.active_count(&EffectId::new(RefreshId)), 1);

        scheduler.advance(Duration::from_secs(1));
        assert_eq!(
            store.receive_pending(),
            vec![Action::FactResponse("1 is a good number.".to_string())]
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_live_fetch_delivers_fact() -> Result<()> {
        let registry = Arc::new(CancellationRegistry::new());
        let mut store = Store::new(Environment::live(TokioScheduler::current()?), registry);

        store.send(Action::Refresh);
        let action = store.receive().await;
        assert_eq!(action, Some(Action::FactResponse("0 is a good number.".to_string())));
        assert!(!store.state().is_loading);
        Ok(())
    }
}
