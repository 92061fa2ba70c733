//! The store: action bus, state projection and the observers hanging off it
//!
//! Dispatch is synchronous. Every observer sees an action before
//! [`Store::dispatch`] returns, and actions emitted by observers are
//! dispatched reentrantly: a cascade runs to completion, depth first,
//! before the outer call returns. Dispatches arriving from other tasks
//! (async effect output) wait on a reentrant lock so there is only ever one
//! cascade in flight.

mod effects;
mod projector;
mod responses;

#[cfg(test)]
mod testing;

pub use effects::{Effect, EffectContext, EffectFn, Trigger};
pub use projector::{MappedReducer, ReduceFn, Reducer, ReducerInput};
pub use responses::ResponseRule;

use crate::action::{Action, ActionWithState};
use crate::config::StoreConfig;
use crate::error::{ReducerError, StoreError};
use crate::registry::Registry;
use crate::tree::{IntoPath, Tree};
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use parking_lot::{ReentrantMutex, RwLock};
use serde_json::{Map, Value};
use std::cell::Cell;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Something notified of every committed (action, state) pair, in the
/// order it subscribed
#[derive(Clone)]
enum Observer {
    Responses,
    Effect(Arc<Effect>),
    Channel(mpsc::UnboundedSender<ActionWithState>),
}

struct Inner {
    config: StoreConfig,
    /// Current cascade depth; the lock serialises dispatch across tasks
    timeline: ReentrantMutex<Cell<usize>>,
    state: RwLock<Tree>,
    failure: RwLock<Option<StoreError>>,
    reducers: Registry<Reducer>,
    mapped_reducers: Registry<MappedReducer>,
    responses: Registry<ResponseRule>,
    observers: Registry<Observer>,
    extras: RwLock<Arc<Map<String, Value>>>,
}

/// Cheap to clone; clones share the same state and registries
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

/// Everything a feature module contributes, applied in field order
#[derive(Debug, Default)]
pub struct Registration {
    pub state: Option<Value>,
    pub reducers: Vec<ReducerInput>,
    pub effects: Vec<Effect>,
    pub responses: Vec<ResponseRule>,
}

type Middleware = Box<dyn FnOnce(&Store)>;

/// Builder mirroring the store's creation arguments
#[derive(Default)]
pub struct StoreBuilder {
    config: StoreConfig,
    state: Value,
    reducers: Vec<ReducerInput>,
    effects: Vec<Effect>,
    responses: Vec<ResponseRule>,
    middleware: Vec<Middleware>,
    extras: Map<String, Value>,
}

impl StoreBuilder {
    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn state(mut self, state: Value) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn reducers(mut self, reducers: impl IntoIterator<Item = impl Into<ReducerInput>>) -> Self {
        self.reducers.extend(reducers.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    #[must_use]
    pub fn responses(mut self, responses: impl IntoIterator<Item = ResponseRule>) -> Self {
        self.responses.extend(responses);
        self
    }

    #[must_use]
    pub fn middleware(mut self, middleware: impl FnOnce(&Store) + 'static) -> Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    #[must_use]
    pub fn extras(mut self, extras: Map<String, Value>) -> Self {
        self.extras.extend(extras);
        self
    }

    /// Builds the store, then applies reducers, effects, responses,
    /// middleware and extras in that order.
    ///
    /// # Errors
    ///
    /// Fails only if seeding state runs into a failing reducer.
    pub fn build(self) -> Result<Store, StoreError> {
        let store = Store::with_config(self.state, self.config);
        store.add_reducers(self.reducers)?;
        store.add_effects(self.effects);
        store.add_responses(self.responses);
        for middleware in self.middleware {
            store.add_middleware(middleware);
        }
        store.add_extras(self.extras);
        Ok(store)
    }
}

impl Store {
    #[must_use]
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    #[must_use]
    pub fn new(initial_state: Value) -> Self {
        Self::with_config(initial_state, StoreConfig::default())
    }

    #[must_use]
    pub fn with_config(initial_state: Value, config: StoreConfig) -> Self {
        let state = match initial_state {
            Value::Null => Tree::empty(),
            other => Tree::from_value(other),
        };
        let observers = Registry::new();
        observers.push(Observer::Responses);

        Self {
            inner: Arc::new(Inner {
                config,
                timeline: ReentrantMutex::new(Cell::new(0)),
                state: RwLock::new(state),
                failure: RwLock::new(None),
                reducers: Registry::new(),
                mapped_reducers: Registry::new(),
                responses: Registry::new(),
                observers,
                extras: RwLock::new(Arc::new(Map::new())),
            }),
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Reduces `action` and notifies every observer before returning.
    ///
    /// # Errors
    ///
    /// `Reducer` if a reducer failed on `action` (the store is now halted),
    /// `Halted` if one failed earlier, and `DepthExceeded` if a configured
    /// cascade depth limit would be passed.
    pub fn dispatch(&self, action: Action) -> Result<(), StoreError> {
        let timeline = self.inner.timeline.lock();
        let depth = timeline.get() + 1;
        if let Some(limit) = self.inner.config.max_dispatch_depth {
            if depth > limit {
                tracing::error!(action = %action.kind, depth, limit, "Dispatch depth exceeded, dropping action");
                return Err(StoreError::DepthExceeded {
                    action: action.kind,
                    depth,
                    limit,
                });
            }
        }

        timeline.set(depth);
        let _depth = DepthGuard(&timeline);
        self.commit(action)
    }

    /// Dispatches each action in order, as separate calls. Keeps going after
    /// a failure.
    ///
    /// # Errors
    ///
    /// The first error any of the dispatches returned.
    pub fn dispatch_all(&self, actions: impl IntoIterator<Item = Action>) -> Result<(), StoreError> {
        let mut first_err = None;
        for action in actions {
            if let Err(err) = self.dispatch(action) {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn commit(&self, action: Action) -> Result<(), StoreError> {
        if self.is_halted() {
            tracing::debug!(action = %action.kind, "Store halted, rejecting action");
            return Err(StoreError::Halted);
        }
        tracing::trace!(action = %action.kind, via = ?action.via, "Dispatching action");

        let previous = self.inner.state.read().clone();
        let next = match projector::project(
            &previous,
            &action,
            &self.inner.reducers.snapshot(),
            &self.inner.mapped_reducers.snapshot(),
        ) {
            Ok(next) => next,
            Err(source) => return Err(self.halt(action.kind, source)),
        };
        *self.inner.state.write() = next.clone();

        self.notify(&ActionWithState {
            action: Arc::new(action),
            state: next,
        });
        Ok(())
    }

    fn notify(&self, pair: &ActionWithState) {
        let mut saw_closed = false;
        for observer in self.inner.observers.snapshot().iter() {
            match observer {
                Observer::Responses => self.respond(pair),
                Observer::Effect(effect) => effects::run(self, effect, pair),
                Observer::Channel(tx) => saw_closed |= tx.send(pair.clone()).is_err(),
            }
            // a reducer failure further down the cascade ends delivery
            if self.is_halted() {
                return;
            }
        }
        if saw_closed {
            self.inner
                .observers
                .retain(|o| !matches!(o, Observer::Channel(tx) if tx.is_closed()));
        }
    }

    fn respond(&self, pair: &ActionWithState) {
        if self.inner.responses.is_empty() {
            return;
        }
        let rules = self.inner.responses.snapshot();
        let actions = responses::route(&rules, pair);
        if actions.is_empty() {
            return;
        }
        if let Err(err) = self.dispatch_all(actions) {
            tracing::warn!(trigger = %pair.action.kind, error = %err, "Response was not accepted");
        }
    }

    fn halt(&self, action: String, source: ReducerError) -> StoreError {
        tracing::error!(action = %action, error = %source, "Reducer failed, halting store");
        let err = StoreError::Reducer { action, source };
        *self.inner.failure.write() = Some(err.clone());
        // dropping the senders ends every observation stream
        self.inner
            .observers
            .retain(|o| !matches!(o, Observer::Channel(_)));
        err
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.inner.failure.read().is_some()
    }

    /// The reducer failure that halted the store, if any
    #[must_use]
    pub fn failure(&self) -> Option<StoreError> {
        self.inner.failure.read().clone()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Applies state, reducers, effects and responses, in that order.
    ///
    /// # Errors
    ///
    /// Fails if seeding state runs into a failing reducer.
    pub fn register(&self, registration: Registration) -> Result<&Self, StoreError> {
        let Registration {
            state,
            reducers,
            effects,
            responses,
        } = registration;

        if let Some(state) = state {
            self.register_state(&state)?;
        }
        self.add_reducers(reducers)?;
        self.add_effects(effects);
        self.add_responses(responses);
        Ok(self)
    }

    /// Appends reducers. `ReducerInput::State` entries seed their namespaces
    /// through dispatch.
    ///
    /// # Errors
    ///
    /// Fails if seeding state runs into a failing reducer.
    pub fn add_reducers(
        &self,
        inputs: impl IntoIterator<Item = impl Into<ReducerInput>>,
    ) -> Result<&Self, StoreError> {
        for input in inputs {
            match input.into() {
                ReducerInput::Reducer(reducer) => {
                    tracing::debug!(path = ?reducer.path, on = ?reducer.on, "Adding reducer");
                    self.inner.reducers.push(reducer);
                }
                ReducerInput::Mapped(reducer) => {
                    tracing::debug!("Adding mapped reducer");
                    self.inner.mapped_reducers.push(reducer);
                }
                ReducerInput::State(state) => self.register_state(&state)?,
            }
        }
        Ok(self)
    }

    fn register_state(&self, state: &Value) -> Result<(), StoreError> {
        let Value::Object(namespaces) = state else {
            tracing::warn!(state = %state, "Ignoring non-object state registration");
            return Ok(());
        };
        for (key, value) in namespaces {
            self.dispatch(Action::ns_init(key, value.clone()))?;
        }
        Ok(())
    }

    pub fn add_effects(&self, effects: impl IntoIterator<Item = Effect>) -> &Self {
        self.inner.observers.extend(effects.into_iter().map(|effect| {
            tracing::debug!(actor = %effect.actor, effect = %effect.name, "Adding effect");
            Observer::Effect(Arc::new(effect))
        }));
        self
    }

    pub fn add_responses(&self, rules: impl IntoIterator<Item = ResponseRule>) -> &Self {
        self.inner.responses.extend(rules.into_iter().inspect(|rule| {
            tracing::debug!(trigger = %rule.name, target = %rule.target_name, "Adding response");
        }));
        self
    }

    /// Accepts the declarative mapping read by [`ResponseRule::from_mapping`].
    ///
    /// # Errors
    ///
    /// `InvalidResponses` if the mapping is malformed; no rule is added then.
    pub fn add_response_mapping(&self, mapping: &Value) -> Result<&Self, StoreError> {
        let rules = ResponseRule::from_mapping(mapping)?;
        Ok(self.add_responses(rules))
    }

    /// Runs `middleware` against this store right away.
    pub fn add_middleware(&self, middleware: impl FnOnce(&Store)) -> &Self {
        middleware(self);
        self
    }

    /// Shallow-merges `extras` over the current extras; later keys win.
    pub fn add_extras(&self, extras: Map<String, Value>) -> &Self {
        if extras.is_empty() {
            return self;
        }
        let mut current = self.inner.extras.write();
        let mut merged = Map::clone(&current);
        merged.extend(extras);
        *current = Arc::new(merged);
        self
    }

    #[must_use]
    pub fn extras(&self) -> Arc<Map<String, Value>> {
        Arc::clone(&self.inner.extras.read())
    }

    // ========================================================================
    // Reading state
    // ========================================================================

    /// The whole current snapshot
    #[must_use]
    pub fn state(&self) -> Tree {
        self.inner.state.read().clone()
    }

    /// Snapshot at `path`, or an empty map when nothing is there
    #[must_use]
    pub fn get_state(&self, path: impl IntoPath) -> Tree {
        self.inner.state.read().get_in_or_empty(&path.into_path())
    }

    #[must_use]
    pub fn to_js(&self, path: impl IntoPath) -> Value {
        self.get_state(path).to_value()
    }

    /// JSON text of the snapshot at `path`
    ///
    /// # Errors
    ///
    /// `Serialize` if serde rejects the tree.
    pub fn to_json(&self, path: impl IntoPath) -> Result<String, StoreError> {
        Ok(serde_json::to_string(&self.get_state(path))?)
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Every (action, resulting state) pair from now on. Ends when the store
    /// halts.
    #[must_use]
    pub fn subscribe(&self) -> UnboundedReceiverStream<ActionWithState> {
        let (tx, rx) = mpsc::unbounded_channel();
        // held so a halt cannot prune channels between the check and the push
        let _timeline = self.inner.timeline.lock();
        if !self.is_halted() {
            self.inner.observers.push(Observer::Channel(tx));
        }
        UnboundedReceiverStream::new(rx)
    }

    /// The current snapshot followed by one snapshot per committed action
    #[must_use]
    pub fn states(&self) -> impl Stream<Item = Tree> + Send + 'static {
        let _timeline = self.inner.timeline.lock();
        let current = self.state();
        let updates = self.subscribe().map(|pair| pair.state);
        stream::once(future::ready(current)).chain(updates)
    }

    /// Distinct values at `path`, starting with the current one; consecutive
    /// duplicates are skipped. Missing paths read as an empty map.
    #[must_use]
    pub fn changes(&self, path: impl IntoPath) -> impl Stream<Item = Tree> + Send + 'static {
        let path = path.into_path();
        let mut last: Option<Tree> = None;
        self.states().filter_map(move |state| {
            let value = state.get_in_or_empty(&path);
            let fresh = if last.as_ref() == Some(&value) {
                None
            } else {
                last = Some(value.clone());
                Some(value)
            };
            future::ready(fresh)
        })
    }

    /// Resolves with the first pair whose action type is one of `types`.
    /// Subscribes immediately, so actions dispatched after this call and
    /// before the first poll are not missed. `None` if the store halts first.
    pub fn once(
        &self,
        types: impl IntoIterator<Item = impl Into<String>>,
    ) -> impl Future<Output = Option<ActionWithState>> + Send + 'static {
        let types: Vec<String> = types.into_iter().map(Into::into).collect();
        let mut pairs = self.subscribe();
        async move {
            while let Some(pair) = pairs.next().await {
                if types.iter().any(|t| *t == pair.action.kind) {
                    return Some(pair);
                }
            }
            None
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .field("reducers", &self.inner.reducers.len())
            .field("mapped_reducers", &self.inner.mapped_reducers.len())
            .field("responses", &self.inner.responses.len())
            .field("observers", &self.inner.observers.len())
            .field("halted", &self.is_halted())
            .finish()
    }
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}
