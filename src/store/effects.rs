//! Effect execution
//!
//! Effects observe committed actions and answer with more actions. Each
//! effect runs behind its own failure boundary: an error is logged with the
//! actor and effect name and ends that effect's contribution, nothing else.

use super::Store;
use crate::action::{Action, ActionWithState};
use crate::error::HandlerError;
use crate::reply::{drain, Reply};
use crate::tree::Tree;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

pub type EffectFn =
    Arc<dyn Fn(&Value, &EffectContext) -> Result<Reply<Action>, HandlerError> + Send + Sync>;

/// Which action types an effect reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Any,
    Types(Vec<String>),
}

/// Everything an effect can see about the action that triggered it
pub struct EffectContext {
    pub action: Arc<Action>,
    /// State right after `action` was reduced
    pub state: Tree,
    /// Values merged in through `Store::add_extras`
    pub extras: Arc<Map<String, Value>>,
    store: Store,
}

impl EffectContext {
    /// Handle to the owning store, for reading state or subscribing
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }
}

#[derive(Clone)]
pub struct Effect {
    pub actor: String,
    pub name: String,
    pub trigger: Trigger,
    handler: EffectFn,
}

impl Effect {
    /// A catch-all effect; narrow it with [`Effect::on`]
    #[must_use]
    pub fn new<F>(actor: impl Into<String>, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Value, &EffectContext) -> Result<Reply<Action>, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            actor: actor.into(),
            name: name.into(),
            trigger: Trigger::Any,
            handler: Arc::new(handler),
        }
    }

    #[must_use]
    pub fn on(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.trigger = Trigger::Types(types.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn wants(&self, kind: &str) -> bool {
        match &self.trigger {
            Trigger::Any => true,
            Trigger::Types(types) => types.iter().any(|t| t == kind),
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("actor", &self.actor)
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

pub(crate) fn run(store: &Store, effect: &Effect, pair: &ActionWithState) {
    if !effect.wants(&pair.action.kind) {
        return;
    }

    let ctx = EffectContext {
        action: Arc::clone(&pair.action),
        state: pair.state.clone(),
        extras: store.extras(),
        store: store.clone(),
    };

    let reply = match (effect.handler)(pair.action.payload_or_null(), &ctx) {
        Ok(reply) => reply,
        Err(err) => {
            report(&effect.actor, &effect.name, &err);
            return;
        }
    };

    let target = store.clone();
    let (actor, name) = (effect.actor.clone(), effect.name.clone());
    drain(
        reply,
        move |action: Action| {
            if let Err(err) = target.dispatch(action) {
                tracing::warn!(error = %err, "Action produced by effect was not accepted");
            }
        },
        move |err| report(&actor, &name, &err),
    );
}

fn report(actor: &str, effect: &str, err: &HandlerError) {
    tracing::error!(actor = %actor, effect = %effect, error = %err.message, "Effect failed");
}
