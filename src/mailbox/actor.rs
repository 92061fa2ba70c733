//! Actor descriptors and per-message route resolution

use super::message::IncomingMessage;
use crate::error::HandlerError;
use crate::reply::Reply;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Synchronous handler; its return value is the single response
pub type MethodFn =
    Arc<dyn Fn(&Value, &IncomingMessage) -> Result<Value, HandlerError> + Send + Sync>;

/// Handler answering with zero or more responses
pub type HandlerFn =
    Arc<dyn Fn(&Value, &IncomingMessage) -> Result<Reply<Value>, HandlerError> + Send + Sync>;

/// Named set of handlers, looked up by the method segment of an action type
#[derive(Clone)]
pub struct Actor {
    pub name: String,
    methods: HashMap<String, MethodFn>,
    effects: HashMap<String, HandlerFn>,
    missing: Option<HandlerFn>,
}

/// The one handler chosen for a message
pub(crate) enum Route {
    Method(MethodFn),
    Effect(HandlerFn),
    Missing(HandlerFn),
    Unrouted,
}

impl Actor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
            effects: HashMap::new(),
            missing: None,
        }
    }

    #[must_use]
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&Value, &IncomingMessage) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    #[must_use]
    pub fn effect<F>(mut self, name: impl Into<String>, effect: F) -> Self
    where
        F: Fn(&Value, &IncomingMessage) -> Result<Reply<Value>, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.effects.insert(name.into(), Arc::new(effect));
        self
    }

    /// Fallback for messages no method or effect claims
    #[must_use]
    pub fn missing<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&Value, &IncomingMessage) -> Result<Reply<Value>, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.missing = Some(Arc::new(fallback));
        self
    }

    /// Methods win over effects, effects over the fallback.
    pub(crate) fn route(&self, message: &IncomingMessage) -> Route {
        let method = message.action.method();
        if let Some(found) = method.and_then(|m| self.methods.get(m)) {
            return Route::Method(Arc::clone(found));
        }
        if let Some(found) = method.and_then(|m| self.effects.get(m)) {
            return Route::Effect(Arc::clone(found));
        }
        match &self.missing {
            Some(fallback) => Route::Missing(Arc::clone(fallback)),
            None => Route::Unrouted,
        }
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        let mut effects: Vec<_> = self.effects.keys().collect();
        effects.sort();
        f.debug_struct("Actor")
            .field("name", &self.name)
            .field("methods", &methods)
            .field("effects", &effects)
            .field("missing", &self.missing.is_some())
            .finish()
    }
}
