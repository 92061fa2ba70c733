//! Actions flowing through the store

use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Prefix of the actions emitted when a namespace is seeded with state
pub const NS_INIT_PREFIX: &str = "@@NS-INIT";

/// A named message describing an intended or completed state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Routing key, conventionally `domain.method`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Provenance of machine-generated actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
}

impl Action {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
            via: None,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    #[must_use]
    pub fn with_via(mut self, via: impl Into<String>) -> Self {
        self.via = Some(via.into());
        self
    }

    /// The payload, or `null` when the action carries none
    #[must_use]
    pub fn payload_or_null(&self) -> &Value {
        self.payload.as_ref().unwrap_or(&Value::Null)
    }

    /// The part of the type after the first `.`, e.g. `inc` in `counter.inc`
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.kind.split('.').nth(1)
    }

    /// Action that seeds `value` at the top-level namespace `key`
    #[must_use]
    pub fn ns_init(key: &str, value: Value) -> Self {
        let mut payload = Map::new();
        payload.insert("path".into(), Value::Array(vec![Value::from(key)]));
        payload.insert("value".into(), value);
        Action::new(format!("{NS_INIT_PREFIX}({key})")).with_payload(payload)
    }

    #[must_use]
    pub fn is_ns_init(&self) -> bool {
        self.kind.starts_with(NS_INIT_PREFIX)
    }
}

/// A committed action paired with the state it produced
#[derive(Debug, Clone)]
pub struct ActionWithState {
    pub action: Arc<Action>,
    pub state: Tree,
}
