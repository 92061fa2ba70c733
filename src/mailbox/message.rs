//! Request and reply envelopes

use crate::action::Action;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque correlation token chosen by the caller and echoed on every reply.
/// Any JSON value is accepted: strings, numbers or structured ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Value);

impl MessageId {
    #[must_use]
    pub fn new(id: impl Into<Value>) -> Self {
        Self(id.into())
    }

    /// Fresh random token, for callers with no ids of their own
    #[must_use]
    pub fn random() -> Self {
        Self(Value::String(uuid::Uuid::new_v4().to_string()))
    }

    /// The token, if it is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(id) => f.write_str(id),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<Value> for MessageId {
    fn from(id: Value) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: MessageId,
    pub action: Action,
}

impl IncomingMessage {
    #[must_use]
    pub fn new(id: impl Into<MessageId>, action: Action) -> Self {
        Self {
            id: id.into(),
            action,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub response: Value,
    #[serde(rename = "respId")]
    pub resp_id: MessageId,
}
