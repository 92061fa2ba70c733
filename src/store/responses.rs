//! Declarative responses: forward a slice of state as a new action whenever
//! a trigger action is committed.

use crate::action::{Action, ActionWithState};
use crate::error::StoreError;
use crate::tree::IntoPath;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRule {
    /// Trigger action type
    pub name: String,
    pub path: Vec<String>,
    /// Type of the emitted action
    pub target_name: String,
}

impl ResponseRule {
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl IntoPath, target_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into_path(),
            target_name: target_name.into(),
        }
    }

    /// Reads rules from a mapping of the form
    /// `{ "<trigger>": { "path": "x" | ["x", "y"], "action": "<target>" } }`,
    /// or an array of such mappings.
    ///
    /// # Errors
    ///
    /// `InvalidResponses` when an entry is not an object or lacks `action`.
    pub fn from_mapping(mapping: &Value) -> Result<Vec<Self>, StoreError> {
        let mappings = match mapping {
            Value::Array(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            single => vec![single],
        };

        let mut rules = Vec::new();
        for mapping in mappings {
            let Value::Object(entries) = mapping else {
                return Err(StoreError::InvalidResponses(format!(
                    "expected an object, got {mapping}"
                )));
            };
            for (trigger, target) in entries {
                let target: ResponseTarget = serde_json::from_value(target.clone())
                    .map_err(|e| StoreError::InvalidResponses(format!("`{trigger}`: {e}")))?;
                rules.push(ResponseRule::new(
                    trigger.clone(),
                    target.path.into_keys(),
                    target.action,
                ));
            }
        }
        Ok(rules)
    }

    fn respond(&self, pair: &ActionWithState) -> Action {
        let payload = pair.state.get_in_or_empty(&self.path).to_value();
        Action::new(self.target_name.clone())
            .with_payload(payload)
            .with_via(format!("[response to ({})]", pair.action.kind))
    }
}

#[derive(Deserialize)]
struct ResponseTarget {
    #[serde(default)]
    path: PathSpec,
    action: String,
}

#[derive(Deserialize, Default)]
#[serde(untagged)]
enum PathSpec {
    #[default]
    Root,
    One(String),
    Many(Vec<String>),
}

impl PathSpec {
    fn into_keys(self) -> Vec<String> {
        match self {
            PathSpec::Root => Vec::new(),
            PathSpec::One(key) => key.into_path(),
            PathSpec::Many(keys) => keys.into_path(),
        }
    }
}

/// Actions to emit for `pair`, in rule registration order
pub(crate) fn route(rules: &[ResponseRule], pair: &ActionWithState) -> Vec<Action> {
    rules
        .iter()
        .filter(|rule| rule.name == pair.action.kind)
        .map(|rule| rule.respond(pair))
        .collect()
}
