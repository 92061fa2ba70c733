//! State projection: (old state, action, reducers) -> new state
//!
//! Path reducers whose action types match run first, each against the
//! sub-tree at its path; mapped reducers then run over the whole tree.
//! Any reducer error is returned as-is and halts the store.

use crate::action::Action;
use crate::error::ReducerError;
use crate::tree::{IntoPath, Tree};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub type ReduceFn = Arc<dyn Fn(&Tree, &Action) -> Result<Tree, ReducerError> + Send + Sync>;

/// A reducer scoped to one path and a set of action types
#[derive(Clone)]
pub struct Reducer {
    pub path: Vec<String>,
    pub on: Vec<String>,
    reduce: ReduceFn,
}

impl Reducer {
    #[must_use]
    pub fn new<F>(path: impl IntoPath, on: impl IntoIterator<Item = impl Into<String>>, reduce: F) -> Self
    where
        F: Fn(&Tree, &Action) -> Result<Tree, ReducerError> + Send + Sync + 'static,
    {
        Self {
            path: path.into_path(),
            on: on.into_iter().map(Into::into).collect(),
            reduce: Arc::new(reduce),
        }
    }

    #[must_use]
    pub fn handles(&self, kind: &str) -> bool {
        self.on.iter().any(|t| t == kind)
    }
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reducer")
            .field("path", &self.path)
            .field("on", &self.on)
            .finish_non_exhaustive()
    }
}

/// A reducer over the whole tree, run for every action
#[derive(Clone)]
pub struct MappedReducer {
    reduce: ReduceFn,
}

impl MappedReducer {
    #[must_use]
    pub fn new<F>(reduce: F) -> Self
    where
        F: Fn(&Tree, &Action) -> Result<Tree, ReducerError> + Send + Sync + 'static,
    {
        Self {
            reduce: Arc::new(reduce),
        }
    }
}

impl fmt::Debug for MappedReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MappedReducer")
    }
}

/// One entry accepted by `Store::add_reducers`
#[derive(Debug, Clone)]
pub enum ReducerInput {
    Reducer(Reducer),
    Mapped(MappedReducer),
    /// Initial values, keyed by top-level namespace
    State(Value),
}

impl From<Reducer> for ReducerInput {
    fn from(reducer: Reducer) -> Self {
        ReducerInput::Reducer(reducer)
    }
}

impl From<MappedReducer> for ReducerInput {
    fn from(reducer: MappedReducer) -> Self {
        ReducerInput::Mapped(reducer)
    }
}

impl From<Value> for ReducerInput {
    fn from(state: Value) -> Self {
        ReducerInput::State(state)
    }
}

pub(crate) fn project(
    state: &Tree,
    action: &Action,
    reducers: &[Reducer],
    mapped: &[MappedReducer],
) -> Result<Tree, ReducerError> {
    let mut next = match ns_init_target(action) {
        Some((path, value)) => state.set_in(&path, value),
        None => state.clone(),
    };

    for reducer in reducers.iter().filter(|r| r.handles(&action.kind)) {
        next = next.update_in(&reducer.path, |current| (reducer.reduce)(current, action))?;
    }

    for reducer in mapped {
        next = (reducer.reduce)(&next, action)?;
    }

    Ok(next)
}

fn ns_init_target(action: &Action) -> Option<(Vec<String>, Tree)> {
    if !action.is_ns_init() {
        return None;
    }
    let payload = action.payload.as_ref()?;
    let path: Vec<String> = payload
        .get("path")?
        .as_array()?
        .iter()
        .filter_map(|k| k.as_str().map(str::to_string))
        .collect();
    let value = payload
        .get("value")
        .cloned()
        .map_or_else(Tree::empty, Tree::from_value);
    Some((path.into_path(), value))
}
