//! Persistent state tree
//!
//! Every update returns a new root; nodes off the updated path are shared
//! with the previous root through `Arc`, so old snapshots stay valid and
//! unchanged.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An immutable, structurally shared tree of maps, lists and scalar leaves
#[derive(Debug, Clone)]
pub enum Tree {
    Map(Arc<BTreeMap<String, Tree>>),
    /// Indexed by decimal path keys
    List(Arc<[Tree]>),
    Leaf(Value),
}

impl Default for Tree {
    fn default() -> Self {
        Self::empty()
    }
}

impl Tree {
    /// The empty map, which is also what lookups at missing paths return
    #[must_use]
    pub fn empty() -> Self {
        Tree::Map(Arc::default())
    }

    #[must_use]
    pub fn leaf(value: impl Into<Value>) -> Self {
        Tree::Leaf(value.into())
    }

    /// Deep conversion from plain data: objects become maps, arrays lists.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Tree::Map(Arc::new(
                map.into_iter()
                    .map(|(k, v)| (k, Tree::from_value(v)))
                    .collect(),
            )),
            Value::Array(items) => {
                Tree::List(items.into_iter().map(Tree::from_value).collect())
            }
            other => Tree::Leaf(other),
        }
    }

    /// Deep conversion back to plain data
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Tree::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            Tree::List(items) => Value::Array(items.iter().map(Tree::to_value).collect()),
            Tree::Leaf(value) => value.clone(),
        }
    }

    #[must_use]
    pub fn as_leaf(&self) -> Option<&Value> {
        match self {
            Tree::Leaf(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_empty_map(&self) -> bool {
        matches!(self, Tree::Map(map) if map.is_empty())
    }

    #[must_use]
    pub fn child(&self, key: &str) -> Option<&Tree> {
        match self {
            Tree::Map(map) => map.get(key),
            Tree::List(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            Tree::Leaf(_) => None,
        }
    }

    #[must_use]
    pub fn get_in(&self, path: &[String]) -> Option<&Tree> {
        path.iter().try_fold(self, |node, key| node.child(key))
    }

    /// Lookup that falls back to an empty map when the path is absent
    #[must_use]
    pub fn get_in_or_empty(&self, path: &[String]) -> Tree {
        self.get_in(path).cloned().unwrap_or_default()
    }

    /// Returns a new tree with `value` stored at `path`. Missing or scalar
    /// intermediate nodes are replaced by maps.
    #[must_use]
    pub fn set_in(&self, path: &[String], value: Tree) -> Tree {
        let Some((key, rest)) = path.split_first() else {
            return value;
        };
        let child = self.child(key).cloned().unwrap_or_default();
        self.with_child(key, child.set_in(rest, value))
    }

    /// Applies `f` to the sub-tree at `path` (empty map when absent) and
    /// stores the result there.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns; the tree is left as it was.
    pub fn update_in<E>(
        &self,
        path: &[String],
        f: impl FnOnce(&Tree) -> Result<Tree, E>,
    ) -> Result<Tree, E> {
        let current = self.get_in_or_empty(path);
        let next = f(&current)?;
        Ok(self.set_in(path, next))
    }

    fn with_child(&self, key: &str, child: Tree) -> Tree {
        match self {
            Tree::Map(map) => {
                let mut map = BTreeMap::clone(map);
                map.insert(key.to_string(), child);
                Tree::Map(Arc::new(map))
            }
            Tree::List(items) => match key.parse::<usize>() {
                Ok(index) => {
                    let mut items = items.to_vec();
                    if index >= items.len() {
                        items.resize(index + 1, Tree::Leaf(Value::Null));
                    }
                    items[index] = child;
                    Tree::List(items.into())
                }
                Err(_) => Tree::empty().with_child(key, child),
            },
            Tree::Leaf(_) => Tree::empty().with_child(key, child),
        }
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Tree::Map(a), Tree::Map(b)) => Arc::ptr_eq(a, b) || a == b,
            (Tree::List(a), Tree::List(b)) => Arc::ptr_eq(a, b) || a == b,
            (Tree::Leaf(a), Tree::Leaf(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Value> for Tree {
    fn from(value: Value) -> Self {
        Tree::from_value(value)
    }
}

impl Serialize for Tree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Tree::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Tree::List(items) => {
                let mut out = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    out.serialize_element(item)?;
                }
                out.end()
            }
            Tree::Leaf(value) => value.serialize(serializer),
        }
    }
}

// ============================================================================
// Paths
// ============================================================================

/// Conversion into an ordered key list. A single key is a one-element path,
/// `()` is the root, and empty keys are dropped.
pub trait IntoPath {
    fn into_path(self) -> Vec<String>;
}

fn keys<S: AsRef<str>>(items: impl IntoIterator<Item = S>) -> Vec<String> {
    items
        .into_iter()
        .filter(|k| !k.as_ref().is_empty())
        .map(|k| k.as_ref().to_string())
        .collect()
}

impl IntoPath for () {
    fn into_path(self) -> Vec<String> {
        Vec::new()
    }
}

impl IntoPath for &str {
    fn into_path(self) -> Vec<String> {
        keys([self])
    }
}

impl IntoPath for String {
    fn into_path(self) -> Vec<String> {
        keys([self])
    }
}

impl IntoPath for &String {
    fn into_path(self) -> Vec<String> {
        keys([self])
    }
}

impl IntoPath for Vec<String> {
    fn into_path(self) -> Vec<String> {
        keys(self)
    }
}

impl IntoPath for Vec<&str> {
    fn into_path(self) -> Vec<String> {
        keys(self)
    }
}

impl IntoPath for &[String] {
    fn into_path(self) -> Vec<String> {
        keys(self)
    }
}

impl IntoPath for &[&str] {
    fn into_path(self) -> Vec<String> {
        keys(self)
    }
}

impl<const N: usize> IntoPath for [&str; N] {
    fn into_path(self) -> Vec<String> {
        keys(self)
    }
}
