//! Append-only, copy-on-write lists shared by the store's components

use parking_lot::RwLock;
use std::sync::Arc;

/// A list that only grows. Readers take a cheap snapshot; writers publish a
/// new list and swap the shared reference, so a snapshot taken mid-dispatch
/// never changes under its reader.
pub struct Registry<T> {
    items: RwLock<Arc<[T]>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(Arc::from(Vec::new())),
        }
    }
}

impl<T: Clone> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<[T]> {
        Arc::clone(&self.items.read())
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Appends `incoming` in order. Duplicates are kept.
    pub fn extend(&self, incoming: impl IntoIterator<Item = T>) {
        let mut items = self.items.write();
        let mut next = items.to_vec();
        next.extend(incoming);
        *items = next.into();
    }

    pub fn push(&self, item: T) {
        self.extend(std::iter::once(item));
    }

    /// Drops entries failing `keep`. Only used for observer channels whose
    /// receiving side has gone away.
    pub(crate) fn retain(&self, keep: impl Fn(&T) -> bool) {
        let mut items = self.items.write();
        if items.iter().all(&keep) {
            return;
        }
        let next: Arc<[T]> = items.iter().filter(|item| keep(item)).cloned().collect();
        *items = next;
    }
}
