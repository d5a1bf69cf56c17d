//! # Entity Lists
//!
//! Shared, externally maintained lists of ids attached to a pool.
//!
//! A pool never reads or writes the contents of its lists. Systems use them to
//! publish a filtered view of a pool (for example the ids visible this frame)
//! next to the pool itself, so consumers that already hold the pool find the
//! view without a separate registry.

use crate::id::Id;
use parking_lot::RwLock;
use std::sync::Arc;

/// A cheaply cloneable handle to a shared list of ids.
///
/// Clones refer to the same list. Identity (not content) decides equality
/// when a list is detached from a pool.
#[derive(Clone, Debug, Default)]
pub struct EntityList {
    ids: Arc<RwLock<Vec<Id>>>,
}

impl EntityList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents with the concatenation of `lists`.
    ///
    /// An empty `lists` clears the list.
    pub fn reset(&self, lists: &[&[Id]]) {
        let total = lists.iter().map(|list| list.len()).sum();
        let mut ids = self.ids.write();
        ids.clear();
        ids.reserve(total);
        for list in lists {
            ids.extend_from_slice(list);
        }
    }

    /// Number of ids in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    /// Whether the list holds no ids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.read().is_empty()
    }

    /// Copies the ids out.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Id> {
        self.ids.read().clone()
    }

    /// Runs `f` over the ids under a shared lock.
    pub fn with_ids<R>(&self, f: impl FnOnce(&[Id]) -> R) -> R {
        f(&self.ids.read())
    }

    /// Whether both handles refer to the same list.
    #[inline]
    #[must_use]
    pub fn same_list(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.ids, &other.ids)
    }
}

/// The lists attached to one pool.
#[derive(Debug, Default)]
pub(crate) struct EntityLists {
    lists: Vec<EntityList>,
}

impl EntityLists {
    pub(crate) fn add(&mut self, list: EntityList) {
        self.lists.push(list);
    }

    /// Detaches the first attachment of `list`. Returns whether one was found.
    pub(crate) fn remove(&mut self, list: &EntityList) -> bool {
        match self.lists.iter().position(|l| l.same_list(list)) {
            Some(pos) => {
                self.lists.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn as_slice(&self) -> &[EntityList] {
        &self.lists
    }
}
