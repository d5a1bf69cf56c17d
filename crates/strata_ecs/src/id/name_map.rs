//! # Id Name Map
//!
//! Two-way lookup between ids and unique, human-readable names, as used by
//! editors and debug tooling. Both directions are unique: an id has at most
//! one name and a name belongs to at most one id.
//!
//! Lookups take a shared lock; `add`, `update` and `remove` take it
//! exclusively. Rejected edits return `false` and log why.

use super::Id;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct Names {
    by_name: BTreeMap<String, Id>,
    by_id: BTreeMap<Id, String>,
}

/// Thread-safe bidirectional map of ids to unique names.
///
/// # Example
///
/// ```rust
/// use strata_ecs::{Id, NameMap};
///
/// let names = NameMap::new();
/// assert!(names.add(Id::from_raw(7), "player"));
/// assert_eq!(names.find_id("player"), Some(Id::from_raw(7)));
/// assert_eq!(names.find_name(Id::from_raw(7)).as_deref(), Some("player"));
/// ```
#[derive(Debug, Default)]
pub struct NameMap {
    names: RwLock<Names>,
}

impl NameMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of named ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.read().by_id.len()
    }

    /// Whether no id is named.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.read().by_id.is_empty()
    }

    /// Id carrying `name`.
    #[must_use]
    pub fn find_id(&self, name: &str) -> Option<Id> {
        self.names.read().by_name.get(name).copied()
    }

    /// Name of `id`.
    #[must_use]
    pub fn find_name(&self, id: Id) -> Option<String> {
        self.names.read().by_id.get(&id).cloned()
    }

    /// Names an id that has no name yet.
    ///
    /// Returns `false` without changes if `id` is invalid, `name` is empty,
    /// `id` already has a name, or `name` is already in use.
    pub fn add(&self, id: Id, name: impl Into<String>) -> bool {
        let name = name.into();
        if id.is_invalid() {
            tracing::warn!(name = %name, "cannot name the invalid id");
            return false;
        }
        if name.is_empty() {
            tracing::warn!(%id, "cannot give an id an empty name");
            return false;
        }

        let mut names = self.names.write();
        if names.by_id.contains_key(&id) {
            tracing::warn!(%id, "id already has a name");
            return false;
        }
        if let Some(owner) = names.by_name.get(&name) {
            tracing::warn!(%id, name = %name, %owner, "name already in use");
            return false;
        }

        names.by_name.insert(name.clone(), id);
        names.by_id.insert(id, name);
        true
    }

    /// Renames an id that already has a name, freeing the old name.
    ///
    /// Returns `false` without changes if `name` is empty, `name` is already
    /// in use (by any id, including this one), or `id` has no name.
    pub fn update(&self, id: Id, name: impl Into<String>) -> bool {
        let name = name.into();
        if name.is_empty() {
            tracing::warn!(%id, "cannot give an id an empty name");
            return false;
        }

        let mut names = self.names.write();
        if let Some(owner) = names.by_name.get(&name) {
            tracing::warn!(%id, name = %name, %owner, "name already in use");
            return false;
        }
        let Some(slot) = names.by_id.get_mut(&id) else {
            tracing::debug!(%id, "cannot rename an id without a name");
            return false;
        };
        let old = std::mem::replace(slot, name.clone());

        names.by_name.remove(&old);
        names.by_name.insert(name, id);
        true
    }

    /// Drops the name of `id`. Returns `false` if it had none.
    pub fn remove(&self, id: Id) -> bool {
        let mut names = self.names.write();
        let Some(name) = names.by_id.remove(&id) else {
            tracing::debug!(%id, "cannot remove the name of an unnamed id");
            return false;
        };
        names.by_name.remove(&name);
        true
    }
}
