//! # Id Allocator
//!
//! Generates, recycles and snapshots the indexes of a single id group.
//!
//! Two sources feed [`IdAllocator::generate_id`]:
//! - The recycle list, consumed oldest-freed-first
//! - The next fresh index, never before issued
//!
//! The set of live ids is everything from [`INDEX_MIN`] up to the next fresh
//! index, minus the recycle list.

use super::{Id, IdGroup, INDEX_MAX, INDEX_MIN};
use crate::error::{EcsError, EcsResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Allocator state guarded by a single lock.
#[derive(Debug)]
struct IndexState {
    /// The next index never yet issued.
    next_index: u32,
    /// Freed indexes, front is the oldest.
    recycled: VecDeque<u32>,
}

/// Thread-safe generator and recycler of ids within one group.
///
/// # Thread Safety
///
/// Every operation takes `&self` and is internally synchronized. There is no
/// ordering relationship with any pool: callers generate an id, then insert it.
///
/// # Example
///
/// ```rust
/// use strata_ecs::{IdAllocator, IdGroup};
///
/// let allocator = IdAllocator::new(IdGroup::default());
/// let a = allocator.generate_id()?;
/// let b = allocator.generate_id()?;
/// allocator.free_id(b)?;
/// allocator.free_id(a)?;
///
/// // Oldest-freed first
/// assert_eq!(allocator.generate_id()?, b);
/// assert_eq!(allocator.generate_id()?, a);
/// # Ok::<(), strata_ecs::EcsError>(())
/// ```
#[derive(Debug)]
pub struct IdAllocator {
    /// The group every generated id carries.
    group: IdGroup,
    /// Index counter and recycle list.
    state: Mutex<IndexState>,
}

/// Plain snapshot of an allocator, for persistence handoff.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Next fresh index.
    pub next_index: u32,
    /// Recycled indexes, oldest-freed first.
    pub recycled: Vec<u32>,
}

impl IdAllocator {
    /// Creates a fresh allocator: no ids live, next index is [`INDEX_MIN`].
    #[must_use]
    pub fn new(group: IdGroup) -> Self {
        Self {
            group,
            state: Mutex::new(IndexState {
                next_index: INDEX_MIN,
                recycled: VecDeque::new(),
            }),
        }
    }

    /// Returns the group this allocator generates ids for.
    #[inline]
    #[must_use]
    pub const fn group(&self) -> IdGroup {
        self.group
    }

    /// Returns either a recycled id or a brand-new one.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::OutOfIndexes`] when the recycle list is empty and
    /// every index of the group has been issued.
    pub fn generate_id(&self) -> EcsResult<Id> {
        let mut state = self.state.lock();

        if let Some(index) = state.recycled.pop_front() {
            return Ok(Id::new(self.group, index));
        }

        if state.next_index >= INDEX_MAX {
            tracing::warn!(group = self.group.value(), "id group ran out of indexes");
            return Err(EcsError::OutOfIndexes(self.group.bits()));
        }

        let index = state.next_index;
        state.next_index += 1;
        Ok(Id::new(self.group, index))
    }

    /// Frees an id so its index may be recycled.
    ///
    /// Freeing the same id twice is not detected: the index is then handed
    /// out twice. Callers must not double-free.
    ///
    /// # Errors
    ///
    /// - [`EcsError::InvalidId`] for [`Id::INVALID`]
    /// - [`EcsError::IncorrectGroupId`] if the id belongs to another group
    /// - [`EcsError::IndexAboveGenerated`] if the index was never issued
    /// - [`EcsError::IndexBelowMinimum`] for index 0 in a non-zero group
    pub fn free_id(&self, id: Id) -> EcsResult<()> {
        self.free_ids(&[id])
    }

    /// Frees a batch of ids.
    ///
    /// All-or-nothing: every id is validated before any is recycled. The first
    /// invalid id's error is returned and the recycle list is left untouched.
    ///
    /// # Errors
    ///
    /// Same as [`IdAllocator::free_id`], for the first failing id.
    pub fn free_ids(&self, ids: &[Id]) -> EcsResult<()> {
        let mut state = self.state.lock();

        for &id in ids {
            self.validate(id, state.next_index)?;
        }

        state.recycled.extend(ids.iter().map(|id| id.index()));
        Ok(())
    }

    fn validate(&self, id: Id, next_index: u32) -> EcsResult<()> {
        if id.is_invalid() {
            return Err(EcsError::InvalidId);
        }
        if id.group() != self.group {
            return Err(EcsError::IncorrectGroupId {
                expected: self.group.bits(),
                found: id.group().bits(),
            });
        }
        if id.index() >= next_index {
            return Err(EcsError::IndexAboveGenerated {
                index: id.index(),
                next: next_index,
            });
        }
        if id.index() < INDEX_MIN {
            return Err(EcsError::IndexBelowMinimum(id.index()));
        }
        Ok(())
    }

    /// Peeks at the next *fresh* index.
    ///
    /// Informational only: the next generated id may come from the recycle
    /// list instead.
    #[must_use]
    pub fn peek_next_fresh_index(&self) -> u32 {
        self.state.lock().next_index
    }

    /// Returns the number of indexes waiting to be recycled.
    #[must_use]
    pub fn recyclable(&self) -> usize {
        self.state.lock().recycled.len()
    }

    /// Overwrites the allocator state.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::IndexBelowMinimum`] if `next_index` is below
    /// [`INDEX_MIN`]; the current state is kept.
    pub fn import_indexes(&self, next_index: u32, recycled: &[u32]) -> EcsResult<()> {
        if next_index < INDEX_MIN {
            return Err(EcsError::IndexBelowMinimum(next_index));
        }

        let mut state = self.state.lock();
        state.next_index = next_index;
        state.recycled.clear();
        state.recycled.extend(recycled.iter().copied());
        Ok(())
    }

    /// Returns a copy of the allocator state.
    #[must_use]
    pub fn export_indexes(&self) -> IndexSnapshot {
        let state = self.state.lock();
        IndexSnapshot {
            next_index: state.next_index,
            recycled: state.recycled.iter().copied().collect(),
        }
    }

    /// Returns an ascending iterator over every currently live id.
    ///
    /// The iterator works on a snapshot taken here; later generate/free calls
    /// do not affect it. Clone it to restart the traversal.
    #[must_use]
    pub fn live_ids(&self) -> LiveIds {
        let snapshot = self.export_indexes();
        let mut recycled = snapshot.recycled;
        recycled.sort_unstable();
        recycled.dedup();

        LiveIds {
            group: self.group,
            next: INDEX_MIN,
            end: snapshot.next_index,
            recycled,
            recycled_pos: 0,
        }
    }

    /// Calls `callback` for every live id, in ascending order.
    pub fn for_each_id(&self, callback: impl FnMut(Id)) {
        self.live_ids().for_each(callback);
    }
}

/// Ascending traversal of live ids: `INDEX_MIN..next_index` minus recycled.
#[derive(Clone, Debug)]
pub struct LiveIds {
    group: IdGroup,
    next: u32,
    end: u32,
    /// Sorted, deduplicated.
    recycled: Vec<u32>,
    recycled_pos: usize,
}

impl Iterator for LiveIds {
    type Item = Id;

    fn next(&mut self) -> Option<Id> {
        while self.next < self.end {
            let index = self.next;
            self.next += 1;

            while self.recycled_pos < self.recycled.len() && self.recycled[self.recycled_pos] < index
            {
                self.recycled_pos += 1;
            }
            if self.recycled.get(self.recycled_pos) == Some(&index) {
                self.recycled_pos += 1;
                continue;
            }

            return Some(Id::new(self.group, index));
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next) as usize;
        (0, Some(remaining))
    }
}
