//! # Typed Data Pool
//!
//! Sorted structure-of-arrays storage for a tuple of component types, mutated
//! only at maintenance time.
//!
//! ## Frame Protocol
//!
//! ```text
//! any thread:   insert(id, row) / remove(id)      queued, never applied
//! one thread:   maintenance()                     applies the queues
//! readers:      ids() / columns() / iter()        sorted live rows
//!               inserted_offsets()                rows added this cycle
//!               removed_ids() / removed_iter()    rows removed this cycle
//! ```
//!
//! A removed row stays readable until the maintenance call after the one that
//! removed it; only then is it dropped.

use super::columns::{Columns, TypedRows};
use super::entity_list::{EntityList, EntityLists};
use super::store::{self, Capacity, Store};
use crate::config::PoolConfig;
use crate::error::EcsResult;
use crate::id::Id;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fmt;

/// Cloneable handle for queueing requests into a [`DataPool`] from any thread.
///
/// Requests sent through a sender are applied by the pool's next maintenance
/// call, exactly as if they had been made on the pool itself.
pub struct PoolSender<C: Columns> {
    inserts: Sender<(Id, C)>,
    removes: Sender<Id>,
}

impl<C: Columns> Clone for PoolSender<C> {
    fn clone(&self) -> Self {
        Self {
            inserts: self.inserts.clone(),
            removes: self.removes.clone(),
        }
    }
}

impl<C: Columns> fmt::Debug for PoolSender<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSender")
            .field("queued_inserts", &self.inserts.len())
            .field("queued_removes", &self.removes.len())
            .finish()
    }
}

impl<C: Columns> PoolSender<C> {
    /// Queues a row for insertion.
    ///
    /// Returns `false` if the pool no longer exists.
    pub fn insert(&self, id: Id, row: C) -> bool {
        self.inserts.send((id, row)).is_ok()
    }

    /// Queues an id for removal.
    ///
    /// Returns `false` if the pool no longer exists.
    pub fn remove(&self, id: Id) -> bool {
        self.removes.send(id).is_ok()
    }
}

/// Typed pool of component rows keyed by [`Id`].
///
/// `C` is a tuple of component types, e.g. `DataPool<(Position, Velocity)>`.
///
/// # Example
///
/// ```rust
/// use strata_ecs::{DataPool, Id};
///
/// let mut pool = DataPool::<(u32, &str)>::new();
/// pool.insert(Id::from_raw(7), (70, "seven"));
/// pool.insert(Id::from_raw(3), (30, "three"));
/// pool.maintenance()?;
///
/// assert_eq!(pool.ids(), &[Id::from_raw(3), Id::from_raw(7)]);
/// let (numbers, names) = pool.columns();
/// assert_eq!(numbers, &[30, 70]);
/// assert_eq!(names, &["three", "seven"]);
/// # Ok::<(), strata_ecs::EcsError>(())
/// ```
pub struct DataPool<C: Columns> {
    /// Live rows, ids strictly ascending.
    stored: TypedRows<C>,
    /// Rows removed by the last maintenance call.
    removed: TypedRows<C>,
    /// Drained insert requests not yet merged.
    staged: TypedRows<C>,
    /// Drained remove requests not yet applied.
    pending_removes: Vec<Id>,
    /// Offsets of rows inserted by the last maintenance call.
    inserted: Vec<usize>,
    capacity: Capacity,
    insert_tx: Sender<(Id, C)>,
    insert_rx: Receiver<(Id, C)>,
    remove_tx: Sender<Id>,
    remove_rx: Receiver<Id>,
    entity_lists: EntityLists,
}

impl<C: Columns> Default for DataPool<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Columns> fmt::Debug for DataPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPool")
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .field("inserted", &self.inserted())
            .field("removed", &self.removed())
            .field("columns", &C::COUNT)
            .finish_non_exhaustive()
    }
}

impl<C: Columns> DataPool<C> {
    /// Creates an empty pool with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(&PoolConfig::default())
    }

    /// Creates an empty pool from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`](crate::EcsError::InvalidConfig) if
    /// the configuration does not validate.
    pub fn with_config(config: &PoolConfig) -> EcsResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: &PoolConfig) -> Self {
        let (insert_tx, insert_rx) = unbounded();
        let (remove_tx, remove_rx) = unbounded();
        Self {
            stored: TypedRows::default(),
            removed: TypedRows::default(),
            staged: TypedRows::default(),
            pending_removes: Vec::new(),
            inserted: Vec::new(),
            capacity: Capacity::from_config(config),
            insert_tx,
            insert_rx,
            remove_tx,
            remove_rx,
            entity_lists: EntityLists::default(),
        }
    }

    // ========================================================================
    // REQUESTS
    // ========================================================================

    /// Queues a row for insertion at the next maintenance call.
    ///
    /// If the same id is queued more than once, the last row wins. If the id
    /// is already stored at maintenance time, the stored row is kept.
    pub fn insert(&self, id: Id, row: C) {
        // Both channel ends live in `self`, so the send cannot fail.
        let _ = self.insert_tx.send((id, row));
    }

    /// Queues an id for removal at the next maintenance call.
    ///
    /// Ids that are not stored at that point are ignored.
    pub fn remove(&self, id: Id) {
        let _ = self.remove_tx.send(id);
    }

    /// Returns a handle that queues requests from other threads.
    #[must_use]
    pub fn sender(&self) -> PoolSender<C> {
        PoolSender {
            inserts: self.insert_tx.clone(),
            removes: self.remove_tx.clone(),
        }
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Applies all queued requests.
    ///
    /// In order:
    /// 1. Drops the rows removed by the previous call
    /// 2. Forgets the previous call's inserted offsets
    /// 3. Moves rows with queued remove requests to the removed store
    /// 4. Merges queued inserts into sorted storage
    ///
    /// Only requests queued before the call starts are applied.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::OutOfMemory`](crate::EcsError::OutOfMemory) if
    /// storage could not grow. All storage is reserved before any row moves,
    /// so a failed call leaves the pool as it was, including the previous
    /// call's removed rows and inserted offsets, and its requests stay queued
    /// for the next call.
    pub fn maintenance(&mut self) -> EcsResult<()> {
        let queued = self.remove_rx.len();
        self.pending_removes
            .extend(self.remove_rx.try_iter().take(queued));
        let queued = self.insert_rx.len();
        for (id, row) in self.insert_rx.try_iter().take(queued) {
            self.staged.push(id, row);
        }

        let counts = store::maintain(
            &mut self.stored,
            &mut self.removed,
            &mut self.staged,
            &mut self.pending_removes,
            &mut self.capacity,
            &mut self.inserted,
        )?;

        tracing::trace!(
            removed = counts.removed,
            inserted = counts.inserted,
            discarded = counts.discarded,
            size = self.stored.len(),
            "data pool maintenance"
        );
        Ok(())
    }

    // ========================================================================
    // CAPACITY
    // ========================================================================

    /// Number of live rows.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.stored.len()
    }

    /// Whether the pool holds no live rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stored.len() == 0
    }

    /// Row capacity of primary storage. Zero until the first growth.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity.current()
    }

    /// Requests at least `capacity` rows. Applied by the next maintenance
    /// call that inserts rows, even if storage already has room for them.
    pub fn reserve(&mut self, capacity: usize) {
        self.capacity.reserve(capacity);
    }

    /// Growth quantum of primary storage.
    #[inline]
    #[must_use]
    pub const fn expansion_rate(&self) -> usize {
        self.capacity.expansion_rate()
    }

    /// Sets the growth quantum.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`](crate::EcsError::InvalidConfig)
    /// for a rate of 0, leaving the current rate in place.
    pub fn set_expansion_rate(&mut self, rate: usize) -> EcsResult<()> {
        self.capacity.set_expansion_rate(rate)
    }

    // ========================================================================
    // LIVE ROWS
    // ========================================================================

    /// Ids of all live rows, strictly ascending.
    #[inline]
    #[must_use]
    pub fn ids(&self) -> &[Id] {
        &self.stored.ids
    }

    /// Every component column, index-aligned with [`DataPool::ids`].
    #[must_use]
    pub fn columns(&self) -> C::Slices<'_> {
        C::slices(&self.stored.columns)
    }

    /// The components of the row at `offset`.
    #[must_use]
    pub fn get(&self, offset: usize) -> Option<C::Ref<'_>> {
        C::row(&self.stored.columns, offset)
    }

    /// Mutable components of the row at `offset`. Ids are not reachable.
    #[must_use]
    pub fn get_mut(&mut self, offset: usize) -> Option<C::Mut<'_>> {
        C::row_mut(&mut self.stored.columns, offset)
    }

    /// Live rows in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (Id, C::Ref<'_>)> + '_ {
        self.stored.iter()
    }

    /// Offset of `id` in live storage (binary search).
    #[must_use]
    pub fn find(&self, id: Id) -> Option<usize> {
        store::find_sorted(&self.stored.ids, id)
    }

    /// Offset of `id` in live storage (linear scan).
    #[must_use]
    pub fn sequential_find(&self, id: Id) -> Option<usize> {
        self.stored.ids.iter().position(|&stored| stored == id)
    }

    /// Whether `id` is live.
    #[must_use]
    pub fn exists(&self, id: Id) -> bool {
        self.find(id).is_some()
    }

    // ========================================================================
    // LAST CYCLE
    // ========================================================================

    /// Number of rows inserted by the last maintenance call.
    #[inline]
    #[must_use]
    pub fn inserted(&self) -> usize {
        self.inserted.len()
    }

    /// Offsets of rows inserted by the last maintenance call, ascending.
    #[inline]
    #[must_use]
    pub fn inserted_offsets(&self) -> &[usize] {
        &self.inserted
    }

    /// Rows inserted by the last maintenance call, in ascending id order.
    pub fn inserted_iter(&self) -> impl Iterator<Item = (Id, C::Ref<'_>)> + '_ {
        self.inserted
            .iter()
            .filter_map(move |&offset| self.stored.row(offset))
    }

    /// Number of rows removed by the last maintenance call.
    #[inline]
    #[must_use]
    pub fn removed(&self) -> usize {
        self.removed.len()
    }

    /// Ids removed by the last maintenance call, ascending.
    #[inline]
    #[must_use]
    pub fn removed_ids(&self) -> &[Id] {
        &self.removed.ids
    }

    /// Components of the removed rows, index-aligned with
    /// [`DataPool::removed_ids`].
    #[must_use]
    pub fn removed_columns(&self) -> C::Slices<'_> {
        C::slices(&self.removed.columns)
    }

    /// Removed rows in ascending id order.
    pub fn removed_iter(&self) -> impl Iterator<Item = (Id, C::Ref<'_>)> + '_ {
        self.removed.iter()
    }

    /// Offset of `id` in the removed store.
    #[must_use]
    pub fn find_removed(&self, id: Id) -> Option<usize> {
        store::find_sorted(&self.removed.ids, id)
    }

    // ========================================================================
    // ENTITY LISTS
    // ========================================================================

    /// Attaches a shared entity list to this pool.
    pub fn add_entity_list(&mut self, list: EntityList) {
        self.entity_lists.add(list);
    }

    /// Detaches `list` (matched by identity). Returns whether it was attached.
    pub fn remove_entity_list(&mut self, list: &EntityList) -> bool {
        self.entity_lists.remove(list)
    }

    /// The attached entity lists, in attachment order.
    #[must_use]
    pub fn entity_lists(&self) -> &[EntityList] {
        self.entity_lists.as_slice()
    }
}
