//! # Type-Erased Component Pool
//!
//! The same sorted storage and maintenance protocol as
//! [`DataPool`](super::DataPool), for a single component whose type is only
//! known at runtime: each element is `element_size` raw bytes.
//!
//! ## Element Lifetime
//!
//! An optional destructor callback runs exactly once for every element that
//! is discarded:
//! - A queued insert superseded by a later insert of the same id
//! - A queued insert for an id that is already stored
//! - A removed element, on the maintenance call after its removal
//! - Every element still stored, removed or queued when the pool is dropped
//!
//! Elements moved between stores are never destructed on the way.

use super::entity_list::{EntityList, EntityLists};
use super::store::{self, Capacity, Store};
use crate::config::PoolConfig;
use crate::error::{EcsError, EcsResult};
use crate::id::Id;
use bytemuck::Pod;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::TryReserveError;
use std::fmt;
use std::sync::Arc;

/// Insert-queue growth step, in elements.
pub const INSERT_CAPACITY_STEP: usize = 16;

/// Callback run on the bytes of each discarded element.
pub type Destructor = Arc<dyn Fn(&mut [u8]) + Send + Sync>;

// ============================================================================
// ERASED ROWS
// ============================================================================

/// Id array plus a packed byte array of fixed-stride elements.
struct ErasedRows {
    ids: Vec<Id>,
    bytes: Vec<u8>,
    stride: usize,
    destructor: Option<Destructor>,
}

impl ErasedRows {
    fn new(stride: usize, destructor: Option<Destructor>) -> Self {
        Self {
            ids: Vec::new(),
            bytes: Vec::new(),
            stride,
            destructor,
        }
    }

    /// Appends a row. Capacity must already be reserved by the caller.
    fn push(&mut self, id: Id, element: &[u8]) {
        self.ids.push(id);
        self.bytes.extend_from_slice(element);
    }

    fn element(&self, offset: usize) -> Option<&[u8]> {
        let start = offset.checked_mul(self.stride)?;
        self.bytes.get(start..start.checked_add(self.stride)?)
    }

    fn element_mut(&mut self, offset: usize) -> Option<&mut [u8]> {
        let start = offset.checked_mul(self.stride)?;
        self.bytes.get_mut(start..start.checked_add(self.stride)?)
    }

    fn iter(&self) -> impl Iterator<Item = (Id, &[u8])> + '_ {
        self.ids
            .iter()
            .copied()
            .zip(self.bytes.chunks_exact(self.stride))
    }
}

impl Store for ErasedRows {
    #[inline]
    fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    fn ids(&self) -> &[Id] {
        &self.ids
    }

    fn try_reserve_total(&mut self, capacity: usize) -> Result<(), TryReserveError> {
        self.ids
            .try_reserve_exact(capacity.saturating_sub(self.ids.len()))?;
        // Saturates into a capacity overflow error on absurd requests.
        let total_bytes = capacity.saturating_mul(self.stride);
        self.bytes
            .try_reserve_exact(total_bytes.saturating_sub(self.bytes.len()))
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.ids.swap(a, b);

        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let stride = self.stride;
        let (head, tail) = self.bytes.split_at_mut(hi * stride);
        head[lo * stride..(lo + 1) * stride].swap_with_slice(&mut tail[..stride]);
    }

    fn append_rows(&mut self, other: &mut Self) {
        self.ids.append(&mut other.ids);
        self.bytes.append(&mut other.bytes);
    }

    fn move_tail_into(&mut self, at: usize, dst: &mut Self) {
        dst.ids.extend(self.ids.drain(at..));
        dst.bytes.extend(self.bytes.drain(at * self.stride..));
    }

    fn truncate_rows(&mut self, len: usize) {
        if len >= self.ids.len() {
            return;
        }
        if let Some(destructor) = &self.destructor {
            for element in self.bytes[len * self.stride..].chunks_exact_mut(self.stride) {
                destructor(element);
            }
        }
        self.ids.truncate(len);
        self.bytes.truncate(len * self.stride);
    }
}

impl Drop for ErasedRows {
    fn drop(&mut self) {
        self.truncate_rows(0);
    }
}

/// Insert requests waiting for maintenance.
struct InsertStaging {
    rows: ErasedRows,
    /// Element capacity of `rows`.
    capacity: usize,
    /// Capacity to jump to on the next insert; consumed by it.
    reserved: usize,
}

impl InsertStaging {
    /// Frees the emptied queue storage after maintenance.
    fn release(&mut self) {
        self.rows.ids = Vec::new();
        self.rows.bytes = Vec::new();
        self.capacity = 0;
    }

    fn make_room(&mut self) -> EcsResult<()> {
        let mut target = self.capacity;
        if self.rows.len() >= target {
            target += INSERT_CAPACITY_STEP;
        }
        target = target.max(self.reserved);
        self.reserved = 0;

        if target > self.capacity {
            self.rows.try_reserve_total(target).map_err(|_| {
                tracing::warn!(requested = target, "insert queue growth failed");
                EcsError::OutOfMemory { requested: target }
            })?;
            self.capacity = target;
        }
        Ok(())
    }
}

// ============================================================================
// COMPONENT POOL
// ============================================================================

/// Pool of fixed-size, type-erased elements keyed by [`Id`].
///
/// # Example
///
/// ```rust
/// use strata_ecs::{ComponentPool, Id};
///
/// let mut pool = ComponentPool::new(std::mem::size_of::<u32>(), None)?;
/// pool.insert_pod(Id::from_raw(9), &90u32)?;
/// pool.insert_pod(Id::from_raw(4), &40u32)?;
/// pool.maintenance()?;
///
/// assert_eq!(pool.ids(), &[Id::from_raw(4), Id::from_raw(9)]);
/// assert_eq!(pool.get_pod::<u32>(1), Some(90));
/// # Ok::<(), strata_ecs::EcsError>(())
/// ```
pub struct ComponentPool {
    element_size: usize,
    /// Live elements, ids strictly ascending.
    stored: ErasedRows,
    /// Elements removed by the last maintenance call.
    removed: ErasedRows,
    staging: Mutex<InsertStaging>,
    /// Drained remove requests not yet applied.
    pending_removes: Vec<Id>,
    remove_tx: Sender<Id>,
    remove_rx: Receiver<Id>,
    /// Offsets of elements inserted by the last maintenance call.
    inserted: Vec<usize>,
    capacity: Capacity,
    entity_lists: EntityLists,
}

impl fmt::Debug for ComponentPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentPool")
            .field("element_size", &self.element_size)
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .field("inserted", &self.inserted())
            .field("removed", &self.removed())
            .field("has_destructor", &self.stored.destructor.is_some())
            .finish_non_exhaustive()
    }
}

impl ComponentPool {
    /// Creates an empty pool with the default configuration.
    ///
    /// # Arguments
    ///
    /// * `element_size` - Size in bytes of every element
    /// * `destructor` - Called on each element when it is discarded
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ZeroElementSize`] if `element_size` is 0.
    pub fn new(element_size: usize, destructor: Option<Destructor>) -> EcsResult<Self> {
        Self::with_config(&PoolConfig::default(), element_size, destructor)
    }

    /// Creates an empty pool from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ZeroElementSize`] if `element_size` is 0, or
    /// [`EcsError::InvalidConfig`] if the configuration does not validate.
    pub fn with_config(
        config: &PoolConfig,
        element_size: usize,
        destructor: Option<Destructor>,
    ) -> EcsResult<Self> {
        if element_size == 0 {
            return Err(EcsError::ZeroElementSize);
        }
        config.validate()?;

        let (remove_tx, remove_rx) = unbounded();
        Ok(Self {
            element_size,
            stored: ErasedRows::new(element_size, destructor.clone()),
            removed: ErasedRows::new(element_size, destructor.clone()),
            staging: Mutex::new(InsertStaging {
                rows: ErasedRows::new(element_size, destructor),
                capacity: 0,
                reserved: config.insert_capacity,
            }),
            pending_removes: Vec::new(),
            remove_tx,
            remove_rx,
            inserted: Vec::new(),
            capacity: Capacity::from_config(config),
            entity_lists: EntityLists::default(),
        })
    }

    /// Size in bytes of every element.
    #[inline]
    #[must_use]
    pub const fn element_size(&self) -> usize {
        self.element_size
    }

    // ========================================================================
    // REQUESTS
    // ========================================================================

    /// Queues a copy of `element` for insertion at the next maintenance call.
    ///
    /// The pool takes ownership of the copied bytes: if the insert is later
    /// discarded the destructor runs on them.
    ///
    /// # Errors
    ///
    /// - [`EcsError::ElementSizeMismatch`] if `element` is not exactly
    ///   [`ComponentPool::element_size`] bytes
    /// - [`EcsError::OutOfMemory`] if the insert queue could not grow
    pub fn insert(&self, id: Id, element: &[u8]) -> EcsResult<()> {
        if element.len() != self.element_size {
            return Err(EcsError::ElementSizeMismatch {
                expected: self.element_size,
                actual: element.len(),
            });
        }

        let mut staging = self.staging.lock();
        staging.make_room()?;
        staging.rows.push(id, element);
        Ok(())
    }

    /// Queues a plain-old-data value for insertion.
    ///
    /// # Errors
    ///
    /// Same as [`ComponentPool::insert`].
    pub fn insert_pod<T: Pod>(&self, id: Id, value: &T) -> EcsResult<()> {
        self.insert(id, bytemuck::bytes_of(value))
    }

    /// Queues an id for removal at the next maintenance call.
    pub fn remove(&self, id: Id) {
        // Both channel ends live in `self`, so the send cannot fail.
        let _ = self.remove_tx.send(id);
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Applies all queued requests.
    ///
    /// Destructs the elements removed by the previous call, then applies
    /// queued removals, then queued inserts. Afterwards the insert queue's
    /// storage is released, so [`ComponentPool::insert_capacity`] is 0 again.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::OutOfMemory`] if storage could not grow. All
    /// storage is reserved before any element moves, so a failed call leaves
    /// the pool as it was, including the previous call's removed elements,
    /// and its requests stay queued for the next call.
    pub fn maintenance(&mut self) -> EcsResult<()> {
        let queued = self.remove_rx.len();
        self.pending_removes
            .extend(self.remove_rx.try_iter().take(queued));

        let staging = self.staging.get_mut();
        let counts = store::maintain(
            &mut self.stored,
            &mut self.removed,
            &mut staging.rows,
            &mut self.pending_removes,
            &mut self.capacity,
            &mut self.inserted,
        )?;
        staging.release();

        tracing::trace!(
            removed = counts.removed,
            inserted = counts.inserted,
            discarded = counts.discarded,
            size = self.stored.len(),
            "component pool maintenance"
        );
        Ok(())
    }

    // ========================================================================
    // CAPACITY
    // ========================================================================

    /// Number of live elements.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.stored.len()
    }

    /// Whether the pool holds no live elements.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stored.len() == 0
    }

    /// Element capacity of primary storage. Zero until the first growth.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity.current()
    }

    /// Requests at least `capacity` elements. Applied by the next maintenance
    /// call that inserts elements, even if storage already has room for them.
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
    /// Returns [`EcsError::InvalidConfig`] for a rate of 0, leaving the
    /// current rate in place.
    pub fn set_expansion_rate(&mut self, rate: usize) -> EcsResult<()> {
        self.capacity.set_expansion_rate(rate)
    }

    /// Element capacity of the insert queue. Grows as elements are queued
    /// and drops back to 0 after each successful maintenance call.
    #[must_use]
    pub fn insert_capacity(&self) -> usize {
        self.staging.lock().capacity
    }

    /// Grows the insert queue to at least `capacity` on the next insert.
    pub fn reserve_insert_capacity(&self, capacity: usize) {
        let mut staging = self.staging.lock();
        staging.reserved = staging.reserved.max(capacity);
    }

    // ========================================================================
    // LIVE ELEMENTS
    // ========================================================================

    /// Ids of all live elements, strictly ascending.
    #[inline]
    #[must_use]
    pub fn ids(&self) -> &[Id] {
        &self.stored.ids
    }

    /// Packed bytes of all live elements, index-aligned with
    /// [`ComponentPool::ids`].
    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.stored.bytes
    }

    /// Bytes of the element at `offset`.
    #[must_use]
    pub fn get(&self, offset: usize) -> Option<&[u8]> {
        self.stored.element(offset)
    }

    /// Mutable bytes of the element at `offset`. Ids are not reachable.
    #[must_use]
    pub fn get_mut(&mut self, offset: usize) -> Option<&mut [u8]> {
        self.stored.element_mut(offset)
    }

    /// Reads the element at `offset` as `T`.
    ///
    /// Returns `None` if the offset is out of range or `T` is not exactly
    /// [`ComponentPool::element_size`] bytes.
    #[must_use]
    pub fn get_pod<T: Pod>(&self, offset: usize) -> Option<T> {
        self.get(offset)
            .and_then(|bytes| bytemuck::try_pod_read_unaligned(bytes).ok())
    }

    /// Live elements in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (Id, &[u8])> + '_ {
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

    /// Number of elements inserted by the last maintenance call.
    #[inline]
    #[must_use]
    pub fn inserted(&self) -> usize {
        self.inserted.len()
    }

    /// Offsets of elements inserted by the last maintenance call, ascending.
    #[inline]
    #[must_use]
    pub fn inserted_offsets(&self) -> &[usize] {
        &self.inserted
    }

    /// Elements inserted by the last maintenance call, in ascending id order.
    pub fn inserted_iter(&self) -> impl Iterator<Item = (Id, &[u8])> + '_ {
        self.inserted.iter().filter_map(move |&offset| {
            let id = *self.stored.ids.get(offset)?;
            self.stored.element(offset).map(|bytes| (id, bytes))
        })
    }

    /// Number of elements removed by the last maintenance call.
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

    /// Packed bytes of the removed elements.
    #[inline]
    #[must_use]
    pub fn removed_data(&self) -> &[u8] {
        &self.removed.bytes
    }

    /// Bytes of the removed element at `offset`.
    #[must_use]
    pub fn removed_get(&self, offset: usize) -> Option<&[u8]> {
        self.removed.element(offset)
    }

    /// Reads the removed element at `offset` as `T`.
    #[must_use]
    pub fn removed_get_pod<T: Pod>(&self, offset: usize) -> Option<T> {
        self.removed_get(offset)
            .and_then(|bytes| bytemuck::try_pod_read_unaligned(bytes).ok())
    }

    /// Removed elements in ascending id order.
    pub fn removed_iter(&self) -> impl Iterator<Item = (Id, &[u8])> + '_ {
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
