//! # Row Stores and the Maintenance Core
//!
//! A [`Store`] is a structure-of-arrays buffer: one id array plus parallel
//! component storage, all index-aligned. Both pool variants run the same
//! merge-remove and merge-insert passes over their store through this trait;
//! only the element representation differs (typed `Vec`s or raw bytes).
//!
//! ## Reordering
//!
//! Neither pass copies rows. Each pass computes where every affected row has
//! to end up and applies that permutation with row swaps, following cycles:
//!
//! ```text
//! insert [2, 6] into [1, 3, 5, 7]
//!
//!   append:   1 3 5 7 2 6      rows 1.. move to offsets 2 3 5 1 4
//!   permute:  1 2 3 5 6 7      inserted offsets = [1, 4]
//! ```
//!
//! Every allocation a maintenance call needs happens before the first swap,
//! so a failed allocation leaves every store exactly as it was.

use crate::config::PoolConfig;
use crate::error::{EcsError, EcsResult};
use crate::id::Id;
use std::collections::TryReserveError;

/// Structure-of-arrays storage the maintenance passes operate on.
pub(crate) trait Store {
    /// Number of rows.
    fn len(&self) -> usize;

    /// Ids of all rows, index-aligned with the component storage.
    fn ids(&self) -> &[Id];

    /// Ensures room for at least `capacity` rows in total.
    fn try_reserve_total(&mut self, capacity: usize) -> Result<(), TryReserveError>;

    /// Swaps two rows across every array.
    fn swap_rows(&mut self, a: usize, b: usize);

    /// Moves every row of `other` onto the end of `self`, leaving `other` empty.
    fn append_rows(&mut self, other: &mut Self);

    /// Moves rows `at..` onto the end of `dst` without discarding them.
    fn move_tail_into(&mut self, at: usize, dst: &mut Self);

    /// Discards every row from `len` on.
    fn truncate_rows(&mut self, len: usize);
}

/// Reorders the rows `base..base + dest.len()` so that the row at
/// `base + i` ends up at `base + dest[i]`.
///
/// `dest` must be a permutation of `0..dest.len()`; it is consumed in the
/// process.
pub(crate) fn apply_permutation<S: Store>(store: &mut S, base: usize, dest: &mut [usize]) {
    for i in 0..dest.len() {
        while dest[i] != i {
            let j = dest[i];
            store.swap_rows(base + i, base + j);
            dest.swap(i, j);
        }
    }
}

/// Binary search over the sorted id array.
#[inline]
pub(crate) fn find_sorted(ids: &[Id], id: Id) -> Option<usize> {
    ids.binary_search(&id).ok()
}

// ============================================================================
// CAPACITY
// ============================================================================

/// Capacity bookkeeping for primary storage.
///
/// Capacity is logical: it only changes when an insert pass merges rows, and
/// then jumps to a multiple of the expansion rate or to the reserved capacity,
/// whichever is larger.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Capacity {
    current: usize,
    reserved: usize,
    expansion_rate: usize,
}

impl Capacity {
    pub(crate) const fn from_config(config: &PoolConfig) -> Self {
        Self {
            current: 0,
            reserved: config.initial_capacity,
            expansion_rate: config.expansion_rate,
        }
    }

    #[inline]
    pub(crate) const fn current(&self) -> usize {
        self.current
    }

    #[inline]
    pub(crate) const fn expansion_rate(&self) -> usize {
        self.expansion_rate
    }

    pub(crate) fn set_expansion_rate(&mut self, rate: usize) -> EcsResult<()> {
        crate::config::check_expansion_rate(rate)?;
        self.expansion_rate = rate;
        Ok(())
    }

    /// Raises the minimum capacity used by the next growth.
    pub(crate) fn reserve(&mut self, capacity: usize) {
        self.reserved = self.reserved.max(capacity);
    }

    /// Capacity required to hold `needed` rows, never below the reserved
    /// capacity.
    fn target(&self, needed: usize) -> EcsResult<usize> {
        let fitted = if needed <= self.current {
            self.current
        } else {
            let rate = self.expansion_rate.max(1);
            needed
                .div_ceil(rate)
                .checked_mul(rate)
                .ok_or(EcsError::OutOfMemory { requested: needed })?
        };
        Ok(fitted.max(self.reserved))
    }

    /// Grows `store` so it can hold `needed` rows, or more if a larger
    /// capacity was reserved.
    fn grow<S: Store>(&mut self, store: &mut S, needed: usize) -> EcsResult<()> {
        let target = self.target(needed)?;
        if target <= self.current {
            return Ok(());
        }

        store.try_reserve_total(target).map_err(|_| {
            tracing::warn!(requested = target, "pool storage growth failed");
            EcsError::OutOfMemory { requested: target }
        })?;

        tracing::debug!(from = self.current, to = target, "pool storage grown");
        self.current = target;
        Ok(())
    }
}

// ============================================================================
// MAINTENANCE
// ============================================================================

/// Result of one maintenance call over a store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PassCounts {
    /// Rows moved from primary storage to the removed store.
    pub removed: usize,
    /// Rows merged into primary storage.
    pub inserted: usize,
    /// Staged rows dropped as superseded duplicates or already-present ids.
    pub discarded: usize,
}

/// Applies one maintenance call: clears the removed store and inserted
/// offsets, moves every row whose id is in `requests` to `removed`, then
/// merges the rows of `staged` into `primary`.
///
/// Remove requests with no matching row are ignored. Among staged rows
/// sharing an id the last one staged wins; a staged row whose id is still in
/// `primary` after the removals is discarded and the existing row kept.
/// Discarded rows are truncated away, which runs their destructors. Final
/// offsets of merged rows are recorded, ascending, in `inserted`.
///
/// Both stores are reserved before anything moves. On allocation failure
/// every store, `requests`, `staged` and `inserted` are left as they were.
pub(crate) fn maintain<S: Store>(
    primary: &mut S,
    removed: &mut S,
    staged: &mut S,
    requests: &mut Vec<Id>,
    capacity: &mut Capacity,
    inserted: &mut Vec<usize>,
) -> EcsResult<PassCounts> {
    requests.sort_unstable();
    requests.dedup();
    let matched = match_removals(primary.ids(), requests);
    let (keep, discard) = plan_inserts(staged.ids(), primary.ids(), &matched);

    if !matched.is_empty() {
        // The removed store is cleared first, so its total is just the matches.
        let requested = matched.len();
        removed.try_reserve_total(requested).map_err(|_| {
            tracing::warn!(requested, "removed storage growth failed");
            EcsError::OutOfMemory { requested }
        })?;
    }
    if !keep.is_empty() {
        let needed = primary.len() - matched.len() + keep.len();
        capacity.grow(primary, needed)?;
    }

    removed.truncate_rows(0);
    inserted.clear();
    requests.clear();

    let removed_count = apply_removals(primary, removed, &matched);
    let (inserted_count, discarded) = apply_inserts(primary, staged, &keep, &discard, inserted);
    Ok(PassCounts {
        removed: removed_count,
        inserted: inserted_count,
        discarded,
    })
}

/// Offsets in `ids` of every id in the sorted, deduplicated `requests`.
fn match_removals(ids: &[Id], requests: &[Id]) -> Vec<usize> {
    let mut matched = Vec::new();
    let mut p = 0;
    for &id in requests {
        while p < ids.len() && ids[p] < id {
            p += 1;
        }
        if p == ids.len() {
            break;
        }
        if ids[p] == id {
            matched.push(p);
            p += 1;
        }
    }
    matched
}

/// Splits staged rows into survivors (sorted by id) and discards.
///
/// `matched` holds the offsets of existing rows about to be removed; their
/// ids count as absent.
fn plan_inserts(staged: &[Id], existing: &[Id], matched: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..staged.len()).collect();
    // Stable: equal ids stay in staging order, so the last one wins.
    order.sort_by_key(|&row| staged[row]);

    let mut keep = Vec::with_capacity(order.len());
    let mut discard = Vec::new();
    let mut p = 0;

    for (pos, &row) in order.iter().enumerate() {
        let id = staged[row];
        let superseded = order
            .get(pos + 1)
            .is_some_and(|&next| staged[next] == id);
        if superseded {
            discard.push(row);
            continue;
        }

        while p < existing.len() && existing[p] < id {
            p += 1;
        }
        if existing.get(p) == Some(&id) && matched.binary_search(&p).is_err() {
            discard.push(row);
        } else {
            keep.push(row);
        }
    }

    (keep, discard)
}

/// Moves the `matched` rows of `primary` onto the end of `removed`.
fn apply_removals<S: Store>(primary: &mut S, removed: &mut S, matched: &[usize]) -> usize {
    let Some(&first) = matched.first() else {
        return 0;
    };

    // Kept rows slide down in order, matched rows go to the tail in order.
    let count = matched.len();
    let len = primary.len();
    let kept_len = len - count;
    let mut dest = Vec::with_capacity(len - first);
    let mut m = 0;
    for offset in first..len {
        if m < count && matched[m] == offset {
            dest.push(kept_len + m - first);
            m += 1;
        } else {
            dest.push(offset - m - first);
        }
    }

    apply_permutation(primary, first, &mut dest);
    primary.move_tail_into(kept_len, removed);
    count
}

/// Drops the `discard` rows of `staged` and merges the `keep` rows into
/// `primary`. Returns the inserted and discarded counts.
fn apply_inserts<S: Store>(
    primary: &mut S,
    staged: &mut S,
    keep: &[usize],
    discard: &[usize],
    inserted: &mut Vec<usize>,
) -> (usize, usize) {
    if staged.len() == 0 {
        return (0, 0);
    }

    let mut dest = vec![0; staged.len()];
    for (slot, &row) in keep.iter().chain(discard.iter()).enumerate() {
        dest[row] = slot;
    }
    apply_permutation(staged, 0, &mut dest);
    staged.truncate_rows(keep.len());

    if keep.is_empty() {
        return (0, discard.len());
    }

    // Number of existing rows sorting before each staged row.
    let lower_bounds: Vec<usize> = {
        let ids = primary.ids();
        let mut p = 0;
        staged
            .ids()
            .iter()
            .map(|&id| {
                while p < ids.len() && ids[p] < id {
                    p += 1;
                }
                p
            })
            .collect()
    };

    let len = primary.len();
    let count = lower_bounds.len();
    let first = lower_bounds[0];
    primary.append_rows(staged);

    let mut dest = Vec::with_capacity(len + count - first);
    let mut k = 0;
    for offset in first..len {
        while k < count && lower_bounds[k] <= offset {
            k += 1;
        }
        dest.push(offset + k - first);
    }
    inserted.reserve(count);
    for (k, &bound) in lower_bounds.iter().enumerate() {
        dest.push(bound + k - first);
        inserted.push(bound + k);
    }

    apply_permutation(primary, first, &mut dest);
    (count, discard.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal store: ids with one `u32` value column.
    #[derive(Debug, Default)]
    struct TestStore {
        ids: Vec<Id>,
        values: Vec<u32>,
        dropped: Vec<u32>,
        fail_reserve: bool,
    }

    impl TestStore {
        fn with_rows(rows: &[(u32, u32)]) -> Self {
            let mut store = Self::default();
            for &(id, value) in rows {
                store.ids.push(Id::from_raw(id));
                store.values.push(value);
            }
            store
        }

        fn raw_ids(&self) -> Vec<u32> {
            self.ids.iter().map(|id| id.raw()).collect()
        }
    }

    impl Store for TestStore {
        fn len(&self) -> usize {
            self.ids.len()
        }

        fn ids(&self) -> &[Id] {
            &self.ids
        }

        fn try_reserve_total(&mut self, capacity: usize) -> Result<(), TryReserveError> {
            if self.fail_reserve {
                return Vec::<u64>::new().try_reserve_exact(usize::MAX);
            }
            let additional = capacity.saturating_sub(self.ids.len());
            self.ids.try_reserve_exact(additional)?;
            self.values.try_reserve_exact(additional)
        }

        fn swap_rows(&mut self, a: usize, b: usize) {
            self.ids.swap(a, b);
            self.values.swap(a, b);
        }

        fn append_rows(&mut self, other: &mut Self) {
            self.ids.append(&mut other.ids);
            self.values.append(&mut other.values);
        }

        fn move_tail_into(&mut self, at: usize, dst: &mut Self) {
            dst.ids.extend(self.ids.drain(at..));
            dst.values.extend(self.values.drain(at..));
        }

        fn truncate_rows(&mut self, len: usize) {
            self.ids.truncate(len);
            self.dropped.extend(self.values.drain(len..));
        }
    }

    fn capacity(rate: usize) -> Capacity {
        Capacity::from_config(&PoolConfig {
            expansion_rate: rate,
            ..PoolConfig::default()
        })
    }

    #[test]
    fn test_permutation_cycles() {
        let mut store = TestStore::with_rows(&[(1, 10), (3, 30), (5, 50), (7, 70), (2, 20), (6, 60)]);
        let mut dest = vec![1, 2, 4, 0, 3];
        apply_permutation(&mut store, 1, &mut dest);
        assert_eq!(store.raw_ids(), vec![1, 2, 3, 5, 6, 7]);
        assert_eq!(store.values, vec![10, 20, 30, 50, 60, 70]);
    }

    /// Stores and queues of one pool, run through [`maintain`].
    #[derive(Default)]
    struct Harness {
        primary: TestStore,
        removed: TestStore,
        staged: TestStore,
        requests: Vec<Id>,
        inserted: Vec<usize>,
    }

    impl Harness {
        fn with_rows(rows: &[(u32, u32)]) -> Self {
            Self {
                primary: TestStore::with_rows(rows),
                ..Self::default()
            }
        }

        fn stage(&mut self, rows: &[(u32, u32)]) {
            for &(id, value) in rows {
                self.staged.ids.push(Id::from_raw(id));
                self.staged.values.push(value);
            }
        }

        fn request_removal(&mut self, ids: &[u32]) {
            self.requests.extend(ids.iter().copied().map(Id::from_raw));
        }

        fn run(&mut self, cap: &mut Capacity) -> EcsResult<PassCounts> {
            maintain(
                &mut self.primary,
                &mut self.removed,
                &mut self.staged,
                &mut self.requests,
                cap,
                &mut self.inserted,
            )
        }
    }

    fn counts(removed: usize, inserted: usize, discarded: usize) -> PassCounts {
        PassCounts {
            removed,
            inserted,
            discarded,
        }
    }

    #[test]
    fn test_insert_merges_sorted() {
        let mut pool = Harness::with_rows(&[(1, 10), (3, 30), (5, 50), (7, 70)]);
        pool.stage(&[(6, 60), (2, 20), (9, 90), (0x10, 160)]);
        let mut cap = capacity(1);

        assert_eq!(pool.run(&mut cap).unwrap(), counts(0, 4, 0));
        assert_eq!(pool.primary.raw_ids(), vec![1, 2, 3, 5, 6, 7, 9, 0x10]);
        assert_eq!(pool.primary.values, vec![10, 20, 30, 50, 60, 70, 90, 160]);
        assert_eq!(pool.inserted, vec![1, 4, 6, 7]);
        assert_eq!(pool.staged.len(), 0);
    }

    #[test]
    fn test_insert_keeps_last_duplicate() {
        let mut pool = Harness::default();
        pool.stage(&[(16, 1), (4, 7), (16, 2), (16, 3)]);
        let mut cap = capacity(128);

        assert_eq!(pool.run(&mut cap).unwrap(), counts(0, 2, 2));
        assert_eq!(pool.primary.raw_ids(), vec![4, 16]);
        assert_eq!(pool.primary.values, vec![7, 3]);

        pool.staged.dropped.sort_unstable();
        assert_eq!(pool.staged.dropped, vec![1, 2]);
        assert_eq!(cap.current(), 128);
    }

    #[test]
    fn test_insert_existing_id_discarded() {
        let mut pool = Harness::with_rows(&[(16, 1)]);
        pool.stage(&[(16, 2)]);
        let mut cap = capacity(1);

        assert_eq!(pool.run(&mut cap).unwrap(), counts(0, 0, 1));
        assert_eq!(pool.primary.values, vec![1]);
        assert_eq!(pool.staged.dropped, vec![2]);
        assert!(pool.inserted.is_empty());
    }

    #[test]
    fn test_remove_moves_to_tail_store() {
        let rows: Vec<(u32, u32)> = (1..=10).map(|i| (i, i * 10)).collect();
        let mut pool = Harness::with_rows(&rows);
        pool.request_removal(&[9, 2, 42, 5, 2]);

        assert_eq!(pool.run(&mut capacity(1)).unwrap(), counts(3, 0, 0));
        assert!(pool.requests.is_empty());
        assert_eq!(pool.primary.raw_ids(), vec![1, 3, 4, 6, 7, 8, 10]);
        assert_eq!(pool.primary.values, vec![10, 30, 40, 60, 70, 80, 100]);
        assert_eq!(pool.removed.raw_ids(), vec![2, 5, 9]);
        assert_eq!(pool.removed.values, vec![20, 50, 90]);
        assert!(pool.primary.dropped.is_empty());
    }

    #[test]
    fn test_removed_store_cleared_next_call() {
        let mut pool = Harness::with_rows(&[(1, 10), (2, 20)]);
        pool.request_removal(&[2]);
        let mut cap = capacity(1);

        pool.run(&mut cap).unwrap();
        assert_eq!(pool.removed.values, vec![20]);
        assert!(pool.removed.dropped.is_empty());

        assert_eq!(pool.run(&mut cap).unwrap(), counts(0, 0, 0));
        assert_eq!(pool.removed.len(), 0);
        assert_eq!(pool.removed.dropped, vec![20]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut pool = Harness::with_rows(&[(1, 1), (3, 3)]);
        pool.request_removal(&[0, 2, 4]);

        assert_eq!(pool.run(&mut capacity(1)).unwrap(), counts(0, 0, 0));
        assert_eq!(pool.primary.raw_ids(), vec![1, 3]);
        assert_eq!(pool.removed.len(), 0);
        assert!(pool.requests.is_empty());
    }

    #[test]
    fn test_remove_then_reinsert_same_call() {
        let mut pool = Harness::with_rows(&[(1, 10), (3, 30)]);
        pool.request_removal(&[3]);
        pool.stage(&[(3, 99), (1, 11)]);

        assert_eq!(pool.run(&mut capacity(1)).unwrap(), counts(1, 1, 1));
        assert_eq!(pool.primary.raw_ids(), vec![1, 3]);
        assert_eq!(pool.primary.values, vec![10, 99]);
        assert_eq!(pool.removed.values, vec![30]);
        assert_eq!(pool.inserted, vec![1]);
    }

    #[test]
    fn test_failed_growth_leaves_everything_intact() {
        let mut pool = Harness::with_rows(&[(1, 10), (3, 30)]);
        let mut cap = capacity(1);
        pool.request_removal(&[1]);
        pool.run(&mut cap).unwrap();
        pool.stage(&[(1, 11)]);
        pool.run(&mut cap).unwrap();
        assert_eq!(pool.removed.len(), 0);

        // Removed store and inserted offsets from a successful call.
        pool.request_removal(&[3]);
        pool.stage(&[(5, 50)]);
        pool.run(&mut cap).unwrap();
        assert_eq!(pool.inserted, vec![1]);
        assert_eq!(pool.removed.values, vec![30]);

        pool.primary.fail_reserve = true;
        pool.request_removal(&[1]);
        pool.stage(&[(2, 20), (2, 21), (4, 40)]);

        let err = pool.run(&mut cap).unwrap_err();
        assert_eq!(err, EcsError::OutOfMemory { requested: 3 });
        assert_eq!(pool.primary.raw_ids(), vec![1, 5]);
        assert_eq!(pool.primary.values, vec![11, 50]);
        assert_eq!(pool.inserted, vec![1]);
        assert_eq!(pool.removed.values, vec![30]);
        assert_eq!(pool.removed.dropped, vec![10]);
        assert_eq!(pool.requests, vec![Id::from_raw(1)]);
        assert_eq!(pool.staged.raw_ids(), vec![2, 2, 4]);
        assert_eq!(pool.staged.values, vec![20, 21, 40]);
        assert!(pool.staged.dropped.is_empty());
        assert_eq!(cap.current(), 2);

        pool.primary.fail_reserve = false;
        assert_eq!(pool.run(&mut cap).unwrap(), counts(1, 2, 1));
        assert_eq!(pool.primary.values, vec![21, 40, 50]);
        assert_eq!(pool.removed.values, vec![11]);
        assert_eq!(pool.removed.dropped, vec![10, 30]);
    }

    #[test]
    fn test_failed_removal_keeps_previous_removed_rows() {
        let mut pool = Harness::with_rows(&[(1, 10), (3, 30), (5, 50)]);
        let mut cap = capacity(1);
        pool.request_removal(&[5]);
        pool.run(&mut cap).unwrap();

        pool.removed.fail_reserve = true;
        pool.request_removal(&[3, 1]);
        assert!(pool.run(&mut cap).is_err());
        assert_eq!(pool.primary.raw_ids(), vec![1, 3]);
        assert_eq!(pool.removed.values, vec![50]);
        assert!(pool.removed.dropped.is_empty());
        assert_eq!(pool.requests.len(), 2);

        pool.removed.fail_reserve = false;
        assert_eq!(pool.run(&mut cap).unwrap(), counts(2, 0, 0));
        assert_eq!(pool.removed.values, vec![10, 30]);
        assert_eq!(pool.removed.dropped, vec![50]);
    }

    #[test]
    fn test_reserve_applies_after_first_growth() {
        let mut pool = Harness::default();
        let mut cap = capacity(128);
        pool.stage(&[(1, 1)]);
        pool.run(&mut cap).unwrap();
        assert_eq!(cap.current(), 128);

        // Takes effect on the next call that merges rows, not before.
        cap.reserve(1024);
        pool.request_removal(&[1]);
        pool.run(&mut cap).unwrap();
        assert_eq!(cap.current(), 128);

        pool.stage(&[(2, 2)]);
        pool.run(&mut cap).unwrap();
        assert_eq!(cap.current(), 1024);
        assert_eq!(pool.primary.raw_ids(), vec![2]);
    }

    #[test]
    fn test_capacity_rounding() {
        let mut cap = capacity(100);
        assert_eq!(cap.target(1).unwrap(), 100);
        assert_eq!(cap.target(101).unwrap(), 200);

        cap.reserve(1024);
        assert_eq!(cap.target(1).unwrap(), 1024);
        assert_eq!(cap.target(1025).unwrap(), 1100);
    }

    #[test]
    fn test_zero_expansion_rate_rejected() {
        let mut cap = capacity(100);
        assert!(matches!(
            cap.set_expansion_rate(0),
            Err(EcsError::InvalidConfig(_))
        ));
        assert_eq!(cap.expansion_rate(), 100);
        cap.set_expansion_rate(7).unwrap();
        assert_eq!(cap.target(8).unwrap(), 14);
    }
}
