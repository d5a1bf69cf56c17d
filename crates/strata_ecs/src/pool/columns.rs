//! # Typed Component Columns
//!
//! A [`DataPool`](super::DataPool) stores each component type in its own
//! `Vec`, index-aligned with the id array. The set of component types is a
//! tuple, from `(A,)` up to `(A, B, C, D, E, F, G, H)`:
//!
//! ```text
//! DataPool<(Position, Velocity)>
//!
//!   ids:       [  3,   7,  12 ]
//!   columns.0: [ p3,  p7, p12 ]   Vec<Position>
//!   columns.1: [ v3,  v7, v12 ]   Vec<Velocity>
//! ```

use super::store::Store;
use crate::id::Id;
use std::collections::TryReserveError;

/// A tuple of component types stored as parallel columns.
///
/// Implemented for tuples of 1 to 8 element types. Every row of a pool is one
/// value of the tuple; the pool splits it into its columns on insertion.
pub trait Columns: Sized {
    /// One `Vec` per component type.
    type Vecs: Default;
    /// Shared references to one row's components.
    type Ref<'a>
    where
        Self: 'a;
    /// Mutable references to one row's components.
    type Mut<'a>
    where
        Self: 'a;
    /// One slice per component type.
    type Slices<'a>
    where
        Self: 'a;

    /// Number of component columns.
    const COUNT: usize;

    /// Splits a row into its columns.
    fn push(vecs: &mut Self::Vecs, row: Self);

    /// Reserves room for `additional` more rows in every column.
    ///
    /// # Errors
    ///
    /// Returns the first column's allocation failure.
    fn try_reserve_exact(vecs: &mut Self::Vecs, additional: usize) -> Result<(), TryReserveError>;

    /// Swaps two rows in every column.
    fn swap(vecs: &mut Self::Vecs, a: usize, b: usize);

    /// Moves all rows of `other` onto the end of `vecs`.
    fn append(vecs: &mut Self::Vecs, other: &mut Self::Vecs);

    /// Moves rows `at..` onto the end of `dst`.
    fn drain_tail_into(vecs: &mut Self::Vecs, at: usize, dst: &mut Self::Vecs);

    /// Drops every row from `len` on.
    fn truncate(vecs: &mut Self::Vecs, len: usize);

    /// References to the row at `offset`.
    fn row<'a>(vecs: &'a Self::Vecs, offset: usize) -> Option<Self::Ref<'a>>
    where
        Self: 'a;

    /// Mutable references to the row at `offset`.
    fn row_mut<'a>(vecs: &'a mut Self::Vecs, offset: usize) -> Option<Self::Mut<'a>>
    where
        Self: 'a;

    /// Every column as a slice.
    fn slices<'a>(vecs: &'a Self::Vecs) -> Self::Slices<'a>
    where
        Self: 'a;
}

macro_rules! impl_columns {
    ($count:expr; $($name:ident $idx:tt),+) => {
        impl<$($name),+> Columns for ($($name,)+) {
            type Vecs = ($(Vec<$name>,)+);
            type Ref<'a> = ($(&'a $name,)+) where Self: 'a;
            type Mut<'a> = ($(&'a mut $name,)+) where Self: 'a;
            type Slices<'a> = ($(&'a [$name],)+) where Self: 'a;

            const COUNT: usize = $count;

            #[inline]
            fn push(vecs: &mut Self::Vecs, row: Self) {
                $( vecs.$idx.push(row.$idx); )+
            }

            fn try_reserve_exact(
                vecs: &mut Self::Vecs,
                additional: usize,
            ) -> Result<(), TryReserveError> {
                $( vecs.$idx.try_reserve_exact(additional)?; )+
                Ok(())
            }

            #[inline]
            fn swap(vecs: &mut Self::Vecs, a: usize, b: usize) {
                $( vecs.$idx.swap(a, b); )+
            }

            fn append(vecs: &mut Self::Vecs, other: &mut Self::Vecs) {
                $( vecs.$idx.append(&mut other.$idx); )+
            }

            fn drain_tail_into(vecs: &mut Self::Vecs, at: usize, dst: &mut Self::Vecs) {
                $( dst.$idx.extend(vecs.$idx.drain(at..)); )+
            }

            fn truncate(vecs: &mut Self::Vecs, len: usize) {
                $( vecs.$idx.truncate(len); )+
            }

            #[inline]
            fn row<'a>(vecs: &'a Self::Vecs, offset: usize) -> Option<Self::Ref<'a>>
            where
                Self: 'a,
            {
                Some(($( vecs.$idx.get(offset)?, )+))
            }

            #[inline]
            fn row_mut<'a>(vecs: &'a mut Self::Vecs, offset: usize) -> Option<Self::Mut<'a>>
            where
                Self: 'a,
            {
                Some(($( vecs.$idx.get_mut(offset)?, )+))
            }

            #[inline]
            fn slices<'a>(vecs: &'a Self::Vecs) -> Self::Slices<'a>
            where
                Self: 'a,
            {
                ($( vecs.$idx.as_slice(), )+)
            }
        }
    };
}

impl_columns!(1; A 0);
impl_columns!(2; A 0, B 1);
impl_columns!(3; A 0, B 1, C 2);
impl_columns!(4; A 0, B 1, C 2, D 3);
impl_columns!(5; A 0, B 1, C 2, D 3, E 4);
impl_columns!(6; A 0, B 1, C 2, D 3, E 4, F 5);
impl_columns!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_columns!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// Id array plus typed columns: the store behind a `DataPool`.
pub(crate) struct TypedRows<C: Columns> {
    pub(crate) ids: Vec<Id>,
    pub(crate) columns: C::Vecs,
}

impl<C: Columns> Default for TypedRows<C> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            columns: C::Vecs::default(),
        }
    }
}

impl<C: Columns> TypedRows<C> {
    #[inline]
    pub(crate) fn push(&mut self, id: Id, row: C) {
        self.ids.push(id);
        C::push(&mut self.columns, row);
    }

    #[inline]
    pub(crate) fn row(&self, offset: usize) -> Option<(Id, C::Ref<'_>)> {
        let id = *self.ids.get(offset)?;
        C::row(&self.columns, offset).map(|row| (id, row))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Id, C::Ref<'_>)> + '_ {
        (0..self.ids.len()).filter_map(move |offset| self.row(offset))
    }
}

impl<C: Columns> Store for TypedRows<C> {
    #[inline]
    fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    fn ids(&self) -> &[Id] {
        &self.ids
    }

    fn try_reserve_total(&mut self, capacity: usize) -> Result<(), TryReserveError> {
        let additional = capacity.saturating_sub(self.ids.len());
        self.ids.try_reserve_exact(additional)?;
        C::try_reserve_exact(&mut self.columns, additional)
    }

    #[inline]
    fn swap_rows(&mut self, a: usize, b: usize) {
        self.ids.swap(a, b);
        C::swap(&mut self.columns, a, b);
    }

    fn append_rows(&mut self, other: &mut Self) {
        self.ids.append(&mut other.ids);
        C::append(&mut self.columns, &mut other.columns);
    }

    fn move_tail_into(&mut self, at: usize, dst: &mut Self) {
        dst.ids.extend(self.ids.drain(at..));
        C::drain_tail_into(&mut self.columns, at, &mut dst.columns);
    }

    fn truncate_rows(&mut self, len: usize) {
        self.ids.truncate(len);
        C::truncate(&mut self.columns, len);
    }
}
