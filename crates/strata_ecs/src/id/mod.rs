//! # Identifiers
//!
//! Ids are lightweight 32-bit values consisting of:
//! - A group (high 4 bits), fixed per allocator
//! - An index (low 28 bits), handed out by an [`IdAllocator`]
//!
//! A [`NameMap`] attaches unique names to ids for tooling.
//!
//! Ids are totally ordered by their raw value, which is what keeps every
//! pool's id array sortable with a plain integer comparison.

mod indexes;
mod name_map;

pub use indexes::{IdAllocator, IndexSnapshot, LiveIds};
pub use name_map::NameMap;

use crate::error::{EcsError, EcsResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Total number of bits in an [`Id`].
pub const ID_BITS: u32 = 32;
/// Number of high bits holding the group.
pub const GROUP_BITS: u32 = 4;
/// Number of low bits holding the index.
pub const INDEX_BITS: u32 = ID_BITS - GROUP_BITS;

/// Mask of the group bits.
pub const GROUP_MASK: u32 = u32::MAX << INDEX_BITS;
/// Mask of the index bits.
pub const INDEX_MASK: u32 = !GROUP_MASK;

/// Largest zero-based group value.
pub const GROUP_MAX_VALUE: u32 = GROUP_MASK >> INDEX_BITS;
/// Number of reserved groups (persistent and temporary).
pub const RESERVED_GROUPS: u32 = 2;
/// Number of groups available for general use.
pub const DYNAMIC_GROUPS: u32 = GROUP_MAX_VALUE + 1 - RESERVED_GROUPS;

/// Smallest index ever issued. Index 0 would collide with [`Id::INVALID`].
pub const INDEX_MIN: u32 = 1;
/// Largest representable index. Reserved, never issued.
pub const INDEX_MAX: u32 = INDEX_MASK;

/// Unique identifier for an object stored in a pool.
///
/// The ID is split into two parts:
/// - Upper 4 bits: Group the id was generated in
/// - Lower 28 bits: Index within the group
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Id(u32);

impl Id {
    /// The invalid id.
    pub const INVALID: Self = Self(0);

    /// Creates an id from its group and index.
    ///
    /// Index bits beyond [`INDEX_MASK`] are discarded.
    #[inline]
    #[must_use]
    pub const fn new(group: IdGroup, index: u32) -> Self {
        Self(group.0 | (index & INDEX_MASK))
    }

    /// Wraps a raw id value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw id value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the group portion of the id.
    #[inline]
    #[must_use]
    pub const fn group(self) -> IdGroup {
        IdGroup(self.0 & GROUP_MASK)
    }

    /// Returns the index portion of the id.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    /// Checks if this is the invalid id.
    #[inline]
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == Self::INVALID.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<u32> for Id {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.0)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

/// The group portion of an id, kept in its shifted (high bit) position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct IdGroup(u32);

impl IdGroup {
    /// Objects preserved across sessions.
    pub const PERSISTENT: Self = Self((GROUP_MAX_VALUE - 1) << INDEX_BITS);
    /// Objects local to the current session.
    pub const TEMPORARY: Self = Self(GROUP_MAX_VALUE << INDEX_BITS);

    /// Creates a group from its zero-based value (`0..=15`).
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::GroupValueOutOfRange`] if the value does not fit.
    pub fn from_value(value: u32) -> EcsResult<Self> {
        if value > GROUP_MAX_VALUE {
            return Err(EcsError::GroupValueOutOfRange(value));
        }
        Ok(Self(value << INDEX_BITS))
    }

    /// Creates a group from already-shifted group bits.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NotGroupId`] if any index bit is set.
    pub fn from_bits(bits: u32) -> EcsResult<Self> {
        if bits & INDEX_MASK != 0 {
            return Err(EcsError::NotGroupId(bits));
        }
        Ok(Self(bits))
    }

    /// Returns the shifted group bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns the zero-based group value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0 >> INDEX_BITS
    }

    /// Whether this is one of the two reserved groups.
    #[inline]
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        self.0 == Self::PERSISTENT.0 || self.0 == Self::TEMPORARY.0
    }
}
