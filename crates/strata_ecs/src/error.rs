//! # Storage Error Types
//!
//! All errors that can occur in id allocation and pool maintenance.
//!
//! Recoverable misuse (inserting a duplicate id, removing an absent id) is
//! silent by design and never shows up here.

use thiserror::Error;

/// Errors that can occur in the storage engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The id is the reserved invalid sentinel.
    #[error("invalid id")]
    InvalidId,

    /// The id belongs to a different group than the allocator.
    #[error("id group {found:#010X} does not match allocator group {expected:#010X}")]
    IncorrectGroupId {
        /// Group bits of the allocator.
        expected: u32,
        /// Group bits of the offending id.
        found: u32,
    },

    /// The index was never handed out by the allocator.
    #[error("index {index} is above the highest generated index (next fresh index is {next})")]
    IndexAboveGenerated {
        /// The offending index.
        index: u32,
        /// The next index the allocator would issue.
        next: u32,
    },

    /// The index is below the reserved minimum.
    #[error("index {0} is below the minimum index")]
    IndexBelowMinimum(u32),

    /// The allocator has issued every index its group can hold.
    #[error("out of indexes in group {0:#010X}")]
    OutOfIndexes(u32),

    /// The raw value has index bits set and cannot be a group.
    #[error("{0:#010X} is not a group id")]
    NotGroupId(u32),

    /// The zero-based group value does not fit in the group bits.
    #[error("group value {0} is out of range")]
    GroupValueOutOfRange(u32),

    /// Storage growth failed to allocate.
    #[error("out of memory growing storage to {requested} elements")]
    OutOfMemory {
        /// Element capacity that was requested.
        requested: usize,
    },

    /// A type-erased pool was created with a zero element size.
    #[error("element size must be greater than zero")]
    ZeroElementSize,

    /// Bytes handed to a type-erased pool do not match its element size.
    #[error("element size mismatch: expected {expected} bytes, got {actual}")]
    ElementSizeMismatch {
        /// Element size of the pool.
        expected: usize,
        /// Length of the supplied bytes.
        actual: usize,
    },

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for storage operations.
pub type EcsResult<T> = Result<T, EcsError>;
