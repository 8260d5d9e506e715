//! Error types for the storage layer

use thiserror::Error;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the storage layer
///
/// Only [`StorageError::InsufficientMemory`] is recoverable: the caller may
/// abort the model build or pick another representation. Every other variant
/// is a precondition violation raised by a model-building mistake and must
/// stop the build or the running simulation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The free-memory check refused a dense allocation
    #[error("Insufficient memory for dense allocation: requested {requested} bytes, available {available} bytes")]
    InsufficientMemory {
        /// Bytes requested by the allocation
        requested: u64,
        /// Bytes reported as available
        available: u64,
    },

    /// Adjacency input sequences have different lengths
    #[error("Length mismatch in {what}: expected {expected}, found {found}")]
    LengthMismatch {
        /// What was being compared
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Found length
        found: usize,
    },

    /// A count or flat index cannot be represented by the configured width
    #[error("Value {value} does not fit the {width} index type ({what})")]
    IndexOverflow {
        /// What overflowed
        what: &'static str,
        /// Offending value
        value: u128,
        /// Name of the numeric type
        width: &'static str,
    },

    /// The rank window arithmetic is inconsistent
    #[error("Invalid {axis} rank window [{low}, {high})")]
    InvalidRankWindow {
        /// Axis name (row or column)
        axis: &'static str,
        /// Low rank (inclusive)
        low: u64,
        /// High rank (exclusive)
        high: u64,
    },

    /// A global rank lies outside the declared window
    #[error("{axis} rank {rank} outside window [{low}, {high})")]
    RankOutOfWindow {
        /// Axis name (row or column)
        axis: &'static str,
        /// Offending rank
        rank: u64,
        /// Low rank (inclusive)
        low: u64,
        /// High rank (exclusive)
        high: u64,
    },

    /// Out of bounds access
    #[error("{axis} index {index} out of bounds (max: {max})")]
    OutOfBounds {
        /// Axis name (row or column)
        axis: &'static str,
        /// Index that was out of bounds
        index: u64,
        /// Exclusive upper bound
        max: u64,
    },

    /// The mask has not been allocated yet
    #[error("Matrix mask is not allocated")]
    Unallocated,
}

impl StorageError {
    /// Create a length mismatch error
    pub fn length_mismatch(what: &'static str, expected: usize, found: usize) -> Self {
        Self::LengthMismatch {
            what,
            expected,
            found,
        }
    }

    /// Create an index overflow error
    pub fn index_overflow(what: &'static str, value: u128, width: &'static str) -> Self {
        Self::IndexOverflow { what, value, width }
    }

    /// Create an out of bounds error
    pub fn out_of_bounds(axis: &'static str, index: u64, max: u64) -> Self {
        Self::OutOfBounds { axis, index, max }
    }

    /// Whether the caller may recover from this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InsufficientMemory { .. })
    }

    /// Whether this error is a precondition violation
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}
