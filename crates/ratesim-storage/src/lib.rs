//! Connectivity storage for rate-coded neural network simulation
//!
//! This crate provides the dense, mask-backed connectivity representations
//! used by the simulation loop: a fixed-shape [`DenseMatrix`], the
//! rank-window addressed [`OffsetMatrix`], the LIL [`Adjacency`] input they
//! are built from, and the [`MemoryBudget`] consulted before every dense
//! allocation.

#![deny(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod error;
pub mod ids;
pub mod index;
pub mod memory;

// Connectivity representations
pub mod adjacency;
pub mod dense;
pub mod offset;

// Re-export essential types
pub use adjacency::Adjacency;
pub use dense::{DenseMatrix, Layout, LineScan};
pub use error::{Result, StorageError};
pub use ids::{PopulationId, ProjectionId};
pub use index::{MaskValue, MatrixIndex};
pub use memory::MemoryBudget;
pub use offset::{OffsetMatrix, RankWindow};

/// Storage crate version for compatibility checking
pub const STORAGE_VERSION: u32 = 1;

/// Connectivity matrix instantiation used by the runtime: 32-bit ranks,
/// 64-bit flat indices, byte-wide mask cells.
pub type ConnectivityMatrix = OffsetMatrix<u32, u64, u8>;
