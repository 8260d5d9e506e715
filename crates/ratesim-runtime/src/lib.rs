//! Rate-coded neural network runtime
//!
//! Populations of rate neurons connected by dense, mask-backed projections,
//! advanced in three phases per step: summation of weighted (optionally
//! delayed) pre-synaptic rates, state update by each population's neuron
//! model, and learning. Each population keeps a history of its past rates
//! deep enough for the longest delay read from it.

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export essential types from storage
pub use ratesim_storage::{
    Adjacency, ConnectivityMatrix, Layout, MemoryBudget, PopulationId, ProjectionId, RankWindow,
    Result as StorageResult, StorageError,
};

// Core modules
pub mod delay;
pub mod error;
pub mod model;
pub mod network;
pub mod plasticity;
pub mod population;
pub mod projection;
pub mod simulation;

// Re-export essential types
pub use delay::DelayHistory;
pub use error::{Result, RuntimeError};
pub use model::{Dynamics, LeakyIntegrator, LeakyParams, NeuronContext, NeuronModel, Transfer};
pub use network::{Network, NetworkBuilder, NetworkConfig};
pub use plasticity::{Hebbian, HebbianParams, LearningRule, Oja, OjaParams};
pub use population::{GlobalOperation, Population, PopulationSpec, TargetSums};
pub use projection::{Delay, Projection, ProjectionSpec, Weights};
pub use simulation::{
    run_fixed_steps, PerfReport, RateSample, RecordSpec, SimulationEngine, SimulationParams,
    SimulationResult, Stimulus,
};

/// Runtime crate version for compatibility checking
pub const RUNTIME_VERSION: u32 = 1;

/// Default integration step (ms)
pub const DEFAULT_DT_MS: f32 = 1.0;
