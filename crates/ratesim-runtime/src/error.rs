//! Error types for the simulation runtime

use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur in the simulation runtime
///
/// Apart from a wrapped [`ratesim_storage::StorageError::InsufficientMemory`]
/// every variant is a precondition violation: the model was built wrong and
/// the simulation must not continue.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Storage layer error
    #[error("Storage error: {source}")]
    Storage {
        #[from]
        /// Source storage error
        source: ratesim_storage::StorageError,
    },

    /// Invalid network configuration
    #[error("Invalid network configuration: {reason}")]
    InvalidConfiguration {
        /// Reason for invalid configuration
        reason: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Population not found
    #[error("Population '{name}' not found")]
    PopulationNotFound {
        /// Name or id of the missing population
        name: String,
    },

    /// Network topology error
    #[error("Network topology error: {reason}")]
    NetworkTopology {
        /// Reason for topology error
        reason: String,
    },

    /// Two sequences that must line up have different lengths
    #[error("Size mismatch in {what}: expected {expected}, found {found}")]
    SizeMismatch {
        /// What was being compared
        what: String,
        /// Expected length
        expected: usize,
        /// Found length
        found: usize,
    },

    /// A delayed read beyond the configured history depth
    #[error("Delay {delay} out of range (history depth: {max})")]
    DelayOutOfRange {
        /// Requested delay in steps
        delay: u32,
        /// Configured history depth
        max: u32,
    },

    /// Attempt to shrink the delay history
    #[error("Cannot shrink delay history from {current} to {requested}")]
    DelayShrink {
        /// Requested depth
        requested: u32,
        /// Current depth
        current: u32,
    },

    /// Attempt to change the delay history after the first step
    #[error("Cannot change delay history to {requested} once the simulation has started")]
    DelayFrozen {
        /// Requested depth
        requested: u32,
    },

    /// Neuron rank outside the population
    #[error("Rank {rank} out of range (population size: {size})")]
    RankOutOfRange {
        /// Offending rank
        rank: usize,
        /// Population size
        size: usize,
    },

    /// Error raised while processing a population
    #[error("Population '{name}': {source}")]
    InPopulation {
        /// Population name
        name: String,
        /// Underlying error
        #[source]
        source: Box<RuntimeError>,
    },

    /// Error raised while processing a projection
    #[error("Projection '{name}': {source}")]
    InProjection {
        /// Projection name
        name: String,
        /// Underlying error
        #[source]
        source: Box<RuntimeError>,
    },

    /// Simulation step failed
    #[error("Simulation step {step} failed: {source}")]
    SimulationStep {
        /// Step at which the failure happened
        step: u64,
        /// Underlying error
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }

    /// Create a network topology error
    pub fn network_topology(reason: impl Into<String>) -> Self {
        Self::NetworkTopology {
            reason: reason.into(),
        }
    }

    /// Create a size mismatch error
    pub fn size_mismatch(what: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::SizeMismatch {
            what: what.into(),
            expected,
            found,
        }
    }

    /// Attach the name of the population being processed
    pub fn in_population(name: impl Into<String>, source: impl Into<RuntimeError>) -> Self {
        Self::InPopulation {
            name: name.into(),
            source: Box::new(source.into()),
        }
    }

    /// Attach the name of the projection being processed
    pub fn in_projection(name: impl Into<String>, source: impl Into<RuntimeError>) -> Self {
        Self::InProjection {
            name: name.into(),
            source: Box::new(source.into()),
        }
    }

    /// Whether the caller may recover from this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Storage { source } => source.is_recoverable(),
            Self::InPopulation { source, .. }
            | Self::InProjection { source, .. }
            | Self::SimulationStep { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    /// Whether this error is a precondition violation
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Innermost error, with population/projection/step context removed
    pub fn root(&self) -> &RuntimeError {
        match self {
            Self::InPopulation { source, .. }
            | Self::InProjection { source, .. }
            | Self::SimulationStep { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratesim_storage::StorageError;

    #[test]
    fn test_error_creation() {
        let err = RuntimeError::invalid_config("dt must be positive");
        assert!(matches!(err, RuntimeError::InvalidConfiguration { .. }));

        let err = RuntimeError::invalid_parameter("tau", "0.0", "> 0.0");
        assert!(matches!(err, RuntimeError::InvalidParameter { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = RuntimeError::in_population(
            "exc",
            RuntimeError::DelayOutOfRange { delay: 4, max: 3 },
        );
        let msg = format!("{}", err);
        assert!(msg.contains("Population 'exc'"));
        assert!(msg.contains("Delay 4 out of range (history depth: 3)"));
    }

    #[test]
    fn test_recoverability_follows_wrapped_source() {
        let oom = RuntimeError::in_projection(
            "input->exc",
            StorageError::InsufficientMemory {
                requested: 10,
                available: 5,
            },
        );
        assert!(oom.is_recoverable());

        let fatal = RuntimeError::in_projection("input->exc", StorageError::Unallocated);
        assert!(fatal.is_fatal());
        assert!(matches!(
            fatal.root(),
            RuntimeError::Storage {
                source: StorageError::Unallocated
            }
        ));
    }
}
