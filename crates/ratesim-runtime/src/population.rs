//! Populations of rate-coded neurons

use crate::{
    delay::DelayHistory,
    error::*,
    model::{Dynamics, NeuronContext},
};
use rand::{rngs::StdRng, SeedableRng};
use ratesim_storage::PopulationId;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-target weighted input sums of one population for the current step
#[derive(Debug, Clone, Default)]
pub struct TargetSums {
    size: usize,
    targets: BTreeMap<String, Vec<f32>>,
}

impl TargetSums {
    /// Create an empty set of sums for `size` neurons
    pub fn new(size: usize) -> Self {
        Self {
            size,
            targets: BTreeMap::new(),
        }
    }

    /// Add a zeroed buffer for `target` if it does not exist yet
    pub fn register(&mut self, target: &str) {
        let size = self.size;
        self.targets
            .entry(target.to_string())
            .or_insert_with(|| vec![0.0; size]);
    }

    /// Zero every buffer
    pub fn reset(&mut self) {
        for buffer in self.targets.values_mut() {
            buffer.fill(0.0);
        }
    }

    /// Sums received on `target`
    pub fn get(&self, target: &str) -> Option<&[f32]> {
        self.targets.get(target).map(Vec::as_slice)
    }

    /// Mutable sums buffer for `target`
    pub fn buffer_mut(&mut self, target: &str) -> Option<&mut [f32]> {
        self.targets.get_mut(target).map(Vec::as_mut_slice)
    }

    /// Sum received by `rank` on `target`, zero for unknown targets
    pub fn value(&self, target: &str, rank: usize) -> f32 {
        self.targets
            .get(target)
            .and_then(|buffer| buffer.get(rank))
            .copied()
            .unwrap_or(0.0)
    }

    /// Registered target names
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }
}

/// Reduction over a population's rates, evaluated after every step
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GlobalOperation {
    /// Smallest rate
    Min,
    /// Largest rate
    Max,
    /// Mean rate
    Mean,
    /// Sum of absolute rates
    Norm1,
    /// Euclidean norm of the rates
    Norm2,
}

impl GlobalOperation {
    /// Evaluate over `values`
    pub fn compute(&self, values: &[f32]) -> f32 {
        match self {
            GlobalOperation::Min => values.iter().copied().fold(f32::INFINITY, f32::min),
            GlobalOperation::Max => values.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            GlobalOperation::Mean => {
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f32>() / values.len() as f32
                }
            }
            GlobalOperation::Norm1 => values.iter().map(|v| v.abs()).sum(),
            GlobalOperation::Norm2 => values.iter().map(|v| v * v).sum::<f32>().sqrt(),
        }
    }
}

/// Description of a population handed to the network builder
#[derive(Debug)]
pub struct PopulationSpec {
    /// Unique population name
    pub name: String,
    /// Number of neurons
    pub size: usize,
    /// Update rule
    pub dynamics: Dynamics,
    /// Reductions evaluated after each step
    pub global_operations: Vec<GlobalOperation>,
}

impl PopulationSpec {
    /// Describe a population
    pub fn new(name: impl Into<String>, size: usize, dynamics: Dynamics) -> Self {
        Self {
            name: name.into(),
            size,
            dynamics,
            global_operations: Vec::new(),
        }
    }

    /// Clamped input population
    pub fn input(name: impl Into<String>, size: usize) -> Self {
        Self::new(name, size, Dynamics::Clamped)
    }

    /// Evaluate the given reductions after every step
    pub fn with_global_operations(mut self, ops: impl IntoIterator<Item = GlobalOperation>) -> Self {
        self.global_operations.extend(ops);
        self.global_operations.sort();
        self.global_operations.dedup();
        self
    }
}

/// A population of rate-coded neurons with its delay history
#[derive(Debug)]
pub struct Population {
    id: PopulationId,
    name: String,
    rates: Vec<f32>,
    potentials: Vec<f32>,
    history: DelayHistory,
    dynamics: Dynamics,
    global_operations: Vec<GlobalOperation>,
    global_values: BTreeMap<GlobalOperation, f32>,
    active: bool,
    seed: u64,
    rng: StdRng,
}

impl Population {
    /// Create a population from its description
    pub fn new(id: PopulationId, spec: PopulationSpec, seed: u64) -> Result<Self> {
        if spec.size == 0 {
            return Err(RuntimeError::invalid_parameter("size", "0", "> 0"));
        }

        let rates = vec![spec.dynamics.initial_rate(); spec.size];
        let potentials = vec![spec.dynamics.initial_potential(); spec.size];
        let mut population = Self {
            id,
            name: spec.name,
            rates,
            potentials,
            history: DelayHistory::new(spec.size),
            dynamics: spec.dynamics,
            global_operations: spec.global_operations,
            global_values: BTreeMap::new(),
            active: true,
            seed,
            rng: StdRng::seed_from_u64(seed),
        };
        population.compute_global_operations();
        Ok(population)
    }

    /// Population ID
    pub fn id(&self) -> PopulationId {
        self.id
    }

    /// Population name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of neurons
    pub fn size(&self) -> usize {
        self.rates.len()
    }

    /// Update rule
    pub fn dynamics(&self) -> &Dynamics {
        &self.dynamics
    }

    /// Current rates
    pub fn rates(&self) -> &[f32] {
        &self.rates
    }

    /// Current integrated potentials
    pub fn potentials(&self) -> &[f32] {
        &self.potentials
    }

    /// Overwrite all rates between steps
    pub fn set_rates(&mut self, rates: &[f32]) -> Result<()> {
        if rates.len() != self.size() {
            return Err(RuntimeError::size_mismatch("rates", self.size(), rates.len()));
        }
        self.rates.copy_from_slice(rates);
        Ok(())
    }

    /// Overwrite one rate between steps
    pub fn set_rate(&mut self, rank: usize, rate: f32) -> Result<()> {
        let size = self.size();
        let slot = self
            .rates
            .get_mut(rank)
            .ok_or(RuntimeError::RankOutOfRange { rank, size })?;
        *slot = rate;
        Ok(())
    }

    /// Whether the population takes part in steps
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Enable or disable updates, global operations and incoming summation
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Depth of the delay history
    pub fn max_delay(&self) -> u32 {
        self.history.depth()
    }

    /// Grow the delay history so delays up to `max_delay` can be read
    pub fn set_max_delay(&mut self, max_delay: u32) -> Result<()> {
        self.history.set_max_delay(max_delay)
    }

    /// Rates as they were `delay` steps ago
    pub fn read_delayed(&self, delay: u32) -> Result<&[f32]> {
        self.history.read(delay)
    }

    /// Delayed rate of `ranks[i]` with delay `delays[i]`, for each `i`
    pub fn read_delayed_batch(&self, delays: &[u32], ranks: &[usize]) -> Result<Vec<f32>> {
        self.history.gather(delays, ranks)
    }

    /// State update phase: compute new rates from this step's input sums
    pub fn update(&mut self, inputs: &TargetSums, dt: f32) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        let model = match &self.dynamics {
            Dynamics::Clamped => return Ok(()),
            Dynamics::Model(model) => model,
        };

        let resolved: Vec<Option<&[f32]>> = model.targets().into_iter().map(|t| inputs.get(t)).collect();
        for (rank, (rate, potential)) in self.rates.iter_mut().zip(&mut self.potentials).enumerate() {
            let next = model.update(NeuronContext {
                rank,
                rate: *rate,
                potential,
                inputs: &resolved,
                dt,
                rng: &mut self.rng,
            });
            if !next.is_finite() {
                return Err(RuntimeError::invalid_parameter(
                    format!("rate[{}]", rank),
                    next.to_string(),
                    "finite",
                ));
            }
            *rate = next;
        }
        Ok(())
    }

    /// Push the current rates onto the delay history
    ///
    /// Inactive populations push their frozen rates too, so delayed readers
    /// stay aligned with the step count once the population is reactivated.
    pub fn push_history(&mut self) -> Result<()> {
        self.history.push(&self.rates)
    }

    /// Evaluate the configured reductions over the current rates
    pub fn compute_global_operations(&mut self) {
        if !self.active {
            return;
        }
        for op in &self.global_operations {
            self.global_values.insert(*op, op.compute(&self.rates));
        }
    }

    /// Last value of a configured reduction
    pub fn global_value(&self, op: GlobalOperation) -> Option<f32> {
        self.global_values.get(&op).copied()
    }

    /// Configured reductions
    pub fn global_operations(&self) -> &[GlobalOperation] {
        &self.global_operations
    }

    /// Restore initial rates, fill the history with them and reseed
    pub fn reset(&mut self) -> Result<()> {
        self.rates.fill(self.dynamics.initial_rate());
        self.potentials.fill(self.dynamics.initial_potential());
        self.history.fill(&self.rates)?;
        self.rng = StdRng::seed_from_u64(self.seed);
        self.global_values.clear();
        self.compute_global_operations();
        Ok(())
    }

    /// Heap bytes held by rates, potentials and history
    pub fn size_in_bytes(&self) -> usize {
        (self.rates.capacity() + self.potentials.capacity()) * std::mem::size_of::<f32>()
            + self.history.size_in_bytes()
    }
}
