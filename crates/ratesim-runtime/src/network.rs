//! Network of populations and projections, advanced one step at a time

use crate::{
    error::*,
    population::{Population, PopulationSpec, TargetSums},
    projection::{byte_count, Projection, ProjectionSpec},
};
use ratesim_storage::{MemoryBudget, PopulationId, ProjectionId};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Network configuration parameters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkConfig {
    /// Integration step (ms)
    pub dt: f32,
    /// Worker threads for a dedicated pool (None = global rayon pool)
    pub num_threads: Option<usize>,
    /// Policy for dense allocations
    pub memory_budget: MemoryBudget,
    /// Base seed for population generators (None = random)
    pub seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            dt: 1.0,
            num_threads: None,
            memory_budget: MemoryBudget::System,
            seed: None,
        }
    }
}

impl NetworkConfig {
    /// Create a configuration with the given step, validated
    pub fn new(dt: f32) -> Result<Self> {
        let config = Self {
            dt,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Pin a dedicated pool of `num_threads` workers
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set the memory policy
    pub fn with_memory_budget(mut self, budget: MemoryBudget) -> Self {
        self.memory_budget = budget;
        self
    }

    /// Set the base seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(RuntimeError::invalid_parameter(
                "dt",
                self.dt.to_string(),
                "> 0.0",
            ));
        }
        if self.num_threads == Some(0) {
            return Err(RuntimeError::invalid_parameter("num_threads", "0", ">= 1"));
        }
        Ok(())
    }
}

/// Rate-coded neural network
#[derive(Debug)]
pub struct Network {
    config: NetworkConfig,
    populations: Vec<Population>,
    projections: Vec<Projection>,
    /// Input sums per population, rebuilt every step
    sums: Vec<TargetSums>,
    /// Incoming projection indices per population
    incoming: Vec<Vec<usize>>,
    step_count: u64,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl Network {
    /// Network configuration
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Integration step (ms)
    pub fn dt(&self) -> f32 {
        self.config.dt
    }

    /// Steps executed since construction or the last reset
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Simulated time (ms)
    pub fn time(&self) -> f64 {
        self.step_count as f64 * self.config.dt as f64
    }

    /// All populations, indexed by [`PopulationId::index`]
    pub fn populations(&self) -> &[Population] {
        &self.populations
    }

    /// All projections, indexed by [`ProjectionId::index`]
    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    /// Get a population
    pub fn population(&self, id: PopulationId) -> Result<&Population> {
        self.populations
            .get(id.index())
            .ok_or_else(|| RuntimeError::PopulationNotFound { name: id.to_string() })
    }

    /// Get a population for editing between steps
    pub fn population_mut(&mut self, id: PopulationId) -> Result<&mut Population> {
        self.populations
            .get_mut(id.index())
            .ok_or_else(|| RuntimeError::PopulationNotFound { name: id.to_string() })
    }

    /// Look up a population ID by name
    pub fn population_id(&self, name: &str) -> Result<PopulationId> {
        self.populations
            .iter()
            .find(|p| p.name() == name)
            .map(Population::id)
            .ok_or_else(|| RuntimeError::PopulationNotFound { name: name.to_string() })
    }

    /// Get a projection
    pub fn projection(&self, id: ProjectionId) -> Result<&Projection> {
        self.projections
            .get(id.index())
            .ok_or_else(|| RuntimeError::network_topology(format!("projection {} not found", id)))
    }

    /// Get a projection for editing between steps
    pub fn projection_mut(&mut self, id: ProjectionId) -> Result<&mut Projection> {
        self.projections
            .get_mut(id.index())
            .ok_or_else(|| RuntimeError::network_topology(format!("projection {} not found", id)))
    }

    /// Look up a projection ID by name
    pub fn projection_id(&self, name: &str) -> Result<ProjectionId> {
        self.projections
            .iter()
            .find(|p| p.name() == name)
            .map(Projection::id)
            .ok_or_else(|| RuntimeError::network_topology(format!("projection '{}' not found", name)))
    }

    /// Current rates of a population
    pub fn rates(&self, id: PopulationId) -> Result<&[f32]> {
        Ok(self.population(id)?.rates())
    }

    /// Rates of a population as they were `delay` steps ago
    pub fn delayed_rates(&self, id: PopulationId, delay: u32) -> Result<&[f32]> {
        let population = self.population(id)?;
        population
            .read_delayed(delay)
            .map_err(|e| RuntimeError::in_population(population.name(), e))
    }

    /// Input sums received by a population on `target` during the last step
    pub fn sums(&self, id: PopulationId, target: &str) -> Result<Option<&[f32]>> {
        self.population(id)?;
        Ok(self.sums[id.index()].get(target))
    }

    /// Dense weights of a projection
    pub fn weights(&self, id: ProjectionId) -> Result<&[f32]> {
        Ok(self.projection(id)?.weights())
    }

    /// Overwrite the rates of a population between steps
    pub fn set_rates(&mut self, id: PopulationId, rates: &[f32]) -> Result<()> {
        let population = self.population_mut(id)?;
        population
            .set_rates(rates)
            .map_err(|e| RuntimeError::in_population(population.name(), e))
    }

    /// Enable or disable a population and every projection touching it
    pub fn set_active(&mut self, id: PopulationId, active: bool) -> Result<()> {
        self.population_mut(id)?.set_active(active);
        for projection in &mut self.projections {
            if projection.pre() == id || projection.post() == id {
                projection.set_enabled(active);
            }
        }
        Ok(())
    }

    /// Total number of synapses
    pub fn nb_synapses(&self) -> Result<usize> {
        self.projections.iter().map(Projection::nb_synapses).sum()
    }

    /// Heap bytes held by populations and projections
    pub fn size_in_bytes(&self) -> usize {
        self.populations.iter().map(Population::size_in_bytes).sum::<usize>()
            + self.projections.iter().map(Projection::size_in_bytes).sum::<usize>()
    }

    /// Advance the network by one step
    ///
    /// Summation, state update, history push, global operations and
    /// learning run in that order, each finishing for the whole network
    /// before the next starts.
    pub fn step(&mut self) -> Result<()> {
        #[cfg(feature = "parallel")]
        let result = match self.pool.take() {
            Some(pool) => {
                let result = pool.install(|| self.run_phases());
                self.pool = Some(pool);
                result
            }
            None => self.run_phases(),
        };

        #[cfg(not(feature = "parallel"))]
        let result = self.run_phases();

        result?;
        self.step_count += 1;
        Ok(())
    }

    fn run_phases(&mut self) -> Result<()> {
        let dt = self.config.dt;

        // Summation
        {
            let populations = &self.populations;
            let projections = &self.projections;
            let incoming = &self.incoming;
            for_each_indexed(&mut self.sums, |post, sums| {
                sums.reset();
                if !populations[post].is_active() {
                    return Ok(());
                }
                for &p in &incoming[post] {
                    let projection = &projections[p];
                    if !projection.is_enabled() {
                        continue;
                    }
                    let buffer = sums.buffer_mut(projection.target()).ok_or_else(|| {
                        RuntimeError::network_topology(format!("target '{}' not registered", projection.target()))
                    })?;
                    projection
                        .compute_sums(&populations[projection.pre().index()], buffer)
                        .map_err(|e| RuntimeError::in_projection(projection.name(), e))?;
                }
                Ok(())
            })?;
        }

        // State update
        {
            let sums = &self.sums;
            for_each_indexed(&mut self.populations, |i, population| {
                population
                    .update(&sums[i], dt)
                    .map_err(|e| RuntimeError::in_population(population.name(), e))
            })?;
        }

        // Delay push and global operations see the final rates of the step
        for_each_indexed(&mut self.populations, |_, population| {
            population
                .push_history()
                .map_err(|e| RuntimeError::in_population(population.name(), e))?;
            population.compute_global_operations();
            Ok(())
        })?;

        // Learning
        {
            let populations = &self.populations;
            for_each_indexed(&mut self.projections, |_, projection| {
                if !projection.is_enabled() || !projection.has_learning() {
                    return Ok(());
                }
                let pre = &populations[projection.pre().index()];
                let post = &populations[projection.post().index()];
                projection
                    .learn(pre, post, dt)
                    .map_err(|e| RuntimeError::in_projection(projection.name(), e))
            })?;
        }

        Ok(())
    }

    /// Restore every population to its initial state and zero the step count
    ///
    /// Weights are kept.
    pub fn reset(&mut self) -> Result<()> {
        for population in &mut self.populations {
            population
                .reset()
                .map_err(|e| RuntimeError::in_population(population.name(), e))?;
        }
        for sums in &mut self.sums {
            sums.reset();
        }
        self.step_count = 0;
        Ok(())
    }
}

fn for_each_indexed<T, F>(items: &mut [T], f: F) -> Result<()>
where
    T: Send,
    F: Fn(usize, &mut T) -> Result<()> + Sync + Send,
{
    #[cfg(feature = "parallel")]
    let result = items
        .par_iter_mut()
        .enumerate()
        .try_for_each(|(i, item)| f(i, item));

    #[cfg(not(feature = "parallel"))]
    let result = items
        .iter_mut()
        .enumerate()
        .try_for_each(|(i, item)| f(i, item));

    result
}

/// Builder for constructing networks
#[derive(Debug)]
pub struct NetworkBuilder {
    config: NetworkConfig,
    populations: Vec<PopulationSpec>,
    projections: Vec<ProjectionSpec>,
}

impl NetworkBuilder {
    /// Create a new network builder
    pub fn new() -> Self {
        Self {
            config: NetworkConfig::default(),
            populations: Vec::new(),
            projections: Vec::new(),
        }
    }

    /// Set network configuration
    pub fn with_config(mut self, config: NetworkConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a population; IDs follow insertion order
    pub fn add_population(mut self, spec: PopulationSpec) -> Self {
        self.populations.push(spec);
        self
    }

    /// Add a projection between two named populations
    pub fn add_projection(mut self, spec: ProjectionSpec) -> Self {
        self.projections.push(spec);
        self
    }

    /// Build the network
    ///
    /// Ingests every adjacency, sizes each delay history for the longest
    /// delay read from it, and reports a refused allocation as a
    /// recoverable error before any step runs.
    pub fn build(self) -> Result<Network> {
        self.config.validate()?;
        let config = self.config;
        let base_seed = config.seed.unwrap_or_else(rand::random);

        let mut populations: Vec<Population> = Vec::with_capacity(self.populations.len());
        for (i, spec) in self.populations.into_iter().enumerate() {
            if populations.iter().any(|p| p.name() == spec.name) {
                return Err(RuntimeError::invalid_config(format!(
                    "Population '{}' already exists",
                    spec.name
                )));
            }
            let name = spec.name.clone();
            let id = PopulationId::new(i as u32);
            let population = Population::new(id, spec, base_seed.wrapping_add(i as u64))
                .map_err(|e| RuntimeError::in_population(name, e))?;
            populations.push(population);
        }

        let find = |name: &str| {
            populations
                .iter()
                .position(|p| p.name() == name)
                .ok_or_else(|| RuntimeError::PopulationNotFound { name: name.to_string() })
        };

        let mut sums: Vec<TargetSums> = populations.iter().map(|p| TargetSums::new(p.size())).collect();
        let mut incoming = vec![Vec::new(); populations.len()];
        let mut max_delays = vec![0u32; populations.len()];
        let mut projections: Vec<Projection> = Vec::with_capacity(self.projections.len());

        for (i, spec) in self.projections.into_iter().enumerate() {
            let name = spec.resolved_name();
            if projections.iter().any(|p| p.name() == name) {
                return Err(RuntimeError::invalid_config(format!(
                    "Projection '{}' already exists",
                    name
                )));
            }
            let pre = find(&spec.pre).map_err(|e| RuntimeError::in_projection(&name, e))?;
            let post = find(&spec.post).map_err(|e| RuntimeError::in_projection(&name, e))?;

            let projection = Projection::new(
                ProjectionId::new(i as u32),
                spec,
                &populations[pre],
                &populations[post],
                &config.memory_budget,
            )
            .map_err(|e| RuntimeError::in_projection(&name, e))?;

            max_delays[pre] = max_delays[pre].max(projection.max_delay());
            sums[post].register(projection.target());
            incoming[post].push(i);
            projections.push(projection);
        }

        for (population, &max_delay) in populations.iter_mut().zip(&max_delays) {
            if max_delay > population.max_delay() {
                let bytes = byte_count(
                    "delay history",
                    max_delay as u128 * population.size() as u128,
                    std::mem::size_of::<f32>(),
                )
                .map_err(|e| RuntimeError::in_population(population.name(), e))?;
                config
                    .memory_budget
                    .check(bytes)
                    .map_err(|e| RuntimeError::in_population(population.name(), e))?;
                population
                    .set_max_delay(max_delay)
                    .map_err(|e| RuntimeError::in_population(population.name(), e))?;
            }
        }

        #[cfg(feature = "parallel")]
        let pool = match config.num_threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| RuntimeError::invalid_config(format!("thread pool: {}", e)))?,
            ),
            None => None,
        };

        #[cfg(not(feature = "parallel"))]
        {
            if config.num_threads.map_or(false, |n| n > 1) {
                log::warn!("num_threads ignored: built without the parallel feature");
            }
        }

        let network = Network {
            config,
            populations,
            projections,
            sums,
            incoming,
            step_count: 0,
            #[cfg(feature = "parallel")]
            pool,
        };

        log::info!(
            "Built network: {} populations, {} projections, {} synapses ({} bytes)",
            network.populations.len(),
            network.projections.len(),
            network.nb_synapses()?,
            network.size_in_bytes()
        );
        Ok(network)
    }
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}
