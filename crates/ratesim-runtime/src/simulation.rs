//! Simulation engine for rate-coded networks

use crate::{error::*, network::Network};
use ratesim_storage::PopulationId;
use std::time::Instant;

/// Rate snapshots of one population, taken every `period` steps
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSpec {
    /// Population name
    pub population: String,
    /// Steps between snapshots
    pub period: u64,
}

impl RecordSpec {
    /// Record `population` every `period` steps
    pub fn new(population: impl Into<String>, period: u64) -> Self {
        Self {
            population: population.into(),
            period,
        }
    }

    /// Record `population` after every step
    pub fn every_step(population: impl Into<String>) -> Self {
        Self::new(population, 1)
    }
}

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimulationParams {
    /// Number of steps for [`SimulationEngine::run`]
    pub steps: u64,
    /// Populations to record
    pub record: Vec<RecordSpec>,
    /// Reset the network before running (default `true`)
    ///
    /// The reset restores initial rates, so rates written with
    /// [`Network::set_rates`] before the run are lost; drive clamped inputs
    /// with a [`Stimulus`] or disable the reset with
    /// [`SimulationParams::with_reset`].
    pub reset_before_run: bool,
    /// Enable performance sampling
    pub perf_enabled: bool,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            steps: 1000,
            record: Vec::new(),
            reset_before_run: true,
            perf_enabled: false,
        }
    }
}

impl SimulationParams {
    /// Create new simulation parameters with validation
    pub fn new(steps: u64) -> Result<Self> {
        if steps == 0 {
            return Err(RuntimeError::invalid_parameter("steps", "0", "> 0"));
        }
        Ok(Self {
            steps,
            ..Default::default()
        })
    }

    /// Add a population to record
    pub fn with_recording(mut self, spec: RecordSpec) -> Self {
        self.record.push(spec);
        self
    }

    /// Continue from the current network state instead of resetting
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset_before_run = reset;
        self
    }

    /// Enable or disable performance sampling
    pub fn with_perf(mut self, enabled: bool) -> Self {
        self.perf_enabled = enabled;
        self
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        Self::new(self.steps)?;
        for spec in &self.record {
            if spec.period == 0 {
                return Err(RuntimeError::invalid_parameter(
                    format!("record[{}].period", spec.population),
                    "0",
                    "> 0",
                ));
            }
        }
        Ok(())
    }
}

/// External input applied to a population before each step
#[derive(Debug, Clone)]
pub enum Stimulus {
    /// Fixed rates over a range of steps
    Constant {
        /// Target population
        population: PopulationId,
        /// Rates, one per neuron
        rates: Vec<f32>,
        /// First step (absolute step count)
        start_step: u64,
        /// Number of steps
        duration: u64,
    },
    /// One frame of rates per `period` steps, starting at step 0;
    /// the last frame stays in place once the sequence ends
    Sequence {
        /// Target population
        population: PopulationId,
        /// Successive rate frames
        frames: Vec<Vec<f32>>,
        /// Steps per frame
        period: u64,
    },
}

impl Stimulus {
    fn population(&self) -> PopulationId {
        match self {
            Stimulus::Constant { population, .. } | Stimulus::Sequence { population, .. } => *population,
        }
    }

    /// Rates to apply before step `step`, if any
    fn rates_at(&self, step: u64) -> Option<&[f32]> {
        match self {
            Stimulus::Constant {
                rates,
                start_step,
                duration,
                ..
            } => (step >= *start_step && step - start_step < *duration).then_some(rates.as_slice()),
            Stimulus::Sequence { frames, period, .. } => {
                if step % period != 0 {
                    return None;
                }
                frames.get((step / period) as usize).map(Vec::as_slice)
            }
        }
    }
}

/// Recorded rate snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct RateSample {
    /// Population ID
    pub population: PopulationId,
    /// Steps completed when the snapshot was taken
    pub step: u64,
    /// Simulated time (ms)
    pub time: f64,
    /// Copy of the rates
    pub rates: Vec<f32>,
}

/// Simulation results
#[derive(Debug, Clone, Default)]
pub struct SimulationResult {
    /// Recorded snapshots in step order
    pub samples: Vec<RateSample>,
    /// Number of steps executed
    pub steps_executed: u64,
    /// Whether a stop condition ended the run
    pub stopped_early: bool,
    /// Simulated time at the end of the run (ms)
    pub final_time: f64,
    /// Optional performance report
    pub perf: Option<PerfReport>,
}

impl SimulationResult {
    /// Snapshots of one population
    pub fn samples_for(&self, population: PopulationId) -> Vec<&RateSample> {
        self.samples
            .iter()
            .filter(|sample| sample.population == population)
            .collect()
    }

    /// Mean rate of one neuron over its recorded snapshots
    pub fn mean_rate(&self, population: PopulationId, rank: usize) -> Option<f32> {
        let values: Vec<f32> = self
            .samples_for(population)
            .iter()
            .filter_map(|sample| sample.rates.get(rank).copied())
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f32>() / values.len() as f32)
    }
}

/// Performance metrics collected during simulation steps.
/// Present when SimulationParams::with_perf(true) is used.
#[derive(Debug, Clone, PartialEq)]
pub struct PerfReport {
    /// Average step time in nanoseconds
    pub avg_step_ns: u64,
    /// Max step time in nanoseconds
    pub max_step_ns: u64,
    /// Steps sampled
    pub steps: usize,
}

impl PerfReport {
    fn from_samples(samples: &[u64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let sum: u128 = samples.iter().map(|v| *v as u128).sum();
        Some(Self {
            avg_step_ns: (sum / samples.len() as u128) as u64,
            max_step_ns: samples.iter().copied().max().unwrap_or(0),
            steps: samples.len(),
        })
    }
}

/// Simulation engine
#[derive(Debug)]
pub struct SimulationEngine {
    /// Network being simulated
    network: Network,
    /// Simulation parameters
    params: SimulationParams,
    /// Resolved recorders: (population, period)
    recorders: Vec<(PopulationId, u64)>,
    /// Input stimuli
    stimuli: Vec<Stimulus>,
    /// Per-step timing samples (ns), captured when perf_enabled
    perf_samples: Vec<u64>,
}

impl SimulationEngine {
    /// Create a new simulation engine
    pub fn new(network: Network, params: SimulationParams) -> Result<Self> {
        params.validate()?;
        let recorders = params
            .record
            .iter()
            .map(|spec| Ok((network.population_id(&spec.population)?, spec.period)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            network,
            params,
            recorders,
            stimuli: Vec::new(),
            perf_samples: Vec::new(),
        })
    }

    /// Add an input stimulus
    pub fn add_stimulus(&mut self, stimulus: Stimulus) -> Result<()> {
        let population = self.network.population(stimulus.population())?;
        let size = population.size();
        let frames: Vec<&Vec<f32>> = match &stimulus {
            Stimulus::Constant { rates, .. } => vec![rates],
            Stimulus::Sequence { frames, period, .. } => {
                if *period == 0 {
                    return Err(RuntimeError::invalid_parameter("period", "0", "> 0"));
                }
                frames.iter().collect()
            }
        };
        if let Some(bad) = frames.iter().find(|f| f.len() != size) {
            return Err(RuntimeError::in_population(
                population.name(),
                RuntimeError::size_mismatch("stimulus rates", size, bad.len()),
            ));
        }
        self.stimuli.push(stimulus);
        Ok(())
    }

    /// Run the configured number of steps
    ///
    /// Resets the network first unless `reset_before_run` is off.
    pub fn run(&mut self) -> Result<SimulationResult> {
        self.execute(self.params.steps, None::<fn(&Network) -> bool>)
    }

    /// Run until `condition` holds after a step, or `max_steps` have run
    ///
    /// Resets the network first unless `reset_before_run` is off.
    pub fn run_until<F>(&mut self, max_steps: u64, condition: F) -> Result<SimulationResult>
    where
        F: FnMut(&Network) -> bool,
    {
        if max_steps == 0 {
            return Err(RuntimeError::invalid_parameter("max_steps", "0", "> 0"));
        }
        self.execute(max_steps, Some(condition))
    }

    fn execute<F>(&mut self, max_steps: u64, mut condition: Option<F>) -> Result<SimulationResult>
    where
        F: FnMut(&Network) -> bool,
    {
        log::info!(
            "Starting simulation: up to {} steps with {}ms timestep",
            max_steps,
            self.network.dt()
        );

        if self.params.reset_before_run {
            self.network.reset()?;
        }
        self.perf_samples.clear();
        let mut result = SimulationResult::default();

        for i in 0..max_steps {
            let step = self.network.step_count();
            let step_start = Instant::now();

            if let Err(e) = self.apply_stimuli(step).and_then(|_| self.network.step()) {
                log::error!("Simulation aborted at step {}: {}", step, e);
                return Err(RuntimeError::SimulationStep {
                    step,
                    source: Box::new(e),
                });
            }
            result.steps_executed += 1;

            self.record(&mut result);

            if self.params.perf_enabled {
                self.perf_samples.push(step_start.elapsed().as_nanos() as u64);
            }

            if i % (max_steps / 10).max(1) == 0 {
                let progress = (i as f32 / max_steps as f32) * 100.0;
                log::debug!("Simulation progress: {:.1}%", progress);
            }

            if let Some(condition) = condition.as_mut() {
                if condition(&self.network) {
                    log::info!("Stop condition met after {} steps", result.steps_executed);
                    result.stopped_early = true;
                    break;
                }
            }
        }

        result.final_time = self.network.time();
        if self.params.perf_enabled {
            result.perf = PerfReport::from_samples(&self.perf_samples);
        }

        log::info!(
            "Simulation completed: {} steps, {} samples recorded",
            result.steps_executed,
            result.samples.len()
        );
        Ok(result)
    }

    /// Apply stimuli due before step `step`
    fn apply_stimuli(&mut self, step: u64) -> Result<()> {
        for stimulus in &self.stimuli {
            if let Some(rates) = stimulus.rates_at(step) {
                self.network.set_rates(stimulus.population(), rates)?;
            }
        }
        Ok(())
    }

    /// Take the snapshots due after the step that just completed
    fn record(&self, result: &mut SimulationResult) {
        let completed = self.network.step_count();
        for &(population, period) in &self.recorders {
            if completed % period != 0 {
                continue;
            }
            if let Ok(rates) = self.network.rates(population) {
                result.samples.push(RateSample {
                    population,
                    step: completed,
                    time: self.network.time(),
                    rates: rates.to_vec(),
                });
            }
        }
    }

    /// Get reference to network
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Get mutable reference to network
    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    /// Take back the network
    pub fn into_network(self) -> Network {
        self.network
    }

    /// Get simulation parameters
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }
}

/// Run a network for a fixed number of steps, recording nothing
pub fn run_fixed_steps(network: Network, steps: u64) -> Result<(Network, SimulationResult)> {
    let params = SimulationParams::new(steps)?.with_reset(false);
    let mut engine = SimulationEngine::new(network, params)?;
    let result = engine.run()?;
    Ok((engine.into_network(), result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{Dynamics, LeakyParams, Transfer},
        network::{NetworkBuilder, NetworkConfig},
        population::PopulationSpec,
        projection::{Delay, ProjectionSpec},
    };
    use ratesim_storage::{Adjacency, MemoryBudget};

    fn relay(delay: Delay) -> Network {
        let linear = Dynamics::leaky(LeakyParams::new(1.0, 0.0, 0.0, Transfer::Linear).unwrap()).unwrap();
        NetworkBuilder::new()
            .with_config(
                NetworkConfig::default()
                    .with_memory_budget(MemoryBudget::Unlimited)
                    .with_seed(3),
            )
            .add_population(PopulationSpec::input("input", 1))
            .add_population(PopulationSpec::new("output", 1, linear))
            .add_projection(
                ProjectionSpec::new("input", "output", "exc", Adjacency::from_pairs([(0u32, 0u32)]))
                    .with_delay(delay),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_simulation_params_validation() {
        assert!(SimulationParams::new(0).is_err());
        assert!(SimulationParams::new(10).is_ok());
        assert!(SimulationParams::default().validate().is_ok());

        let params = SimulationParams::new(10)
            .unwrap()
            .with_recording(RecordSpec::new("output", 0));
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_unknown_recorded_population() {
        let params = SimulationParams::new(5)
            .unwrap()
            .with_recording(RecordSpec::every_step("missing"));
        assert!(matches!(
            SimulationEngine::new(relay(Delay::None), params),
            Err(RuntimeError::PopulationNotFound { .. })
        ));
    }

    #[test]
    fn test_run_records_with_period() {
        let params = SimulationParams::new(10)
            .unwrap()
            .with_recording(RecordSpec::new("output", 5))
            .with_perf(true);
        let mut engine = SimulationEngine::new(relay(Delay::None), params).unwrap();
        engine
            .add_stimulus(Stimulus::Constant {
                population: PopulationId::new(0),
                rates: vec![2.0],
                start_step: 0,
                duration: 10,
            })
            .unwrap();

        let result = engine.run().unwrap();
        assert_eq!(result.steps_executed, 10);
        assert!(!result.stopped_early);
        assert_eq!(result.final_time, 10.0);

        let samples = result.samples_for(PopulationId::new(1));
        assert_eq!(samples.iter().map(|s| s.step).collect::<Vec<_>>(), vec![5, 10]);
        assert_eq!(samples[0].rates, vec![2.0]);
        assert_eq!(result.mean_rate(PopulationId::new(1), 0), Some(2.0));

        let perf = result.perf.unwrap();
        assert_eq!(perf.steps, 10);
        assert!(perf.max_step_ns >= perf.avg_step_ns);
    }

    #[test]
    fn test_run_until_stops_on_condition() {
        let params = SimulationParams::new(1).unwrap();
        let mut engine = SimulationEngine::new(relay(Delay::Uniform(4)), params).unwrap();
        engine
            .add_stimulus(Stimulus::Constant {
                population: PopulationId::new(0),
                rates: vec![1.0],
                start_step: 0,
                duration: u64::MAX,
            })
            .unwrap();

        let output = PopulationId::new(1);
        let result = engine
            .run_until(100, |network| network.rates(output).map_or(false, |r| r[0] > 0.5))
            .unwrap();

        assert!(result.stopped_early);
        // the input set before step 0 reaches the output four steps later
        assert_eq!(result.steps_executed, 5);
    }

    #[test]
    fn test_sequence_stimulus() {
        let params = SimulationParams::new(6)
            .unwrap()
            .with_recording(RecordSpec::every_step("input"));
        let mut engine = SimulationEngine::new(relay(Delay::None), params).unwrap();
        engine
            .add_stimulus(Stimulus::Sequence {
                population: PopulationId::new(0),
                frames: vec![vec![1.0], vec![2.0]],
                period: 2,
            })
            .unwrap();

        let result = engine.run().unwrap();
        let rates: Vec<f32> = result.samples.iter().map(|s| s.rates[0]).collect();
        assert_eq!(rates, vec![1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_stimulus_size_checked() {
        let mut engine = SimulationEngine::new(relay(Delay::None), SimulationParams::default()).unwrap();
        let err = engine
            .add_stimulus(Stimulus::Constant {
                population: PopulationId::new(0),
                rates: vec![1.0, 2.0],
                start_step: 0,
                duration: 1,
            })
            .unwrap_err();
        assert!(matches!(err.root(), RuntimeError::SizeMismatch { .. }));
    }

    #[test]
    fn test_reset_before_run_discards_preset_rates() {
        let input = PopulationId::new(0);
        let output = PopulationId::new(1);

        let mut network = relay(Delay::None);
        network.set_rates(input, &[3.0]).unwrap();
        let mut engine = SimulationEngine::new(network, SimulationParams::new(2).unwrap()).unwrap();
        engine.run().unwrap();
        assert_eq!(engine.network().rates(output).unwrap(), &[0.0]);

        let mut network = relay(Delay::None);
        network.set_rates(input, &[3.0]).unwrap();
        let params = SimulationParams::new(2).unwrap().with_reset(false);
        let mut engine = SimulationEngine::new(network, params).unwrap();
        engine.run().unwrap();
        assert_eq!(engine.network().rates(output).unwrap(), &[3.0]);
    }

    #[test]
    fn test_run_fixed_steps_keeps_state() {
        let mut network = relay(Delay::None);
        network.set_rates(PopulationId::new(0), &[3.0]).unwrap();
        let (network, result) = run_fixed_steps(network, 4).unwrap();
        assert_eq!(result.steps_executed, 4);
        assert_eq!(network.step_count(), 4);
        assert_eq!(network.rates(PopulationId::new(1)).unwrap(), &[3.0]);
    }

    #[test]
    fn test_determinism_reproducibility() {
        let noisy = || {
            let params = LeakyParams::default().with_noise(0.5);
            NetworkBuilder::new()
                .with_config(
                    NetworkConfig::default()
                        .with_memory_budget(MemoryBudget::Unlimited)
                        .with_seed(9999),
                )
                .add_population(PopulationSpec::new("noisy", 16, Dynamics::leaky(params).unwrap()))
                .build()
                .unwrap()
        };
        let params = SimulationParams::new(20)
            .unwrap()
            .with_recording(RecordSpec::every_step("noisy"));

        let res1 = SimulationEngine::new(noisy(), params.clone()).unwrap().run().unwrap();
        let res2 = SimulationEngine::new(noisy(), params).unwrap().run().unwrap();
        assert_eq!(res1.samples, res2.samples);
    }
}
