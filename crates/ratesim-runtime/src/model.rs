//! Rate-coded neuron models

use crate::error::*;
use rand::{rngs::StdRng, Rng};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Transfer function mapping the integrated potential to a rate
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Transfer {
    /// f(x) = x
    Linear,
    /// f(x) = max(0, x)
    #[default]
    Rectified,
    /// f(x) = 1 / (1 + e^(-steepness * x))
    Sigmoid {
        /// Slope at the origin, scaled by 4
        steepness: f32,
    },
    /// f(x) = tanh(x)
    Tanh,
}

impl Transfer {
    /// Apply the transfer function
    pub fn apply(&self, x: f32) -> f32 {
        match *self {
            Transfer::Linear => x,
            Transfer::Rectified => x.max(0.0),
            Transfer::Sigmoid { steepness } => 1.0 / (1.0 + (-steepness * x).exp()),
            Transfer::Tanh => x.tanh(),
        }
    }

    fn validate(&self) -> Result<()> {
        if let Transfer::Sigmoid { steepness } = *self {
            if !(steepness > 0.0) {
                return Err(RuntimeError::invalid_parameter(
                    "steepness",
                    steepness.to_string(),
                    "> 0.0",
                ));
            }
        }
        Ok(())
    }
}

/// Everything a model sees while updating one neuron
pub struct NeuronContext<'a> {
    /// Rank of the neuron inside its population
    pub rank: usize,
    /// Rate produced by the previous step
    pub rate: f32,
    /// Integrated state carried between steps
    pub potential: &'a mut f32,
    /// This step's input sums of the targets named by
    /// [`NeuronModel::targets`], in that order; `None` when nothing projects
    /// onto a target
    pub inputs: &'a [Option<&'a [f32]>],
    /// Integration step
    pub dt: f32,
    /// Population random number generator
    pub rng: &'a mut StdRng,
}

impl NeuronContext<'_> {
    /// Weighted input received on the `slot`-th target of the model
    pub fn sum(&self, slot: usize) -> f32 {
        self.inputs
            .get(slot)
            .copied()
            .flatten()
            .and_then(|sums| sums.get(self.rank))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Per-neuron update rule of a population
///
/// Implementations are shared across the worker threads of a step and must
/// not keep per-neuron state of their own: everything that persists between
/// steps lives in the rate and potential passed through [`NeuronContext`].
pub trait NeuronModel: Send + Sync + fmt::Debug {
    /// Model name used in logs
    fn name(&self) -> &str;

    /// Rate of every neuron at construction and after reset
    fn initial_rate(&self) -> f32 {
        0.0
    }

    /// Potential of every neuron at construction and after reset
    fn initial_potential(&self) -> f32 {
        0.0
    }

    /// Input targets read through [`NeuronContext::sum`], resolved once per
    /// population update
    fn targets(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Compute the new rate of one neuron
    fn update(&self, ctx: NeuronContext<'_>) -> f32;
}

/// How a population's rates evolve during the state update phase
#[derive(Debug)]
pub enum Dynamics {
    /// Rates are only changed through [`crate::Population::set_rates`]
    Clamped,
    /// Rates are computed by a neuron model
    Model(Box<dyn NeuronModel>),
}

impl Dynamics {
    /// Wrap a neuron model
    pub fn model(model: impl NeuronModel + 'static) -> Self {
        Dynamics::Model(Box::new(model))
    }

    /// Leaky integrator with the given parameters
    pub fn leaky(params: LeakyParams) -> Result<Self> {
        Ok(Self::model(LeakyIntegrator::new(params)?))
    }

    /// Name used in logs
    pub fn name(&self) -> &str {
        match self {
            Dynamics::Clamped => "clamped",
            Dynamics::Model(model) => model.name(),
        }
    }

    /// Initial rate for every neuron
    pub fn initial_rate(&self) -> f32 {
        match self {
            Dynamics::Clamped => 0.0,
            Dynamics::Model(model) => model.initial_rate(),
        }
    }

    /// Initial potential for every neuron
    pub fn initial_potential(&self) -> f32 {
        match self {
            Dynamics::Clamped => 0.0,
            Dynamics::Model(model) => model.initial_potential(),
        }
    }
}

/// Parameters for leaky integrator neurons
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LeakyParams {
    /// Integration time constant (ms)
    pub tau: f32,
    /// Constant drive added to the input
    pub baseline: f32,
    /// Amplitude of uniform noise in [-noise, noise]
    pub noise: f32,
    /// Transfer function applied to the potential
    pub transfer: Transfer,
    /// Target whose sum drives the potential up
    pub excitatory: String,
    /// Target whose sum drives the potential down
    pub inhibitory: String,
}

impl Default for LeakyParams {
    fn default() -> Self {
        Self {
            tau: 10.0,
            baseline: 0.0,
            noise: 0.0,
            transfer: Transfer::Rectified,
            excitatory: "exc".to_string(),
            inhibitory: "inh".to_string(),
        }
    }
}

impl LeakyParams {
    /// Create new leaky integrator parameters with validation
    pub fn new(tau: f32, baseline: f32, noise: f32, transfer: Transfer) -> Result<Self> {
        let params = Self {
            tau,
            baseline,
            noise,
            transfer,
            ..Self::default()
        };
        params.validate()?;
        Ok(params)
    }

    /// Rename the excitatory and inhibitory targets
    pub fn with_targets(mut self, excitatory: impl Into<String>, inhibitory: impl Into<String>) -> Self {
        self.excitatory = excitatory.into();
        self.inhibitory = inhibitory.into();
        self
    }

    /// Set the noise amplitude
    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise;
        self
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.tau > 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "tau",
                self.tau.to_string(),
                "> 0.0",
            ));
        }
        if !(self.noise >= 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "noise",
                self.noise.to_string(),
                ">= 0.0",
            ));
        }
        if !self.baseline.is_finite() {
            return Err(RuntimeError::invalid_parameter(
                "baseline",
                self.baseline.to_string(),
                "finite",
            ));
        }
        if self.excitatory == self.inhibitory {
            return Err(RuntimeError::invalid_parameter(
                "inhibitory",
                self.inhibitory.clone(),
                "distinct from the excitatory target",
            ));
        }
        self.transfer.validate()
    }
}

/// Leaky integrator: `tau * dp/dt = -p + baseline + exc - inh + noise`,
/// `rate = transfer(p)`, explicit Euler
#[derive(Debug, Clone)]
pub struct LeakyIntegrator {
    params: LeakyParams,
}

impl LeakyIntegrator {
    /// Create a new leaky integrator model
    pub fn new(params: LeakyParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Get model parameters
    pub fn params(&self) -> &LeakyParams {
        &self.params
    }
}

impl NeuronModel for LeakyIntegrator {
    fn name(&self) -> &str {
        "leaky-integrator"
    }

    fn targets(&self) -> Vec<&str> {
        vec![self.params.excitatory.as_str(), self.params.inhibitory.as_str()]
    }

    fn update(&self, ctx: NeuronContext<'_>) -> f32 {
        let p = &self.params;
        let noise = if p.noise > 0.0 {
            p.noise * ctx.rng.gen_range(-1.0f32..=1.0)
        } else {
            0.0
        };
        let drive = p.baseline + ctx.sum(0) - ctx.sum(1) + noise;

        *ctx.potential += ctx.dt / p.tau * (drive - *ctx.potential);
        p.transfer.apply(*ctx.potential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::TargetSums;
    use rand::SeedableRng;

    fn run_one(model: &LeakyIntegrator, inputs: &TargetSums, potential: &mut f32, dt: f32) -> f32 {
        let mut rng = StdRng::seed_from_u64(7);
        let resolved: Vec<_> = model.targets().into_iter().map(|t| inputs.get(t)).collect();
        model.update(NeuronContext {
            rank: 0,
            rate: 0.0,
            potential,
            inputs: &resolved,
            dt,
            rng: &mut rng,
        })
    }

    #[test]
    fn test_transfer_functions() {
        assert_eq!(Transfer::Linear.apply(-2.0), -2.0);
        assert_eq!(Transfer::Rectified.apply(-2.0), 0.0);
        assert_eq!(Transfer::Rectified.apply(1.5), 1.5);
        assert!((Transfer::Sigmoid { steepness: 1.0 }.apply(0.0) - 0.5).abs() < 1e-6);
        assert!((Transfer::Tanh.apply(0.5) - 0.5f32.tanh()).abs() < 1e-6);
    }

    #[test]
    fn test_params_validation() {
        assert!(LeakyParams::new(10.0, 0.0, 0.0, Transfer::Linear).is_ok());
        assert!(LeakyParams::new(0.0, 0.0, 0.0, Transfer::Linear).is_err());
        assert!(LeakyParams::new(10.0, 0.0, -1.0, Transfer::Linear).is_err());
        assert!(LeakyParams::new(f32::NAN, 0.0, 0.0, Transfer::Linear).is_err());
        assert!(LeakyParams::new(10.0, 0.0, 0.0, Transfer::Sigmoid { steepness: 0.0 }).is_err());
        assert!(LeakyParams::default().with_targets("x", "x").validate().is_err());
    }

    #[test]
    fn test_euler_step() {
        let model = LeakyIntegrator::new(LeakyParams::new(10.0, 0.0, 0.0, Transfer::Linear).unwrap()).unwrap();
        let mut inputs = TargetSums::new(1);
        inputs.register("exc");
        inputs.register("inh");
        inputs.buffer_mut("exc").unwrap()[0] = 2.0;
        inputs.buffer_mut("inh").unwrap()[0] = 0.5;

        let mut potential = 0.0;
        let rate = run_one(&model, &inputs, &mut potential, 1.0);
        // 0 + 1/10 * (2.0 - 0.5 - 0)
        assert!((rate - 0.15).abs() < 1e-6);
        assert_eq!(rate, potential);
    }

    #[test]
    fn test_target_slots() {
        let model = LeakyIntegrator::new(LeakyParams::default().with_targets("ampa", "gaba")).unwrap();
        assert_eq!(model.targets(), vec!["ampa", "gaba"]);

        let exc = [0.0, 3.0];
        let inputs = [Some(&exc[..]), None];
        let mut potential = 0.0;
        let mut rng = StdRng::seed_from_u64(1);
        let ctx = NeuronContext {
            rank: 1,
            rate: 0.0,
            potential: &mut potential,
            inputs: &inputs,
            dt: 1.0,
            rng: &mut rng,
        };
        assert_eq!(ctx.sum(0), 3.0);
        // unprojected target and unknown slot read as zero
        assert_eq!(ctx.sum(1), 0.0);
        assert_eq!(ctx.sum(2), 0.0);
    }

    #[test]
    fn test_converges_to_drive() {
        let params = LeakyParams {
            baseline: 0.8,
            ..LeakyParams::default()
        };
        let model = LeakyIntegrator::new(params).unwrap();
        let inputs = TargetSums::new(1);

        let mut potential = 0.0;
        let mut rate = 0.0;
        for _ in 0..500 {
            rate = run_one(&model, &inputs, &mut potential, 1.0);
        }
        assert!((rate - 0.8).abs() < 1e-3);
    }

    #[test]
    fn test_rectified_output() {
        let params = LeakyParams {
            baseline: -1.0,
            ..LeakyParams::default()
        };
        let model = LeakyIntegrator::new(params).unwrap();
        let inputs = TargetSums::new(1);
        let mut potential = 0.0;
        let rate = run_one(&model, &inputs, &mut potential, 1.0);
        assert!(potential < 0.0);
        assert_eq!(rate, 0.0);
    }

    #[test]
    fn test_dynamics_names() {
        assert_eq!(Dynamics::Clamped.name(), "clamped");
        let leaky = Dynamics::leaky(LeakyParams::default()).unwrap();
        assert_eq!(leaky.name(), "leaky-integrator");
        assert_eq!(leaky.initial_rate(), 0.0);
    }
}
