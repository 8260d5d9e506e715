//! Rate-based learning rules for projection weights

use crate::error::*;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Trait for weight learning rules
///
/// Applied once per synapse during the learning phase, with the rates
/// produced by the state update of the same step.
pub trait LearningRule: Send + Sync + fmt::Debug {
    /// Rule name used in logs
    fn name(&self) -> &str;

    /// New weight of one synapse, before clipping
    fn update_weight(&self, weight: f32, pre_rate: f32, post_rate: f32, dt: f32) -> f32;

    /// Interval `(w_min, w_max)` the projection clips learned weights to
    fn weight_bounds(&self) -> (f32, f32);
}

fn check_rule_params(eta: f32, w_min: f32, w_max: f32) -> Result<()> {
    if !(eta > 0.0) {
        return Err(RuntimeError::invalid_parameter(
            "eta",
            eta.to_string(),
            "> 0.0",
        ));
    }
    if !(w_max > w_min) {
        return Err(RuntimeError::invalid_parameter(
            "w_max",
            format!("{} (with w_min={})", w_max, w_min),
            "> w_min",
        ));
    }
    Ok(())
}

/// Parameters for the Hebbian rule
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HebbianParams {
    /// Learning rate (per ms)
    pub eta: f32,
    /// Minimum weight value
    pub w_min: f32,
    /// Maximum weight value
    pub w_max: f32,
}

impl Default for HebbianParams {
    fn default() -> Self {
        Self {
            eta: 0.01,
            w_min: 0.0,
            w_max: 1.0,
        }
    }
}

impl HebbianParams {
    /// Create new Hebbian parameters with validation
    pub fn new(eta: f32, w_min: f32, w_max: f32) -> Result<Self> {
        check_rule_params(eta, w_min, w_max)?;
        Ok(Self { eta, w_min, w_max })
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        check_rule_params(self.eta, self.w_min, self.w_max)
    }
}

/// Hebbian rule: `dw/dt = eta * pre * post`
#[derive(Debug, Clone)]
pub struct Hebbian {
    /// Rule parameters
    pub params: HebbianParams,
}

impl Hebbian {
    /// Create a new Hebbian rule
    pub fn new(params: HebbianParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl LearningRule for Hebbian {
    fn name(&self) -> &str {
        "hebbian"
    }

    fn update_weight(&self, weight: f32, pre_rate: f32, post_rate: f32, dt: f32) -> f32 {
        weight + dt * self.params.eta * pre_rate * post_rate
    }

    fn weight_bounds(&self) -> (f32, f32) {
        (self.params.w_min, self.params.w_max)
    }
}

/// Parameters for Oja's rule
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OjaParams {
    /// Learning rate (per ms)
    pub eta: f32,
    /// Decay factor on the post-synaptic activity
    pub alpha: f32,
    /// Minimum weight value
    pub w_min: f32,
    /// Maximum weight value
    pub w_max: f32,
}

impl Default for OjaParams {
    fn default() -> Self {
        Self {
            eta: 0.01,
            alpha: 1.0,
            w_min: -1.0,
            w_max: 1.0,
        }
    }
}

impl OjaParams {
    /// Create new Oja parameters with validation
    pub fn new(eta: f32, alpha: f32, w_min: f32, w_max: f32) -> Result<Self> {
        let params = Self {
            eta,
            alpha,
            w_min,
            w_max,
        };
        params.validate()?;
        Ok(params)
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        check_rule_params(self.eta, self.w_min, self.w_max)?;
        if !(self.alpha > 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "alpha",
                self.alpha.to_string(),
                "> 0.0",
            ));
        }
        Ok(())
    }
}

/// Oja's rule: `dw/dt = eta * (pre * post - alpha * post^2 * w)`
#[derive(Debug, Clone)]
pub struct Oja {
    /// Rule parameters
    pub params: OjaParams,
}

impl Oja {
    /// Create a new Oja rule
    pub fn new(params: OjaParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl LearningRule for Oja {
    fn name(&self) -> &str {
        "oja"
    }

    fn update_weight(&self, weight: f32, pre_rate: f32, post_rate: f32, dt: f32) -> f32 {
        let p = &self.params;
        let dw = p.eta * (pre_rate * post_rate - p.alpha * post_rate * post_rate * weight);
        weight + dt * dw
    }

    fn weight_bounds(&self) -> (f32, f32) {
        (self.params.w_min, self.params.w_max)
    }
}
