//! Numerical parameters for the integrator
//!
//! `Parameters` holds runtime settings:
//! - end time and diagnostic output interval,
//! - block time-step bounds (`d_time_min`, `d_time_max`),
//! - softening for the direct-force path,
//! - the accuracy parameter `eta` (derived at start-up when not given),
//! - Kepler solver tolerances and iteration cap,
//! - the perturbation threshold for two-body substitution

use crate::simulation::error::ConfigError;

pub const D_TIME_MIN: f64 = 9.5367431640625e-07; // 2^-20
pub const D_TIME_MAX: f64 = 0.125; // 2^-3
pub const DEL_E: f64 = 9.0e-16;
pub const DEL_E_HYP: f64 = 2.0e-15;
pub const KEPLER_ITE: usize = 50;

/// Newton iteration policy for the Kepler solvers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeplerTolerances {
    pub del_e: f64,     // absolute tolerance, elliptic solver
    pub del_e_hyp: f64, // relative tolerance, general solver
    pub kepler_ite: usize, // iteration cap
}

impl Default for KeplerTolerances {
    fn default() -> Self {
        Self {
            del_e: DEL_E,
            del_e_hyp: DEL_E_HYP,
            kepler_ite: KEPLER_ITE,
        }
    }
}

/// Block time-step bounds. `max / min` is a power of two.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for StepBounds {
    fn default() -> Self {
        Self {
            min: D_TIME_MIN,
            max: D_TIME_MAX,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Parameters {
    pub t_end: f64,           // time end
    pub output_interval: f64, // diagnostics cadence
    pub bounds: StepBounds,   // block step bounds
    pub softening: f64,       // softening length, direct-force path only
    pub eta: Option<f64>,     // accuracy parameter, derived when None
    pub kepler: KeplerTolerances,
    pub max_perturbation: f64, // external/mutual acceleration ratio for Kepler pairs
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            t_end: 1.0,
            output_interval: 1.0,
            bounds: StepBounds::default(),
            softening: 0.0,
            eta: None,
            kepler: KeplerTolerances::default(),
            max_perturbation: 1.0e-4,
        }
    }
}

impl Parameters {
    /// Softening squared, as used by the force kernel.
    pub fn eps2(&self) -> f64 {
        self.softening * self.softening
    }

    /// Reject inconsistent settings before any integration step is taken.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let StepBounds { min, max } = self.bounds;
        if !(min > 0.0 && min.is_finite() && max.is_finite() && min <= max) {
            return Err(ConfigError::InvertedTimeBounds { min, max });
        }
        let k = (max / min).log2();
        if k.fract() != 0.0 || max / 2f64.powi(k as i32) != min {
            return Err(ConfigError::TimeBoundsNotPowerOfTwo { min, max });
        }

        positive("t_end", self.t_end)?;
        positive("output_interval", self.output_interval)?;
        positive("del_e", self.kepler.del_e)?;
        positive("del_e_hyp", self.kepler.del_e_hyp)?;
        positive("max_perturbation", self.max_perturbation)?;
        if let Some(eta) = self.eta {
            positive("eta", eta)?;
        }
        if !(self.softening >= 0.0 && self.softening.is_finite()) {
            return Err(ConfigError::NonPositiveParameter {
                name: "softening",
                value: self.softening,
            });
        }
        if self.kepler.kepler_ite == 0 {
            return Err(ConfigError::ZeroIterationCap);
        }
        if (self.output_interval / max).fract() != 0.0 {
            return Err(ConfigError::OutputInterval {
                interval: self.output_interval,
                max,
            });
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositiveParameter { name, value })
    }
}
