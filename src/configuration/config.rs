//! Configuration types for loading integration scenarios from YAML.
//!
//! This module defines a thin, `serde`-deserializable representation of a
//! scenario. A scenario consists of:
//!
//! - [`EngineConfig`]     – force backend, corrector passes, Kepler pairs
//! - [`ParametersConfig`] – end time, step bounds and solver tolerances
//! - [`BodyConfig`]       – initial state for each body
//! - [`ScenarioConfig`]   – top-level wrapper used to load a scenario from YAML
//!
//! # YAML format
//! The reference equal-mass binary:
//!
//! ```yaml
//! engine:
//!   backend: "direct"        # or "parallel"
//!   corrector_passes: 3      # P(EC)^n
//!   encounters: false        # Kepler substitution for tight pairs
//!
//! parameters:
//!   t_end: 1000.0
//!   output_interval: 1.0     # multiple of d_time_max
//!   d_time_min: 9.5367431640625e-07
//!   d_time_max: 0.125
//!   softening: 0.0
//!
//! bodies:
//!   - x: [ 0.5, 0.0, 0.0 ]
//!     v: [ 0.0, -0.99498743710662, 0.0 ]
//!     m: 2.0
//!   - x: [ -0.5, 0.0, 0.0 ]
//!     v: [ 0.0, 0.99498743710662, 0.0 ]
//!     m: 2.0
//! ```
//!
//! Every `parameters` key except `t_end` has a default. `eta` is derived from
//! the initial forces unless given.

use serde::Deserialize;

use crate::simulation::params::{D_TIME_MAX, D_TIME_MIN, DEL_E, DEL_E_HYP, KEPLER_ITE};

/// Which force summation the engine uses:
/// `backend: "direct"` or `backend: "parallel"`
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendConfig {
    #[default]
    #[serde(rename = "direct")] // Serial direct summation
    Direct,
    #[serde(rename = "parallel")] // Direct summation spread over threads with rayon
    Parallel,
}

/// High-level engine configuration
#[derive(Deserialize, Debug, Clone)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default = "default_corrector_passes")]
    pub corrector_passes: usize, // number of evaluate/correct rounds per step
    #[serde(default)]
    pub encounters: bool, // `true` - bound pairs below d_time_min are propagated analytically
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Direct,
            corrector_passes: default_corrector_passes(),
            encounters: false,
        }
    }
}

/// Global numerical parameters for a scenario
#[derive(Deserialize, Debug, Clone)]
pub struct ParametersConfig {
    pub t_end: f64, // time end
    #[serde(default = "default_output_interval")]
    pub output_interval: f64, // diagnostics cadence
    #[serde(default = "default_d_time_min")]
    pub d_time_min: f64, // smallest block step
    #[serde(default = "default_d_time_max")]
    pub d_time_max: f64, // largest block step
    #[serde(default)]
    pub softening: f64, // softening length for the direct force
    #[serde(default)]
    pub eta: Option<f64>, // accuracy parameter, derived when absent
    #[serde(default = "default_del_e")]
    pub del_e: f64, // elliptic Kepler tolerance
    #[serde(default = "default_del_e_hyp")]
    pub del_e_hyp: f64, // general Kepler relative tolerance
    #[serde(default = "default_kepler_ite")]
    pub kepler_ite: usize, // Kepler iteration cap
    #[serde(default = "default_max_perturbation")]
    pub max_perturbation: f64, // tidal/mutual ratio allowed for Kepler pairs
}

/// Configuration for a single body’s initial state
#[derive(Deserialize, Debug, Clone)]
pub struct BodyConfig {
    pub x: Vec<f64>, // Initial position
    pub v: Vec<f64>, // Initial velocity
    pub m: f64,      // Mass of the body
}

/// Top-level scenario configuration loaded from YAML.
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub engine: EngineConfig, // Engine-level configuration
    pub parameters: ParametersConfig, // Global numerical parameters
    pub bodies: Vec<BodyConfig>, // Initial state of the system
}

fn default_corrector_passes() -> usize {
    3
}

fn default_output_interval() -> f64 {
    1.0
}

fn default_d_time_min() -> f64 {
    D_TIME_MIN
}

fn default_d_time_max() -> f64 {
    D_TIME_MAX
}

fn default_del_e() -> f64 {
    DEL_E
}

fn default_del_e_hyp() -> f64 {
    DEL_E_HYP
}

fn default_kepler_ite() -> usize {
    KEPLER_ITE
}

fn default_max_perturbation() -> f64 {
    1.0e-4
}
