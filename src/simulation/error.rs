//! Error types for setup, the Kepler solver, and the integration loop.

use thiserror::Error;

/// Problems with a scenario detected before the first integration step.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("scenario contains no bodies")]
    EmptyEnsemble,

    #[error("body {index} has non-positive mass {mass}")]
    NonPositiveMass { index: usize, mass: f64 },

    #[error("body {index} has a non-finite initial position or velocity")]
    NonFiniteState { index: usize },

    #[error("body {index}: `{field}` must have 3 components, got {len}")]
    VectorArity {
        index: usize,
        field: &'static str,
        len: usize,
    },

    #[error("time step bounds must satisfy 0 < d_time_min <= d_time_max (got {min} and {max})")]
    InvertedTimeBounds { min: f64, max: f64 },

    #[error("d_time_max / d_time_min must be a power of two (got {min} and {max})")]
    TimeBoundsNotPowerOfTwo { min: f64, max: f64 },

    #[error("`{name}` must be positive and finite (got {value})")]
    NonPositiveParameter { name: &'static str, value: f64 },

    #[error("kepler iteration cap must be at least 1")]
    ZeroIterationCap,

    #[error("at least one corrector pass is required")]
    ZeroCorrectorPasses,

    #[error("output interval {interval} is not a multiple of d_time_max {max}")]
    OutputInterval { interval: f64, max: f64 },

    #[error("force buffers sized for {buffers} particles, ensemble has {ensemble}")]
    BufferSize { buffers: usize, ensemble: usize },
}

/// Why an orbit cannot be propagated in closed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    NonPositiveMass,
    ZeroSeparation,
    ZeroAngularMomentum,
    Circular,
    Parabolic,
    NonFinite,
}

impl std::fmt::Display for Degeneracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Degeneracy::NonPositiveMass => "non-positive central mass",
            Degeneracy::ZeroSeparation => "zero separation",
            Degeneracy::ZeroAngularMomentum => "zero angular momentum",
            Degeneracy::Circular => "eccentricity vector vanishes (circular orbit)",
            Degeneracy::Parabolic => "eccentricity is 1 (parabolic orbit)",
            Degeneracy::NonFinite => "non-finite orbital element",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum KeplerError {
    #[error("degenerate orbit: {0}")]
    DegenerateOrbit(Degeneracy),
}

/// Failures inside a block step. The step is rolled back before these are returned.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("non-finite force on particle {index} at t = {time}")]
    NonFiniteForce { index: usize, time: f64 },
}
