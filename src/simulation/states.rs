//! Core state types for the Hermite N-body integrator.
//!
//! Defines the per-body [`Particle`] record and the [`Ensemble`] that holds
//! all of them. A particle carries three copies of its kinematic state:
//! - canonical `r`/`v`, the committed state at time `t`
//! - predicted `pr`/`pv`, scratch rewritten on every prediction
//! - anchor `ipr`/`ipv`, the raw predictor output the corrector adds onto

use nalgebra::Vector3;

use crate::simulation::error::ConfigError;

pub type NVec3 = Vector3<f64>;

#[derive(Debug, Clone)]
pub struct Particle {
    pub index: usize, // stable identity
    pub m: f64,       // mass

    pub r: NVec3, // position
    pub v: NVec3, // velocity

    pub pr: NVec3, // predicted position
    pub pv: NVec3, // predicted velocity

    pub ipr: NVec3, // predictor output, position
    pub ipv: NVec3, // predictor output, velocity

    pub a0: NVec3, // acceleration
    pub a1: NVec3, // jerk
    pub oa0: NVec3, // acceleration at previous commit
    pub oa1: NVec3, // jerk at previous commit
    pub a2: NVec3, // snap (finite difference)
    pub a3: NVec3, // crackle (finite difference)

    pub t: f64,  // time of last commit
    pub dt: f64, // step size
}

impl Particle {
    /// Fresh particle at `t = 0` with predicted state equal to the canonical one.
    pub fn new(index: usize, m: f64, r: NVec3, v: NVec3) -> Self {
        Self {
            index,
            m,
            r,
            v,
            pr: r,
            pv: v,
            ipr: r,
            ipv: v,
            a0: NVec3::zeros(),
            a1: NVec3::zeros(),
            oa0: NVec3::zeros(),
            oa1: NVec3::zeros(),
            a2: NVec3::zeros(),
            a3: NVec3::zeros(),
            t: 0.0,
            dt: 0.0,
        }
    }

    /// Time at which this particle is next due.
    pub fn next_time(&self) -> f64 {
        self.t + self.dt
    }
}

/// Fixed-size collection of particles, built once from the loader data.
#[derive(Debug, Clone)]
pub struct Ensemble {
    pub particles: Vec<Particle>,
}

impl Ensemble {
    /// Build an ensemble from `(mass, position, velocity)` tuples.
    ///
    /// Fails on an empty list, a non-positive or non-finite mass, or a
    /// non-finite initial position/velocity.
    pub fn from_bodies<I>(bodies: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (f64, NVec3, NVec3)>,
    {
        let mut particles = Vec::new();
        for (index, (m, r, v)) in bodies.into_iter().enumerate() {
            if !(m.is_finite() && m > 0.0) {
                return Err(ConfigError::NonPositiveMass { index, mass: m });
            }
            if !(r.iter().all(|x| x.is_finite()) && v.iter().all(|x| x.is_finite())) {
                return Err(ConfigError::NonFiniteState { index });
            }
            particles.push(Particle::new(index, m, r, v));
        }

        if particles.is_empty() {
            return Err(ConfigError::EmptyEnsemble);
        }

        Ok(Self { particles })
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn total_mass(&self) -> f64 {
        self.particles.iter().map(|p| p.m).sum()
    }
}
