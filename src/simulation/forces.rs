//! Acceleration and jerk evaluation for the Hermite scheme
//!
//! Defines the [`JerkEvaluator`] seam and two direct-summation gravity
//! backends: a serial one and a rayon-parallel one that works through
//! mirrored [`DeviceBuffers`]. Both read the *predicted* state of every
//! particle and write `a0`/`a1` for a subset of target particles

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::simulation::backend::DeviceBuffers;
use crate::simulation::error::ConfigError;
use crate::simulation::states::{Ensemble, NVec3};

/// Acceleration and its first time derivative for one particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Derivatives {
    pub a0: NVec3, // acceleration
    pub a1: NVec3, // jerk
}

impl Default for Derivatives {
    fn default() -> Self {
        Self {
            a0: NVec3::zeros(),
            a1: NVec3::zeros(),
        }
    }
}

impl Derivatives {
    pub fn is_finite(&self) -> bool {
        self.a0.iter().chain(self.a1.iter()).all(|x| x.is_finite())
    }
}

/// Contribution of source `j` on target `i` for the pairwise inverse-square law.
///
/// `dr = pr_j - pr_i`, `dv = pv_j - pv_i`, `eps2` softening squared.
#[inline]
pub fn pair_derivatives(dr: NVec3, dv: NVec3, mj: f64, eps2: f64) -> Derivatives {
    let r2 = dr.dot(&dr) + eps2;
    let rinv = r2.sqrt().recip();
    let r2inv = rinv * rinv;
    let r3inv = r2inv * rinv;
    let r5inv = r2inv * r3inv;
    let rv = dr.dot(&dv);

    let mr3inv = mj * r3inv;
    let mr5inv = mj * r5inv;

    Derivatives {
        a0: dr * mr3inv,
        a1: dv * mr3inv - dr * (3.0 * rv * mr5inv),
    }
}

/// Sum the contributions of all sources on the particle at `(pos_i, vel_i)`.
///
/// `skip` is the target's own index.
#[inline]
fn sum_on_target(
    skip: usize,
    pos_i: NVec3,
    vel_i: NVec3,
    pos: &[NVec3],
    vel: &[NVec3],
    mass: &[f64],
    eps2: f64,
) -> Derivatives {
    let mut acc = Derivatives::default();
    for j in 0..mass.len() {
        if j == skip {
            continue;
        }
        let d = pair_derivatives(pos[j] - pos_i, vel[j] - vel_i, mass[j], eps2);
        acc.a0 += d.a0;
        acc.a1 += d.a1;
    }
    acc
}

/// Anything that can produce `a0`/`a1` for the due block.
///
/// `out[k]` receives the derivatives of particle `targets[k]`, evaluated from
/// the predicted state (`pr`, `pv`) of every particle in `ens`.
pub trait JerkEvaluator {
    /// Called once by the integrator before the first evaluation.
    fn prepare(&mut self, _ens: &Ensemble) -> Result<(), ConfigError> {
        Ok(())
    }

    fn evaluate(&mut self, ens: &Ensemble, targets: &[usize], out: &mut [Derivatives]);
}

/// Softened Newtonian gravity, serial direct O(N·n_due) summation.
pub struct DirectGravity {
    pub eps2: f64, // softening
}

impl JerkEvaluator for DirectGravity {
    fn evaluate(&mut self, ens: &Ensemble, targets: &[usize], out: &mut [Derivatives]) {
        let ps = &ens.particles;
        for (slot, &i) in out.iter_mut().zip(targets.iter()) {
            let pi = &ps[i];
            let mut acc = Derivatives::default();
            for (j, pj) in ps.iter().enumerate() {
                if j == i {
                    continue;
                }
                let d = pair_derivatives(pj.pr - pi.pr, pj.pv - pi.pv, pj.m, self.eps2);
                acc.a0 += d.a0;
                acc.a1 += d.a1;
            }
            *slot = acc;
        }
    }
}

/// Softened Newtonian gravity summed in parallel over targets.
///
/// Masses are mirrored once at construction; predicted state is copied in
/// before and derivatives copied out after every evaluation.
pub struct ParallelGravity {
    pub eps2: f64,
    buffers: DeviceBuffers,
}

impl ParallelGravity {
    pub fn new(ens: &Ensemble, eps2: f64) -> Self {
        Self {
            eps2,
            buffers: DeviceBuffers::allocate(ens),
        }
    }
}

impl JerkEvaluator for ParallelGravity {
    fn prepare(&mut self, ens: &Ensemble) -> Result<(), ConfigError> {
        self.buffers.check_len(ens)
    }

    fn evaluate(&mut self, ens: &Ensemble, targets: &[usize], out: &mut [Derivatives]) {
        self.buffers.upload_predicted(ens);

        let eps2 = self.eps2;
        let buffers = &self.buffers;
        let results: Vec<Derivatives> = targets
            .par_iter()
            .map(|&i| {
                sum_on_target(
                    i,
                    buffers.pos[i],
                    buffers.vel[i],
                    &buffers.pos,
                    &buffers.vel,
                    &buffers.mass,
                    eps2,
                )
            })
            .collect();

        // collect() is the barrier: every target is summed before any is written back
        self.buffers.store(targets, &results);
        self.buffers.download(targets, out);
    }
}
