//! Block time-step control
//!
//! Per-particle 4th-order (Aarseth-style) step criterion and the block
//! clock. Steps are always `d_time_max / 2^k`; a step may be halved at
//! any commit but only doubled on a `2·dt` boundary, so particles keep
//! committing on shared times

use log::warn;

use crate::simulation::params::StepBounds;
use crate::simulation::states::{Ensemble, Particle};

/// Criterion step from the first four force derivatives of `p`.
///
/// `a1_2 = a2 + dt a3` is the 2nd derivative extrapolated to the end of the step.
pub fn normal_timestep(p: &Particle, eta: f64) -> f64 {
    let a1_2 = p.a2 + p.a3 * p.dt;

    let abs_a = p.a0.norm();
    let abs_j = p.a1.norm();
    let abs_a3 = p.a3.norm();
    let abs_a1_2 = a1_2.norm();

    (eta * (abs_a * abs_a1_2 + abs_j * abs_j) / (abs_j * abs_a3 + abs_a1_2 * abs_a1_2)).sqrt()
}

/// Accuracy parameter from the initial forces: `d_time_min / (2 min |a0|/|a1|)`.
///
/// Particles without jerk are skipped. If none has jerk, falls back to `d_time_min`.
pub fn derive_eta(ens: &Ensemble, d_time_min: f64) -> f64 {
    let dt_min = ens
        .particles
        .iter()
        .filter(|p| p.a1.norm() > 0.0)
        .map(|p| p.a0.norm() / p.a1.norm())
        .fold(f64::INFINITY, f64::min);

    if dt_min.is_finite() && dt_min > 0.0 {
        d_time_min / (2.0 * dt_min)
    } else {
        warn!("no particle has a non-zero jerk at t = 0, using eta = d_time_min");
        d_time_min
    }
}

/// New step size after a commit at time `t`.
pub fn next_step_size(t: f64, dt: f64, normal_dt: f64, bounds: &StepBounds) -> f64 {
    if normal_dt < dt {
        let half = 0.5 * dt;
        if half < bounds.min {
            bounds.min
        } else {
            half
        }
    } else if normal_dt > 2.0 * dt && t % (2.0 * dt) == 0.0 {
        let double = 2.0 * dt;
        if double < bounds.max {
            double
        } else {
            bounds.max
        }
    } else {
        dt
    }
}

/// System clock: the earliest time any particle is due.
pub fn next_block_time(ens: &Ensemble) -> f64 {
    ens.particles
        .iter()
        .map(Particle::next_time)
        .fold(f64::INFINITY, f64::min)
}

/// Indices of the particles that commit at block time `time`.
pub fn due_particles(ens: &Ensemble, time: f64) -> Vec<usize> {
    ens.particles
        .iter()
        .filter(|p| p.next_time() == time)
        .map(|p| p.index)
        .collect()
}
