//! Analytic two-body substitution for tight bound pairs.
//!
//! When the step criterion of a particle drops below `d_time_min`, direct
//! integration of its closest bound partner is no longer well resolved.
//! Such a pair is advanced with [`kepler::propagate`] instead: the centre
//! of mass follows the Taylor prediction, the relative orbit is exact.
//! Members of a pair stay at `d_time_min` so they commit together.

use crate::simulation::error::KeplerError;
use crate::simulation::forces::pair_derivatives;
use crate::simulation::kepler;
use crate::simulation::params::KeplerTolerances;
use crate::simulation::states::Ensemble;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeplerPair {
    pub primary: usize,
    pub secondary: usize,
}

impl KeplerPair {
    pub fn contains(&self, i: usize) -> bool {
        self.primary == i || self.secondary == i
    }

    /// Replace the predicted and anchor state of both members at `time`.
    ///
    /// Must be called after the Taylor prediction; the ensemble is left
    /// untouched when the orbit is degenerate.
    pub fn predict(
        &self,
        ens: &mut Ensemble,
        time: f64,
        tol: &KeplerTolerances,
    ) -> Result<(), KeplerError> {
        let (pi, pj) = (&ens.particles[self.primary], &ens.particles[self.secondary]);
        let m_tot = pi.m + pj.m;
        let (wi, wj) = (pi.m / m_tot, pj.m / m_tot);

        let com_r = pi.pr * wi + pj.pr * wj;
        let com_v = pi.pv * wi + pj.pv * wj;

        let tau = time - pi.t;
        let (rel_r, rel_v) = kepler::propagate(pi.r - pj.r, pi.v - pj.v, m_tot, tau, tol)?;

        let pi = &mut ens.particles[self.primary];
        pi.pr = com_r + rel_r * wj;
        pi.pv = com_v + rel_v * wj;
        pi.ipr = pi.pr;
        pi.ipv = pi.pv;

        let pj = &mut ens.particles[self.secondary];
        pj.pr = com_r - rel_r * wi;
        pj.pv = com_v - rel_v * wi;
        pj.ipr = pj.pr;
        pj.ipv = pj.pv;

        Ok(())
    }
}

/// Closest particle to `i` (unsoftened) among those accepted by `allow`.
pub fn nearest_neighbour<F>(ens: &Ensemble, i: usize, allow: F) -> Option<usize>
where
    F: Fn(usize) -> bool,
{
    let ri = ens.particles[i].r;
    ens.particles
        .iter()
        .filter(|p| p.index != i && allow(p.index))
        .map(|p| (p.index, (p.r - ri).norm_squared()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(j, _)| j)
}

/// Two-body energy of the relative orbit of `i` and `j` is negative.
pub fn is_bound(ens: &Ensemble, i: usize, j: usize) -> bool {
    let (pi, pj) = (&ens.particles[i], &ens.particles[j]);
    let r = (pj.r - pi.r).norm();
    let v2 = (pj.v - pi.v).norm_squared();
    0.5 * v2 - (pi.m + pj.m) / r < 0.0
}

/// `|a_rel − a_mutual| / |a_mutual|` for the relative motion of `i` and `j`.
///
/// Uses the committed `a0` of both particles and the softened mutual term,
/// so the numerator is the tidal pull of everything else.
pub fn perturbation(ens: &Ensemble, i: usize, j: usize, eps2: f64) -> f64 {
    let (pi, pj) = (&ens.particles[i], &ens.particles[j]);
    let on_i = pair_derivatives(pj.r - pi.r, pj.v - pi.v, pj.m, eps2).a0;
    let on_j = pair_derivatives(pi.r - pj.r, pi.v - pj.v, pi.m, eps2).a0;

    let mutual = on_i - on_j;
    let total = pi.a0 - pj.a0;
    (total - mutual).norm() / mutual.norm()
}
