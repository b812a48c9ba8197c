//! # Closed-form two-body propagation
//!
//! Advances the relative state of a two-body system (or a body around a
//! fixed mass) by an arbitrary time increment by solving Kepler's equation,
//! instead of integrating the pair force numerically.
//!
//! The orbit is described by:
//! - the angular momentum `j = r × v`
//! - the Laplace–Runge–Lenz vector `e = (v × j)/m0 − r/|r|`
//! - the semi-major axis `a = j²/(m0 |1 − e²|)` and frequency `w = sqrt(m0/a³)`
//! - two axis vectors: `a_vec` along `e`, `b_vec` along `j × e`
//!
//! so that on an ellipse `r(E) = a_vec (cos E − e) + b_vec sin E`, and on a
//! hyperbola `r(H) = a_vec (e − cosh H) + b_vec sinh H`.
//!
//! Root finding is best-effort: when the Newton iteration hits the iteration
//! cap the current estimate is returned along with its residual.
//!
//! Circular (`e = 0`) and parabolic (`e = 1`) orbits have no well defined
//! `a_vec` / `|1 − e²|`, and are reported as [`KeplerError::DegenerateOrbit`].

use std::f64::consts::PI;

use log::debug;

use crate::simulation::error::{Degeneracy, KeplerError};
use crate::simulation::params::KeplerTolerances;
use crate::simulation::states::NVec3;

const TWO_PI: f64 = 2.0 * PI;

/// Eccentricities within this distance of 0 or 1 are treated as degenerate.
pub const DEGENERATE_ECC: f64 = 1.0e-10;

/// Below this |E| (and above `PERICENTER_ECC`) the elliptic branch switches to a series.
const PERICENTER_ANOMALY: f64 = 1.0e-3;
const PERICENTER_ECC: f64 = 0.99;

// 1/(n(n-1)) factors of the sinh/cosh series
const F_17_16: f64 = 1. / 17. / 16.;
const F_16_15: f64 = 1. / 16. / 15.;
const F_15_14: f64 = 1. / 15. / 14.;
const F_14_13: f64 = 1. / 14. / 13.;
const F_13_12: f64 = 1. / 13. / 12.;
const F_12_11: f64 = 1. / 12. / 11.;
const F_11_10: f64 = 1. / 11. / 10.;
const F_10_9: f64 = 1. / 10. / 9.;
const F_9_8: f64 = 1. / 9. / 8.;
const F_8_7: f64 = 1. / 8. / 7.;
const F_7_6: f64 = 1. / 7. / 6.;
const F_6_5: f64 = 1. / 6. / 5.;
const F_4_3: f64 = 1. / 4. / 3.;
const F_3_2: f64 = 1. / 3. / 2.;

/// Result of a Kepler's-equation root search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalySolution {
    pub anomaly: f64,     // eccentric (or hyperbolic) anomaly
    pub residual: f64,    // last evaluated error of Kepler's equation
    pub iterations: usize,
    pub converged: bool,
}

impl AnomalySolution {
    fn exact(anomaly: f64) -> Self {
        Self {
            anomaly,
            residual: 0.0,
            iterations: 0,
            converged: true,
        }
    }
}

/// Orbital elements of a relative two-body state.
#[derive(Debug, Clone, Copy)]
pub struct KeplerOrbit {
    pub m0: f64,
    pub j: NVec3,     // specific angular momentum
    pub e_vec: NVec3, // Laplace-Runge-Lenz vector
    pub ecc: f64,
    pub a: f64, // semi-major axis (positive for both branches)
    pub w: f64, // mean motion
    pub a_vec: NVec3,
    pub b_vec: NVec3,
}

impl KeplerOrbit {
    /// Derive the orbit through relative position `r` and velocity `v` about mass `m0`.
    pub fn from_state(r: NVec3, v: NVec3, m0: f64) -> Result<Self, KeplerError> {
        if !(m0 > 0.0 && m0.is_finite()) {
            return degenerate(Degeneracy::NonPositiveMass);
        }
        if !(r.iter().chain(v.iter()).all(|x| x.is_finite())) {
            return degenerate(Degeneracy::NonFinite);
        }
        let rmag = r.norm();
        if rmag == 0.0 {
            return degenerate(Degeneracy::ZeroSeparation);
        }

        let j = r.cross(&v);
        let j2 = j.norm_squared();
        if j2 <= (DEGENERATE_ECC * rmag * v.norm()).powi(2) {
            return degenerate(Degeneracy::ZeroAngularMomentum);
        }

        let e_vec = v.cross(&j) / m0 - r / rmag;
        let ecc = e_vec.norm();
        if ecc < DEGENERATE_ECC {
            return degenerate(Degeneracy::Circular);
        }
        if (1.0 - ecc).abs() < DEGENERATE_ECC {
            return degenerate(Degeneracy::Parabolic);
        }

        let one_minus_e2 = (1.0 - ecc * ecc).abs();
        let a = j2 / (m0 * one_minus_e2);
        let w = (m0 / (a * a * a)).sqrt();

        let a_vec = e_vec * (a / ecc);

        let b_dir = j.cross(&e_vec);
        let b_vmag = b_dir.norm();
        if b_vmag == 0.0 {
            return degenerate(Degeneracy::ZeroAngularMomentum);
        }
        let b = a * one_minus_e2.sqrt();
        let b_vec = b_dir * (b / b_vmag);

        if !(a.is_finite() && w.is_finite()) {
            return degenerate(Degeneracy::NonFinite);
        }

        Ok(Self {
            m0,
            j,
            e_vec,
            ecc,
            a,
            w,
            a_vec,
            b_vec,
        })
    }

    pub fn is_elliptic(&self) -> bool {
        self.ecc < 1.0
    }

    /// Orbital period; infinite for unbound orbits.
    pub fn period(&self) -> f64 {
        if self.is_elliptic() {
            TWO_PI / self.w
        } else {
            f64::INFINITY
        }
    }

    /// Propagate the relative state `(r, v)` lying on this orbit by `dt`.
    pub fn advance(&self, r: NVec3, v: NVec3, dt: f64, tol: &KeplerTolerances) -> (NVec3, NVec3) {
        if self.is_elliptic() {
            self.advance_elliptic(r, dt, tol)
        } else {
            self.advance_hyperbolic(r, v, dt, tol)
        }
    }

    fn advance_elliptic(&self, r: NVec3, dt: f64, tol: &KeplerTolerances) -> (NVec3, NVec3) {
        let Self {
            ecc, a, w, a_vec, b_vec, ..
        } = *self;
        let rmag = r.norm();

        // eccentric anomaly of the current radius
        let cos_e0 = (a - rmag) / (ecc * a);
        let mut e0 = if cos_e0 >= 1.0 {
            0.0
        } else if cos_e0 <= -1.0 {
            PI
        } else {
            cos_e0.acos()
        };
        // r·b is proportional to sin E
        if r.dot(&b_vec) < 0.0 {
            e0 = TWO_PI - e0;
        }

        let m_anomaly = (e0 - ecc * e0.sin() + dt * w).rem_euclid(TWO_PI);
        let sol = solve_elliptic(m_anomaly, ecc, tol);
        if !sol.converged {
            debug!(
                "elliptic kepler solve stopped after {} iterations (e = {ecc:e}, M = {m_anomaly:e}, residual = {:e})",
                sol.iterations, sol.residual
            );
        }
        let e_anomaly = sol.anomaly;

        let cos_e = e_anomaly.cos();
        let sin_e = e_anomaly.sin();

        let mut r_const = cos_e - ecc;
        let mut v_const = w / (1.0 - ecc * cos_e);

        // pericenter passage of a very eccentric orbit: cos E - e and 1 - e cos E cancel
        if ecc > PERICENTER_ECC {
            let e_tmp = if e_anomaly > TWO_PI - PERICENTER_ANOMALY {
                e_anomaly - TWO_PI
            } else {
                e_anomaly
            };
            if e_tmp.abs() < PERICENTER_ANOMALY {
                let e2 = e_tmp * e_tmp;
                let ecc_const = self.j.norm_squared() / (self.m0 * a * (1.0 + ecc)); // 1 - e
                let cos_const = -0.5 * e2 * (1.0 - e2 / 12.0 * (1.0 - e2 / 30.0)); // cos E - 1

                r_const = ecc_const + cos_const;
                v_const = w / (ecc_const - ecc * cos_const);
            }
        }

        let pos = a_vec * r_const + b_vec * sin_e;
        let vel = (-a_vec * sin_e + b_vec * cos_e) * v_const;
        (pos, vel)
    }

    fn advance_hyperbolic(
        &self,
        r: NVec3,
        v: NVec3,
        dt: f64,
        tol: &KeplerTolerances,
    ) -> (NVec3, NVec3) {
        let Self {
            ecc, a, w, a_vec, b_vec, ..
        } = *self;
        let rmag = r.norm();

        let cosh_h0 = (a + rmag) / (ecc * a);
        let h0 = if cosh_h0 < 1.0 {
            0.0
        } else if r.dot(&v) < 0.0 {
            -cosh_h0.acosh()
        } else {
            cosh_h0.acosh()
        };

        let m_anomaly = ecc * h0.sinh() - h0 + dt * w;
        let sol = solve_general(ecc, m_anomaly, tol);
        if !sol.converged {
            debug!(
                "hyperbolic kepler solve stopped after {} iterations (e = {ecc:e}, M = {m_anomaly:e}, residual = {:e})",
                sol.iterations, sol.residual
            );
        }
        let h = sol.anomaly;

        let cosh_h = h.cosh();
        let sinh_h = h.sinh();
        let v_const = w / (ecc * cosh_h - 1.0);

        let pos = a_vec * (ecc - cosh_h) + b_vec * sinh_h;
        let vel = (-a_vec * sinh_h + b_vec * cosh_h) * v_const;
        (pos, vel)
    }
}

fn degenerate<T>(d: Degeneracy) -> Result<T, KeplerError> {
    Err(KeplerError::DegenerateOrbit(d))
}

/// Propagate a relative two-body state `(r, v)` about total mass `m0` by `dt`.
pub fn propagate(
    r: NVec3,
    v: NVec3,
    m0: f64,
    dt: f64,
    tol: &KeplerTolerances,
) -> Result<(NVec3, NVec3), KeplerError> {
    let orbit = KeplerOrbit::from_state(r, v, m0)?;
    let (pos, vel) = orbit.advance(r, v, dt, tol);
    if !(pos.iter().chain(vel.iter()).all(|x| x.is_finite())) {
        return Err(KeplerError::DegenerateOrbit(Degeneracy::NonFinite));
    }
    Ok((pos, vel))
}

/// Propagate a body orbiting a reference body, returning its absolute state.
///
/// `(r, v)` is the state relative to the reference at `(center_r, center_v)`.
pub fn propagate_about(
    center_r: NVec3,
    center_v: NVec3,
    r: NVec3,
    v: NVec3,
    m0: f64,
    dt: f64,
    tol: &KeplerTolerances,
) -> Result<(NVec3, NVec3), KeplerError> {
    let (rel_r, rel_v) = propagate(r, v, m0, dt, tol)?;
    Ok((center_r + rel_r, center_v + rel_v))
}

/// Solve `E − e sin E = M` for an elliptic orbit with an absolute tolerance.
///
/// Seeds at `π` for `e > 0.8`, at `M` otherwise.
pub fn solve_elliptic(m_anomaly: f64, ecc: f64, tol: &KeplerTolerances) -> AnomalySolution {
    let mut e_new = if ecc > 0.8 { PI } else { m_anomaly };
    let mut iterations = 0;
    let mut d = e_new - ecc * e_new.sin() - m_anomaly;

    while d.abs() > tol.del_e {
        if iterations >= tol.kepler_ite {
            return AnomalySolution {
                anomaly: e_new,
                residual: d,
                iterations,
                converged: false,
            };
        }
        e_new -= d / (1.0 - ecc * e_new.cos());
        d = e_new - ecc * e_new.sin() - m_anomaly;
        iterations += 1;
    }

    AnomalySolution {
        anomaly: e_new,
        residual: d,
        iterations,
        converged: true,
    }
}

/// Solve Kepler's equation for any eccentricity with a relative tolerance
/// `del_e_hyp · |M|`.
///
/// Elliptic (`e < 1`) solves `E − e sin E = M`, hyperbolic (`e ≥ 1`) solves
/// `e sinh H − H = M`.
pub fn solve_general(ecc: f64, mean_anom: f64, tol: &KeplerTolerances) -> AnomalySolution {
    if mean_anom == 0.0 {
        return AnomalySolution::exact(0.0);
    }

    // low-eccentricity closed form (Meeus, p. 195) plus one Newton step
    if ecc < 0.3 {
        let mut curr = mean_anom.sin().atan2(mean_anom.cos() - ecc);
        let err = curr - ecc * curr.sin() - mean_anom;
        curr -= err / (1.0 - ecc * curr.cos());
        return AnomalySolution {
            anomaly: curr,
            residual: curr - ecc * curr.sin() - mean_anom,
            iterations: 1,
            converged: true,
        };
    }

    let is_negative = mean_anom < 0.0;
    let mean_anom = mean_anom.abs();

    let mut curr = mean_anom;
    if (ecc > 0.8 && mean_anom < PI / 3.0) || ecc > 1.0 {
        let mut trial = mean_anom / (1.0 - ecc).abs();
        // cubic term dominant
        if trial * trial > 6.0 * (1.0 - ecc).abs() {
            trial = if mean_anom < PI {
                (6.0 * mean_anom).cbrt()
            } else {
                // hyperbolic, 5th and higher order terms dominant
                (mean_anom / ecc).asinh()
            };
        }
        curr = trial;
    }

    let thresh = tol.del_e_hyp * mean_anom;
    let mut iterations = 0;
    let mut err;
    let mut converged = true;

    if ecc < 1.0 {
        err = (curr - ecc * curr.sin()) - mean_anom;
        while err.abs() > thresh {
            iterations += 1;
            curr -= err / (1.0 - ecc * curr.cos());
            err = (curr - ecc * curr.sin()) - mean_anom;
            if iterations > tol.kepler_ite {
                converged = false;
                break;
            }
        }
    } else {
        // Burkardt & Danby, CeMec 31 (1983), 317-328
        curr = (2.0 * mean_anom / ecc + 1.8).ln();
        let mut curr_abs = curr.abs();
        err = (ecc * curr.sinh() - curr) - mean_anom;
        while err.abs() > thresh {
            iterations += 1;
            if curr_abs < 0.72 && ecc < 1.1 {
                // e sinh H - H and e cosh H - 1 are small: expand instead of subtracting.
                // Omitting the n-th order term is below 1e-15 relative for
                // H < (n!/2e15)^(1/(n-2)): n = 16 gives 0.72, n = 10 gives 0.08.
                let curr2 = curr * curr;
                curr -= err / ((ecc - 1.0) * curr.cosh() + cosh_minus_one(curr2, curr_abs));

                let curr2 = curr * curr;
                curr_abs = curr.abs();
                err = ((ecc - 1.0) * curr.sinh() + sinh_minus_x(curr, curr2, curr_abs))
                    - mean_anom;
            } else {
                curr -= err / (ecc * curr.cosh() - 1.0);
                curr_abs = curr.abs();
                err = (ecc * curr.sinh() - curr) - mean_anom;
            }
            if iterations > tol.kepler_ite {
                converged = false;
                break;
            }
        }
    }

    AnomalySolution {
        anomaly: if is_negative { -curr } else { curr },
        residual: err,
        iterations,
        converged,
    }
}

/// `cosh(x) − 1` as a truncated series in `x2 = x²`.
fn cosh_minus_one(x2: f64, x_abs: f64) -> f64 {
    if x_abs > 0.08 {
        (((((((F_16_15 * x2 + 1.) * F_14_13 * x2 + 1.) * F_12_11 * x2 + 1.) * F_10_9 * x2
            + 1.)
            * F_8_7
            * x2
            + 1.)
            * F_6_5
            * x2
            + 1.)
            * F_4_3
            * x2
            + 1.)
            * 0.5
            * x2
    } else {
        ((((F_10_9 * x2 + 1.) * F_8_7 * x2 + 1.) * F_6_5 * x2 + 1.) * F_4_3 * x2 + 1.) * 0.5 * x2
    }
}

/// `sinh(x) − x` as a truncated series.
fn sinh_minus_x(x: f64, x2: f64, x_abs: f64) -> f64 {
    if x_abs > 0.08 {
        (((((((F_17_16 * x2 + 1.) * F_15_14 * x2 + 1.) * F_13_12 * x2 + 1.) * F_11_10 * x2
            + 1.)
            * F_9_8
            * x2
            + 1.)
            * F_7_6
            * x2
            + 1.)
            * 0.05
            * x2
            + 1.)
            * F_3_2
            * x2
            * x
    } else {
        ((((F_11_10 * x2 + 1.) * F_9_8 * x2 + 1.) * F_7_6 * x2 + 1.) * 0.05 * x2 + 1.)
            * F_3_2
            * x2
            * x
    }
}
