use approx::assert_relative_eq;

use hermite_nbody::simulation::diagnostics::{
    total_angular_momentum, total_energy, total_momentum, BinaryMonitor, DiagnosticRecord,
    OrbitalElements,
};
use hermite_nbody::simulation::encounter::{is_bound, nearest_neighbour, perturbation};
use hermite_nbody::simulation::engine::Engine;
use hermite_nbody::simulation::error::{ConfigError, Degeneracy, IntegrationError, KeplerError};
use hermite_nbody::simulation::forces::{
    pair_derivatives, Derivatives, DirectGravity, JerkEvaluator, ParallelGravity,
};
use hermite_nbody::simulation::integrator::Hermite;
use hermite_nbody::simulation::kepler::{self, KeplerOrbit};
use hermite_nbody::simulation::params::{
    KeplerTolerances, Parameters, StepBounds, D_TIME_MAX, D_TIME_MIN,
};
use hermite_nbody::simulation::states::{Ensemble, NVec3};
use hermite_nbody::simulation::timestep::{derive_eta, next_block_time, next_step_size};
use hermite_nbody::{BackendConfig, Scenario, ScenarioConfig};

/// Build an ensemble from `(m, x, v)` triples
pub fn ensemble(bodies: &[(f64, [f64; 3], [f64; 3])]) -> Ensemble {
    Ensemble::from_bodies(
        bodies
            .iter()
            .map(|(m, x, v)| (*m, NVec3::from(*x), NVec3::from(*v))),
    )
    .expect("valid test ensemble")
}

/// Two bodies at rest separated along the x-axis
pub fn two_body_at_rest(dist: f64, m1: f64, m2: f64) -> Ensemble {
    ensemble(&[
        (m1, [-dist / 2.0, 0.0, 0.0], [0.0; 3]),
        (m2, [dist / 2.0, 0.0, 0.0], [0.0; 3]),
    ])
}

const BINARY_V: f64 = 0.99498743710662; // sqrt(0.99)

/// Equal-mass binary with a = 1/1.01, e = 0.01, E = -2.02
pub fn reference_binary() -> Ensemble {
    ensemble(&[
        (2.0, [0.5, 0.0, 0.0], [0.0, -BINARY_V, 0.0]),
        (2.0, [-0.5, 0.0, 0.0], [0.0, BINARY_V, 0.0]),
    ])
}

/// Circular inner binary with a light companion at r = 5
pub fn hierarchical_triple() -> Ensemble {
    ensemble(&[
        (0.5, [0.5, 0.0, 0.0], [0.0, 0.5, 0.0]),
        (0.5, [-0.5, 0.0, 0.0], [0.0, -0.5, 0.0]),
        (0.01, [5.0, 0.0, 0.0], [0.0, 0.2f64.sqrt(), 0.0]),
    ])
}

/// Unit-mass binary at apocentre, e = 0.99, pericentre separation 0.005
pub fn eccentric_binary() -> Ensemble {
    ensemble(&[
        (0.5, [0.5, 0.0, 0.0], [0.0, 0.05, 0.0]),
        (0.5, [-0.5, 0.0, 0.0], [0.0, -0.05, 0.0]),
    ])
}

/// Deterministic cloud of `n` bodies, no rand needed
pub fn cloud(n: usize) -> Ensemble {
    let bodies = (0..n).map(|i| {
        let i_f = i as f64;
        let x = NVec3::new(
            (i_f * 0.37).sin() * 5.0,
            (i_f * 0.13).cos() * 5.0,
            (i_f * 0.07).sin() * 5.0,
        );
        let v = NVec3::new((i_f * 0.11).cos() * 0.1, (i_f * 0.29).sin() * 0.1, 0.0);
        (1.0 + 0.1 * (i_f * 0.5).sin(), x, v)
    });
    Ensemble::from_bodies(bodies).expect("valid cloud")
}

pub fn params_with_bounds(min: f64, max: f64) -> Parameters {
    Parameters {
        bounds: StepBounds { min, max },
        ..Parameters::default()
    }
}

pub fn direct_hermite(ens: Ensemble, params: Parameters, engine: &Engine) -> Hermite {
    let eps2 = params.eps2();
    Hermite::new(ens, params, engine, Box::new(DirectGravity { eps2 })).expect("valid setup")
}

/// Derivatives of every particle from its predicted state
pub fn all_derivatives(forces: &mut dyn JerkEvaluator, ens: &Ensemble) -> Vec<Derivatives> {
    let targets: Vec<usize> = (0..ens.len()).collect();
    let mut out = vec![Derivatives::default(); ens.len()];
    forces.evaluate(ens, &targets, &mut out);
    out
}

pub fn tol() -> KeplerTolerances {
    KeplerTolerances::default()
}

fn max_abs(a: NVec3, b: NVec3) -> f64 {
    (a - b).amax()
}

// ==================================================================================
// Force evaluator tests
// ==================================================================================

#[test]
fn gravity_newton_third_law() {
    let mut ens = two_body_at_rest(1.0, 2.0, 3.0);
    ens.particles[0].pv = NVec3::new(0.1, -0.3, 0.2);
    ens.particles[1].pv = NVec3::new(-0.2, 0.4, 0.0);

    let d = all_derivatives(&mut DirectGravity { eps2: 0.0 }, &ens);
    let (m1, m2) = (ens.particles[0].m, ens.particles[1].m);

    let net_a0 = d[0].a0 * m1 + d[1].a0 * m2;
    let net_a1 = d[0].a1 * m1 + d[1].a1 * m2;

    assert!(net_a0.norm() < 1e-12, "Net force not zero: {:?}", net_a0);
    assert!(net_a1.norm() < 1e-12, "Net jerk not zero: {:?}", net_a1);
}

#[test]
fn gravity_points_toward_other_body() {
    let ens = two_body_at_rest(2.0, 1.0, 1.0);
    let d = all_derivatives(&mut DirectGravity { eps2: 0.0 }, &ens);

    let dx = ens.particles[1].r - ens.particles[0].r;
    assert!(d[0].a0.dot(&dx) > 0.0, "Acceleration is not toward second body");
    assert_relative_eq!(d[0].a0.normalize(), dx.normalize(), epsilon = 1e-14);
}

#[test]
fn gravity_inverse_square_law() {
    let ens_r = two_body_at_rest(1.0, 1.0, 1.0);
    let ens_2r = two_body_at_rest(2.0, 1.0, 1.0);

    let d_r = all_derivatives(&mut DirectGravity { eps2: 0.0 }, &ens_r);
    let d_2r = all_derivatives(&mut DirectGravity { eps2: 0.0 }, &ens_2r);

    let ratio = d_r[0].a0.norm() / d_2r[0].a0.norm();
    assert_relative_eq!(ratio, 4.0, epsilon = 1e-12);
}

#[test]
fn gravity_softening_prevents_blowup() {
    let ens = two_body_at_rest(1e-9, 1.0, 1.0);
    let d = all_derivatives(&mut DirectGravity { eps2: 0.1 }, &ens);

    assert!(d[0].a0.norm() < 1e9, "Softening failed; acceleration too large");
    assert!(d[0].is_finite());
}

#[test]
fn jerk_is_time_derivative_of_acceleration() {
    let r = NVec3::new(1.0, 0.3, -0.2);
    let v = NVec3::new(-0.1, 0.7, 0.25);
    let h = 1e-5;

    let plus = pair_derivatives(r + v * h, v, 1.5, 0.0);
    let minus = pair_derivatives(r - v * h, v, 1.5, 0.0);
    let centre = pair_derivatives(r, v, 1.5, 0.0);

    let fd = (plus.a0 - minus.a0) / (2.0 * h);
    assert_relative_eq!(fd, centre.a1, max_relative = 1e-7);
}

#[test]
fn parallel_matches_serial() {
    let ens = cloud(64);
    let targets = [0, 7, 13, 42, 63];

    let mut serial = vec![Derivatives::default(); targets.len()];
    let mut parallel = vec![Derivatives::default(); targets.len()];

    DirectGravity { eps2: 1e-4 }.evaluate(&ens, &targets, &mut serial);
    ParallelGravity::new(&ens, 1e-4).evaluate(&ens, &targets, &mut parallel);

    for (s, p) in serial.iter().zip(&parallel) {
        assert_relative_eq!(s.a0, p.a0, max_relative = 1e-12);
        assert_relative_eq!(s.a1, p.a1, max_relative = 1e-12);
    }
}

#[test]
fn parallel_buffers_must_match_ensemble() {
    let small = reference_binary();
    let forces = Box::new(ParallelGravity::new(&small, 0.0));

    let err = Hermite::new(hierarchical_triple(), Parameters::default(), &Engine::default(), forces).err();
    assert_eq!(
        err,
        Some(ConfigError::BufferSize {
            buffers: 2,
            ensemble: 3
        })
    );
}

// ==================================================================================
// Kepler solver tests
// ==================================================================================

fn assert_round_trip(r: NVec3, v: NVec3, m0: f64, dt: f64, eps: f64) {
    let (r1, v1) = kepler::propagate(r, v, m0, dt, &tol()).expect("propagate forward");
    let (r2, v2) = kepler::propagate(r1, v1, m0, -dt, &tol()).expect("propagate back");

    assert!(max_abs(r2, r) < eps, "position round trip off by {}", max_abs(r2, r));
    assert!(max_abs(v2, v) < eps, "velocity round trip off by {}", max_abs(v2, v));
}

#[test]
fn kepler_elliptic_round_trip() {
    let r = NVec3::new(1.5, 0.0, 0.0);
    let v = NVec3::new(0.0, 1.0, 0.0);
    assert_round_trip(r, v, 1.0, 0.7, 1e-12);
    assert_round_trip(r, v, 1.0, 20.0, 1e-12);

    let r = NVec3::new(0.3, 1.1, 0.2);
    let v = NVec3::new(-0.4, 0.5, 0.3);
    assert_round_trip(r, v, 2.0, 3.3, 1e-12);
}

#[test]
fn kepler_pericenter_series_round_trip() {
    // e = 0.995, starting at pericentre: |E| stays below 1e-3
    let r = NVec3::new(1.0, 0.0, 0.0);
    let v = NVec3::new(0.0, 1.995f64.sqrt(), 0.0);
    assert_round_trip(r, v, 1.0, 1e-4, 1e-9);
    assert_round_trip(r, v, 1.0, 0.05, 1e-9);
}

#[test]
fn kepler_hyperbolic_round_trip() {
    // e = 3
    assert_round_trip(NVec3::new(1.0, 0.0, 0.0), NVec3::new(0.0, 2.0, 0.0), 1.0, 0.5, 1e-12);
    // e = 1.05, series regime
    assert_round_trip(
        NVec3::new(1.0, 0.0, 0.0),
        NVec3::new(0.0, 2.05f64.sqrt(), 0.0),
        1.0,
        0.3,
        1e-12,
    );
    assert_round_trip(
        NVec3::new(1.0, 0.2, 0.0),
        NVec3::new(0.3, 2.05f64.sqrt(), 0.1),
        1.0,
        2.0,
        1e-12,
    );
}

#[test]
fn kepler_returns_after_one_period() {
    let r = NVec3::new(1.5, 0.0, 0.0);
    let v = NVec3::new(0.0, 1.0, 0.0);

    let orbit = KeplerOrbit::from_state(r, v, 1.0).expect("bound orbit");
    assert_relative_eq!(orbit.a, 3.0, max_relative = 1e-12);
    assert_relative_eq!(orbit.ecc, 0.5, max_relative = 1e-12);
    assert!(orbit.is_elliptic());

    let (r1, v1) = kepler::propagate(r, v, 1.0, orbit.period(), &tol()).expect("propagate");
    assert!(max_abs(r1, r) < 1e-9);
    assert!(max_abs(v1, v) < 1e-9);

    // conserved along the way
    let (r_half, v_half) = kepler::propagate(r, v, 1.0, 0.5 * orbit.period(), &tol()).expect("propagate");
    let energy = |r: NVec3, v: NVec3| 0.5 * v.norm_squared() - 1.0 / r.norm();
    assert_relative_eq!(energy(r_half, v_half), energy(r, v), max_relative = 1e-12);
    assert_relative_eq!(r_half.cross(&v_half), r.cross(&v), max_relative = 1e-12);
    assert_relative_eq!(r_half.norm(), 4.5, max_relative = 1e-12); // apocentre a(1 + e)
}

#[test]
fn kepler_propagate_about_offsets_by_centre() {
    let centre_r = NVec3::new(10.0, -2.0, 1.0);
    let centre_v = NVec3::new(0.1, 0.0, -0.3);
    let r = NVec3::new(1.5, 0.0, 0.0);
    let v = NVec3::new(0.0, 1.0, 0.0);

    let (rel_r, rel_v) = kepler::propagate(r, v, 1.0, 0.7, &tol()).expect("propagate");
    let (abs_r, abs_v) =
        kepler::propagate_about(centre_r, centre_v, r, v, 1.0, 0.7, &tol()).expect("propagate");

    assert_relative_eq!(abs_r, centre_r + rel_r);
    assert_relative_eq!(abs_v, centre_v + rel_v);
}

#[test]
fn kepler_solvers_satisfy_keplers_equation() {
    for (ecc, m) in [(0.0, 1.0), (0.3, 5.5), (0.6, 0.01), (0.9, 1.0), (0.999, 3.0)] {
        let sol = kepler::solve_elliptic(m, ecc, &tol());
        assert!(sol.converged);
        let res = sol.anomaly - ecc * sol.anomaly.sin() - m;
        assert!(res.abs() < 1e-14, "e = {ecc}, M = {m}: residual {res}");
    }

    for (ecc, m) in [(0.5, 2.0), (0.95, 0.3), (0.95, -0.3)] {
        let sol = kepler::solve_general(ecc, m, &tol());
        let res = sol.anomaly - ecc * sol.anomaly.sin() - m;
        assert!(res.abs() < 1e-13, "e = {ecc}, M = {m}: residual {res}");
    }

    for (ecc, m) in [(1.5, 3.0), (1.05, 0.1), (3.0, -10.0), (1.02, 0.002)] {
        let sol = kepler::solve_general(ecc, m, &tol());
        assert!(sol.converged);
        let res = ecc * sol.anomaly.sinh() - sol.anomaly - m;
        assert!(res.abs() < 1e-13 * m.abs().max(1.0), "e = {ecc}, M = {m}: residual {res}");
    }

    // low eccentricity closed form
    let sol = kepler::solve_general(0.1, 1.0, &tol());
    assert!((sol.anomaly - 0.1 * sol.anomaly.sin() - 1.0).abs() < 1e-8);

    assert_eq!(kepler::solve_general(0.7, 0.0, &tol()).anomaly, 0.0);
}

#[test]
fn kepler_iteration_cap_returns_estimate() {
    let capped = KeplerTolerances {
        kepler_ite: 1,
        ..tol()
    };
    let sol = kepler::solve_elliptic(1.0, 0.9, &capped);

    assert!(!sol.converged);
    assert_eq!(sol.iterations, 1);
    assert!(sol.anomaly.is_finite());
    assert!(sol.residual.abs() > capped.del_e);

    let full = kepler::solve_elliptic(1.0, 0.9, &tol());
    assert!(full.converged);
    assert!(full.iterations > 1);
}

#[test]
fn kepler_degenerate_orbits() {
    let x = NVec3::new(1.0, 0.0, 0.0);
    let cases = [
        (x, NVec3::new(0.0, 1.0, 0.0), 1.0, Degeneracy::Circular),
        (x, NVec3::new(0.0, 2f64.sqrt(), 0.0), 1.0, Degeneracy::Parabolic),
        (x, NVec3::new(0.5, 0.0, 0.0), 1.0, Degeneracy::ZeroAngularMomentum),
        (NVec3::zeros(), NVec3::new(0.0, 1.0, 0.0), 1.0, Degeneracy::ZeroSeparation),
        (x, NVec3::new(0.0, 1.0, 0.0), 0.0, Degeneracy::NonPositiveMass),
        (NVec3::new(f64::NAN, 0.0, 0.0), NVec3::new(0.0, 1.0, 0.0), 1.0, Degeneracy::NonFinite),
    ];

    for (r, v, m0, expected) in cases {
        let err = kepler::propagate(r, v, m0, 0.1, &tol()).err();
        assert_eq!(err, Some(KeplerError::DegenerateOrbit(expected)), "r = {r:?}, v = {v:?}");
    }
}

// ==================================================================================
// Time step tests
// ==================================================================================

#[test]
fn step_size_rules() {
    let b = StepBounds {
        min: 1.0 / 1024.0,
        max: 0.5,
    };

    // halve
    assert_eq!(next_step_size(0.5, 0.125, 0.1, &b), 0.0625);
    // floor
    assert_eq!(next_step_size(0.5, b.min, 1e-9, &b), b.min);
    // double on a 2dt boundary
    assert_eq!(next_step_size(0.5, 0.125, 0.3, &b), 0.25);
    // no doubling off the boundary
    assert_eq!(next_step_size(0.375, 0.125, 0.3, &b), 0.125);
    // cap
    assert_eq!(next_step_size(1.0, b.max, 10.0, &b), b.max);
    // hold between dt and 2dt
    assert_eq!(next_step_size(0.5, 0.125, 0.2, &b), 0.125);
}

#[test]
fn eta_falls_back_without_jerk() {
    // at rest: no relative velocity, no jerk
    let h = direct_hermite(two_body_at_rest(1.0, 1.0, 1.0), Parameters::default(), &Engine::default());
    assert_eq!(h.eta(), D_TIME_MIN);

    let h = direct_hermite(reference_binary(), Parameters::default(), &Engine::default());
    let ens = h.ensemble();
    let ratio = ens.particles[0].a0.norm() / ens.particles[0].a1.norm();
    assert_relative_eq!(h.eta(), D_TIME_MIN / (2.0 * ratio), max_relative = 1e-12);
    assert_relative_eq!(derive_eta(ens, D_TIME_MIN), h.eta());
}

#[test]
fn configured_eta_is_used() {
    let params = Parameters {
        eta: Some(1e-3),
        ..Parameters::default()
    };
    let h = direct_hermite(reference_binary(), params, &Engine::default());
    assert_eq!(h.eta(), 1e-3);
}

#[test]
fn initial_steps_start_at_minimum() {
    let h = direct_hermite(hierarchical_triple(), Parameters::default(), &Engine::default());

    for p in &h.ensemble().particles {
        assert_eq!(p.t, 0.0);
        assert_eq!(p.dt, D_TIME_MIN);
    }
    assert_eq!(h.clock(), D_TIME_MIN);
    assert_eq!(h.due(), vec![0, 1, 2]);
}

#[test]
fn block_steps_stay_synchronised() {
    let min = 3.0517578125e-05; // 2^-15
    let max = D_TIME_MAX;
    let mut h = direct_hermite(hierarchical_triple(), params_with_bounds(min, max), &Engine::default());
    let e0 = total_energy(h.ensemble(), 0.0);

    let mut partial_blocks = 0;
    while h.clock() <= 4.0 {
        let report = h.step().expect("finite forces");
        if report.due < 3 {
            partial_blocks += 1;
        }

        for p in &h.ensemble().particles {
            assert!(p.dt >= min && p.dt <= max, "dt {} out of bounds", p.dt);
            assert_eq!((max / p.dt).log2().fract(), 0.0, "dt {} not max/2^k", p.dt);
            assert_eq!(p.t % p.dt, 0.0, "t = {} not a multiple of dt = {}", p.t, p.dt);
            assert!(p.t <= h.clock());
        }
        assert_eq!(h.clock(), next_block_time(h.ensemble()));
        assert!(h.clock() > report.time);
    }

    assert_eq!(h.time(), 4.0);
    assert!(partial_blocks > 0, "every block committed all particles");

    let d_energy = (total_energy(h.ensemble(), 0.0) - e0) / e0;
    assert!(d_energy.abs() < 1e-5, "energy drift {d_energy}");
}

// ==================================================================================
// Integrator tests
// ==================================================================================

#[test]
fn binary_conserves_energy_and_elements() {
    let mut h = direct_hermite(reference_binary(), Parameters::default(), &Engine::default());
    let monitor = BinaryMonitor::new(h.ensemble(), (0, 1), 0.0);

    let mut records: Vec<DiagnosticRecord> = Vec::new();
    h.run_until(10.0, 1.0, Some(&monitor), &mut records).expect("finite forces");

    let times: Vec<f64> = records.iter().map(|r| r.time).collect();
    assert_eq!(times, (1..=10).map(f64::from).collect::<Vec<_>>());

    for rec in &records {
        assert!(rec.d_energy.abs() < 1e-6, "t = {}: dE/E0 = {:e}", rec.time, rec.d_energy);
        assert!(rec.d_semimajor.abs() < 1e-4, "t = {}: da/a0 = {:e}", rec.time, rec.d_semimajor);
        assert!(rec.d_eccentricity.abs() < 1e-4, "t = {}: de/e0 = {:e}", rec.time, rec.d_eccentricity);
        assert!(rec.separation > 0.97 && rec.separation < 1.01);
    }

    let stats = h.stats();
    assert_eq!(stats.evaluations, 1 + 3 * stats.steps);
    assert_eq!(stats.commits, 2 * stats.steps);
    assert_eq!(stats.pairs_formed, 0);

    // momentum stays at zero
    assert!(total_momentum(h.ensemble()).norm() < 1e-12);
}

#[test]
fn extra_corrector_pass_does_not_grow_the_correction() {
    let params = Parameters {
        bounds: StepBounds {
            min: 0.0625,
            max: D_TIME_MAX,
        },
        eta: Some(1e-3),
        ..Parameters::default()
    };
    let mut h = direct_hermite(reference_binary(), params, &Engine::default());

    let time = h.clock();
    let due = h.due();
    h.predict(time);
    h.save_old(&due);

    let positions = |h: &Hermite| -> Vec<NVec3> { due.iter().map(|&i| h.ensemble().particles[i].pr).collect() };
    let mut last = positions(&h);
    let mut deltas = Vec::new();
    for _ in 0..4 {
        h.evaluate(&due, time).expect("finite forces");
        h.correct(&due);
        let now = positions(&h);
        let delta = now
            .iter()
            .zip(&last)
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max);
        deltas.push(delta);
        last = now;
    }

    assert!(deltas[1] < deltas[0]);
    assert!(deltas[2] < deltas[1]);
    assert!(
        deltas[3] <= deltas[2].max(1e-14),
        "4th pass moved {:e}, 3rd moved {:e}",
        deltas[3],
        deltas[2]
    );
}

/// Direct gravity that reports a NaN acceleration on one chosen call
struct Poisoned {
    inner: DirectGravity,
    calls: usize,
    poison_at: usize,
}

impl JerkEvaluator for Poisoned {
    fn evaluate(&mut self, ens: &Ensemble, targets: &[usize], out: &mut [Derivatives]) {
        self.inner.evaluate(ens, targets, out);
        self.calls += 1;
        if self.calls == self.poison_at {
            out[0].a0.x = f64::NAN;
        }
    }
}

#[test]
fn failed_step_commits_nothing() {
    let forces = Box::new(Poisoned {
        inner: DirectGravity { eps2: 0.0 },
        calls: 0,
        poison_at: 3, // 2nd corrector pass of the first step
    });
    let mut h = Hermite::new(reference_binary(), Parameters::default(), &Engine::default(), forces)
        .expect("valid setup");

    let before = h.ensemble().clone();
    let clock = h.clock();

    let err = h.step().err();
    assert_eq!(
        err,
        Some(IntegrationError::NonFiniteForce {
            index: 0,
            time: clock
        })
    );

    for (p, q) in h.ensemble().particles.iter().zip(&before.particles) {
        assert_eq!(p.r, q.r);
        assert_eq!(p.v, q.v);
        assert_eq!(p.a0, q.a0);
        assert_eq!(p.a1, q.a1);
        assert_eq!(p.t, q.t);
        assert_eq!(p.dt, q.dt);
    }
    assert_eq!(h.clock(), clock);
    assert_eq!(h.stats().steps, 0);

    // the next attempt is clean
    let report = h.step().expect("finite forces");
    assert_eq!(report.time, clock);
    assert_eq!(report.due, 2);
}

#[test]
fn eccentric_binary_uses_kepler_pairs() {
    let engine = Engine {
        encounters: true,
        ..Engine::default()
    };
    let params = params_with_bounds(9.765625e-4, D_TIME_MAX); // 2^-10
    let mut h = direct_hermite(eccentric_binary(), params, &engine);
    let monitor = BinaryMonitor::new(h.ensemble(), (0, 1), 0.0);
    assert_relative_eq!(monitor.elements0.eccentricity, 0.99, max_relative = 1e-12);

    let mut records: Vec<DiagnosticRecord> = Vec::new();
    h.run_until(10.0, 1.0, Some(&monitor), &mut records).expect("finite forces");

    let stats = h.stats();
    assert!(stats.pairs_formed > 0, "no pair formed at pericentre");
    assert!(stats.pairs_released > 0, "pair never released");
    assert!(stats.kepler_steps > 0);

    assert_eq!(records.len(), 10);
    for rec in &records {
        assert!(rec.d_energy.is_finite());
        assert!(rec.d_energy.abs() < 1e-8, "t = {}: dE/E0 = {:e}", rec.time, rec.d_energy);
        assert!(rec.d_semimajor.abs() < 1e-8, "t = {}: da/a0 = {:e}", rec.time, rec.d_semimajor);
    }
}

// ==================================================================================
// Encounter helpers
// ==================================================================================

#[test]
fn encounter_neighbours_and_binding() {
    let h = direct_hermite(hierarchical_triple(), Parameters::default(), &Engine::default());
    let ens = h.ensemble();

    assert_eq!(nearest_neighbour(ens, 0, |_| true), Some(1));
    assert_eq!(nearest_neighbour(ens, 2, |_| true), Some(0));
    assert_eq!(nearest_neighbour(ens, 2, |j| j != 0), Some(1));
    assert_eq!(nearest_neighbour(ens, 0, |_| false), None);

    assert!(is_bound(ens, 0, 1));
    assert!(!is_bound(&two_body_fast(), 0, 1));

    // the companion tides the inner pair a little
    let ratio = perturbation(ens, 0, 1, 0.0);
    assert!(ratio > 0.0 && ratio < 1e-3, "perturbation {ratio}");

    let isolated = direct_hermite(reference_binary(), Parameters::default(), &Engine::default());
    assert!(perturbation(isolated.ensemble(), 0, 1, 0.0) < 1e-12);
}

fn two_body_fast() -> Ensemble {
    ensemble(&[
        (0.5, [0.5, 0.0, 0.0], [0.0, 2.0, 0.0]),
        (0.5, [-0.5, 0.0, 0.0], [0.0, -2.0, 0.0]),
    ])
}

// ==================================================================================
// Diagnostics tests
// ==================================================================================

#[test]
fn reference_binary_diagnostics() {
    let ens = reference_binary();

    assert_relative_eq!(total_energy(&ens, 0.0), -2.02, max_relative = 1e-12);
    assert!(total_momentum(&ens).norm() < 1e-15);
    assert_relative_eq!(
        total_angular_momentum(&ens),
        NVec3::new(0.0, 0.0, -2.0 * BINARY_V),
        max_relative = 1e-12
    );

    let el = OrbitalElements::of_pair(&ens, 0, 1);
    assert_relative_eq!(el.semimajor, 1.0 / 1.01, max_relative = 1e-10);
    assert_relative_eq!(el.eccentricity, 0.01, max_relative = 1e-6);
    assert_relative_eq!(el.separation, 1.0);

    let monitor = BinaryMonitor::new(&ens, (0, 1), 0.0);
    let rec = monitor.record(&ens, 0.0);
    assert_eq!(rec.d_energy, 0.0);
    assert_eq!(rec.d_semimajor, 0.0);
    assert_eq!(rec.d_eccentricity, 0.0);
}

#[test]
fn softened_energy_is_higher() {
    let ens = reference_binary();
    assert!(total_energy(&ens, 0.01) > total_energy(&ens, 0.0));
}

// ==================================================================================
// Configuration tests
// ==================================================================================

const BINARY_YAML: &str = include_str!("../scenarios/binary.yaml");

fn parse(yaml: &str) -> ScenarioConfig {
    serde_yaml::from_str(yaml).expect("valid yaml")
}

fn build_err(yaml: &str) -> Option<ConfigError> {
    Scenario::build_scenario(parse(yaml)).err()
}

#[test]
fn config_loads_reference_binary() {
    let cfg = parse(BINARY_YAML);
    assert_eq!(cfg.engine.backend, BackendConfig::Direct);
    assert_eq!(cfg.engine.corrector_passes, 3);
    assert_eq!(cfg.bodies.len(), 2);

    let scenario = Scenario::build_scenario(cfg).expect("valid scenario");
    assert_eq!(scenario.integrator.ensemble().len(), 2);
    assert_eq!(scenario.parameters.t_end, 1000.0);
    assert_eq!(scenario.parameters.bounds.min, D_TIME_MIN);
    assert!(scenario.monitor.is_some());
}

#[test]
fn config_defaults() {
    let cfg = parse(
        r#"
parameters:
  t_end: 2.0
bodies:
  - { x: [0.0, 0.0, 0.0], v: [0.0, 0.0, 0.0], m: 1.0 }
"#,
    );
    assert_eq!(cfg.engine.backend, BackendConfig::Direct);
    assert_eq!(cfg.engine.corrector_passes, 3);
    assert!(!cfg.engine.encounters);

    let p = &cfg.parameters;
    assert_eq!(p.output_interval, 1.0);
    assert_eq!(p.d_time_min, D_TIME_MIN);
    assert_eq!(p.d_time_max, D_TIME_MAX);
    assert_eq!(p.softening, 0.0);
    assert_eq!(p.eta, None);
    assert_eq!(p.del_e, 9.0e-16);
    assert_eq!(p.del_e_hyp, 2.0e-15);
    assert_eq!(p.kepler_ite, 50);

    // a single body has no pair to monitor
    let scenario = Scenario::build_scenario(cfg).expect("valid scenario");
    assert!(scenario.monitor.is_none());
}

#[test]
fn config_parallel_backend_runs() {
    let yaml = BINARY_YAML
        .replace("backend: \"direct\"", "backend: \"parallel\"")
        .replace("t_end: 1000.0", "t_end: 1.0");
    let mut scenario = Scenario::build_scenario(parse(&yaml)).expect("valid scenario");
    assert_eq!(scenario.engine.backend, BackendConfig::Parallel);

    let mut records: Vec<DiagnosticRecord> = Vec::new();
    scenario
        .integrator
        .run_until(1.0, 1.0, scenario.monitor.as_ref(), &mut records)
        .expect("finite forces");
    assert_eq!(records.len(), 1);
    assert!(records[0].d_energy.abs() < 1e-6);
}

#[test]
fn config_validation_errors() {
    let body = "bodies:\n  - { x: [1.0, 0.0, 0.0], v: [0.0, 0.0, 0.0], m: 1.0 }\n";
    let with = |engine: &str, params: &str, bodies: &str| {
        format!("engine:\n{engine}\nparameters:\n  t_end: 1.0\n{params}\n{bodies}")
    };
    let none = "  backend: \"direct\"";

    assert_eq!(
        build_err(&with(none, "", "bodies:\n  - { x: [1.0, 0.0], v: [0.0, 0.0, 0.0], m: 1.0 }\n")),
        Some(ConfigError::VectorArity {
            index: 0,
            field: "x",
            len: 2
        })
    );
    assert_eq!(
        build_err(&with(none, "", "bodies:\n  - { x: [1.0, 0.0, 0.0], v: [0.0, 0.0, 0.0], m: -1.0 }\n")),
        Some(ConfigError::NonPositiveMass { index: 0, mass: -1.0 })
    );
    assert_eq!(build_err(&with(none, "", "bodies: []\n")), Some(ConfigError::EmptyEnsemble));
    assert_eq!(
        build_err(&with(none, "  d_time_min: 0.25\n  d_time_max: 0.125", body)),
        Some(ConfigError::InvertedTimeBounds { min: 0.25, max: 0.125 })
    );
    assert_eq!(
        build_err(&with(none, "  d_time_min: 0.001\n  d_time_max: 0.125", body)),
        Some(ConfigError::TimeBoundsNotPowerOfTwo { min: 0.001, max: 0.125 })
    );
    assert_eq!(
        build_err(&with(none, "  kepler_ite: 0", body)),
        Some(ConfigError::ZeroIterationCap)
    );
    assert_eq!(
        build_err(&with("  corrector_passes: 0", "", body)),
        Some(ConfigError::ZeroCorrectorPasses)
    );
    assert_eq!(
        build_err(&with(none, "  output_interval: 0.3", body)),
        Some(ConfigError::OutputInterval { interval: 0.3, max: 0.125 })
    );
    assert_eq!(
        build_err(&with(none, "  softening: -0.1", body)),
        Some(ConfigError::NonPositiveParameter {
            name: "softening",
            value: -0.1
        })
    );
    assert_eq!(
        build_err(&with(none, "  eta: 0.0", body)),
        Some(ConfigError::NonPositiveParameter { name: "eta", value: 0.0 })
    );
}
