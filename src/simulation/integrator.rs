//! Hermite 4th-order block time-step integrator
//!
//! One block step at system time `T`:
//! 1. predict every particle to `T` with a 3rd-order Taylor series
//! 2. save `a0`/`a1` of the due particles as `oa0`/`oa1`
//! 3. P(EC)^n: evaluate forces at the predicted state, recover `a2`/`a3`
//!    by Hermite interpolation and correct the predicted state
//! 4. commit the corrected state and pick new individual steps
//! 5. advance the clock to the next due time
//!
//! Tight bound pairs can be handed to the Kepler solver (see
//! [`crate::simulation::encounter`]).

use log::{debug, info, warn};

use super::diagnostics::{BinaryMonitor, OutputSink};
use super::encounter::{self, KeplerPair};
use super::engine::Engine;
use super::error::{ConfigError, IntegrationError};
use super::forces::{Derivatives, JerkEvaluator};
use super::params::Parameters;
use super::states::Ensemble;
use super::timestep::{derive_eta, due_particles, next_block_time, next_step_size, normal_timestep};

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub steps: u64,
    pub evaluations: u64,
    pub commits: u64,
    pub kepler_steps: u64,
    pub pairs_formed: u64,
    pub pairs_released: u64,
}

/// What one block step did.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub time: f64,
    pub due: usize,
    pub kepler_pairs: usize,
}

pub struct Hermite {
    ensemble: Ensemble,
    params: Parameters,
    forces: Box<dyn JerkEvaluator + Send + Sync>,
    passes: usize,
    encounters: bool,
    eta: f64,
    clock: f64, // next block time
    time: f64,  // last committed block time
    pairs: Vec<KeplerPair>,
    scratch: Vec<Derivatives>,
    stats: RunStats,
}

impl Hermite {
    /// Evaluate the initial forces and set up steps, `eta` and the clock.
    pub fn new(
        ensemble: Ensemble,
        params: Parameters,
        engine: &Engine,
        mut forces: Box<dyn JerkEvaluator + Send + Sync>,
    ) -> Result<Self, ConfigError> {
        params.validate()?;
        if engine.corrector_passes == 0 {
            return Err(ConfigError::ZeroCorrectorPasses);
        }
        if ensemble.is_empty() {
            return Err(ConfigError::EmptyEnsemble);
        }
        forces.prepare(&ensemble)?;

        let mut h = Self {
            ensemble,
            params,
            forces,
            passes: engine.corrector_passes,
            encounters: engine.encounters,
            eta: 0.0,
            clock: 0.0,
            time: 0.0,
            pairs: Vec::new(),
            scratch: Vec::new(),
            stats: RunStats::default(),
        };

        for p in h.ensemble.particles.iter_mut() {
            p.pr = p.r;
            p.pv = p.v;
            p.t = 0.0;
            p.dt = h.params.bounds.min;
        }

        let all: Vec<usize> = (0..h.ensemble.len()).collect();
        h.scratch.resize(all.len(), Derivatives::default());
        h.forces.evaluate(&h.ensemble, &all, &mut h.scratch);
        for (&i, d) in all.iter().zip(&h.scratch) {
            if !d.is_finite() {
                return Err(ConfigError::NonFiniteState { index: i });
            }
            let p = &mut h.ensemble.particles[i];
            p.a0 = d.a0;
            p.a1 = d.a1;
        }
        h.stats.evaluations += 1;

        h.eta = match h.params.eta {
            Some(eta) => eta,
            None => derive_eta(&h.ensemble, h.params.bounds.min),
        };
        h.clock = next_block_time(&h.ensemble);

        info!(
            "hermite: n = {}, eta = {:e}, dt in [{:e}, {:e}], {} corrector passes",
            h.ensemble.len(),
            h.eta,
            h.params.bounds.min,
            h.params.bounds.max,
            h.passes
        );
        Ok(h)
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    pub fn into_ensemble(self) -> Ensemble {
        self.ensemble
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn eta(&self) -> f64 {
        self.eta
    }

    /// System clock: the next block time.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Time of the last committed block.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn pairs(&self) -> &[KeplerPair] {
        &self.pairs
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Particles due at the current clock.
    pub fn due(&self) -> Vec<usize> {
        due_particles(&self.ensemble, self.clock)
    }

    /// Advance one block.
    ///
    /// On error nothing is committed: the step is as if it never happened.
    pub fn step(&mut self) -> Result<StepReport, IntegrationError> {
        let time = self.clock;
        let due = due_particles(&self.ensemble, time);

        self.predict(time);
        let kepler_pairs = self.predict_pairs(time, &due);
        self.save_old(&due);

        for _ in 0..self.passes {
            if let Err(e) = self.evaluate(&due, time) {
                self.rollback(&due);
                return Err(e);
            }
            self.correct(&due);
        }

        let normals = self.commit(&due, time);
        if self.encounters {
            self.update_pairs(&due, &normals, time);
        }

        self.time = time;
        self.clock = next_block_time(&self.ensemble);

        self.stats.steps += 1;
        self.stats.commits += due.len() as u64;
        self.stats.kepler_steps += kepler_pairs as u64;

        Ok(StepReport {
            time,
            due: due.len(),
            kepler_pairs,
        })
    }

    /// Step while the clock is at or before `t_end`.
    ///
    /// Every committed time that is a multiple of `interval` is a checkpoint:
    /// a record from `monitor` (if any) and a snapshot go to `sink`.
    pub fn run_until<S>(
        &mut self,
        t_end: f64,
        interval: f64,
        monitor: Option<&BinaryMonitor>,
        sink: &mut S,
    ) -> Result<(), IntegrationError>
    where
        S: OutputSink + ?Sized,
    {
        while self.clock <= t_end {
            let report = self.step()?;
            if report.time % interval == 0.0 {
                debug!("checkpoint t = {} after {} steps", report.time, self.stats.steps);
                if let Some(m) = monitor {
                    sink.record(&m.record(&self.ensemble, report.time));
                }
                sink.snapshot(report.time, &self.ensemble);
            }
        }
        Ok(())
    }

    /// Taylor-predict every particle to `time` and snapshot the anchor state.
    pub fn predict(&mut self, time: f64) {
        for p in self.ensemble.particles.iter_mut() {
            let dt = time - p.t;
            let dt2 = dt * dt;
            let dt3 = dt2 * dt;

            p.pr = p.a1 * (dt3 / 6.0) + p.a0 * (dt2 / 2.0) + p.v * dt + p.r;
            p.pv = p.a1 * (dt2 / 2.0) + p.a0 * dt + p.v;

            p.ipr = p.pr;
            p.ipv = p.pv;
        }
    }

    /// Keep the derivatives of the last commit for the Hermite interpolation.
    pub fn save_old(&mut self, due: &[usize]) {
        for &i in due {
            let p = &mut self.ensemble.particles[i];
            p.oa0 = p.a0;
            p.oa1 = p.a1;
        }
    }

    /// Recompute `a0`/`a1` of the due particles at the current predicted state.
    ///
    /// Nothing is written when any result is non-finite.
    pub fn evaluate(&mut self, due: &[usize], time: f64) -> Result<(), IntegrationError> {
        self.scratch.clear();
        self.scratch.resize(due.len(), Derivatives::default());
        self.forces.evaluate(&self.ensemble, due, &mut self.scratch);
        self.stats.evaluations += 1;

        if let Some(k) = self.scratch.iter().position(|d| !d.is_finite()) {
            return Err(IntegrationError::NonFiniteForce {
                index: due[k],
                time,
            });
        }

        for (&i, d) in due.iter().zip(&self.scratch) {
            let p = &mut self.ensemble.particles[i];
            p.a0 = d.a0;
            p.a1 = d.a1;
        }
        Ok(())
    }

    /// Recover `a2`/`a3` and correct the predicted state from the anchor.
    ///
    /// Members of a Kepler pair keep their analytic prediction.
    pub fn correct(&mut self, due: &[usize]) {
        for &i in due {
            let analytic = self.pairs.iter().any(|pair| pair.contains(i));
            let p = &mut self.ensemble.particles[i];

            let dt1 = p.dt;
            let dt2 = dt1 * dt1;
            let dt3 = dt2 * dt1;
            let dt4 = dt2 * dt2;
            let dt5 = dt4 * dt1;

            let da = p.oa0 - p.a0;
            p.a2 = (da * -6.0 - (p.oa1 * 4.0 + p.a1 * 2.0) * dt1) / dt2;
            p.a3 = (da * 12.0 + (p.oa1 + p.a1) * (6.0 * dt1)) / dt3;

            if analytic {
                continue;
            }

            p.pr = p.ipr + p.a2 * (dt4 / 24.0) + p.a3 * (dt5 / 120.0);
            p.pv = p.ipv + p.a2 * (dt3 / 6.0) + p.a3 * (dt4 / 24.0);
        }
    }

    fn rollback(&mut self, due: &[usize]) {
        for &i in due {
            let p = &mut self.ensemble.particles[i];
            p.a0 = p.oa0;
            p.a1 = p.oa1;
        }
    }

    /// Analytic prediction for pairs whose members are both due.
    ///
    /// A pair that cannot be propagated is dropped and its members keep the
    /// Taylor prediction.
    fn predict_pairs(&mut self, time: f64, due: &[usize]) -> usize {
        if self.pairs.is_empty() {
            return 0;
        }

        let tol = self.params.kepler;
        let mut kept = Vec::with_capacity(self.pairs.len());
        for pair in std::mem::take(&mut self.pairs) {
            if !(due.contains(&pair.primary) && due.contains(&pair.secondary)) {
                warn!("kepler pair {pair:?} fell out of step at t = {time}, releasing");
                self.stats.pairs_released += 1;
                continue;
            }
            match pair.predict(&mut self.ensemble, time, &tol) {
                Ok(()) => kept.push(pair),
                Err(e) => {
                    warn!("kepler pair {pair:?} at t = {time}: {e}, falling back to direct integration");
                    self.stats.pairs_released += 1;
                }
            }
        }
        self.pairs = kept;
        self.pairs.len()
    }

    /// Copy the corrected state into the canonical one and pick new steps.
    ///
    /// Returns the criterion step of each due particle, in `due` order.
    fn commit(&mut self, due: &[usize], time: f64) -> Vec<f64> {
        let bounds = self.params.bounds;
        let mut normals = Vec::with_capacity(due.len());

        for &i in due {
            let analytic = self.pairs.iter().any(|pair| pair.contains(i));
            let p = &mut self.ensemble.particles[i];

            p.t = time;
            p.r = p.pr;
            p.v = p.pv;

            let normal_dt = normal_timestep(p, self.eta);
            p.dt = if analytic {
                bounds.min
            } else {
                next_step_size(p.t, p.dt, normal_dt, &bounds)
            };
            normals.push(normal_dt);
        }
        normals
    }

    /// Release pairs that no longer need the analytic path and form new ones.
    fn update_pairs(&mut self, due: &[usize], normals: &[f64], time: f64) {
        let bounds = self.params.bounds;
        let eps2 = self.params.eps2();
        let max_perturbation = self.params.max_perturbation;
        let normal_of = |i: usize| {
            due.iter()
                .position(|&d| d == i)
                .map(|k| normals[k])
                .unwrap_or(f64::INFINITY)
        };

        let ens = &self.ensemble;
        let before = self.pairs.len();
        self.pairs.retain(|pair| {
            let (i, j) = (pair.primary, pair.secondary);
            let resolved = normal_of(i) >= 2.0 * bounds.min && normal_of(j) >= 2.0 * bounds.min;
            let release = resolved
                || !encounter::is_bound(ens, i, j)
                || encounter::perturbation(ens, i, j, eps2) > max_perturbation;
            if release {
                info!("kepler pair ({i}, {j}) released at t = {time}");
            }
            !release
        });
        self.stats.pairs_released += (before - self.pairs.len()) as u64;

        for (k, &i) in due.iter().enumerate() {
            if normals[k] >= bounds.min || self.pairs.iter().any(|pair| pair.contains(i)) {
                continue;
            }

            let pairs = &self.pairs;
            let Some(j) =
                encounter::nearest_neighbour(&self.ensemble, i, |j| !pairs.iter().any(|p| p.contains(j)))
            else {
                continue;
            };
            if self.ensemble.particles[j].t != time
                || !encounter::is_bound(&self.ensemble, i, j)
                || encounter::perturbation(&self.ensemble, i, j, eps2) > max_perturbation
            {
                continue;
            }

            self.ensemble.particles[i].dt = bounds.min;
            self.ensemble.particles[j].dt = bounds.min;
            self.pairs.push(KeplerPair {
                primary: i,
                secondary: j,
            });
            self.stats.pairs_formed += 1;
            info!("kepler pair ({i}, {j}) formed at t = {time}");
        }
    }
}
