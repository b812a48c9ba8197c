//! Conserved quantities and binary orbital elements
//!
//! Everything here reads the canonical state (`r`, `v`, `m`) only and
//! never touches predicted or derivative fields

use crate::simulation::states::{Ensemble, NVec3};

pub fn kinetic_energy(ens: &Ensemble) -> f64 {
    ens.particles
        .iter()
        .map(|p| 0.5 * p.m * p.v.norm_squared())
        .sum()
}

/// Pairwise potential, softened with `eps2` the same way as the force kernel.
pub fn potential_energy(ens: &Ensemble, eps2: f64) -> f64 {
    let ps = &ens.particles;
    let mut pot = 0.0;
    for i in 0..ps.len() {
        for j in (i + 1)..ps.len() {
            let r = ps[j].r - ps[i].r;
            pot -= ps[i].m * ps[j].m / (r.norm_squared() + eps2).sqrt();
        }
    }
    pot
}

pub fn total_energy(ens: &Ensemble, eps2: f64) -> f64 {
    kinetic_energy(ens) + potential_energy(ens, eps2)
}

pub fn total_momentum(ens: &Ensemble) -> NVec3 {
    ens.particles
        .iter()
        .fold(NVec3::zeros(), |acc, p| acc + p.v * p.m)
}

pub fn total_angular_momentum(ens: &Ensemble) -> NVec3 {
    ens.particles
        .iter()
        .fold(NVec3::zeros(), |acc, p| acc + p.r.cross(&p.v) * p.m)
}

/// Elements of the two-body orbit formed by a pair of particles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitalElements {
    pub semimajor: f64,
    pub eccentricity: f64,
    pub separation: f64,
}

impl OrbitalElements {
    /// Elements of particles `i` and `j`, ignoring everything else.
    pub fn of_pair(ens: &Ensemble, i: usize, j: usize) -> Self {
        let (pi, pj) = (&ens.particles[i], &ens.particles[j]);
        let m_tot = pi.m + pj.m;
        let m1m2 = pi.m * pj.m;
        let mu = m1m2 / m_tot; // reduced mass

        let r = pj.r - pi.r;
        let v = pj.v - pi.v;
        let sep = r.norm();
        let j2 = r.cross(&v).norm_squared();

        let binde = 0.5 * mu * v.norm_squared() - m1m2 / sep;
        let semimajor = -0.5 * m1m2 / binde;

        let jmax2 = semimajor * m_tot;
        // round-off can push a near-circular orbit slightly past 1
        let eccentricity = (1.0 - j2 / jmax2).max(0.0).sqrt();

        Self {
            semimajor,
            eccentricity,
            separation: sep,
        }
    }
}

/// One diagnostic line: relative drifts against the start of the run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiagnosticRecord {
    pub time: f64,
    pub d_semimajor: f64,    // (a - a0) / a0
    pub d_eccentricity: f64, // (e - e0) / e0
    pub separation: f64,
    pub d_energy: f64, // (E - E0) / E0
}

/// Where checkpoints go. Formatting and cadence belong to the implementor.
pub trait OutputSink {
    fn record(&mut self, rec: &DiagnosticRecord);

    /// Full state dump at a checkpoint.
    fn snapshot(&mut self, _time: f64, _ens: &Ensemble) {}
}

/// Collects records in memory.
impl OutputSink for Vec<DiagnosticRecord> {
    fn record(&mut self, rec: &DiagnosticRecord) {
        self.push(*rec);
    }
}

/// Reference values captured at the start of a run for one pair.
#[derive(Debug, Clone)]
pub struct BinaryMonitor {
    pub pair: (usize, usize),
    pub eps2: f64,
    pub energy0: f64,
    pub elements0: OrbitalElements,
}

impl BinaryMonitor {
    pub fn new(ens: &Ensemble, pair: (usize, usize), eps2: f64) -> Self {
        Self {
            pair,
            eps2,
            energy0: total_energy(ens, eps2),
            elements0: OrbitalElements::of_pair(ens, pair.0, pair.1),
        }
    }

    pub fn record(&self, ens: &Ensemble, time: f64) -> DiagnosticRecord {
        let el = OrbitalElements::of_pair(ens, self.pair.0, self.pair.1);
        let e = total_energy(ens, self.eps2);
        DiagnosticRecord {
            time,
            d_semimajor: (el.semimajor - self.elements0.semimajor) / self.elements0.semimajor,
            d_eccentricity: (el.eccentricity - self.elements0.eccentricity)
                / self.elements0.eccentricity,
            separation: el.separation,
            d_energy: (e - self.energy0) / self.energy0,
        }
    }
}
