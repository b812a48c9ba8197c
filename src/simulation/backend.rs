//! Mirrored per-particle buffers for the parallel force backend.
//!
//! The buffers stand in for device memory: they are allocated once for a
//! fixed particle count and released when the owner is dropped. The
//! synchronisation points are fixed:
//! - masses are copied in once, at allocation (they never change)
//! - predicted positions/velocities are copied in before every evaluation
//! - accelerations/jerks are copied out after every evaluation

use crate::simulation::error::ConfigError;
use crate::simulation::forces::Derivatives;
use crate::simulation::states::{Ensemble, NVec3};

#[derive(Debug)]
pub struct DeviceBuffers {
    pub mass: Vec<f64>,
    pub pos: Vec<NVec3>, // predicted positions
    pub vel: Vec<NVec3>, // predicted velocities
    pub acc: Vec<NVec3>,
    pub jerk: Vec<NVec3>,
}

impl DeviceBuffers {
    /// Allocate buffers sized for `ens` and upload the masses.
    pub fn allocate(ens: &Ensemble) -> Self {
        let n = ens.len();
        Self {
            mass: ens.particles.iter().map(|p| p.m).collect(),
            pos: vec![NVec3::zeros(); n],
            vel: vec![NVec3::zeros(); n],
            acc: vec![NVec3::zeros(); n],
            jerk: vec![NVec3::zeros(); n],
        }
    }

    pub fn len(&self) -> usize {
        self.mass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mass.is_empty()
    }

    pub fn check_len(&self, ens: &Ensemble) -> Result<(), ConfigError> {
        if self.len() != ens.len() {
            return Err(ConfigError::BufferSize {
                buffers: self.len(),
                ensemble: ens.len(),
            });
        }
        Ok(())
    }

    /// Copy-in before an evaluation.
    pub fn upload_predicted(&mut self, ens: &Ensemble) {
        for (k, p) in ens.particles.iter().enumerate() {
            self.pos[k] = p.pr;
            self.vel[k] = p.pv;
        }
    }

    /// Write freshly computed derivatives of `targets` into the output buffers.
    pub fn store(&mut self, targets: &[usize], results: &[Derivatives]) {
        for (&i, d) in targets.iter().zip(results) {
            self.acc[i] = d.a0;
            self.jerk[i] = d.a1;
        }
    }

    /// Copy-out after an evaluation.
    pub fn download(&self, targets: &[usize], out: &mut [Derivatives]) {
        for (slot, &i) in out.iter_mut().zip(targets) {
            slot.a0 = self.acc[i];
            slot.a1 = self.jerk[i];
        }
    }
}
