//! Build fully-initialized integration scenarios from configuration
//!
//! Takes a `ScenarioConfig` (YAML-facing) and produces a runtime bundle
//! containing:
//! - engine settings (`Engine`)
//! - numerical parameters (`Parameters`)
//! - the Hermite integrator, which owns the particle ensemble
//! - the binary monitor used for diagnostic records

use crate::configuration::config::{BackendConfig, BodyConfig, ScenarioConfig};
use crate::simulation::diagnostics::BinaryMonitor;
use crate::simulation::engine::Engine;
use crate::simulation::error::ConfigError;
use crate::simulation::forces::{DirectGravity, JerkEvaluator, ParallelGravity};
use crate::simulation::integrator::Hermite;
use crate::simulation::params::{KeplerTolerances, Parameters, StepBounds};
use crate::simulation::states::{Ensemble, NVec3};

pub struct Scenario {
    pub engine: Engine,
    pub parameters: Parameters,
    pub integrator: Hermite,
    pub monitor: Option<BinaryMonitor>, // pair (0, 1), when there is one
}

impl Scenario {
    pub fn build_scenario(cfg: ScenarioConfig) -> Result<Self, ConfigError> {
        // Bodies: map `BodyConfig` -> (m, x, v) using nalgebra vectors
        let bodies = cfg
            .bodies
            .iter()
            .enumerate()
            .map(|(index, bc)| body_tuple(index, bc))
            .collect::<Result<Vec<_>, _>>()?;
        let ensemble = Ensemble::from_bodies(bodies)?;

        // Parameters (runtime) from ParametersConfig
        let p_cfg = cfg.parameters;
        let parameters = Parameters {
            t_end: p_cfg.t_end,
            output_interval: p_cfg.output_interval,
            bounds: StepBounds {
                min: p_cfg.d_time_min,
                max: p_cfg.d_time_max,
            },
            softening: p_cfg.softening,
            eta: p_cfg.eta,
            kepler: KeplerTolerances {
                del_e: p_cfg.del_e,
                del_e_hyp: p_cfg.del_e_hyp,
                kepler_ite: p_cfg.kepler_ite,
            },
            max_perturbation: p_cfg.max_perturbation,
        };
        parameters.validate()?;

        // Engine (runtime) from EngineConfig
        let e_cfg = cfg.engine;
        let engine = Engine {
            backend: e_cfg.backend,
            corrector_passes: e_cfg.corrector_passes,
            encounters: e_cfg.encounters,
        };

        let forces = build_forces(&engine, &ensemble, parameters.eps2());

        let monitor = (ensemble.len() >= 2).then(|| BinaryMonitor::new(&ensemble, (0, 1), parameters.eps2()));
        let integrator = Hermite::new(ensemble, parameters.clone(), &engine, forces)?;

        Ok(Self {
            engine,
            parameters,
            integrator,
            monitor,
        })
    }
}

/// Force backend selected by the engine settings.
pub fn build_forces(
    engine: &Engine,
    ensemble: &Ensemble,
    eps2: f64,
) -> Box<dyn JerkEvaluator + Send + Sync> {
    match engine.backend {
        BackendConfig::Direct => Box::new(DirectGravity { eps2 }),
        BackendConfig::Parallel => Box::new(ParallelGravity::new(ensemble, eps2)),
    }
}

fn body_tuple(index: usize, bc: &BodyConfig) -> Result<(f64, NVec3, NVec3), ConfigError> {
    Ok((bc.m, vec3(index, "x", &bc.x)?, vec3(index, "v", &bc.v)?))
}

fn vec3(index: usize, field: &'static str, xs: &[f64]) -> Result<NVec3, ConfigError> {
    match xs {
        [x, y, z] => Ok(NVec3::new(*x, *y, *z)),
        _ => Err(ConfigError::VectorArity {
            index,
            field,
            len: xs.len(),
        }),
    }
}
