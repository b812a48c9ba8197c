use std::time::Instant;

use crate::simulation::engine::Engine;
use crate::simulation::error::ConfigError;
use crate::simulation::forces::{Derivatives, DirectGravity, JerkEvaluator, ParallelGravity};
use crate::simulation::integrator::Hermite;
use crate::simulation::params::{Parameters, StepBounds};
use crate::simulation::states::{Ensemble, NVec3};

/// Helper to build a deterministic ensemble of size `n`, no rand needed
fn make_ensemble(n: usize) -> Result<Ensemble, ConfigError> {
    let bodies = (0..n).map(|i| {
        let i_f = i as f64;
        let x = NVec3::new(
            (i_f * 0.37).sin() * 5.0,
            (i_f * 0.13).cos() * 5.0,
            (i_f * 0.07).sin() * 5.0,
        );
        let v = NVec3::new(
            (i_f * 0.11).cos() * 0.1,
            (i_f * 0.29).sin() * 0.1,
            0.0,
        );
        (1.0 / n as f64, x, v)
    });

    let mut ens = Ensemble::from_bodies(bodies)?;
    for p in ens.particles.iter_mut() {
        p.pr = p.r;
        p.pv = p.v;
    }
    Ok(ens)
}

/// Parameters shared by the benchmarks
fn make_params() -> Parameters {
    Parameters {
        t_end: 1.0,
        bounds: StepBounds {
            min: 1.0 / 1024.0,
            max: 1.0 / 64.0,
        },
        softening: 1.0e-2,
        eta: Some(0.01),
        ..Parameters::default()
    }
}

/// Full-ensemble force evaluation, direct vs parallel
pub fn bench_forces() -> Result<(), ConfigError> {
    // Different system sizes to test
    let ns = [200, 400, 800, 1600, 3200, 6400];
    let eps2 = make_params().eps2();

    for n in ns {
        let ens = make_ensemble(n)?;
        let targets: Vec<usize> = (0..n).collect();
        let mut out = vec![Derivatives::default(); n];

        let mut direct = DirectGravity { eps2 };
        let mut parallel = ParallelGravity::new(&ens, eps2);

        // Warm up
        direct.evaluate(&ens, &targets, &mut out);
        parallel.evaluate(&ens, &targets, &mut out);

        // Time direct
        let t0 = Instant::now();
        direct.evaluate(&ens, &targets, &mut out);
        let dt_direct = t0.elapsed().as_secs_f64();

        // Time parallel
        let t1 = Instant::now();
        parallel.evaluate(&ens, &targets, &mut out);
        let dt_parallel = t1.elapsed().as_secs_f64();

        println!("N = {n:5}, direct = {:8.6} s, parallel = {:8.6} s", dt_direct, dt_parallel);
    }
    Ok(())
}

/// Wall time per Hermite block step for both backends
pub fn bench_hermite() -> Result<(), ConfigError> {
    let ns = [100, 200, 400, 800, 1600];
    let steps = 8; // block steps per model

    println!("N,direct_ms,parallel_ms");

    for n in ns {
        let params = make_params();
        let eps2 = params.eps2();

        let mut ms = [0.0; 2];
        for (k, parallel) in [false, true].into_iter().enumerate() {
            let ens = make_ensemble(n)?;
            let forces: Box<dyn JerkEvaluator + Send + Sync> = if parallel {
                Box::new(ParallelGravity::new(&ens, eps2))
            } else {
                Box::new(DirectGravity { eps2 })
            };

            let mut hermite = Hermite::new(ens, params.clone(), &Engine::default(), forces)?;

            let t0 = Instant::now();
            for _ in 0..steps {
                if let Err(e) = hermite.step() {
                    println!("N = {n}: step failed: {e}");
                    break;
                }
            }
            ms[k] = t0.elapsed().as_secs_f64() * 1000.0 / steps as f64;
        }

        println!("{},{:.6},{:.6}", n, ms[0], ms[1]);
    }
    Ok(())
}
