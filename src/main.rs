use hermite_nbody::{Scenario, ScenarioConfig};
use hermite_nbody::{bench_forces, bench_hermite};
use hermite_nbody::{DiagnosticRecord, Ensemble, OutputSink};

use clap::Parser;
use anyhow::Result;
use log::info;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, default_value = "binary.yaml")]
    file_name: String,

    /// Run the force and step benchmarks instead of a scenario
    #[arg(long)]
    bench: bool,
}

/// Prints one diagnostic line per checkpoint: `time da/a0 de/e0 r dE/E0`.
struct StdoutSink;

impl OutputSink for StdoutSink {
    fn record(&mut self, rec: &DiagnosticRecord) {
        println!(
            "{:.5e} {:.5e} {:.5e} {:.5e} {:.5e}",
            rec.time, rec.d_semimajor, rec.d_eccentricity, rec.separation, rec.d_energy
        );
    }

    fn snapshot(&mut self, time: f64, ens: &Ensemble) {
        info!("t = {time}: {} particles committed", ens.len());
    }
}

// load here to keep main clean
fn load_scenario_from_yaml(file_name: &str) -> Result<ScenarioConfig> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(file_name);
    let file = File::open(&config_path)?;
    let reader = BufReader::new(file);
    let scenario_cfg: ScenarioConfig = serde_yaml::from_reader(reader)?;

    Ok(scenario_cfg)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.bench {
        bench_forces()?;
        bench_hermite()?;
        return Ok(());
    }

    let scenario_cfg = load_scenario_from_yaml(&args.file_name)?;
    let mut scenario = Scenario::build_scenario(scenario_cfg)?;

    let t_end = scenario.parameters.t_end;
    let interval = scenario.parameters.output_interval;
    let mut sink = StdoutSink;
    scenario
        .integrator
        .run_until(t_end, interval, scenario.monitor.as_ref(), &mut sink)?;

    let stats = scenario.integrator.stats();
    info!(
        "done: {} block steps, {} evaluations, {} kepler pair steps",
        stats.steps, stats.evaluations, stats.kepler_steps
    );

    Ok(())
}
