pub mod simulation;
pub mod configuration;
pub mod benchmark;

pub use simulation::states::{Particle, Ensemble, NVec3};
pub use simulation::error::{ConfigError, Degeneracy, KeplerError, IntegrationError};
pub use simulation::params::{Parameters, StepBounds, KeplerTolerances};
pub use simulation::engine::Engine;
pub use simulation::forces::{Derivatives, JerkEvaluator, DirectGravity, ParallelGravity};
pub use simulation::kepler::{KeplerOrbit, AnomalySolution};
pub use simulation::integrator::{Hermite, RunStats, StepReport};
pub use simulation::diagnostics::{BinaryMonitor, DiagnosticRecord, OrbitalElements, OutputSink};
pub use simulation::scenario::Scenario;

pub use configuration::config::{BackendConfig, EngineConfig, ParametersConfig, BodyConfig, ScenarioConfig};

pub use benchmark::benchmark::{bench_forces, bench_hermite};
