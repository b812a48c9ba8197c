pub mod states;
pub mod error;
pub mod params;
pub mod engine;
pub mod forces;
pub mod backend;
pub mod kepler;
pub mod timestep;
pub mod integrator;
pub mod encounter;
pub mod diagnostics;
pub mod scenario;
