//! High-level runtime engine settings
//!
//! Selects the force backend, the number of corrector passes, and whether
//! tight bound pairs are handed to the Kepler solver

use crate::configuration::config::BackendConfig;

#[derive(Debug, Clone)]
pub struct Engine {
    pub backend: BackendConfig,  // direct or parallel force summation
    pub corrector_passes: usize, // n in P(EC)^n
    pub encounters: bool,        // false = direct integration only
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Direct,
            corrector_passes: 3,
            encounters: false,
        }
    }
}
