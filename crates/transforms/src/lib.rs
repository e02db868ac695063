pub mod control_flow_flattening;
pub mod obfuscator;
pub mod options;
pub mod pass;
pub mod preparation;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tangle_core::ProgramIr;
use tangle_utils::errors::TransformError;

/// Trait for JavaScript obfuscation transforms.
pub trait Transform: Send + Sync {
    /// Returns the transform's name for logging and identification.
    fn name(&self) -> &'static str;
    /// Applies the transform to the program IR, returning whether changes were made.
    fn apply(&self, ir: &mut ProgramIr, rng: &mut StdRng) -> Result<bool, TransformError>;
}

/// Configuration for transform passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    /// Minimum quality threshold for accepting transforms
    pub accept_threshold: f64,
    /// Apply transforms aggressively without quality gates
    pub aggressive: bool,
    /// Maximum allowable output size increase (as ratio, 0 disables the check)
    pub max_size_delta: f32,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.0,
            aggressive: true,
            max_size_delta: 0.0,
        }
    }
}
