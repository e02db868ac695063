use crate::{PassConfig, Transform};
use rand::rngs::StdRng;
use tangle_analysis::{collect_metrics, compare};
use tangle_core::ProgramIr;
use tangle_utils::errors::{MetricsError, TransformError};
use tracing::{debug, info};

/// Trait for running a sequence of obfuscation transforms over a program.
pub trait Pass {
    /// Applies `passes` in order and returns the names of those whose result was kept.
    fn run(
        &self,
        ir: &mut ProgramIr,
        passes: &[Box<dyn Transform>],
        cfg: &PassConfig,
        rng: &mut StdRng,
    ) -> Result<Vec<String>, TransformError>;
}

/// Default implementation of the Pass trait.
///
/// Each transform runs on a snapshot; the snapshot replaces the program only if the metrics
/// delta reaches `accept_threshold` or the config is aggressive.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPass;

impl Pass for DefaultPass {
    fn run(
        &self,
        ir: &mut ProgramIr,
        passes: &[Box<dyn Transform>],
        cfg: &PassConfig,
        rng: &mut StdRng,
    ) -> Result<Vec<String>, TransformError> {
        let mut applied = Vec::new();

        for pass in passes {
            let before = match collect_metrics(ir) {
                Ok(metrics) => metrics,
                Err(MetricsError::EmptyProgram) => {
                    debug!("Empty program, skipping {}", pass.name());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let mut snapshot = ir.clone();

            let mutated = pass.apply(&mut snapshot, rng)?;
            if !mutated {
                debug!("{} made no changes", pass.name());
                continue;
            }

            let after = collect_metrics(&snapshot)?;
            let delta = compare(&before, &after);

            let keep = delta >= cfg.accept_threshold || cfg.aggressive;
            info!(
                "{:>22} Δ{:+.2} {}",
                pass.name(),
                delta,
                if keep { "✓" } else { "×" }
            );

            if keep {
                *ir = snapshot;
                applied.push(pass.name().to_string());
            }
        }
        Ok(applied)
    }
}

/// Convenience function to run the default pass.
pub fn run(
    ir: &mut ProgramIr,
    passes: &[Box<dyn Transform>],
    cfg: &PassConfig,
    rng: &mut StdRng,
) -> Result<Vec<String>, TransformError> {
    DefaultPass.run(ir, passes, cfg, rng)
}
