use crate::options::ObfuscationOptions;
use crate::preparation::Preparation;
use crate::{PassConfig, Transform, pass};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tangle_core::report::{BlockKind, FlatteningReport};
use tangle_core::{parse, with_globals};
use tangle_utils::errors::ObfuscateError;

/// Configuration for the obfuscation pipeline
pub struct ObfuscationConfig {
    /// Random seed for deterministic obfuscation
    pub seed: u64,
    /// List of transforms to apply
    pub transforms: Vec<Box<dyn Transform>>,
    /// Pass configuration for transform behavior
    pub pass_config: PassConfig,
    /// Options shared by the pipeline (naming strategy, output format)
    pub options: ObfuscationOptions,
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            transforms: Vec::new(),
            pass_config: PassConfig::default(),
            options: ObfuscationOptions::default(),
        }
    }
}

impl std::fmt::Debug for ObfuscationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObfuscationConfig")
            .field("seed", &self.seed)
            .field(
                "transforms",
                &format!("{} transforms", self.transforms.len()),
            )
            .field("pass_config", &self.pass_config)
            .field("options", &self.options)
            .finish()
    }
}

/// Result of the obfuscation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObfuscationResult {
    /// The obfuscated JavaScript
    pub obfuscated_code: String,
    /// Original source size in bytes
    pub original_size: usize,
    /// Obfuscated output size in bytes
    pub obfuscated_size: usize,
    /// Size increase as percentage
    pub size_increase_percentage: f64,
    /// Number of functions (and the program) rewritten into dispatch loops
    pub targets_flattened: usize,
    /// Number of blocks across all dispatch loops
    pub blocks_created: usize,
    /// Per-target block graphs
    pub reports: Vec<FlatteningReport>,
    /// Metadata about the obfuscation process
    pub metadata: ObfuscationMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObfuscationMetadata {
    /// Names of transforms that were applied
    pub transforms_applied: Vec<String>,
    /// Seed used for the obfuscation
    pub seed_used: u64,
    /// Whether the size limit was exceeded
    pub size_limit_exceeded: bool,
    pub minified: bool,
}

/// Main obfuscation pipeline: parse, prepare, transform, print.
pub fn obfuscate_source(
    source: &str,
    config: ObfuscationConfig,
) -> Result<ObfuscationResult, ObfuscateError> {
    config.options.validate()?;
    with_globals(|| run_pipeline(source, config))
}

fn run_pipeline(
    source: &str,
    config: ObfuscationConfig,
) -> Result<ObfuscationResult, ObfuscateError> {
    let original_size = source.len();

    tracing::debug!("Starting obfuscation pipeline:");
    tracing::debug!("  Input size: {} bytes", original_size);
    tracing::debug!("  Seed: 0x{:x}", config.seed);
    tracing::debug!("  User transforms: {}", config.transforms.len());

    let mut ir = parse(source, "input.js")?;
    ir.names.set_strategy(config.options.identifier_generator);
    let mut shared_rng = StdRng::seed_from_u64(config.seed);

    // Flattening depends on the normalized shape, so this runs outside the metrics gate.
    let preparation = Preparation;
    preparation.apply(&mut ir, &mut shared_rng)?;
    let mut transforms_applied = vec![preparation.name().to_string()];

    if config.transforms.is_empty() {
        tracing::warn!("No transforms configured; output is only normalized");
    }
    transforms_applied.extend(pass::run(
        &mut ir,
        &config.transforms,
        &config.pass_config,
        &mut shared_rng,
    )?);

    let obfuscated_code = ir.to_source(config.options.minify)?;
    let obfuscated_size = obfuscated_code.len();
    let blocks_created = ir
        .flattened
        .iter()
        .flat_map(|r| &r.blocks)
        .filter(|b| b.kind != BlockKind::End)
        .count();

    tracing::debug!("Transform summary:");
    tracing::debug!("  Applied: {:?}", transforms_applied);
    tracing::debug!("  Targets flattened: {}", ir.flattened.len());
    tracing::debug!("  Blocks created: {}", blocks_created);
    tracing::debug!("  Final size: {} bytes", obfuscated_size);

    let size_increase_percentage = if original_size > 0 {
        ((obfuscated_size as f64 - original_size as f64) / original_size as f64) * 100.0
    } else {
        0.0
    };

    let size_limit_exceeded = if config.pass_config.max_size_delta > 0.0 {
        let max_allowed_size =
            (original_size as f32 * (1.0 + config.pass_config.max_size_delta)).ceil() as usize;
        obfuscated_size > max_allowed_size
    } else {
        false
    };
    if size_limit_exceeded {
        tracing::warn!(
            "Output grew to {} bytes, over the configured limit of +{:.0}%",
            obfuscated_size,
            config.pass_config.max_size_delta * 100.0
        );
    }

    Ok(ObfuscationResult {
        obfuscated_code,
        original_size,
        obfuscated_size,
        size_increase_percentage,
        targets_flattened: ir.flattened.len(),
        blocks_created,
        reports: ir.flattened,
        metadata: ObfuscationMetadata {
            transforms_applied,
            seed_used: config.seed,
            size_limit_exceeded,
            minified: config.options.minify,
        },
    })
}

/// Prints a short analysis of the obfuscation process
pub fn print_obfuscation_analysis(result: &ObfuscationResult) {
    println!("Transform Analysis:");
    println!("Original size: {} bytes", result.original_size);
    println!(
        "Applied {} transforms: {:?}",
        result.metadata.transforms_applied.len(),
        result.metadata.transforms_applied
    );
    if result.targets_flattened > 0 {
        println!(
            "Flattened {} target(s) into {} block(s)",
            result.targets_flattened, result.blocks_created
        );
        for report in &result.reports {
            println!(
                "  {:<20} {:>3} blocks, {} state vars",
                report.target,
                report.blocks.len(),
                report.state_vars.len()
            );
        }
    }
    println!("✅ Obfuscation complete");
    println!(
        "📈 Size change: {} → {} bytes ({:+.1}%)",
        result.original_size, result.obfuscated_size, result.size_increase_percentage
    );
    println!();
}

/// Builds the JSON report written by `obfuscate --emit`.
pub fn create_report(result: &ObfuscationResult) -> serde_json::Value {
    json!({
        "original_bytes": result.original_size,
        "obfuscated_bytes": result.obfuscated_size,
        "size_delta_bytes": (result.obfuscated_size as i64 - result.original_size as i64),
        "percent_size": result.size_increase_percentage,
        "targets_flattened": result.targets_flattened,
        "blocks_created": result.blocks_created,
        "transforms_applied": result.metadata.transforms_applied,
        "seed_used": result.metadata.seed_used,
        "size_limit_exceeded": result.metadata.size_limit_exceeded,
        "targets": result.reports,
    })
}

/// Convenience function to create common transform configurations
pub mod presets {
    use super::*;
    use crate::control_flow_flattening::ControlFlowFlattening;
    use tangle_core::probability::ProbabilityMap;

    /// Pipeline that flattens according to `options`.
    pub fn from_options(seed: Option<u64>, options: ObfuscationOptions) -> ObfuscationConfig {
        ObfuscationConfig {
            seed: seed.unwrap_or(42),
            transforms: vec![Box::new(ControlFlowFlattening::from_options(&options))],
            pass_config: PassConfig::default(),
            options,
        }
    }

    /// Default obfuscation with every flattening feature enabled
    pub fn default_obfuscation(seed: Option<u64>) -> ObfuscationConfig {
        from_options(seed, ObfuscationOptions::default())
    }

    /// Light obfuscation (flattening without dead code or disguised tests)
    pub fn light_obfuscation(seed: Option<u64>) -> ObfuscationConfig {
        from_options(
            seed,
            ObfuscationOptions {
                dead_code: false,
                complex_tests: false,
                ..ObfuscationOptions::default()
            },
        )
    }

    /// Custom obfuscation with specific intensity
    pub fn custom_obfuscation(seed: Option<u64>, intensity: f32) -> ObfuscationConfig {
        let intensity = intensity.clamp(0.0, 1.0);
        let options = ObfuscationOptions {
            control_flow_flattening: ProbabilityMap::Chance(f64::from(intensity)),
            dead_code: intensity > 0.3,
            complex_tests: intensity > 0.5,
            fake_tests: intensity > 0.5,
            mangle_literals: intensity > 0.7,
            ..ObfuscationOptions::default()
        };
        ObfuscationConfig {
            pass_config: PassConfig {
                max_size_delta: intensity * 20.0,
                aggressive: intensity > 0.7,
                ..PassConfig::default()
            },
            ..from_options(seed, options)
        }
    }
}
