/// Module for the `obfuscate` subcommand, which flattens JavaScript control flow.
///
/// Reads inline source or an `@file`, loads options from an optional JSON file, runs the
/// pipeline, and writes the obfuscated code. A JSON size/structure report can be emitted
/// alongside.
use async_trait::async_trait;
use clap::Args;
use std::error::Error;
use std::fs;
use tangle_core::parser::input_to_source;
use tangle_transform::PassConfig;
use tangle_transform::obfuscator::{
    create_report, obfuscate_source, presets, print_obfuscation_analysis,
};
use tangle_transform::options::ObfuscationOptions;

/// Arguments for the `obfuscate` subcommand.
#[derive(Args)]
pub struct ObfuscateArgs {
    /// Input JavaScript source, or a file path prefixed with @
    pub input: String,
    /// Random seed for transform application (default: 42).
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// JSON options file; unlisted fields keep their defaults.
    #[arg(long)]
    config: Option<String>,
    /// Output file for the obfuscated code (default: stdout)
    #[arg(short, long)]
    output: Option<String>,
    /// Path to emit a size/structure report as JSON (optional).
    #[arg(long)]
    emit: Option<String>,
    /// Disable fake blocks, dead branches, and clones.
    #[arg(long)]
    no_dead_code: bool,
    /// Print without insignificant whitespace.
    #[arg(long)]
    minify: bool,
    /// Keep a transform only if its metrics delta reaches this value.
    #[arg(long)]
    accept_threshold: Option<f64>,
    /// Maximum allowable size increase as a ratio; 0 disables the check.
    #[arg(long, default_value_t = 0.0)]
    max_size_delta: f32,
}

impl ObfuscateArgs {
    fn options(&self) -> Result<ObfuscationOptions, Box<dyn Error>> {
        let mut options = match &self.config {
            Some(path) => ObfuscationOptions::load(path)?,
            None => ObfuscationOptions::default(),
        };
        if self.no_dead_code {
            options.dead_code = false;
        }
        if self.minify {
            options.minify = true;
        }
        Ok(options)
    }
}

/// Executes the `obfuscate` subcommand.
#[async_trait]
impl super::Command for ObfuscateArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let (source, kind) = input_to_source(&self.input)?;
        tracing::debug!("Read {} bytes from {:?}", source.len(), kind);

        let mut config = presets::from_options(Some(self.seed), self.options()?);
        config.pass_config = PassConfig {
            accept_threshold: self.accept_threshold.unwrap_or(0.0),
            aggressive: self.accept_threshold.is_none(),
            max_size_delta: self.max_size_delta,
        };

        let result = obfuscate_source(&source, config)?;
        if result.metadata.size_limit_exceeded {
            return Err(format!(
                "Obfuscated code grew {:.1}%, exceeds --max-size-delta {:.1}%",
                result.size_increase_percentage,
                self.max_size_delta * 100.0
            )
            .into());
        }

        if let Some(path) = &self.emit {
            fs::write(path, serde_json::to_string_pretty(&create_report(&result))?)?;
            tracing::info!("Wrote size/structure report to {}", path);
        }

        if self.output.is_some() {
            print_obfuscation_analysis(&result);
        }
        super::write_output(self.output.as_deref(), &result.obfuscated_code)
    }
}
