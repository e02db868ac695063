//! Helpers shared by the integration tests.

use boa_engine::{Context, Source};
use tangle_transform::obfuscator::{ObfuscationResult, obfuscate_source, presets};
use tangle_transform::options::ObfuscationOptions;

/// Defined before every run; programs report observable effects through `print`.
const PRELUDE: &str = "var __out = []; function print(x) { __out.push(String(x)); }";

/// Runs `code` in a fresh interpreter and returns everything it printed, joined with `|`.
///
/// An uncaught exception is returned as `Err` with its message.
pub fn run_js(code: &str) -> Result<String, String> {
    let mut ctx = Context::default();
    ctx.eval(Source::from_bytes(PRELUDE))
        .map_err(|e| e.to_string())?;
    ctx.eval(Source::from_bytes(code))
        .map_err(|e| e.to_string())?;
    let out = ctx
        .eval(Source::from_bytes("__out.join('|')"))
        .map_err(|e| e.to_string())?;
    out.to_string(&mut ctx)
        .map(|s| s.to_std_string_escaped())
        .map_err(|e| e.to_string())
}

/// Options that flatten every function regardless of size.
pub fn eager_options() -> ObfuscationOptions {
    ObfuscationOptions {
        min_statements: 1,
        ..ObfuscationOptions::default()
    }
}

pub fn obfuscate(source: &str, seed: u64, options: ObfuscationOptions) -> ObfuscationResult {
    match obfuscate_source(source, presets::from_options(Some(seed), options)) {
        Ok(result) => result,
        Err(e) => panic!("obfuscation failed for seed {seed}: {e}"),
    }
}

/// Obfuscates `source` under every seed in `seeds` and checks that it prints the same thing
/// as the original. Returns the expected output.
pub fn assert_equivalent(
    source: &str,
    seeds: std::ops::Range<u64>,
    options: &ObfuscationOptions,
) -> String {
    let expected = run_js(source);
    for seed in seeds {
        let result = obfuscate(source, seed, options.clone());
        assert!(
            result.targets_flattened > 0,
            "seed {seed}: nothing was flattened in\n{source}"
        );
        let actual = run_js(&result.obfuscated_code);
        assert_eq!(
            actual, expected,
            "seed {seed}: obfuscated program diverged\n{}",
            result.obfuscated_code
        );
    }
    match expected {
        Ok(out) => out,
        Err(e) => format!("threw: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_js_collects_prints() {
        assert_eq!(run_js("print(1); print('a' + 2);").unwrap(), "1|a2");
    }

    #[test]
    fn test_run_js_reports_exceptions() {
        assert!(run_js("throw new Error('boom');").unwrap_err().contains("boom"));
    }
}
