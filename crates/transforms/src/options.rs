use serde::{Deserialize, Serialize};
use std::fs;
use tangle_core::names::IdentifierStrategy;
use tangle_core::probability::ProbabilityMap;
use tangle_utils::errors::ConfigError;

/// User-facing obfuscation options.
///
/// Every field has a default, so a JSON options file only needs to list what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObfuscationOptions {
    /// Per-function chance of control-flow flattening.
    pub control_flow_flattening: ProbabilityMap,
    /// Also flatten the top-level program, which moves its bindings onto a scope object.
    pub rename_globals: bool,
    /// Inject fake blocks, dead branches, and block clones.
    pub dead_code: bool,
    /// Disguise some case tests as expressions over the state variables.
    pub complex_tests: bool,
    /// Add never-matching case labels and a decoy `default:`.
    pub fake_tests: bool,
    /// Rewrite small integer and boolean literals in terms of the state variables.
    pub mangle_literals: bool,
    pub identifier_generator: IdentifierStrategy,
    /// Half-width of the range state values are drawn from.
    pub state_range: i64,
    /// Targets with fewer top-level statements are left alone.
    pub min_statements: usize,
    pub minify: bool,
}

impl Default for ObfuscationOptions {
    fn default() -> Self {
        Self {
            control_flow_flattening: ProbabilityMap::Flag(true),
            rename_globals: true,
            dead_code: true,
            complex_tests: true,
            fake_tests: true,
            mangle_literals: true,
            identifier_generator: IdentifierStrategy::Randomized,
            state_range: 250,
            min_statements: 3,
            minify: false,
        }
    }
}

impl ObfuscationOptions {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// Loads and validates an options file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_string(),
            source: e,
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.control_flow_flattening.validate()?;
        if self.state_range <= 0 {
            return Err(ConfigError::InvalidStateRange(self.state_range));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options =
            ObfuscationOptions::from_json(r#"{"dead_code": false, "identifier_generator": "mangled"}"#)
                .unwrap();
        assert!(!options.dead_code);
        assert_eq!(options.identifier_generator, IdentifierStrategy::Mangled);
        assert_eq!(options.state_range, 250, "unlisted fields keep their default");
        assert!(options.rename_globals);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(ObfuscationOptions::from_json(r#"{"control_flow_flattening": 2.0}"#).is_err());
        assert!(ObfuscationOptions::from_json(r#"{"state_range": 0}"#).is_err());
        assert!(ObfuscationOptions::from_json("not json").is_err());
    }
}
