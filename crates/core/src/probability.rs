use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tangle_utils::errors::ConfigError;

/// Per-target application probability for a transform.
///
/// Deserializes from `true`/`false`, a number in `[0, 1]`, or an object keyed by function name
/// where `"*"` supplies the fallback for unnamed or unlisted targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProbabilityMap {
    Flag(bool),
    Chance(f64),
    PerName(HashMap<String, f64>),
}

impl Default for ProbabilityMap {
    fn default() -> Self {
        Self::Flag(true)
    }
}

impl ProbabilityMap {
    /// Rejects probabilities outside `[0, 1]` and NaN.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let check = |key: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::InvalidProbability {
                    key: key.to_string(),
                    value,
                })
            }
        };
        match self {
            Self::Flag(_) => Ok(()),
            Self::Chance(p) => check("*", *p),
            Self::PerName(map) => map.iter().try_for_each(|(k, v)| check(k, *v)),
        }
    }

    /// Decides whether the transform applies to the target called `name`.
    pub fn compute(&self, name: Option<&str>, rng: &mut StdRng) -> bool {
        let p = match self {
            Self::Flag(flag) => return *flag,
            Self::Chance(p) => *p,
            Self::PerName(map) => name
                .and_then(|n| map.get(n))
                .or_else(|| map.get("*"))
                .copied()
                .unwrap_or(0.0),
        };
        if p >= 1.0 {
            true
        } else if p > 0.0 {
            rng.random_bool(p)
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_flags_and_extremes_ignore_rng() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(ProbabilityMap::Flag(true).compute(None, &mut rng));
        assert!(!ProbabilityMap::Flag(false).compute(Some("f"), &mut rng));
        assert!(ProbabilityMap::Chance(1.0).compute(None, &mut rng));
        assert!(!ProbabilityMap::Chance(0.0).compute(None, &mut rng));
    }

    #[test]
    fn test_per_name_lookup_with_wildcard() {
        let mut rng = StdRng::seed_from_u64(3);
        let map = ProbabilityMap::PerName(HashMap::from([
            ("keep".to_string(), 1.0),
            ("*".to_string(), 0.0),
        ]));
        assert!(map.compute(Some("keep"), &mut rng));
        assert!(!map.compute(Some("other"), &mut rng));
        assert!(!map.compute(None, &mut rng));
    }

    #[test]
    fn test_deserialize_forms() {
        let flag: ProbabilityMap = serde_json::from_str("false").unwrap();
        assert_eq!(flag, ProbabilityMap::Flag(false));
        let chance: ProbabilityMap = serde_json::from_str("0.25").unwrap();
        assert_eq!(chance, ProbabilityMap::Chance(0.25));
        let named: ProbabilityMap = serde_json::from_str(r#"{"f": 0.5}"#).unwrap();
        assert!(matches!(named, ProbabilityMap::PerName(_)));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(ProbabilityMap::Chance(1.5).validate().is_err());
        assert!(ProbabilityMap::Chance(f64::NAN).validate().is_err());
        assert!(ProbabilityMap::Chance(0.5).validate().is_ok());
    }
}
