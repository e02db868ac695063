/// Fresh identifier generation.
///
/// Every synthetic name the transforms introduce (state variables, the dispatch function, scope
/// object properties, labels) is drawn from one `NameGenerator` per program. The generator is
/// seeded with every identifier already present in the input, so a generated name can never
/// capture or shadow user code.
use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use swc_core::ecma::ast::{Ident, IdentName, Program};
use swc_core::ecma::visit::{Visit, VisitWith};

/// Built-in naming strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierStrategy {
    /// `_0x3fa91c`
    Hexadecimal,
    /// Shortest unused names in sequence: `a`, `b`, ..., `aa`.
    Mangled,
    /// Random mixed-case letters.
    #[default]
    Randomized,
    /// `_` followed by invisible zero-width joiners.
    ZeroWidth,
    /// `_0`, `_1`, ...
    Numbered,
}

/// Caller-supplied naming function, given a monotonically increasing counter.
pub type CustomNamer = Arc<dyn Fn(usize) -> String + Send + Sync>;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const RESERVED_WORDS: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let",
    "new", "null", "package", "private", "protected", "public", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void", "while",
    "with", "yield", "NaN", "Infinity",
];

/// Produces identifiers that collide with nothing in the program.
#[derive(Clone)]
pub struct NameGenerator {
    strategy: IdentifierStrategy,
    custom: Option<CustomNamer>,
    taken: HashSet<String>,
    counter: usize,
}

impl fmt::Debug for NameGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameGenerator")
            .field("strategy", &self.strategy)
            .field("custom", &self.custom.is_some())
            .field("taken", &self.taken.len())
            .field("counter", &self.counter)
            .finish()
    }
}

impl NameGenerator {
    pub fn new(strategy: IdentifierStrategy, taken: HashSet<String>) -> Self {
        Self {
            strategy,
            custom: None,
            taken,
            counter: 0,
        }
    }

    /// Creates a generator that avoids every identifier spelled anywhere in `program`.
    pub fn for_program(program: &Program, strategy: IdentifierStrategy) -> Self {
        let mut collector = NameCollector::default();
        program.visit_with(&mut collector);
        Self::new(strategy, collector.names)
    }

    pub fn set_strategy(&mut self, strategy: IdentifierStrategy) {
        self.strategy = strategy;
        self.custom = None;
    }

    /// Routes generation through `namer`; invalid or taken results are skipped.
    pub fn set_custom(&mut self, namer: CustomNamer) {
        self.custom = Some(namer);
    }

    pub fn strategy(&self) -> IdentifierStrategy {
        self.strategy
    }

    /// Marks `name` as unavailable.
    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_string());
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    /// Returns a fresh, valid identifier and records it as taken.
    pub fn generate(&mut self, rng: &mut StdRng) -> String {
        let mut rejected = 0usize;
        loop {
            let candidate = self.candidate(rng, rejected);
            self.counter += 1;
            if is_valid_identifier(&candidate)
                && !RESERVED_WORDS.contains(&candidate.as_str())
                && self.taken.insert(candidate.clone())
            {
                return candidate;
            }
            rejected += 1;
        }
    }

    fn candidate(&self, rng: &mut StdRng, rejected: usize) -> String {
        if let Some(namer) = &self.custom {
            // A namer that keeps colliding falls back to a numbered suffix.
            return if rejected < 64 {
                namer(self.counter)
            } else {
                format!("{}_{}", namer(self.counter), self.counter)
            };
        }
        match self.strategy {
            IdentifierStrategy::Hexadecimal => {
                let mut bytes = [0u8; 3];
                rng.fill(&mut bytes);
                format!("_0x{}", hex::encode(bytes))
            }
            IdentifierStrategy::Mangled => mangled(self.counter),
            IdentifierStrategy::Randomized => {
                let len = rng.random_range(6..=10) + rejected / 16;
                (0..len)
                    .map(|_| LETTERS[rng.random_range(0..LETTERS.len())] as char)
                    .collect()
            }
            IdentifierStrategy::ZeroWidth => {
                let mut name = String::from("_");
                let mut n = self.counter + 1;
                while n > 0 {
                    name.push(if n & 1 == 1 { '\u{200d}' } else { '\u{200c}' });
                    n >>= 1;
                }
                name
            }
            IdentifierStrategy::Numbered => format!("_{}", self.counter),
        }
    }
}

/// Bijective base-52 spelling of `n`: 0 => `a`, 51 => `Z`, 52 => `aa`.
fn mangled(mut n: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(LETTERS[n % LETTERS.len()]);
        n /= LETTERS.len();
        if n == 0 {
            break;
        }
        n -= 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Checks `name` against the ECMAScript IdentifierName grammar.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let start = first == '$' || first == '_' || unicode_ident::is_xid_start(first);
    start
        && chars.all(|c| {
            c == '$' || c == '\u{200c}' || c == '\u{200d}' || unicode_ident::is_xid_continue(c)
        })
}

#[derive(Default)]
struct NameCollector {
    names: HashSet<String>,
}

impl Visit for NameCollector {
    fn visit_ident(&mut self, id: &Ident) {
        self.names.insert(id.sym.to_string());
    }

    fn visit_ident_name(&mut self, id: &IdentName) {
        self.names.insert(id.sym.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use rand::SeedableRng;
    use swc_core::common::{GLOBALS, Globals};

    #[test]
    fn test_mangled_sequence() {
        assert_eq!(mangled(0), "a");
        assert_eq!(mangled(51), "Z");
        assert_eq!(mangled(52), "aa");
        assert_eq!(mangled(53), "ab");
    }

    #[test]
    fn test_generated_names_avoid_program_names() {
        GLOBALS.set(&Globals::new(), || {
            let parsed = parse_program("var a = 1; function b(c) { return a + c; }", "t.js")
                .unwrap();
            let mut names = NameGenerator::for_program(&parsed.program, IdentifierStrategy::Mangled);
            let mut rng = StdRng::seed_from_u64(1);
            let generated: Vec<String> = (0..4).map(|_| names.generate(&mut rng)).collect();
            assert_eq!(generated, vec!["d", "e", "f", "g"]);
        });
    }

    #[test]
    fn test_every_strategy_yields_unique_valid_names() {
        let strategies = [
            IdentifierStrategy::Hexadecimal,
            IdentifierStrategy::Mangled,
            IdentifierStrategy::Randomized,
            IdentifierStrategy::ZeroWidth,
            IdentifierStrategy::Numbered,
        ];
        for strategy in strategies {
            let mut names = NameGenerator::new(strategy, HashSet::new());
            let mut rng = StdRng::seed_from_u64(7);
            let mut seen = HashSet::new();
            for _ in 0..300 {
                let name = names.generate(&mut rng);
                assert!(is_valid_identifier(&name), "{strategy:?} produced {name:?}");
                assert!(seen.insert(name), "{strategy:?} repeated a name");
            }
        }
    }

    #[test]
    fn test_custom_namer_skips_keywords_and_collisions() {
        let mut names = NameGenerator::new(IdentifierStrategy::Numbered, HashSet::new());
        names.reserve("v1");
        names.set_custom(Arc::new(|n| if n == 0 { "if".into() } else { format!("v{n}") }));
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(names.generate(&mut rng), "v2");
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("$a_1"));
        assert!(is_valid_identifier("_\u{200c}"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("a-b"));
        assert!(!is_valid_identifier(""));
    }
}
