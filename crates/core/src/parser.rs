//! tangle's single entry-point for turning JavaScript text into a resolved swc AST.

use swc_core::common::{FileName, Mark, SourceMap, Spanned, sync::Lrc};
use swc_core::ecma::ast::{EsVersion, Program};
use swc_core::ecma::parser::{EsSyntax, Syntax, error::Error as SwcError, parse_file_as_program};
use swc_core::ecma::transforms::base::resolver;
use swc_core::ecma::visit::VisitMutWith;
use crate::ProgramIr;
use crate::annotations::Annotations;
use crate::names::{IdentifierStrategy, NameGenerator};
use std::{fs, path::Path};
use tangle_utils::errors::ParseError;

/// Where the JavaScript text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceType {
    Inline,
    File(String),
}

/// A parsed program together with the marks the resolver stamped onto it.
pub struct ParsedProgram {
    pub program: Program,
    pub cm: Lrc<SourceMap>,
    /// Mark carried by references that resolve to no declaration.
    pub unresolved_mark: Mark,
    /// Mark carried by top-level declarations.
    pub top_level_mark: Mark,
}

/// Normalizes CLI-style input into source text.
///
/// Input prefixed with `@` is read from disk; anything else is taken as inline source.
pub fn input_to_source(input: &str) -> Result<(String, SourceType), ParseError> {
    match input.strip_prefix('@') {
        Some(path) => {
            let path = Path::new(path);
            let text = fs::read_to_string(path).map_err(|e| ParseError::FileRead {
                path: path.display().to_string(),
                source: e,
            })?;
            Ok((text, SourceType::File(path.display().to_string())))
        }
        None => Ok((input.to_string(), SourceType::Inline)),
    }
}

/// Parses `source` as a script or module and runs the swc resolver over it.
///
/// After this call every identifier carries a syntax context, so `Ident::to_id()` names the
/// binding a reference resolves to rather than just its spelling. Must run inside
/// `swc_core::common::GLOBALS`.
///
/// # Arguments
/// * `source` - JavaScript text.
/// * `file_name` - Name recorded in the source map, used only for diagnostics.
///
/// # Returns
/// The resolved program, or a `ParseError` pointing at the first syntax error.
pub fn parse_program(source: &str, file_name: &str) -> Result<ParsedProgram, ParseError> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(
        Lrc::new(FileName::Custom(file_name.to_string())),
        source.to_string(),
    );

    let mut recovered = Vec::new();
    let mut program = parse_file_as_program(
        &fm,
        Syntax::Es(EsSyntax::default()),
        EsVersion::latest(),
        None,
        &mut recovered,
    )
    .map_err(|e| syntax_error(&cm, e))?;

    if let Some(e) = recovered.into_iter().next() {
        return Err(syntax_error(&cm, e));
    }

    let unresolved_mark = Mark::new();
    let top_level_mark = Mark::new();
    program.visit_mut_with(&mut resolver(unresolved_mark, top_level_mark, false));
    tracing::debug!(
        "Parsed {} ({} bytes) as {}",
        file_name,
        source.len(),
        if program.is_module() { "module" } else { "script" }
    );

    Ok(ParsedProgram {
        program,
        cm,
        unresolved_mark,
        top_level_mark,
    })
}

/// Parses `source` and builds the IR bundle. Must run inside [`crate::with_globals`].
///
/// # Examples
/// ```rust,ignore
/// let ir = tangle_core::with_globals(|| tangle_core::parse("f();", "in.js"))?;
/// assert!(ir.flattened.is_empty());
/// ```
pub fn parse(source: &str, file_name: &str) -> Result<ProgramIr, ParseError> {
    let parsed = parse_program(source, file_name)?;
    let annotations = Annotations::collect(&parsed.program);
    let names = NameGenerator::for_program(&parsed.program, IdentifierStrategy::default());
    Ok(ProgramIr {
        program: parsed.program,
        cm: parsed.cm,
        unresolved_mark: parsed.unresolved_mark,
        top_level_mark: parsed.top_level_mark,
        annotations,
        names,
        flattened: Vec::new(),
    })
}

fn syntax_error(cm: &SourceMap, err: SwcError) -> ParseError {
    let loc = cm.lookup_char_pos(err.span().lo);
    ParseError::Syntax {
        line: loc.line,
        col: loc.col_display,
        msg: err.kind().msg().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swc_core::common::{GLOBALS, Globals};

    #[test]
    fn test_parse_script_and_module() {
        GLOBALS.set(&Globals::new(), || {
            let script = parse_program("var a = 1; a + 2;", "script.js").unwrap();
            assert!(script.program.is_script(), "plain code should parse as a script");

            let module = parse_program("import x from 'y'; x();", "module.js").unwrap();
            assert!(module.program.is_module(), "imports should force module goal");
        });
    }

    #[test]
    fn test_syntax_error_has_location() {
        GLOBALS.set(&Globals::new(), || {
            let Err(err) = parse_program("var a = ;\n", "bad.js") else {
                panic!("invalid source should not parse");
            };
            match err {
                ParseError::Syntax { line, .. } => assert_eq!(line, 1, "error should be on line 1"),
                other => panic!("unexpected error: {other}"),
            }
        });
    }

    #[test]
    fn test_input_to_source_inline() {
        let (text, kind) = input_to_source("let x = 1;").unwrap();
        assert_eq!(text, "let x = 1;");
        assert_eq!(kind, SourceType::Inline);
    }

    #[test]
    fn test_input_to_source_missing_file() {
        let err = input_to_source("@/definitely/not/here.js").unwrap_err();
        assert!(matches!(err, ParseError::FileRead { .. }));
    }
}
