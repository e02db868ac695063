//! Prints a swc AST back to JavaScript text.

use crate::ProgramIr;
use swc_core::common::{SourceMap, sync::Lrc};
use swc_core::ecma::ast::Program;
use swc_core::ecma::codegen::{Config, Emitter, text_writer::JsWriter};
use tangle_utils::errors::CodegenError;

/// Prints the program held by `ir`.
pub fn generate(ir: &ProgramIr, minify: bool) -> Result<String, CodegenError> {
    print_program(&ir.program, &ir.cm, minify)
}

/// Emits `program` as JavaScript.
///
/// With `minify` set the emitter drops insignificant whitespace; the output is otherwise
/// semantically identical.
pub fn print_program(
    program: &Program,
    cm: &Lrc<SourceMap>,
    minify: bool,
) -> Result<String, CodegenError> {
    let mut buf = Vec::new();
    {
        let writer = JsWriter::new(cm.clone(), "\n", &mut buf, None);
        let mut emitter = Emitter {
            cfg: Config::default().with_minify(minify),
            cm: cm.clone(),
            comments: None,
            wr: writer,
        };
        emitter.emit_program(program)?;
    }
    Ok(String::from_utf8(buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use swc_core::common::{GLOBALS, Globals};

    #[test]
    fn test_print_roundtrip_keeps_code() {
        GLOBALS.set(&Globals::new(), || {
            let parsed = parse_program("function f(a) { return a + 1; }", "f.js").unwrap();
            let text = print_program(&parsed.program, &parsed.cm, false).unwrap();
            assert!(text.contains("function f(a)"), "printed: {text}");
            assert!(text.contains("return a + 1"), "printed: {text}");
        });
    }

    #[test]
    fn test_minify_is_shorter() {
        GLOBALS.set(&Globals::new(), || {
            let parsed =
                parse_program("function f(a) {\n  var b = a * 2;\n  return b;\n}", "f.js").unwrap();
            let pretty = print_program(&parsed.program, &parsed.cm, false).unwrap();
            let small = print_program(&parsed.program, &parsed.cm, true).unwrap();
            assert!(small.len() < pretty.len(), "minified output should be shorter");
        });
    }
}
