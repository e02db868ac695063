pub mod annotations;
pub mod ast;
pub mod codegen;
pub mod names;
pub mod parser;
pub mod probability;
pub mod report;
pub mod template;

use annotations::Annotations;
use names::NameGenerator;
use report::FlatteningReport;
use swc_core::common::{GLOBALS, Globals, Mark, SourceMap, sync::Lrc};
use swc_core::ecma::ast::Program;
use tangle_utils::errors::CodegenError;

pub use parser::parse;

/// Bundle of a resolved program and the state the transforms share.
///
/// Transforms mutate `program` in place; `annotations` and `names` are derived from it and kept
/// current by the passes that change them.
#[derive(Clone)]
pub struct ProgramIr {
    pub program: Program,
    pub cm: Lrc<SourceMap>,
    pub unresolved_mark: Mark,
    pub top_level_mark: Mark,
    /// Functions that must not be restructured.
    pub annotations: Annotations,
    /// Shared fresh-name source for every synthetic identifier.
    pub names: NameGenerator,
    /// One entry per function (or program) that control-flow flattening rewrote.
    pub flattened: Vec<FlatteningReport>,
}

impl std::fmt::Debug for ProgramIr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramIr")
            .field("program", &self.program)
            .field("annotations", &self.annotations)
            .field("names", &self.names)
            .field("flattened", &format!("{} report(s)", self.flattened.len()))
            .finish()
    }
}

impl ProgramIr {
    /// Prints the current program.
    pub fn to_source(&self, minify: bool) -> Result<String, CodegenError> {
        codegen::generate(self, minify)
    }
}

/// Runs `f` with a fresh set of swc globals installed, which marks and hygiene require.
pub fn with_globals<R>(f: impl FnOnce() -> R) -> R {
    GLOBALS.set(&Globals::new(), f)
}
