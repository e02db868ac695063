//! Control-flow flattening.
//!
//! Each eligible target (the program and every function) is split into basic blocks that are
//! folded into a single `while`/`switch` dispatch loop driven by a set of state variables.
//! Bindings of the target move onto per-invocation scope objects, nested function declarations
//! are relocated into the same graph, and dead blocks and disguised case tests are mixed in.

pub mod assembler;
pub mod blocks;
pub mod builder;
pub mod dead_code;
pub mod rewriter;
pub mod safety;
pub mod scope;

use crate::Transform;
use crate::options::ObfuscationOptions;
use blocks::BlockGraph;
use builder::{Exit, FlatteningContext};
use rand::rngs::StdRng;
use safety::{Candidate, Eligibility, SafetyAnalyzer};
use swc_core::common::Spanned;
use swc_core::ecma::ast::{
    ClassMethod, FnDecl, FnExpr, Function, MethodProp, ModuleDecl, ModuleItem, Pat, Program,
    PropName, Stmt,
};
use swc_core::ecma::visit::{VisitMut, VisitMutWith};
use tangle_core::ProgramIr;
use tangle_core::annotations::Annotations;
use tangle_core::ast::is_directive;
use tangle_core::names::NameGenerator;
use tangle_core::probability::ProbabilityMap;
use tangle_core::report::{BlockSummary, EdgeSummary, FlatteningReport};
use tangle_utils::errors::TransformError;
use tracing::{debug, info};

/// Report name used for the top-level program.
pub const PROGRAM_TARGET: &str = "<program>";

/// Knobs of the flattening transform, taken from [`ObfuscationOptions`].
#[derive(Debug, Clone)]
pub struct FlatteningConfig {
    /// Per-target chance of flattening
    pub probability: ProbabilityMap,
    /// Flatten the top-level program as well
    pub rename_globals: bool,
    /// Inject fake blocks, dead branches, and clones
    pub dead_code: bool,
    /// Disguise some case tests
    pub complex_tests: bool,
    /// Add decoy case labels
    pub fake_tests: bool,
    /// Rewrite small literals over the state variables
    pub mangle_literals: bool,
    /// Half-width of the state value range
    pub state_range: i64,
    /// Smallest body that is worth flattening
    pub min_statements: usize,
}

impl From<&ObfuscationOptions> for FlatteningConfig {
    fn from(options: &ObfuscationOptions) -> Self {
        Self {
            probability: options.control_flow_flattening.clone(),
            rename_globals: options.rename_globals,
            dead_code: options.dead_code,
            complex_tests: options.complex_tests,
            fake_tests: options.fake_tests,
            mangle_literals: options.mangle_literals,
            state_range: options.state_range,
            min_statements: options.min_statements,
        }
    }
}

impl Default for FlatteningConfig {
    fn default() -> Self {
        Self::from(&ObfuscationOptions::default())
    }
}

/// Control-flow flattening transform.
#[derive(Debug, Clone, Default)]
pub struct ControlFlowFlattening {
    config: FlatteningConfig,
}

impl ControlFlowFlattening {
    pub fn new(config: FlatteningConfig) -> Self {
        Self { config }
    }

    pub fn from_options(options: &ObfuscationOptions) -> Self {
        Self::new(FlatteningConfig::from(options))
    }
}

impl Transform for ControlFlowFlattening {
    fn name(&self) -> &'static str {
        "ControlFlowFlattening"
    }

    fn apply(&self, ir: &mut ProgramIr, rng: &mut StdRng) -> Result<bool, TransformError> {
        let ProgramIr {
            program,
            annotations,
            names,
            flattened,
            ..
        } = ir;
        let mut driver = Driver {
            config: &self.config,
            annotations,
            names,
            rng,
            reports: Vec::new(),
            error: None,
            pending_name: None,
        };

        if self.config.rename_globals {
            driver.flatten_program(program)?;
        }
        program.visit_mut_with(&mut driver);
        if let Some(err) = driver.error.take() {
            return Err(err);
        }

        let blocks: usize = driver.reports.iter().map(|r| r.blocks.len()).sum();
        info!(
            "ControlFlowFlattening: {} target(s) flattened into {} block(s)",
            driver.reports.len(),
            blocks
        );
        let changed = !driver.reports.is_empty();
        flattened.extend(driver.reports);
        Ok(changed)
    }
}

/// Walks the program pre-order and flattens every eligible target.
struct Driver<'a> {
    config: &'a FlatteningConfig,
    annotations: &'a Annotations,
    names: &'a mut NameGenerator,
    rng: &'a mut StdRng,
    reports: Vec<FlatteningReport>,
    error: Option<TransformError>,
    /// Name of the function about to be visited, for per-name probabilities.
    pending_name: Option<String>,
}

impl Driver<'_> {
    fn is_eligible(&mut self, target: &str, key: Option<&str>, candidate: Candidate<'_>) -> bool {
        let analyzer = SafetyAnalyzer::new(self.annotations, self.config.min_statements);
        let probability = &self.config.probability;
        let rng = &mut *self.rng;
        match analyzer.analyze(candidate, || probability.compute(key, rng)) {
            Eligibility::Eligible(bindings) => {
                debug!("Flattening {}: {} binding(s)", target, bindings.len());
                true
            }
            Eligibility::Ineligible(reason) => {
                debug!("Skipping {}: {}", target, reason);
                false
            }
        }
    }

    fn flatten_program(&mut self, program: &mut Program) -> Result<(), TransformError> {
        let span = program.span();
        match program {
            Program::Script(script) => {
                let split = directive_count(&script.body);
                let candidate = Candidate {
                    span,
                    params: &[],
                    stmts: &script.body[split..],
                    has_exports: false,
                };
                if !self.is_eligible(PROGRAM_TARGET, None, candidate) {
                    return Ok(());
                }
                let mut body = std::mem::take(&mut script.body);
                let stmts = body.split_off(split);
                body.extend(self.flatten_body(PROGRAM_TARGET.to_string(), stmts, false)?);
                script.body = body;
            }
            Program::Module(module) => {
                let has_exports = module.body.iter().any(|item| {
                    matches!(item, ModuleItem::ModuleDecl(decl) if !matches!(decl, ModuleDecl::Import(_)))
                });
                let mut stmts: Vec<Stmt> = module
                    .body
                    .iter()
                    .filter_map(|item| match item {
                        ModuleItem::Stmt(stmt) => Some(stmt.clone()),
                        ModuleItem::ModuleDecl(_) => None,
                    })
                    .collect();
                let split = directive_count(&stmts);
                let candidate = Candidate {
                    span,
                    params: &[],
                    stmts: &stmts[split..],
                    has_exports,
                };
                if !self.is_eligible(PROGRAM_TARGET, None, candidate) {
                    return Ok(());
                }
                let body = stmts.split_off(split);
                let imports: Vec<ModuleItem> = std::mem::take(&mut module.body)
                    .into_iter()
                    .filter(|item| matches!(item, ModuleItem::ModuleDecl(ModuleDecl::Import(_))))
                    .collect();
                let flattened = self.flatten_body(PROGRAM_TARGET.to_string(), body, false)?;
                module.body = stmts
                    .into_iter()
                    .map(ModuleItem::Stmt)
                    .chain(imports)
                    .chain(flattened.into_iter().map(ModuleItem::Stmt))
                    .collect();
            }
        }
        Ok(())
    }

    fn flatten_function(
        &mut self,
        function: &mut Function,
        key: Option<String>,
    ) -> Result<(), TransformError> {
        let Some(body) = &mut function.body else {
            return Ok(());
        };
        let split = directive_count(&body.stmts);
        let params: Vec<Pat> = function.params.iter().map(|p| p.pat.clone()).collect();
        let target = key.clone().unwrap_or_else(|| "<anonymous>".to_string());
        let candidate = Candidate {
            span: function.span,
            params: &params,
            stmts: &body.stmts[split..],
            has_exports: false,
        };
        if !self.is_eligible(&target, key.as_deref(), candidate) {
            return Ok(());
        }
        let stmts = body.stmts.split_off(split);
        let flattened = self.flatten_body(target, stmts, true)?;
        body.stmts.extend(flattened);
        Ok(())
    }

    /// Runs builder, dead-code injector, rewriter, and assembler over one target body and
    /// returns the statements that replace it.
    fn flatten_body(
        &mut self,
        target: String,
        stmts: Vec<Stmt>,
        is_function: bool,
    ) -> Result<Vec<Stmt>, TransformError> {
        let analyzer = SafetyAnalyzer::new(self.annotations, self.config.min_statements);
        let mut ctx = FlatteningContext::new(
            self.config,
            analyzer,
            &mut *self.names,
            &mut *self.rng,
            is_function,
        );

        let root = ctx.root_scope;
        ctx.declare_function_scope(root, &[], &stmts);
        let start = ctx.graph.start_label.clone();
        let end = ctx.graph.end_label.clone();
        ctx.flatten_statements(stmts, root, start, Exit::Goto(end), !is_function)?;
        if self.config.dead_code {
            dead_code::inject(&mut ctx);
        }
        ctx.graph.check_invariants();

        let edges = collect_edges(&ctx.graph);
        rewriter::rewrite(&mut ctx);
        for block in ctx.graph.blocks.values() {
            assert!(
                ctx.graph.gotos_in(&block.body).is_empty(),
                "unresolved goto left in {}",
                block.label
            );
        }
        let blocks = block_summaries(&ctx.graph);
        let body = assembler::assemble(&mut ctx)?;

        debug!(
            "Flattened {} into {} block(s) over {} state variable(s)",
            target,
            blocks.len(),
            ctx.graph.state_vars.len()
        );
        let report = FlatteningReport {
            target,
            state_vars: ctx.graph.state_vars.clone(),
            dispatch_name: ctx.dispatch_name.clone(),
            start_label: ctx.graph.start_label.clone(),
            end_label: ctx.graph.end_label.clone(),
            relocated_entries: ctx.relocations.clone(),
            blocks,
            edges,
            scopes: ctx.scopes.summaries(),
        };
        self.reports.push(report);
        Ok(body)
    }
}

impl VisitMut for Driver<'_> {
    fn visit_mut_fn_decl(&mut self, decl: &mut FnDecl) {
        self.pending_name = Some(decl.ident.sym.to_string());
        decl.function.visit_mut_with(self);
    }

    fn visit_mut_fn_expr(&mut self, expr: &mut FnExpr) {
        self.pending_name = expr.ident.as_ref().map(|id| id.sym.to_string());
        expr.function.visit_mut_with(self);
    }

    fn visit_mut_class_method(&mut self, method: &mut ClassMethod) {
        method.key.visit_mut_with(self);
        self.pending_name = prop_name(&method.key);
        method.function.visit_mut_with(self);
    }

    fn visit_mut_method_prop(&mut self, method: &mut MethodProp) {
        method.key.visit_mut_with(self);
        self.pending_name = prop_name(&method.key);
        method.function.visit_mut_with(self);
    }

    fn visit_mut_function(&mut self, function: &mut Function) {
        let key = self.pending_name.take();
        if self.error.is_none() {
            if let Err(err) = self.flatten_function(function, key) {
                self.error = Some(err);
            }
        }
        function.visit_mut_children_with(self);
    }
}

fn prop_name(key: &PropName) -> Option<String> {
    match key {
        PropName::Ident(id) => Some(id.sym.to_string()),
        PropName::Str(s) => Some(s.value.to_string()),
        _ => None,
    }
}

fn directive_count(stmts: &[Stmt]) -> usize {
    stmts.iter().take_while(|s| is_directive(s)).count()
}

fn collect_edges(graph: &BlockGraph) -> Vec<EdgeSummary> {
    graph
        .blocks
        .values()
        .flat_map(|block| {
            graph
                .gotos_in(&block.body)
                .into_iter()
                .map(|goto| EdgeSummary {
                    from: block.label.clone(),
                    to: goto.target,
                    kind: goto.kind,
                })
        })
        .collect()
}

fn block_summaries(graph: &BlockGraph) -> Vec<BlockSummary> {
    graph
        .blocks
        .values()
        .map(|block| BlockSummary {
            label: block.label.clone(),
            total_state: block.total_state,
            state_values: block.state_values.clone(),
            kind: block.kind,
            statements: block.body.len(),
        })
        .collect()
}
