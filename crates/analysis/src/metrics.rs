/// Metrics used to judge whether a transform made a program harder to read.
///
/// Combines printed size, statement shape, and the block graphs that control-flow flattening
/// recorded in `ProgramIr::flattened` into a potency score. Dominator overlap is computed per
/// flattened target over its block graph, with the start block as entry and the end block as
/// exit.
///
/// # Usage
/// ```rust,ignore
/// let ir = tangle_core::with_globals(|| tangle_core::parse("var a = 1; f(a);", "in.js"))?;
/// let metrics = metrics::collect_metrics(&ir)?;
/// println!("{}", serde_json::to_string_pretty(&metrics)?);
/// ```
use petgraph::{
    algo::dominators::simple_fast,
    graph::{DiGraph, NodeIndex},
    stable_graph::IndexType,
    visit::Reversed,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use swc_core::ecma::ast::{BlockStmt, Function, Stmt};
use swc_core::ecma::visit::{Visit, VisitWith};
use tangle_core::ProgramIr;
use tangle_core::codegen::print_program;
use tangle_core::report::{BlockSummary, EdgeKind};
use tangle_utils::errors::MetricsError;

/// Analytical metrics of one program state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// Length of the minified output in bytes.
    pub byte_len: usize,
    pub stmt_cnt: usize,
    pub fn_cnt: usize,
    /// Straight-line top level plus every block of every flattened target.
    pub block_cnt: usize,
    /// Goto edges recorded by flattening.
    pub edge_cnt: usize,
    /// Deepest block nesting.
    pub max_nesting: usize,
    /// Fraction of blocks whose immediate dominator is also their immediate post-dominator.
    pub dom_overlap: f64,
    /// Composite potency score (heuristic based on blocks, edges, and overlap).
    pub potency: f64,
}

/// Collects metrics from the program and the flattening reports attached to it.
///
/// # Arguments
/// * `ir` - The program bundle, as produced by `tangle_core::parse` and rewritten by transforms.
///
/// # Returns
/// A `Metrics` struct, or an error if the program is empty or cannot be printed.
pub fn collect_metrics(ir: &ProgramIr) -> Result<Metrics, MetricsError> {
    let mut shape = ShapeCounter::default();
    ir.program.visit_with(&mut shape);
    if shape.statements == 0 {
        return Err(MetricsError::EmptyProgram);
    }
    let byte_len = print_program(&ir.program, &ir.cm, true)?.len();

    let mut block_cnt = 1;
    let mut edge_cnt = 0;
    let mut dominated = 0;
    let mut common = 0;
    for report in &ir.flattened {
        let (graph, index) = report.graph();
        block_cnt += graph.node_count();
        edge_cnt += graph.edge_count();
        let (Some(&entry), Some(&exit)) =
            (index.get(&report.start_label), index.get(&report.end_label))
        else {
            continue;
        };
        let (doms, post_doms) = dominator_pairs(&graph, entry, exit);
        dominated += doms.len();
        common += shared_count(&doms, &post_doms);
    }
    let overlap = if dominated == 0 {
        0.0
    } else {
        common as f64 / dominated as f64
    };
    tracing::debug!(
        "Metrics: {} bytes, {} block(s), {} edge(s), overlap {:.2}",
        byte_len,
        block_cnt,
        edge_cnt,
        overlap
    );

    Ok(Metrics {
        byte_len,
        stmt_cnt: shape.statements,
        fn_cnt: shape.functions,
        block_cnt,
        edge_cnt,
        max_nesting: shape.max_depth,
        dom_overlap: overlap,
        potency: score(overlap, block_cnt, edge_cnt),
    })
}

#[derive(Default)]
struct ShapeCounter {
    statements: usize,
    functions: usize,
    depth: usize,
    max_depth: usize,
}

impl Visit for ShapeCounter {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        self.statements += 1;
        stmt.visit_children_with(self);
    }

    fn visit_function(&mut self, function: &Function) {
        self.functions += 1;
        function.visit_children_with(self);
    }

    fn visit_block_stmt(&mut self, block: &BlockStmt) {
        self.depth += 1;
        self.max_depth = self.max_depth.max(self.depth);
        block.visit_children_with(self);
        self.depth -= 1;
    }
}

type DominatorMap<Ix> = HashMap<NodeIndex<Ix>, NodeIndex<Ix>>;

/// Immediate dominators from `entry` and immediate post-dominators from `exit`.
fn dominator_pairs<Ix>(
    g: &DiGraph<BlockSummary, EdgeKind, Ix>,
    entry: NodeIndex<Ix>,
    exit: NodeIndex<Ix>,
) -> (DominatorMap<Ix>, DominatorMap<Ix>)
where
    Ix: IndexType,
{
    let doms = simple_fast(g, entry);
    let mut dom_map = HashMap::new();
    for n in g.node_indices() {
        if let Some(idom) = doms.immediate_dominator(n) {
            dom_map.insert(n, idom);
        }
    }

    let post = simple_fast(Reversed(g), exit);
    let mut pdom_map = HashMap::new();
    for n in g.node_indices() {
        if let Some(ipdom) = post.immediate_dominator(n) {
            pdom_map.insert(n, ipdom);
        }
    }

    (dom_map, pdom_map)
}

fn shared_count<Ix>(doms: &DominatorMap<Ix>, pdoms: &DominatorMap<Ix>) -> usize
where
    Ix: IndexType + Hash + Eq,
{
    doms.iter()
        .filter(|(n, d)| pdoms.get(*n) == Some(*d))
        .count()
}

/// Potency heuristic: rewards blocks and edges, penalizes overlap.
fn score(overlap: f64, nodes: usize, edges: usize) -> f64 {
    5.0 * (nodes as f64).log2() + edges as f64 + 30.0 * (1.0 - overlap)
}

/// Compares two sets of metrics to evaluate a transform.
///
/// Potency gain minus a size penalty of 0.25 per 100 output bytes. A positive result means
/// the transform added complexity without excessive growth.
pub fn compare(before: &Metrics, after: &Metrics) -> f64 {
    after.potency - before.potency - 0.25 * (after.byte_len as f64 - before.byte_len as f64) / 100.0
}
