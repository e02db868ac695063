//! Dead-code injection: fake blocks, never-taken branches, and clones of real blocks.
//!
//! Nothing added here is reachable from the start block or a relocated entry through edges
//! that can actually be taken.

use super::builder::FlatteningContext;
use rand::Rng;
use rand::seq::IndexedRandom;
use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::{IfStmt, Stmt};
use tangle_core::ast::{block, bool_expr};
use tangle_core::report::{BlockKind, EdgeKind};
use tracing::debug;

/// Share of real blocks that receive an `if (false) goto` before their last statement.
const DEAD_BRANCH_RATIO: f64 = 0.25;

pub fn inject(ctx: &mut FlatteningContext<'_>) {
    let fakes = add_fake_blocks(ctx);
    let branches = add_dead_branches(ctx);
    let clones = add_clones(ctx);
    debug!(
        "Dead code: {} fake block(s), {} dead branch(es), {} clone(s)",
        fakes, branches, clones
    );
}

fn labels_of(ctx: &FlatteningContext<'_>, kind: BlockKind) -> Vec<String> {
    ctx.graph
        .blocks
        .values()
        .filter(|b| b.kind == kind)
        .map(|b| b.label.clone())
        .collect()
}

fn random_label(ctx: &mut FlatteningContext<'_>) -> String {
    let labels: Vec<&String> = ctx.graph.blocks.keys().collect();
    match labels.choose(ctx.rng) {
        Some(label) => (*label).clone(),
        None => ctx.graph.end_label.clone(),
    }
}

/// Statements of real blocks that can be copied into filler without changing meaning of
/// anything reachable: no declarations, no `goto`s.
fn filler_from(ctx: &mut FlatteningContext<'_>, source: &str) -> Vec<Stmt> {
    let candidates: Vec<Stmt> = ctx
        .graph
        .get(source)
        .body
        .iter()
        .filter(|s| {
            !matches!(s, Stmt::Decl(_)) && ctx.graph.gotos_in(std::slice::from_ref(*s)).is_empty()
        })
        .cloned()
        .collect();
    if candidates.is_empty() {
        return Vec::new();
    }
    let take = ctx.rng.random_range(1..=candidates.len());
    candidates
        .choose_multiple(ctx.rng, take)
        .cloned()
        .collect()
}

/// 1 to 5 blocks of copied statements ending in a jump to a random label.
fn add_fake_blocks(ctx: &mut FlatteningContext<'_>) -> usize {
    let real = labels_of(ctx, BlockKind::Real);
    if real.is_empty() {
        return 0;
    }
    let count = ctx.rng.random_range(1..=5);
    for _ in 0..count {
        let Some(source) = real.choose(ctx.rng).cloned() else {
            break;
        };
        let scope = ctx.graph.get(&source).scope;
        let mut body = filler_from(ctx, &source);
        let target = random_label(ctx);
        body.push(ctx.graph.goto(&target, EdgeKind::Jump));

        let label = ctx.graph.new_label();
        ctx.graph
            .create_block(label, scope, BlockKind::Fake, ctx.rng)
            .body = body;
    }
    count
}

/// Inserts `if (false) { goto(random) }` before the last statement of about a quarter of the
/// real blocks. The literal is left for the literal mangler to disguise.
fn add_dead_branches(ctx: &mut FlatteningContext<'_>) -> usize {
    let mut added = 0;
    for label in labels_of(ctx, BlockKind::Real) {
        if !ctx.rng.random_bool(DEAD_BRANCH_RATIO) {
            continue;
        }
        let target = random_label(ctx);
        let dead = Stmt::If(IfStmt {
            span: DUMMY_SP,
            test: Box::new(bool_expr(false)),
            cons: Box::new(block(vec![ctx.graph.goto(&target, EdgeKind::Dead)])),
            alt: None,
        });
        let body = &mut ctx.graph.get_mut(&label).body;
        let at = body.len().saturating_sub(1);
        body.insert(at, dead);
        added += 1;
    }
    added
}

/// 1 to 5 copies of declaration-free real blocks under new labels that nothing jumps to.
fn add_clones(ctx: &mut FlatteningContext<'_>) -> usize {
    let sources: Vec<String> = ctx
        .graph
        .blocks
        .values()
        .filter(|b| {
            b.kind == BlockKind::Real && !b.body.iter().any(|s| matches!(s, Stmt::Decl(_)))
        })
        .map(|b| b.label.clone())
        .collect();
    if sources.is_empty() {
        return 0;
    }
    let count = ctx.rng.random_range(1..=5);
    for _ in 0..count {
        let Some(source) = sources.choose(ctx.rng).cloned() else {
            break;
        };
        let original = ctx.graph.get(&source);
        let (scope, body) = (original.scope, original.body.clone());
        let label = ctx.graph.new_label();
        ctx.graph
            .create_block(label, scope, BlockKind::Clone, ctx.rng)
            .body = body;
    }
    count
}
