//! Basic blocks, the block arena, and `goto` placeholders.

use super::scope::ScopeId;
use indexmap::IndexMap;
use rand::{Rng, rngs::StdRng};
use std::collections::HashSet;
use swc_core::common::{DUMMY_SP, SyntaxContext};
use swc_core::ecma::ast::{
    ArrowExpr, CallExpr, Callee, Expr, ExprOrSpread, ExprStmt, Function, Lit, Stmt,
};
use swc_core::ecma::visit::{Visit, VisitWith};
use tangle_core::ast::{ident_expr, str_expr};
use tangle_core::report::{BlockKind, EdgeKind};

/// A straight-line run of statements that becomes one `case` of the dispatch switch.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    /// Value the state variables sum to while this block runs; unique within the target.
    pub total_state: i64,
    /// One value per state variable; sums to `total_state`.
    pub state_values: Vec<i64>,
    pub body: Vec<Stmt>,
    /// Lexical scope the body's bindings resolve against.
    pub scope: ScopeId,
    pub kind: BlockKind,
}

/// Draws distinct integers from `[-range, range]`, widening the range when it runs dry.
#[derive(Debug, Clone)]
pub struct IntGen {
    used: HashSet<i64>,
    range: i64,
}

impl IntGen {
    pub fn new(range: i64) -> Self {
        Self {
            used: HashSet::new(),
            range: range.max(1),
        }
    }

    pub fn generate(&mut self, rng: &mut StdRng) -> i64 {
        let mut misses = 0;
        loop {
            let value = rng.random_range(-self.range..=self.range);
            if self.used.insert(value) {
                return value;
            }
            misses += 1;
            if misses > 16 {
                self.range = self.range.saturating_mul(2);
                misses = 0;
            }
        }
    }

    pub fn is_used(&self, value: i64) -> bool {
        self.used.contains(&value)
    }
}

/// A `goto` placeholder found in a block body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goto {
    pub target: String,
    pub kind: EdgeKind,
}

/// Arena of every block of one flattening target.
#[derive(Debug)]
pub struct BlockGraph {
    pub blocks: IndexMap<String, BasicBlock>,
    pub state_vars: Vec<String>,
    pub start_label: String,
    pub end_label: String,
    /// Callee name of the `goto` placeholder calls.
    pub goto_marker: String,
    totals: IntGen,
    state_range: i64,
    label_counter: usize,
    previous_values: Option<Vec<i64>>,
}

impl BlockGraph {
    /// Creates the arena with its terminal block already in place.
    pub fn new(
        state_vars: Vec<String>,
        goto_marker: String,
        state_range: i64,
        root_scope: ScopeId,
        rng: &mut StdRng,
    ) -> Self {
        assert!(!state_vars.is_empty(), "flattening needs at least one state variable");
        let mut graph = Self {
            blocks: IndexMap::new(),
            state_vars,
            start_label: String::new(),
            end_label: String::new(),
            goto_marker,
            totals: IntGen::new(state_range),
            state_range: state_range.max(1),
            label_counter: 0,
            previous_values: None,
        };
        graph.start_label = graph.new_label();
        graph.end_label = graph.new_label();
        let end = graph.end_label.clone();
        graph.create_block(end, root_scope, BlockKind::End, rng);
        graph
    }

    pub fn new_label(&mut self) -> String {
        let label = format!("block_{}", self.label_counter);
        self.label_counter += 1;
        label
    }

    /// Creates an empty block under `label` with freshly assigned state values.
    pub fn create_block(
        &mut self,
        label: String,
        scope: ScopeId,
        kind: BlockKind,
        rng: &mut StdRng,
    ) -> &mut BasicBlock {
        assert!(
            !self.blocks.contains_key(&label),
            "duplicate block label {label}"
        );
        let (total_state, state_values) = self.assign_state(rng);
        let block = BasicBlock {
            label: label.clone(),
            total_state,
            state_values,
            body: Vec::new(),
            scope,
            kind,
        };
        self.blocks.entry(label).or_insert(block)
    }

    /// Picks a fresh total and splits it across the state variables.
    ///
    /// Coordinates are often carried over from the previously created block so that consecutive
    /// blocks differ in only a few variables; one coordinate is then forced so the sum matches.
    fn assign_state(&mut self, rng: &mut StdRng) -> (i64, Vec<i64>) {
        let total = self.totals.generate(rng);
        let n = self.state_vars.len();
        let mut values: Vec<i64> = (0..n)
            .map(|i| match &self.previous_values {
                Some(prev) if rng.random_bool(0.5) => prev[i],
                _ => rng.random_range(-self.state_range..=self.state_range),
            })
            .collect();
        let fixed = rng.random_range(0..n);
        let others: i64 = values
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != fixed)
            .map(|(_, v)| *v)
            .sum();
        values[fixed] = total - others;
        assert_eq!(
            values.iter().sum::<i64>(),
            total,
            "state values must sum to the block total"
        );
        self.previous_values = Some(values.clone());
        (total, values)
    }

    /// A value no block uses as its total, reserved so later blocks never take it either.
    pub fn fresh_unused_state(&mut self, rng: &mut StdRng) -> i64 {
        self.totals.generate(rng)
    }

    pub fn get(&self, label: &str) -> &BasicBlock {
        match self.blocks.get(label) {
            Some(block) => block,
            None => panic!("unknown block label {label}"),
        }
    }

    pub fn get_mut(&mut self, label: &str) -> &mut BasicBlock {
        match self.blocks.get_mut(label) {
            Some(block) => block,
            None => panic!("unknown block label {label}"),
        }
    }

    pub fn push(&mut self, label: &str, stmt: Stmt) {
        self.get_mut(label).body.push(stmt);
    }

    /// Builds `marker("label", "kind");`.
    pub fn goto(&self, target: &str, kind: EdgeKind) -> Stmt {
        let kind = match kind {
            EdgeKind::Jump => "jump",
            EdgeKind::Branch => "branch",
            EdgeKind::Dead => "dead",
        };
        Stmt::Expr(ExprStmt {
            span: DUMMY_SP,
            expr: Box::new(Expr::Call(CallExpr {
                span: DUMMY_SP,
                ctxt: SyntaxContext::empty(),
                callee: Callee::Expr(Box::new(ident_expr(&self.goto_marker))),
                args: vec![str_arg(target), str_arg(kind)],
                type_args: None,
            })),
        })
    }

    /// Decodes a statement produced by [`BlockGraph::goto`].
    pub fn as_goto(&self, stmt: &Stmt) -> Option<Goto> {
        let Stmt::Expr(ExprStmt { expr, .. }) = stmt else {
            return None;
        };
        let Expr::Call(call) = &**expr else {
            return None;
        };
        let Callee::Expr(callee) = &call.callee else {
            return None;
        };
        if !matches!(&**callee, Expr::Ident(id) if *id.sym == *self.goto_marker) {
            return None;
        }
        let arg = |i: usize| match call.args.get(i).map(|a| &*a.expr) {
            Some(Expr::Lit(Lit::Str(s))) => Some(s.value.to_string()),
            _ => None,
        };
        let kind = match arg(1)?.as_str() {
            "jump" => EdgeKind::Jump,
            "branch" => EdgeKind::Branch,
            "dead" => EdgeKind::Dead,
            _ => return None,
        };
        Some(Goto {
            target: arg(0)?,
            kind,
        })
    }

    /// Every `goto` in `stmts`, including those nested in `if` arms, in source order.
    pub fn gotos_in(&self, stmts: &[Stmt]) -> Vec<Goto> {
        let mut finder = GotoFinder {
            graph: self,
            found: Vec::new(),
        };
        for stmt in stmts {
            stmt.visit_with(&mut finder);
        }
        finder.found
    }

    /// Checks the arena-wide invariants: unique totals, consistent sums, resolvable targets,
    /// and an empty terminal block.
    pub fn check_invariants(&self) {
        let mut totals = HashSet::new();
        for block in self.blocks.values() {
            assert!(
                totals.insert(block.total_state),
                "duplicate total state {} at {}",
                block.total_state,
                block.label
            );
            assert_eq!(
                block.state_values.iter().sum::<i64>(),
                block.total_state,
                "state values of {} do not sum to its total",
                block.label
            );
            for goto in self.gotos_in(&block.body) {
                assert!(
                    self.blocks.contains_key(&goto.target),
                    "goto from {} targets unknown label {}",
                    block.label,
                    goto.target
                );
            }
        }
        assert!(
            self.get(&self.end_label).body.is_empty(),
            "the end block must stay empty"
        );
    }
}

fn str_arg(value: &str) -> ExprOrSpread {
    ExprOrSpread {
        spread: None,
        expr: Box::new(str_expr(value)),
    }
}

struct GotoFinder<'a> {
    graph: &'a BlockGraph,
    found: Vec<Goto>,
}

impl Visit for GotoFinder<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match self.graph.as_goto(stmt) {
            Some(goto) => self.found.push(goto),
            None => stmt.visit_children_with(self),
        }
    }

    fn visit_function(&mut self, _: &Function) {}

    fn visit_arrow_expr(&mut self, _: &ArrowExpr) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn graph(rng: &mut StdRng) -> BlockGraph {
        BlockGraph::new(
            vec!["a".into(), "b".into(), "c".into()],
            "goto_".into(),
            250,
            0,
            rng,
        )
    }

    #[test]
    fn test_state_values_sum_to_unique_totals() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut g = graph(&mut rng);
        for _ in 0..200 {
            let label = g.new_label();
            g.create_block(label, 0, BlockKind::Real, &mut rng);
        }
        g.check_invariants();
        let totals: HashSet<i64> = g.blocks.values().map(|b| b.total_state).collect();
        assert_eq!(totals.len(), g.blocks.len(), "totals must be unique");
    }

    #[test]
    fn test_intgen_widens_when_exhausted() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut ints = IntGen::new(2);
        let values: HashSet<i64> = (0..20).map(|_| ints.generate(&mut rng)).collect();
        assert_eq!(values.len(), 20, "a 5-value range must widen to fit 20 draws");
        assert!(values.iter().all(|v| ints.is_used(*v)));
    }

    #[test]
    fn test_goto_roundtrip() {
        let mut rng = StdRng::seed_from_u64(1);
        let g = graph(&mut rng);
        let stmt = g.goto("block_9", EdgeKind::Branch);
        assert_eq!(
            g.as_goto(&stmt),
            Some(Goto {
                target: "block_9".into(),
                kind: EdgeKind::Branch
            })
        );
        assert_eq!(g.as_goto(&tangle_core::ast::expr_stmt(ident_expr("x"))), None);
    }

    #[test]
    #[should_panic(expected = "duplicate block label")]
    fn test_duplicate_label_panics() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut g = graph(&mut rng);
        let end = g.end_label.clone();
        g.create_block(end, 0, BlockKind::Real, &mut rng);
    }

    #[test]
    #[should_panic(expected = "unknown label")]
    fn test_unknown_goto_target_panics() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut g = graph(&mut rng);
        let start = g.start_label.clone();
        g.create_block(start.clone(), 0, BlockKind::Real, &mut rng);
        let stmt = g.goto("nowhere", EdgeKind::Jump);
        g.push(&start, stmt);
        g.check_invariants();
    }
}
