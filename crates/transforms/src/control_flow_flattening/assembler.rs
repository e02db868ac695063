//! Switch assembly: folds the rewritten blocks into one dispatch function and emits the
//! prologue that replaces the target body.

use super::builder::FlatteningContext;
use rand::Rng;
use rand::seq::SliceRandom;
use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::{BinaryOp, CondExpr, Expr, Stmt, SwitchCase, SwitchStmt};
use swc_core::ecma::visit::{VisitMut, VisitMutWith};
use tangle_core::ast::{bin, bool_expr, ident_expr, num_expr, paren};
use tangle_core::template::{Binding, Template};
use tangle_utils::errors::{TemplateError, TransformError};

/// Share of cases whose test is disguised as an expression over one state variable.
const COMPLEX_TEST_RATIO: f64 = 0.25;
/// Share of cases that get decoy labels when fake tests are on.
const FAKE_TEST_RATIO: f64 = 0.5;

/// Builds the statements that replace the target body, after directives and imports.
///
/// Block bodies are moved into the switch, so the graph is left with empty blocks.
pub fn assemble(ctx: &mut FlatteningContext<'_>) -> Result<Vec<Stmt>, TransformError> {
    let cases = build_cases(ctx);
    let state_vars = ctx.graph.state_vars.clone();
    let start_values = ctx.graph.get(&ctx.graph.start_label).state_values.clone();

    let mut out = Vec::new();
    let declare = Template::parse("var $name = $value;")?;
    for (var, value) in state_vars.iter().zip(&start_values) {
        out.push(declare.statement(&[
            ("name", Binding::Ident(var.clone())),
            ("value", Binding::Expr(num_expr(*value))),
        ])?);
    }
    if let Some(flag) = &ctx.did_return {
        out.push(declare.statement(&[
            ("name", Binding::Ident(flag.clone())),
            ("value", Binding::Expr(bool_expr(false))),
        ])?);
    }
    out.push(dispatch_function(ctx, cases)?);

    let keys: Vec<String> = (0..state_vars.len()).map(|i| format!("s{i}")).collect();
    let args: Vec<String> = keys.iter().map(|k| format!("${k}")).collect();
    let call = format!("$dispatch({}, void 0, {{}})", args.join(", "));
    let mut bindings: Vec<(&str, Binding)> = keys
        .iter()
        .map(String::as_str)
        .zip(state_vars.iter().map(|v| Binding::Ident(v.clone())))
        .collect();
    bindings.push(("dispatch", Binding::Ident(ctx.dispatch_name.clone())));

    match &ctx.did_return {
        Some(flag) => {
            let result = ctx.names.generate(ctx.rng);
            bindings.push(("flag", Binding::Ident(flag.clone())));
            bindings.push(("result", Binding::Ident(result)));
            let text = format!("var $result = {call}; if ($flag) return $result;");
            out.extend(Template::parse(&text)?.compile(&bindings)?);
        }
        None => out.push(Template::parse(&format!("{call};"))?.statement(&bindings)?),
    }
    Ok(out)
}

/// `function dispatch(s0, ..., args, frame) { while (sum !== END) { L: switch (sum) {...} } }`
fn dispatch_function(
    ctx: &FlatteningContext<'_>,
    cases: Vec<SwitchCase>,
) -> Result<Stmt, TransformError> {
    let count = ctx.graph.state_vars.len();
    let params: Vec<String> = (0..count).map(|i| format!("$s{i}")).collect();
    let sum = params.join(" + ");
    let text = format!(
        "function $dispatch({}, $args, $frame) {{ while ({sum} !== $end) {{ $label: switch ({sum}) {{}} }} }}",
        params.join(", "),
    );

    let keys: Vec<String> = (0..count).map(|i| format!("s{i}")).collect();
    let mut bindings: Vec<(&str, Binding)> = keys
        .iter()
        .map(String::as_str)
        .zip(ctx.graph.state_vars.iter().map(|v| Binding::Ident(v.clone())))
        .collect();
    let end = ctx.graph.get(&ctx.graph.end_label).total_state;
    bindings.extend([
        ("dispatch", Binding::Ident(ctx.dispatch_name.clone())),
        ("args", Binding::Ident(ctx.args_name.clone())),
        ("frame", Binding::Ident(ctx.scopes.object_name.clone())),
        ("label", Binding::Ident(ctx.switch_label.clone())),
        ("end", Binding::Expr(num_expr(end))),
    ]);

    let mut function = Template::parse(&text)?.statement(&bindings)?;
    let mut fill = FillSwitch { cases: Some(cases) };
    function.visit_mut_with(&mut fill);
    if fill.cases.is_some() {
        return Err(TemplateError::UnexpectedShape("a dispatch switch").into());
    }
    Ok(function)
}

struct FillSwitch {
    cases: Option<Vec<SwitchCase>>,
}

impl VisitMut for FillSwitch {
    fn visit_mut_switch_stmt(&mut self, switch: &mut SwitchStmt) {
        if let Some(cases) = self.cases.take() {
            switch.cases = cases;
        }
    }
}

/// One group of labels per block, in shuffled order; the last label of a group carries the
/// body.
fn build_cases(ctx: &mut FlatteningContext<'_>) -> Vec<SwitchCase> {
    let end = ctx.graph.end_label.clone();
    let mut labels: Vec<String> = ctx
        .graph
        .blocks
        .keys()
        .filter(|l| **l != end)
        .cloned()
        .collect();
    labels.shuffle(ctx.rng);
    let default_at = (ctx.config.fake_tests && !labels.is_empty())
        .then(|| ctx.rng.random_range(0..labels.len()));

    let mut cases = Vec::new();
    for (index, label) in labels.iter().enumerate() {
        let test = if ctx.config.complex_tests && ctx.rng.random_bool(COMPLEX_TEST_RATIO) {
            complex_test(ctx, label)
        } else {
            num_expr(ctx.graph.get(label).total_state)
        };
        let mut tests = vec![Some(test)];
        if ctx.config.fake_tests && ctx.rng.random_bool(FAKE_TEST_RATIO) {
            for _ in 0..ctx.rng.random_range(1..=3) {
                tests.push(Some(num_expr(ctx.graph.fresh_unused_state(ctx.rng))));
            }
        }
        if default_at == Some(index) {
            tests.push(None);
        }
        tests.shuffle(ctx.rng);

        let mut body = Some(std::mem::take(&mut ctx.graph.get_mut(label).body));
        let last = tests.len() - 1;
        for (i, test) in tests.into_iter().enumerate() {
            let cons = if i == last {
                body.take().unwrap_or_default()
            } else {
                Vec::new()
            };
            cases.push(SwitchCase {
                span: DUMMY_SP,
                test: test.map(Box::new),
                cons,
            });
        }
    }
    cases
}

/// `guards ? s_i - (v_i - total) : unmatched`
///
/// While block `b` runs, the core expression equals `b`'s total only if
/// `b.state_values[i] - b.total_state` equals this block's offset; every other block with that
/// property is excluded by a guard on a coordinate where it differs.
fn complex_test(ctx: &mut FlatteningContext<'_>, label: &str) -> Expr {
    let i = ctx.rng.random_range(0..ctx.graph.state_vars.len());
    let owner = ctx.graph.get(label);
    let offset = owner.state_values[i] - owner.total_state;

    let mut guards = Vec::new();
    for other in ctx.graph.blocks.values() {
        if other.label == owner.label || other.label == ctx.graph.end_label {
            continue;
        }
        if other.state_values[i] - offset != other.total_state {
            continue;
        }
        let Some(j) = (0..other.state_values.len())
            .find(|&j| other.state_values[j] != owner.state_values[j])
        else {
            panic!("blocks {} and {} share a state vector", owner.label, other.label);
        };
        guards.push(bin(
            BinaryOp::NotEqEq,
            ident_expr(&ctx.graph.state_vars[j]),
            num_expr(other.state_values[j]),
        ));
    }

    let core = bin(
        BinaryOp::Sub,
        ident_expr(&ctx.graph.state_vars[i]),
        paren(num_expr(offset)),
    );
    let test = guards.into_iter().reduce(|acc, g| bin(BinaryOp::LogicalAnd, acc, g));
    match test {
        None => paren(core),
        Some(test) => {
            let unmatched = ctx.graph.fresh_unused_state(ctx.rng);
            paren(Expr::Cond(CondExpr {
                span: DUMMY_SP,
                test: Box::new(test),
                cons: Box::new(core),
                alt: Box::new(num_expr(unmatched)),
            }))
        }
    }
}
