use crate::harness::{eager_options, obfuscate, run_js};
use petgraph::algo::has_path_connecting;
use std::collections::HashSet;
use swc_core::ecma::ast::{Decl, Program, Stmt};
use tangle_core::names::IdentifierStrategy;
use tangle_core::report::{BlockKind, FlatteningReport};
use tangle_core::{parse, with_globals};
use tangle_transform::options::ObfuscationOptions;

const PROGRAM: &str = r#"
function classify(n) {
  var kind = 'none';
  if (n > 0) {
    kind = 'positive';
    if (n > 100) { kind = 'huge'; }
  } else {
    if (n < 0) { kind = 'negative'; }
  }
  function describe(k) { var text = k + '!'; return text; }
  return describe(kind);
}
print(classify(5)); print(classify(500)); print(classify(-1)); print(classify(0));
"#;

fn reports_for(seed: u64, options: ObfuscationOptions) -> Vec<FlatteningReport> {
    obfuscate(PROGRAM, seed, options).reports
}

#[test]
fn test_state_values_sum_to_unique_totals() {
    for seed in 0..30 {
        for report in reports_for(seed, eager_options()) {
            let mut totals = HashSet::new();
            let mut labels = HashSet::new();
            for block in &report.blocks {
                assert_eq!(
                    block.state_values.iter().sum::<i64>(),
                    block.total_state,
                    "seed {seed}: {} in {}",
                    block.label,
                    report.target
                );
                assert_eq!(block.state_values.len(), report.state_vars.len());
                assert!(totals.insert(block.total_state), "seed {seed}: duplicate total");
                assert!(labels.insert(block.label.clone()), "seed {seed}: duplicate label");
            }
            assert!((2..=5).contains(&report.state_vars.len()));
        }
    }
}

#[test]
fn test_every_goto_is_resolved() {
    for seed in 0..30 {
        let result = obfuscate(PROGRAM, seed, eager_options());
        for marker in ["\"jump\"", "\"branch\"", "\"dead\""] {
            assert!(
                !result.obfuscated_code.contains(marker),
                "seed {seed}: goto placeholder left in output"
            );
        }
        for report in &result.reports {
            let labels: HashSet<&str> = report.blocks.iter().map(|b| b.label.as_str()).collect();
            for edge in &report.edges {
                assert!(labels.contains(edge.to.as_str()), "seed {seed}: dangling edge");
            }
            let end = report.block(&report.end_label).unwrap();
            assert_eq!(end.kind, BlockKind::End);
            assert_eq!(end.statements, 0, "the end block stays empty");
        }
    }
}

#[test]
fn test_injected_blocks_are_unreachable() {
    let mut injected = 0;
    for seed in 0..30 {
        for report in reports_for(seed, eager_options()) {
            let reachable = report.reachable_labels();
            assert!(reachable.contains(&report.start_label));
            for block in &report.blocks {
                match block.kind {
                    BlockKind::Fake | BlockKind::Clone => {
                        injected += 1;
                        assert!(
                            !reachable.contains(&block.label),
                            "seed {seed}: {:?} block {} is reachable in {}",
                            block.kind,
                            block.label,
                            report.target
                        );
                    }
                    BlockKind::Real | BlockKind::End => {}
                }
            }

            let (graph, index) = report.graph();
            assert!(
                has_path_connecting(&graph, index[&report.start_label], index[&report.end_label], None),
                "seed {seed}: the end block is reachable from the start"
            );
        }
    }
    assert!(injected > 0, "dead code should have been injected");
}

#[test]
fn test_dead_code_is_inert() {
    let expected = run_js(PROGRAM).unwrap();
    assert_eq!(expected, "positive!|huge!|negative!|none!");
    for seed in 0..15 {
        for dead_code in [false, true] {
            let options = ObfuscationOptions {
                dead_code,
                ..eager_options()
            };
            let result = obfuscate(PROGRAM, seed, options);
            let has_injected = result.reports.iter().any(|r| {
                r.blocks
                    .iter()
                    .any(|b| matches!(b.kind, BlockKind::Fake | BlockKind::Clone))
            });
            assert_eq!(has_injected, dead_code);
            assert_eq!(run_js(&result.obfuscated_code).unwrap(), expected);
        }
    }
}

#[test]
fn test_sibling_functions_have_independent_scopes() {
    let source = |name: &str| {
        format!(
            "function A() {{ var {name} = 1; {name} = {name} + 1; return {name}; }}\n\
             function B() {{ var x = 10; x = x * 2; return x; }}\n\
             print(A()); print(B());"
        )
    };
    let options = ObfuscationOptions {
        rename_globals: false,
        identifier_generator: IdentifierStrategy::Numbered,
        ..eager_options()
    };
    let property = |reports: &[FlatteningReport], target: &str, name: &str| -> String {
        let report = reports.iter().find(|r| r.target == target).unwrap();
        report
            .scopes
            .iter()
            .flat_map(|s| &s.names)
            .find(|(original, _)| original == name)
            .map(|(_, property)| property.clone())
            .unwrap()
    };

    let with_x = obfuscate(&source("x"), 9, options.clone()).reports;
    let with_y = obfuscate(&source("y"), 9, options).reports;

    assert_eq!(
        property(&with_x, "B", "x"),
        property(&with_y, "B", "x"),
        "renaming A's local must not touch B"
    );
    assert_eq!(property(&with_x, "A", "x"), property(&with_y, "A", "y"));
    assert_ne!(property(&with_x, "A", "x"), property(&with_x, "B", "x"));
}

#[test]
fn test_arguments_user_is_left_alone() {
    let source = "function usesArgs(a) { var t = a; t = t + arguments.length; return t; }\n\
                  function plain(a) { var t = a; t = t + 1; return t; }\n\
                  print(usesArgs(1, 2, 3)); print(plain(1));";
    for rename_globals in [false, true] {
        let options = ObfuscationOptions {
            rename_globals,
            ..eager_options()
        };
        let result = obfuscate(source, 4, options);
        assert!(result.reports.iter().all(|r| r.target != "usesArgs"));
        assert!(
            result.reports.iter().any(|r| r.target == "plain"
                || r.relocated_entries.iter().any(|(name, _)| name == "plain"))
        );
        assert_eq!(run_js(&result.obfuscated_code).unwrap(), "4|2");

        let code = result.obfuscated_code;
        with_globals(|| {
            let ir = parse(&code, "out.js").unwrap();
            let body = find_function_body(&ir.program, "usesArgs")
                .unwrap_or_else(|| panic!("usesArgs must survive as a function:\n{code}"));
            assert_eq!(body.len(), 3, "body must keep its three statements:\n{code}");
            assert!(matches!(&body[0], Stmt::Decl(Decl::Var(_))));
        });
    }
}

/// Finds the body of a function called `name`, whether it is still a declaration or was
/// turned into a named function expression.
fn find_function_body(program: &Program, name: &str) -> Option<Vec<Stmt>> {
    use swc_core::ecma::ast::{FnDecl, FnExpr};
    use swc_core::ecma::visit::{Visit, VisitWith};

    struct Finder<'a> {
        name: &'a str,
        found: Option<Vec<Stmt>>,
    }

    impl Visit for Finder<'_> {
        fn visit_fn_decl(&mut self, decl: &FnDecl) {
            if &*decl.ident.sym == self.name {
                self.found = decl.function.body.as_ref().map(|b| b.stmts.clone());
            }
            decl.visit_children_with(self);
        }

        fn visit_fn_expr(&mut self, expr: &FnExpr) {
            if expr.ident.as_ref().is_some_and(|id| &*id.sym == self.name) {
                self.found = expr.function.body.as_ref().map(|b| b.stmts.clone());
            }
            expr.visit_children_with(self);
        }
    }

    let mut finder = Finder { name, found: None };
    program.visit_with(&mut finder);
    finder.found
}

#[test]
fn test_short_functions_respect_min_statements() {
    let source = "function tiny(a) { return a; }\nfunction big(a) { var b = a; b = b + 1; return b; }\nprint(tiny(1) + big(1));";
    let options = ObfuscationOptions {
        rename_globals: false,
        min_statements: 3,
        ..ObfuscationOptions::default()
    };
    let result = obfuscate(source, 1, options);
    let targets: Vec<&str> = result.reports.iter().map(|r| r.target.as_str()).collect();
    assert_eq!(targets, vec!["big"]);
    assert_eq!(run_js(&result.obfuscated_code).unwrap(), "3");
}

#[test]
fn test_per_name_probability() {
    let source = "function keep(a) { var b = a; return b; }\nfunction flat(a) { var b = a; return b; }\nprint(keep(1) + flat(2));";
    let options: ObfuscationOptions = serde_json::from_value(serde_json::json!({
        "control_flow_flattening": { "flat": 1.0, "*": 0.0 },
        "rename_globals": false,
        "min_statements": 1
    }))
    .unwrap();
    for seed in 0..5 {
        let result = obfuscate(source, seed, options.clone());
        let targets: Vec<&str> = result.reports.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["flat"], "seed {seed}");
    }
}

#[test]
fn test_seed_determinism() {
    let a = obfuscate(PROGRAM, 17, eager_options());
    let b = obfuscate(PROGRAM, 17, eager_options());
    let c = obfuscate(PROGRAM, 18, eager_options());
    assert_eq!(a.obfuscated_code, b.obfuscated_code);
    assert_ne!(a.obfuscated_code, c.obfuscated_code);
}

#[test]
fn test_modules_with_exports_keep_their_top_level() {
    let source = "import x from 'dep';\nexport function f(a) { var b = a; if (b) { b = 2; } return b; }";
    let result = obfuscate(source, 2, eager_options());
    assert!(result.reports.iter().all(|r| r.target != "<program>"));
    assert!(result.reports.iter().any(|r| r.target == "f"));
    assert!(result.obfuscated_code.contains("import x from"));
    assert!(result.obfuscated_code.contains("export function f"));
}
