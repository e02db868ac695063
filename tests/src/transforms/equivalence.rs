use crate::harness::{assert_equivalent, eager_options};
use tangle_core::names::IdentifierStrategy;
use tangle_transform::options::ObfuscationOptions;

const SEEDS: std::ops::Range<u64> = 0..20;

/// Every case is checked with the program itself both flattened and left alone.
fn check(source: &str, expected: &str) {
    for rename_globals in [false, true] {
        let options = ObfuscationOptions {
            rename_globals,
            ..eager_options()
        };
        assert_eq!(assert_equivalent(source, SEEDS, &options), expected);
    }
}

#[test]
fn test_early_return_in_branch() {
    check(
        "function f(a, b) { if (a) { return b + 1; } return b - 1; }\nprint(f(true, 5)); print(f(false, 5));",
        "6|4",
    );
}

#[test]
fn test_early_return_inside_relocated_function() {
    check(
        "function outer() { function inner(x) { if (x) return 1; return 2; } return inner(true) + inner(false); }\nprint(outer());",
        "3",
    );
}

#[test]
fn test_closure_updates_parent_binding() {
    check(
        "function counter() { var n = 0; function inc() { n = n + 1; return n; } inc(); inc(); return inc(); }\nprint(counter()); print(counter());",
        "3|3",
    );
}

#[test]
fn test_block_scoped_shadowing() {
    check(
        "function g(x) { let y = 1; if (x > 0) { let y = 10; x = x + y; } else { const z = 5; x = x - z; } return x + y; }\nprint(g(1)); print(g(-1));",
        "12|-5",
    );
}

#[test]
fn test_default_and_rest_parameters_of_relocated_function() {
    check(
        "function h() { function sum(a, b = 2, ...rest) { var t = a + b; if (rest.length) { t = t + rest.length; } return t; } return sum(1) + ':' + sum(1, 1, 9, 9) + ':' + sum.length; }\nprint(h());",
        "3:4:1",
    );
}

#[test]
fn test_loops_stay_intact() {
    check(
        "function loop(n) { var acc = 0; for (var i = 0; i < n; i++) { if (i === 3) { continue; } acc += i; } while (acc > 100) { acc -= 100; } return acc + ',' + i; }\nprint(loop(5)); print(loop(30));",
        "7,5|32,30",
    );
}

#[test]
fn test_exceptions_are_preserved() {
    check(
        "function risky(x) { var r = 'ok'; try { if (x) { throw new Error('boom'); } } catch (e) { r = e.message; } finally { print('finally'); } return r; }\nprint(risky(false)); print(risky(true));",
        "finally|ok|finally|boom",
    );
}

#[test]
fn test_side_effect_order() {
    check(
        "function order(flag) { print('a'); if (flag) { print('b'); } else { print('c'); } print('d'); return 'e'; }\nprint(order(true)); print(order(false));",
        "a|b|d|e|a|c|d|e",
    );
}

#[test]
fn test_class_and_arrow_bindings() {
    check(
        "function mk() { class P { constructor(v) { this.v = v; } get() { return this.v; } } var k = 2; var f = (x) => x * k; k = 3; var p = new P(f(4)); return p.get(); }\nprint(mk());",
        "12",
    );
}

#[test]
fn test_recursion_through_relocated_declaration() {
    check(
        "function fib(n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); }\nprint(fib(10));",
        "55",
    );
}

#[test]
fn test_top_level_bindings_and_hoisting() {
    check(
        "print(typeof add); var total = 0; function add(v) { total = total + v; } add(2); add(3);\nif (total > 4) { print('big ' + total); } else { print('small'); }",
        "function|big 5",
    );
}

#[test]
fn test_destructuring_and_update_expressions() {
    check(
        "function d(o) { var { a, b: [c, d] } = o; let n = 0; n++; ++n; n += a; [c, d] = [d, c]; return [n, c, d].join('-'); }\nprint(d({ a: 4, b: [1, 2] }));",
        "6-2-1",
    );
}

#[test]
fn test_undefined_return_and_void_function() {
    check(
        "function nothing(x) { if (x) { return; } print('no return'); }\nprint(nothing(true)); print(nothing(false));",
        "undefined|no return|undefined",
    );
}

#[test]
fn test_nested_function_expressions_flatten_independently() {
    check(
        "function make(base) { var add = function adder(n) { var r = base + n; if (r > 10) { r = 10; } return r; }; return add; }\nprint(make(3)(4)); print(make(8)(9));",
        "7|10",
    );
}

/// Flattenable on its own, so every run below has at least one target.
const HELPER: &str = "function g(a) { var b = a; if (b) { b = b + 1; } return b; }";

#[test]
fn test_const_reassignment_still_throws() {
    check(
        &format!(
            "function f() {{ const c = 1; var m = 'ok'; try {{ c = 2; }} catch (e) {{ m = e.name; }} return m + c; }}\n{HELPER}\nprint(f()); print(g(1));"
        ),
        "TypeError1|2",
    );
}

#[test]
fn test_temporal_dead_zone_still_throws() {
    check(
        &format!(
            "function h() {{ var m = 'ok'; try {{ x; }} catch (e) {{ m = e.name; }} let x = 1; return m + x; }}\n{HELPER}\nprint(h()); print(g(1));"
        ),
        "ReferenceError1|2",
    );
    check(
        &format!(
            "try {{ early; }} catch (e) {{ print(e.name); }}\nlet early = 2;\n{HELPER}\nprint(early + g(1));"
        ),
        "ReferenceError|4",
    );
}

#[test]
fn test_every_feature_combination_is_equivalent() {
    let source = "function f(a, b) { var r = 0; if (a > b) { r = a - b; } else { r = b - a; } if (r === 0) { return true; } return r; }\nprint(f(5, 2)); print(f(2, 5)); print(f(3, 3));";
    for mask in 0..16u8 {
        let options = ObfuscationOptions {
            dead_code: mask & 1 != 0,
            complex_tests: mask & 2 != 0,
            fake_tests: mask & 4 != 0,
            mangle_literals: mask & 8 != 0,
            ..eager_options()
        };
        assert_eq!(assert_equivalent(source, 0..5, &options), "3|3|true");
    }
}

#[test]
fn test_every_identifier_strategy_is_equivalent() {
    let source = "function f(a) { var b = a * 2; if (b > 4) { b = b - 1; } return b; }\nprint(f(1)); print(f(3));";
    for strategy in [
        IdentifierStrategy::Hexadecimal,
        IdentifierStrategy::Mangled,
        IdentifierStrategy::Randomized,
        IdentifierStrategy::ZeroWidth,
        IdentifierStrategy::Numbered,
    ] {
        let options = ObfuscationOptions {
            identifier_generator: strategy,
            ..eager_options()
        };
        assert_eq!(assert_equivalent(source, 0..5, &options), "2|5");
    }
}

#[test]
fn test_small_state_range_is_still_equivalent() {
    let options = ObfuscationOptions {
        state_range: 2,
        ..eager_options()
    };
    let source = "function f(a) { var b = a; if (a) { b = 1; } else { b = 2; } if (b > 1) { b = b + 1; } return b; }\nprint(f(0)); print(f(1));";
    assert_eq!(assert_equivalent(source, SEEDS, &options), "3|1");
}
