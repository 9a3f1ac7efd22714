//! Partial evaluation: constant folding, identity laws, branch discarding,
//! let rebuilding and the uninlining pass.

use mantra::{evaluate_partial, parse, partial_env, print_expr, uninline, Expr};
use pretty_assertions::assert_eq;
use serde_json::json;

fn reduce_with(
    known: Vec<(&str, serde_json::Value)>,
    source: &str,
) -> mantra::AstNode {
    let env = partial_env(known.into_iter().map(|(k, v)| (k.to_string(), v)));
    let ast = parse(source).unwrap_or_else(|e| panic!("parse failed for {source:?}: {e}"));
    evaluate_partial(&env, &ast)
}

fn simplify(known: Vec<(&str, serde_json::Value)>, source: &str) -> String {
    print_expr(&uninline(&reduce_with(known, source)))
}

// ============================================================================
// CONSTANT FOLDING AND RESIDUALS
// ============================================================================

#[test]
fn pure_arithmetic_folds_completely() {
    assert_eq!(simplify(vec![], "1 + 2 * 3"), "7");
    assert_eq!(simplify(vec![], "$sum([1, 2, 3])"), "6");
    assert_eq!(simplify(vec![], "\"a\" = \"a\""), "true");
}

#[test]
fn known_variables_fold_into_expressions() {
    assert_eq!(simplify(vec![("rate", json!(0.25))], "$rate * 100"), "25");
}

#[test]
fn unknown_names_stay_symbolic_without_errors() {
    let residual = reduce_with(vec![], "$x + 1");
    let Expr::Call(call) = residual.expr.as_ref() else {
        panic!("expected residual call, got {residual:?}")
    };
    assert_eq!(call.function, "+");
    assert!(matches!(call.args[0].expr.as_ref(), Expr::Var(n) if n == "x"));
}

#[test]
fn unknown_properties_stay_symbolic() {
    assert_eq!(simplify(vec![], "price * 2"), "price * 2");
}

#[test]
fn unknown_functions_are_legitimate_residuals() {
    assert_eq!(simplify(vec![], "$custom(1 + 1)"), "$custom(2)");
}

// ============================================================================
// IDENTITY LAWS
// ============================================================================

#[test]
fn and_drops_known_true_operands() {
    assert_eq!(simplify(vec![], "$x and true"), "$and($x)");
    assert_eq!(simplify(vec![], "true and $x and true and $y"), "$x and $y");
}

#[test]
fn and_truncates_at_known_false() {
    // A leading false decides the chain outright; behind a symbolic operand
    // it only ends the chain, because `$x` may still be null or non-boolean
    // and that outcome wins first.
    assert_eq!(simplify(vec![], "false and $x"), "false");
    assert_eq!(simplify(vec![], "$x and false and $y"), "$x and false");
}

#[test]
fn or_drops_known_false_operands() {
    assert_eq!(simplify(vec![], "false or $x or false or $y"), "$x or $y");
}

#[test]
fn or_truncates_at_known_true() {
    assert_eq!(simplify(vec![], "true or $x"), "true");
    assert_eq!(simplify(vec![], "$x or true"), "$x or true");
}

#[test]
fn chains_of_zero_symbolic_operands_are_their_identity() {
    assert_eq!(simplify(vec![], "true and true"), "true");
    assert_eq!(simplify(vec![], "false or false"), "false");
}

#[test]
fn null_short_circuits_boolean_chains() {
    assert_eq!(simplify(vec![], "$x and null and $y"), "null");
}

// ============================================================================
// CONDITIONALS
// ============================================================================

#[test]
fn known_condition_discards_the_other_branch() {
    assert_eq!(simplify(vec![("flag", json!(true))], "$flag ? $a : $boom(1)"), "$a");
    assert_eq!(simplify(vec![("flag", json!(false))], "$flag ? $boom(1) : $b"), "$b");
}

#[test]
fn unknown_condition_keeps_both_branches_partially_evaluated() {
    assert_eq!(simplify(vec![], "$c ? 1 + 1 : 2 * 2"), "$c ? 2 : 4");
}

#[test]
fn coalesce_resolves_when_left_is_known() {
    assert_eq!(simplify(vec![("a", json!(5))], "$a ?? $b"), "5");
    assert_eq!(simplify(vec![("a", json!(null))], "$a ?? $b"), "$b");
    assert_eq!(simplify(vec![], "$a ?? 2 + 3"), "$a ?? 5");
}

// ============================================================================
// LET REBUILDING
// ============================================================================

#[test]
fn spec_scenario_tax_pipeline() {
    let simplified = simplify(
        vec![("taxRate", json!(0.08)), ("discount", json!(0.1))],
        "let $s := price, $d := $s * (1 - discount), $t := $d * (1 + taxRate) in $t",
    );
    assert_eq!(simplified, "let $d := price * 0.9, $t := $d * 1.08 in $t");
}

#[test]
fn unused_bindings_are_eliminated() {
    assert_eq!(simplify(vec![], "let $u := $expensive($x), $k := 1 in $k"), "1");
}

#[test]
fn simple_bindings_inline_and_fold() {
    assert_eq!(
        simplify(vec![("rate", json!(2))], "let $r := $rate in $r * 3"),
        "6"
    );
}

#[test]
fn fully_known_lets_disappear() {
    assert_eq!(simplify(vec![], "let $a := 2, $b := $a + 1 in $a + $b"), "5");
}

#[test]
fn self_reference_is_preserved_residually() {
    assert_eq!(simplify(vec![], "let $x := $x in $x"), "let $x := $x in $x");
}

// ============================================================================
// UNINLINING
// ============================================================================

#[test]
fn repeated_inlined_properties_are_rebound() {
    // `$p` inlines to the `site` property twice; uninline hoists it back.
    let simplified = simplify(vec![], "let $p := site in $p + $p");
    assert_eq!(simplified, "let $p := site in $p + $p");
}

#[test]
fn single_occurrences_stay_inline() {
    assert_eq!(simplify(vec![], "let $p := site in $p + 1"), "site + 1");
}

#[test]
fn uninline_is_idempotent_over_partial_results() {
    let residual = reduce_with(
        vec![],
        "let $p := site, $q := $p * ($p + 1) in $q ? $p : $q",
    );
    let once = uninline(&residual);
    let twice = uninline(&once);
    assert_eq!(once, twice);
    assert_eq!(print_expr(&once), print_expr(&twice));
}

#[test]
fn collection_residuals_keep_callbacks_raw() {
    let simplified = simplify(vec![], "$sum(nums[$i => $this() >= 3])");
    assert_eq!(simplified, "$sum(nums[$i => $this() >= 3])");
}

#[test]
fn known_data_folds_collection_calls() {
    assert_eq!(
        simplify(vec![("nums", json!([1, 4, 5]))], "$sum($nums[$i => $this() >= 3])"),
        "9"
    );
}
