//! Surface-syntax coverage through the public API: spans, diagnostics and
//! the full sugar inventory.

use mantra::{parse, parse_with_source, print_expr, to_canonical, Expr};
use pretty_assertions::assert_eq;

fn printed(source: &str) -> String {
    print_expr(&parse(source).unwrap_or_else(|e| panic!("parse failed for {source:?}: {e}")))
}

#[test]
fn full_sugar_inventory_parses() {
    for source in [
        "1 + 2.5e3 - 4 * 5 / 6 % 7",
        "a = b or c != d and e <= f",
        "x ?? y ?? z",
        "cond ? \"y\" : 'n'",
        "!done and -count < 0",
        "[1, [2, 3], {a: 4}]",
        "{key: value, \"spaced key\": 2}",
        "$sum(items . values)",
        "$first(nums, $i => $this() > 2)",
        "let $a := 1, $b := $a + 1 in $b",
        "`total: {a + b} items`",
        "items[0].child[\"k\"]",
        "// leading comment\n1 /* inline */ + 2",
    ] {
        parse(source).unwrap_or_else(|e| panic!("parse failed for {source:?}: {e}"));
    }
}

#[test]
fn spans_cover_the_source_range() {
    let node = parse("  1 + 2").unwrap();
    let span = node.span.expect("binary call is spanned");
    assert_eq!(&"  1 + 2"[span.start..span.end], "1 + 2");
}

#[test]
fn property_versus_variable() {
    assert!(matches!(
        parse("price").unwrap().expr.as_ref(),
        Expr::Property(p) if p == "price"
    ));
    assert!(matches!(
        parse("$price").unwrap().expr.as_ref(),
        Expr::Var(v) if v == "price"
    ));
}

#[test]
fn single_quoted_strings() {
    let node = parse("'it\\'s'").unwrap();
    assert_eq!(node.as_value().and_then(|v| v.as_str()), Some("it's"));
}

#[test]
fn keywords_do_not_parse_as_identifiers() {
    assert!(parse("let").is_err());
    assert!(parse("null + 1").is_ok());
    // `lettuce` is an ordinary identifier despite the prefix.
    assert!(matches!(
        parse("lettuce").unwrap().expr.as_ref(),
        Expr::Property(p) if p == "lettuce"
    ));
}

#[test]
fn boolean_chains_are_flat() {
    let node = parse("a and b and c").unwrap();
    let Expr::Call(call) = node.expr.as_ref() else {
        panic!("expected call")
    };
    assert_eq!(call.function, "and");
    assert_eq!(call.args.len(), 3);
}

#[test]
fn parse_errors_carry_locations() {
    let err = parse_with_source("1 + @", "check.expr").unwrap_err();
    assert!(err.span.start >= 4, "span {:?}", err.span);
    assert!(err.message().contains("parse error"), "{}", err.message());

    for bad in ["\"open", "`open {a}", "(1 + 2", "{a: }", "let $x := in 1", "1 +"] {
        assert!(parse(bad).is_err(), "expected failure for {bad:?}");
    }
}

#[test]
fn print_parse_print_is_stable() {
    for source in [
        "1 + 2 * 3",
        "(1 + 2) * 3",
        "items[0].name",
        "a ?? b ? c : d",
        "$sum(nums[$i => $this() >= 3])",
        "let $a := x * 2, $b := $a in $b",
        "{k: [1, 2], \"s p\": `v {x}`}",
    ] {
        let first = printed(source);
        let second = printed(&first);
        assert_eq!(first, second, "printing is not a fixed point for {source:?}");
        assert_eq!(
            to_canonical(&parse(&first).unwrap()),
            to_canonical(&parse(source).unwrap()),
            "canonical drift for {source:?}"
        );
    }
}
