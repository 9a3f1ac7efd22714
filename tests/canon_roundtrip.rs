//! Generated-AST round-trip properties: the canonical form is lossless, and
//! the pretty printer is lossless modulo the two documented normalizations.

use mantra::{from_canonical, normalize, parse, print_expr, to_canonical, AstNode, Value};
use proptest::prelude::*;

fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,6}".prop_filter("keywords are not identifiers", |s| {
        !matches!(s.as_str(), "let" | "in" | "and" | "or" | "true" | "false" | "null")
    })
}

/// Function names for generated calls; `string` and `object` are exercised
/// through their dedicated strategies so their sugar rules hold.
fn call_name() -> impl Strategy<Value = String> {
    ident().prop_filter("sugared built-ins generated separately", |s| {
        s != "string" && s != "object"
    })
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        (0u32..1000).prop_map(|n| Value::number(f64::from(n))),
        (1u32..400).prop_map(|n| Value::number(f64::from(n) / 4.0)),
        "[ -~]{0,8}".prop_map(Value::string),
        Just(Value::bool(true)),
        Just(Value::bool(false)),
        Just(Value::null()),
    ]
}

fn leaf() -> impl Strategy<Value = AstNode> {
    prop_oneof![
        4 => scalar().prop_map(AstNode::value),
        1 => prop::collection::vec(scalar(), 0..4).prop_map(|items| {
            AstNode::value(Value::list(items))
        }),
        1 => prop::collection::btree_map(ident(), scalar(), 0..3).prop_map(|fields| {
            AstNode::value(Value::map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, std::rc::Rc::new(v)))
                    .collect(),
            ))
        }),
        2 => ident().prop_map(AstNode::var),
        2 => ident().prop_map(AstNode::property),
    ]
}

fn expr() -> impl Strategy<Value = AstNode> {
    leaf().prop_recursive(4, 48, 4, |inner| {
        let binary_op = prop::sample::select(vec![
            "+", "-", "*", "/", "%", "=", "!=", "<", "<=", ">", ">=", "??", ".", "[",
        ]);
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(AstNode::array),
            (binary_op, inner.clone(), inner.clone())
                .prop_map(|(op, a, b)| AstNode::call(op, vec![a, b])),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(c, t, e)| AstNode::call("?", vec![c, t, e])),
            prop::collection::vec(inner.clone(), 2..4)
                .prop_map(|args| AstNode::call("and", args)),
            prop::collection::vec(inner.clone(), 2..4)
                .prop_map(|args| AstNode::call("or", args)),
            inner.clone().prop_map(|a| AstNode::call("!", vec![a])),
            (call_name(), prop::collection::vec(inner.clone(), 0..3))
                .prop_map(|(name, args)| AstNode::call(name, args)),
            // Templates: at least two parts, none a literal string (adjacent
            // literal text merges on re-parse, by design).
            prop::collection::vec(
                inner.clone().prop_filter("no literal string parts", |node| {
                    !matches!(node.as_value().map(|v| v.as_str()), Some(Some(_)))
                }),
                2..4,
            )
            .prop_map(|parts| AstNode::call("string", parts)),
            // Object literals: alternating literal keys and values.
            prop::collection::vec((ident(), inner.clone()), 0..3).prop_map(|entries| {
                let mut args = Vec::new();
                for (key, value) in entries {
                    args.push(AstNode::value(Value::string(key)));
                    args.push(value);
                }
                AstNode::call("object", args)
            }),
            (ident(), inner.clone()).prop_map(|(param, body)| AstNode::lambda(param, body)),
            (
                prop::collection::vec((ident(), inner.clone()), 1..3),
                inner.clone(),
            )
                .prop_map(|(bindings, body)| AstNode::let_in(bindings, body)),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn canonical_round_trip(ast in expr()) {
        let canonical = to_canonical(&ast);
        let back = from_canonical(&canonical)
            .unwrap_or_else(|e| panic!("canonical reparse failed for {canonical:?}: {e}"));
        prop_assert_eq!(back, normalize(&ast), "through {}", canonical);
    }

    #[test]
    fn printer_round_trip(ast in expr()) {
        let printed = print_expr(&ast);
        let reparsed = parse(&printed)
            .unwrap_or_else(|e| panic!("printed source failed to parse: {printed:?}: {e}"));
        prop_assert_eq!(
            to_canonical(&reparsed),
            to_canonical(&normalize(&ast)),
            "through {}",
            printed
        );
    }
}
