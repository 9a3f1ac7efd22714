//! Best-effort type checking over the AST: per-node rules, call return
//! types through function handles, and the union algebra.

use mantra::types::{element_type, union_type, PrimKind, Type};
use mantra::{basic_type_env, check_expr, parse};
use pretty_assertions::assert_eq;

fn data_type(fields: Vec<(&str, Type)>) -> Type {
    Type::Object {
        fields: fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    }
}

fn check(data: Type, source: &str) -> Type {
    let env = basic_type_env(data);
    let ast = parse(source).unwrap_or_else(|e| panic!("parse failed for {source:?}: {e}"));
    check_expr(&env, &ast)
}

#[test]
fn literals_carry_their_constants() {
    let ty = check(Type::any(), "42");
    let Type::Primitive { kind, constant } = ty else {
        panic!("expected primitive")
    };
    assert_eq!(kind, PrimKind::Number);
    assert_eq!(constant, Some(serde_json::json!(42.0)));
}

#[test]
fn properties_read_the_data_type() {
    let data = data_type(vec![("age", Type::number()), ("name", Type::string())]);
    assert_eq!(check(data.clone(), "age"), Type::number());
    // Unknown fields and non-object data are `any`, never errors.
    assert!(check(data, "missing").is_any());
    assert!(check(Type::number(), "age").is_any());
}

#[test]
fn arithmetic_and_comparisons_have_fixed_types() {
    let data = data_type(vec![("a", Type::number())]);
    assert_eq!(check(data.clone(), "a + 1"), Type::number());
    assert_eq!(check(data.clone(), "a = 1"), Type::boolean());
    assert_eq!(check(data, "$notEmpty(a)"), Type::boolean());
}

#[test]
fn ternary_unions_its_branches() {
    let data = data_type(vec![("c", Type::boolean())]);
    assert_eq!(check(data.clone(), "c ? 1 : 2"), Type::number());
    assert!(check(data, "c ? 1 : \"x\"").is_any());
}

#[test]
fn let_threads_binding_types() {
    let data = data_type(vec![("a", Type::number())]);
    assert_eq!(check(data, "let $x := a + 1 in $x"), Type::number());
}

#[test]
fn arrays_are_positional() {
    let ty = check(Type::any(), "[1, \"x\"]");
    let Type::Array { positional, rest } = ty else {
        panic!("expected array type")
    };
    assert_eq!(positional.len(), 2);
    assert!(rest.is_none());
}

#[test]
fn object_literals_type_their_fields() {
    let ty = check(Type::any(), "{a: 1, b: \"x\"}");
    let Type::Object { fields } = ty else {
        panic!("expected object type")
    };
    assert!(matches!(
        fields.get("a"),
        Some(Type::Primitive {
            kind: PrimKind::Number,
            ..
        })
    ));
}

#[test]
fn mapping_types_flow_through_element_type() {
    let data = data_type(vec![(
        "items",
        Type::array_of(data_type(vec![("n", Type::number())])),
    )]);
    let ty = check(data, "$map(items, n + 1)");
    let Type::Array { rest: Some(rest), .. } = ty else {
        panic!("expected array type")
    };
    assert_eq!(*rest, Type::number());
}

#[test]
fn unknown_vars_and_functions_are_any() {
    assert!(check(Type::any(), "$mystery").is_any());
    assert!(check(Type::any(), "$mystery(1)").is_any());
}

#[test]
fn union_algebra() {
    assert_eq!(union_type(&Type::never(), &Type::string()), Type::string());
    assert_eq!(union_type(&Type::number(), &Type::number()), Type::number());
    assert!(union_type(&Type::number(), &Type::string()).is_any());
    let arr = Type::Array {
        positional: vec![Type::number()],
        rest: Some(Box::new(Type::string())),
    };
    assert!(element_type(&arr).is_any());
}
