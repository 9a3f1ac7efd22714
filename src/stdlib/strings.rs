// This module provides the string built-ins. `string` doubles as the
// desugaring target of template strings, so its stringification rules are
// what interpolation prints.

use crate::ast::AstNode;
use crate::stdlib::{
    self, deps_of, null_result, ok, strict_args, strict_n_args, TYPE_BOOLEAN, TYPE_STRING,
};
use crate::value::{NativeFn, Value};

/// Concatenates the stringified arguments. Null renders as the empty
/// string, integral numbers print without a fraction, containers render as
/// JSON.
///
/// Usage: $string(a, b, ...) — also produced by `template {strings}`
///
///   Returns: string; deps are the union of all arguments.
pub const FN_STRING: NativeFn = |env, call, span| {
    let values = match strict_args(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    let mut text = String::new();
    for value in &values {
        text.push_str(&value.stringify());
    }
    let operands: Vec<&Value> = values.iter().collect();
    ok(
        Value::string(text).with_deps(deps_of(env, &operands)),
        span,
    )
};

/// Lower-cases a string.
///
/// Usage: $lower(s)
pub const FN_LOWER: NativeFn = |env, call, span| {
    let [a] = match strict_n_args::<1>(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    if a.is_null() {
        return null_result(env, &[&a], span);
    }
    match a.as_str() {
        Some(s) => ok(
            Value::string(s.to_lowercase()).with_deps(deps_of(env, &[&a])),
            span,
        ),
        None => stdlib::type_error_value(env, &call.function, "a string", &a, span),
    }
};

/// Upper-cases a string.
///
/// Usage: $upper(s)
pub const FN_UPPER: NativeFn = |env, call, span| {
    let [a] = match strict_n_args::<1>(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    if a.is_null() {
        return null_result(env, &[&a], span);
    }
    match a.as_str() {
        Some(s) => ok(
            Value::string(s.to_uppercase()).with_deps(deps_of(env, &[&a])),
            span,
        ),
        None => stdlib::type_error_value(env, &call.function, "a string", &a, span),
    }
};

/// True when the argument is neither null nor the empty string; the
/// idiomatic required-field check.
///
/// Usage: $notEmpty(v)
pub const FN_NOT_EMPTY: NativeFn = |env, call, span| {
    let [a] = match strict_n_args::<1>(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    let result = !a.is_null() && a.as_str() != Some("");
    ok(Value::bool(result).with_deps(deps_of(env, &[&a])), span)
};

pub fn register(map: &mut im::HashMap<String, AstNode>) {
    stdlib::install(map, "string", FN_STRING, TYPE_STRING);
    stdlib::install(map, "lower", FN_LOWER, TYPE_STRING);
    stdlib::install(map, "upper", FN_UPPER, TYPE_STRING);
    stdlib::install(map, "notEmpty", FN_NOT_EMPTY, TYPE_BOOLEAN);
}
