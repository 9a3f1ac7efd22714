// This module provides the comparison built-ins. All comparisons go through
// the environment's comparator, so by default numbers compare equal at 5
// significant digits. Null-strict: a null operand makes the result null.

use std::cmp::Ordering;

use crate::ast::{AstNode, CallExpr, Span};
use crate::env::Env;
use crate::errors;
use crate::stdlib::{self, deps_of, null_result, ok, strict_n_args, TYPE_BOOLEAN};
use crate::value::{NativeFn, Value};

fn compare_op(
    env: &Env,
    call: &CallExpr,
    span: Option<Span>,
    decide: fn(Option<Ordering>) -> Option<bool>,
) -> AstNode {
    let [a, b] = match strict_n_args::<2>(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    if a.is_null() || b.is_null() {
        return null_result(env, &[&a, &b], span);
    }
    match decide(env.compare(&a, &b)) {
        Some(result) => ok(Value::bool(result).with_deps(deps_of(env, &[&a, &b])), span),
        None => ok(
            Value::error(errors::type_mismatch(
                &call.function,
                "comparable operands",
                &format!("{} and {}", a.type_name(), b.type_name()),
            ))
            .with_deps(deps_of(env, &[&a, &b])),
            span,
        ),
    }
}

/// Equality under the environment comparator; incomparable operands are
/// simply not equal.
///
/// Usage: a = b
pub const FN_EQ: NativeFn =
    |env, call, span| compare_op(env, call, span, |ord| Some(ord == Some(Ordering::Equal)));

/// Usage: a != b
pub const FN_NEQ: NativeFn =
    |env, call, span| compare_op(env, call, span, |ord| Some(ord != Some(Ordering::Equal)));

/// Usage: a < b
pub const FN_LT: NativeFn =
    |env, call, span| compare_op(env, call, span, |ord| ord.map(|o| o == Ordering::Less));

/// Usage: a <= b
pub const FN_LTE: NativeFn =
    |env, call, span| compare_op(env, call, span, |ord| ord.map(|o| o != Ordering::Greater));

/// Usage: a > b
pub const FN_GT: NativeFn =
    |env, call, span| compare_op(env, call, span, |ord| ord.map(|o| o == Ordering::Greater));

/// Usage: a >= b
pub const FN_GTE: NativeFn =
    |env, call, span| compare_op(env, call, span, |ord| ord.map(|o| o != Ordering::Less));

pub fn register(map: &mut im::HashMap<String, AstNode>) {
    stdlib::install(map, "=", FN_EQ, TYPE_BOOLEAN);
    stdlib::install(map, "!=", FN_NEQ, TYPE_BOOLEAN);
    stdlib::install(map, "<", FN_LT, TYPE_BOOLEAN);
    stdlib::install(map, "<=", FN_LTE, TYPE_BOOLEAN);
    stdlib::install(map, ">", FN_GT, TYPE_BOOLEAN);
    stdlib::install(map, ">=", FN_GTE, TYPE_BOOLEAN);
}
