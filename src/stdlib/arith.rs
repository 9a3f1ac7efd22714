// This module provides the arithmetic built-ins. All of them are
// null-strict: a null operand makes the result null, carrying the deps of
// every operand that was evaluated.

use crate::ast::AstNode;
use crate::stdlib::{
    self, deps_of, null_result, numeric_binop, numeric_unop, ok, TYPE_NUMBER, TYPE_STRING,
};
use crate::value::{format_number, NativeFn, Value};

// ============================================================================
// ARITHMETIC OPERATIONS
// ============================================================================

/// Adds two numbers.
///
/// Usage: a + b
///
///   Returns: number, or null if either operand is null.
pub const FN_ADD: NativeFn = |env, call, span| numeric_binop(env, call, span, |a, b| a + b);

/// Subtracts two numbers. Unary minus parses as `0 - x`.
///
/// Usage: a - b
pub const FN_SUB: NativeFn = |env, call, span| numeric_binop(env, call, span, |a, b| a - b);

/// Multiplies two numbers.
///
/// Usage: a * b
pub const FN_MUL: NativeFn = |env, call, span| numeric_binop(env, call, span, |a, b| a * b);

/// Divides two numbers. Division by zero follows IEEE-754: the payload is an
/// infinity or NaN, never an error.
///
/// Usage: a / b
pub const FN_DIV: NativeFn = |env, call, span| numeric_binop(env, call, span, |a, b| a / b);

/// Remainder of two numbers.
///
/// Usage: a % b
pub const FN_MOD: NativeFn = |env, call, span| numeric_binop(env, call, span, |a, b| a % b);

// ============================================================================
// ROUNDING AND FORMATTING
// ============================================================================

/// Rounds down to the nearest integer.
///
/// Usage: $floor(n)
pub const FN_FLOOR: NativeFn = |env, call, span| numeric_unop(env, call, span, f64::floor);

/// Rounds up to the nearest integer.
///
/// Usage: $ceil(n)
pub const FN_CEIL: NativeFn = |env, call, span| numeric_unop(env, call, span, f64::ceil);

/// Formats a number with a fixed count of decimal digits.
///
/// Usage: $fixed(n, digits) or $fixed(n)
///
///   Returns: string. Digits defaults to 0 when omitted.
pub const FN_FIXED: NativeFn = |env, call, span| {
    if call.args.is_empty() || call.args.len() > 2 {
        return stdlib::arity_error(&call.function, "1 or 2", call.args.len(), span);
    }
    let values = match stdlib::strict_args(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    let operands: Vec<&Value> = values.iter().collect();
    if values.iter().any(Value::is_null) {
        return null_result(env, &operands, span);
    }
    let Some(n) = values[0].as_number() else {
        return stdlib::type_error_value(env, &call.function, "a number", &values[0], span);
    };
    let digits = match values.get(1) {
        Some(d) => match d.as_number() {
            Some(d) if d >= 0.0 => d as usize,
            _ => {
                return stdlib::type_error_value(
                    env,
                    &call.function,
                    "a non-negative digit count",
                    d,
                    span,
                );
            }
        },
        None => 0,
    };
    let text = if n.is_finite() {
        format!("{n:.digits$}")
    } else {
        format_number(n)
    };
    ok(
        Value::string(text).with_deps(deps_of(env, &operands)),
        span,
    )
};

// ============================================================================
// REGISTRATION
// ============================================================================

pub fn register(map: &mut im::HashMap<String, AstNode>) {
    stdlib::install(map, "+", FN_ADD, TYPE_NUMBER);
    stdlib::install(map, "-", FN_SUB, TYPE_NUMBER);
    stdlib::install(map, "*", FN_MUL, TYPE_NUMBER);
    stdlib::install(map, "/", FN_DIV, TYPE_NUMBER);
    stdlib::install(map, "%", FN_MOD, TYPE_NUMBER);
    stdlib::install(map, "floor", FN_FLOOR, TYPE_NUMBER);
    stdlib::install(map, "ceil", FN_CEIL, TYPE_NUMBER);
    stdlib::install(map, "fixed", FN_FIXED, TYPE_STRING);
}
