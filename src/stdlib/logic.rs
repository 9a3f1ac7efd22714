// This module provides the lazy boolean family: negation, the
// short-circuiting chains, the conditional and null-coalescing. Laziness is
// observable — operands past a short circuit are never evaluated, which the
// dependency sets reflect.

use crate::ast::{AstNode, CallExpr, Span};
use crate::env::Env;
use crate::errors;
use crate::eval::{dep_of, reduce};
use crate::stdlib::{self, deps_of, null_result, ok, residual_call, strict_n_args, TYPE_BOOLEAN};
use crate::types::union_type;
use crate::value::{NativeFn, TypeOfFn, Value};

/// Logical negation.
///
/// Usage: !a
///
///   Returns: boolean, or null when the operand is not a boolean.
pub const FN_NOT: NativeFn = |env, call, span| {
    let [a] = match strict_n_args::<1>(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    match a.as_bool() {
        Some(b) => ok(Value::bool(!b).with_deps(deps_of(env, &[&a])), span),
        None => null_result(env, &[&a], span),
    }
};

// ============================================================================
// SHORT-CIRCUIT CHAINS
// ============================================================================

/// Evaluates operands left to right until the result is decided. In partial
/// mode the identity laws apply: known identity operands are dropped, null
/// anywhere short-circuits to null, and a chain left with zero symbolic
/// operands is its identity. A known absorbing operand folds the chain only
/// when no symbolic operand precedes it — an earlier operand may still turn
/// out null or non-boolean, and that outcome wins first, so the residual
/// keeps the symbolic prefix and ends at the absorbing constant.
fn bool_chain(env: &Env, call: &CallExpr, span: Option<Span>, identity: bool) -> AstNode {
    if call.args.is_empty() {
        return stdlib::arity_error(&call.function, "at least 1", 0, span);
    }
    let mut deps = Vec::new();
    let mut residuals = Vec::new();
    for arg in &call.args {
        let reduced = reduce(env, arg);
        let Some(value) = reduced.as_value() else {
            residuals.push(reduced);
            continue;
        };
        deps.push(dep_of(env, value));
        match value.as_bool() {
            Some(b) if b == identity => {}
            Some(_) => {
                if residuals.is_empty() {
                    return ok(Value::bool(!identity).with_deps(deps), span);
                }
                residuals.push(reduced);
                return residual_call(call, residuals, span);
            }
            None => return ok(Value::null().with_deps(deps), span),
        }
    }
    if residuals.is_empty() {
        ok(Value::bool(identity).with_deps(deps), span)
    } else {
        residual_call(call, residuals, span)
    }
}

/// Short-circuit conjunction.
///
/// Usage: a and b and ...
///
///   Returns: false at the first false operand, null at the first null or
///   non-boolean operand, true otherwise. Deps cover only the operands that
///   were actually evaluated.
pub const FN_AND: NativeFn = |env, call, span| bool_chain(env, call, span, true);

/// Short-circuit disjunction.
///
/// Usage: a or b or ...
pub const FN_OR: NativeFn = |env, call, span| bool_chain(env, call, span, false);

// ============================================================================
// CONDITIONAL
// ============================================================================

/// The ternary conditional. Only the selected branch is evaluated; the
/// result carries the condition's deps plus the taken branch's.
///
/// Usage: cond ? then : else
pub const FN_IF: NativeFn = |env, call, span| {
    if call.args.len() != 3 {
        return stdlib::arity_error(&call.function, "3", call.args.len(), span);
    }
    let condition = reduce(env, &call.args[0]);
    let Some(cond_value) = condition.as_value() else {
        // Unknown condition: keep both branches, partially evaluated.
        let then_branch = reduce(env, &call.args[1]);
        let else_branch = reduce(env, &call.args[2]);
        return residual_call(call, vec![condition, then_branch, else_branch], span);
    };
    let taken = match cond_value.as_bool() {
        Some(true) => &call.args[1],
        Some(false) => &call.args[2],
        None if cond_value.is_null() => return null_result(env, &[cond_value], span),
        None => {
            return ok(
                Value::error(errors::type_mismatch(
                    &call.function,
                    "a boolean condition",
                    cond_value.type_name(),
                ))
                .with_deps(vec![dep_of(env, cond_value)]),
                span,
            );
        }
    };
    let branch = reduce(env, taken);
    match branch.as_value() {
        Some(branch_value) => {
            let mut result = branch_value.clone();
            result.add_dep(dep_of(env, cond_value));
            ok(result, span)
        }
        // The branch stays symbolic; the known condition is folded away.
        None => branch,
    }
};

/// Null-coalescing: the left operand unless it is null.
///
/// Usage: a ?? b
///
///   The right-branch result keeps the left operand's deps, so invalidation
///   still notices when the left side becomes non-null.
pub const FN_COALESCE: NativeFn = |env, call, span| {
    if call.args.len() != 2 {
        return stdlib::arity_error(&call.function, "2", call.args.len(), span);
    }
    let left = reduce(env, &call.args[0]);
    let Some(left_value) = left.as_value() else {
        let right = reduce(env, &call.args[1]);
        return residual_call(call, vec![left, right], span);
    };
    if !left_value.is_null() {
        return left;
    }
    let right = reduce(env, &call.args[1]);
    match right.as_value() {
        Some(right_value) => {
            let mut result = right_value.clone();
            result.add_dep(dep_of(env, left_value));
            ok(result, span)
        }
        None => right,
    }
};

// ============================================================================
// TYPE CALLBACKS
// ============================================================================

const TYPE_IF: TypeOfFn = |env, call| {
    if call.args.len() != 3 {
        return crate::types::Type::any();
    }
    union_type(
        &crate::types::check_expr(env, &call.args[1]),
        &crate::types::check_expr(env, &call.args[2]),
    )
};

const TYPE_COALESCE: TypeOfFn = |env, call| {
    if call.args.len() != 2 {
        return crate::types::Type::any();
    }
    union_type(
        &crate::types::check_expr(env, &call.args[0]),
        &crate::types::check_expr(env, &call.args[1]),
    )
};

pub fn register(map: &mut im::HashMap<String, AstNode>) {
    stdlib::install(map, "!", FN_NOT, TYPE_BOOLEAN);
    stdlib::install(map, "and", FN_AND, TYPE_BOOLEAN);
    stdlib::install(map, "or", FN_OR, TYPE_BOOLEAN);
    stdlib::install(map, "?", FN_IF, TYPE_IF);
    stdlib::install(map, "??", FN_COALESCE, TYPE_COALESCE);
}
