// # Mantra Standard Library
//
// The ~35 built-in functions of the language. Each built-in is a
// `FunctionHandle`: an `eval` callback defining evaluator semantics
// (including dependency propagation, null-strictness and laziness) and a
// `get_type` callback defining its type-check semantics.
//
// ## Module Structure
//
// - **`helpers`-style shared code**: lives in this module (argument
//   reduction, null-strictness, callback application, dependency plumbing)
// - **`arith`**: `+ - * / % floor ceil fixed`
// - **`compare`**: `= != < <= > >=`
// - **`logic`**: `! and or ? ??`
// - **`strings`**: `string lower upper notEmpty`
// - **`sequence`**: `array sum min max count any all first firstIndex
//   contains indexOf elem`
// - **`mapping`**: `. map [ this object keys values merge which`
//
// ## Design Principles
//
// - **Errors are values**: nothing here returns a Rust error; failures are
//   attached to the result value and flow through the dependency graph
// - **Laziness where semantics demand it**: short-circuit operators and
//   callback-taking functions receive raw AST arguments

use crate::ast::{AstNode, CallExpr, Expr, Span};
use crate::env::{Env, EvalMode};
use crate::errors;
use crate::eval::{dep_of, reduce};
use crate::types::{Type, TypeEnv};
use crate::value::{Dep, FunctionHandle, NativeFn, TypeOfFn, Value};

pub mod arith;
pub mod compare;
pub mod logic;
pub mod mapping;
pub mod sequence;
pub mod strings;

// ============================================================================
// REGISTRATION
// ============================================================================

/// Builds the bindings for the complete standard library. Function handles
/// live in the environment as ordinary values under their name.
pub fn standard_bindings() -> im::HashMap<String, AstNode> {
    let mut map = im::HashMap::new();
    arith::register(&mut map);
    compare::register(&mut map);
    logic::register(&mut map);
    strings::register(&mut map);
    sequence::register(&mut map);
    mapping::register(&mut map);
    map
}

/// Installs the standard functions as a new scope over `env`.
pub fn install_standard(env: &Env) -> Env {
    env.new_scope(standard_bindings())
}

/// A typing environment that knows the standard functions' result types.
pub fn standard_type_env(data_type: Type) -> TypeEnv {
    let mut env = TypeEnv::new(data_type);
    for (name, node) in standard_bindings() {
        if let Some(handle) = node.as_value().and_then(Value::as_function) {
            env = env.with_var(
                name,
                Type::Function {
                    return_type: handle.get_type,
                },
            );
        }
    }
    env
}

pub(crate) fn install(
    map: &mut im::HashMap<String, AstNode>,
    name: &'static str,
    eval: NativeFn,
    get_type: TypeOfFn,
) {
    map.insert(
        name.to_string(),
        AstNode::value(Value::function(FunctionHandle {
            name,
            eval,
            get_type,
        })),
    );
}

// ============================================================================
// SHARED TYPE CALLBACKS
// ============================================================================

pub const TYPE_NUMBER: TypeOfFn = |_, _| Type::number();
pub const TYPE_BOOLEAN: TypeOfFn = |_, _| Type::boolean();
pub const TYPE_STRING: TypeOfFn = |_, _| Type::string();
pub const TYPE_ANY: TypeOfFn = |_, _| Type::any();

// ============================================================================
// ARGUMENT EVALUATION
// ============================================================================

/// Reduces every argument in order. Full mode guarantees values come back.
pub fn reduce_args(env: &Env, call: &CallExpr) -> Vec<AstNode> {
    call.args.iter().map(|arg| reduce(env, arg)).collect()
}

/// Rebuilds the call around already-reduced arguments; the partial
/// evaluator's residual form.
pub fn residual_call(call: &CallExpr, args: Vec<AstNode>, span: Option<Span>) -> AstNode {
    AstNode::new(Expr::Call(CallExpr {
        function: call.function.clone(),
        args,
    }))
    .with_span(span)
}

/// Keeps the callback argument raw while reducing the rest; used by the
/// residual forms of callback-taking built-ins so a callback body is never
/// reduced against the wrong current value.
pub fn residual_with_callback(
    call: &CallExpr,
    target: AstNode,
    span: Option<Span>,
) -> AstNode {
    let mut args = vec![target];
    args.extend(call.args.iter().skip(1).cloned());
    residual_call(call, args, span)
}

/// Strict evaluation of all arguments: the values, or the residual call when
/// some argument is still symbolic (partial mode only).
pub fn strict_args(
    env: &Env,
    call: &CallExpr,
    span: Option<Span>,
) -> Result<Vec<Value>, AstNode> {
    let reduced = reduce_args(env, call);
    if reduced.iter().all(AstNode::is_value) {
        Ok(reduced
            .iter()
            .map(|node| {
                node.as_value()
                    .expect("checked value")
                    .clone()
                    .at_location(node.span)
            })
            .collect())
    } else {
        Err(residual_call(call, reduced, span))
    }
}

/// Exactly `n` strict arguments, or an arity-error value.
pub fn strict_n_args<const N: usize>(
    env: &Env,
    call: &CallExpr,
    span: Option<Span>,
) -> Result<[Value; N], AstNode> {
    if call.args.len() != N {
        return Err(arity_error(&call.function, &N.to_string(), call.args.len(), span));
    }
    let values = strict_args(env, call, span)?;
    values
        .try_into()
        .map_err(|_| arity_error(&call.function, &N.to_string(), call.args.len(), span))
}

// ============================================================================
// ERROR VALUES
// ============================================================================

pub fn ok(value: Value, span: Option<Span>) -> AstNode {
    AstNode::value(value.at_location(span))
}

pub fn arity_error(function: &str, expected: &str, actual: usize, span: Option<Span>) -> AstNode {
    ok(
        Value::error(errors::arity_mismatch(function, expected, actual)),
        span,
    )
}

pub fn type_error_value(
    env: &Env,
    function: &str,
    expected: &str,
    actual: &Value,
    span: Option<Span>,
) -> AstNode {
    ok(
        Value::error(errors::type_mismatch(function, expected, actual.type_name()))
            .with_deps(vec![dep_of(env, actual)]),
        span,
    )
}

// ============================================================================
// NULL-STRICTNESS AND DEPENDENCY PLUMBING
// ============================================================================

/// Deps on every given operand, in order.
pub fn deps_of(env: &Env, values: &[&Value]) -> Vec<Dep> {
    values.iter().map(|v| dep_of(env, v)).collect()
}

/// The null-strict escape hatch: when any required operand is null, the
/// result is null carrying the deps of all evaluated operands.
pub fn null_result(env: &Env, operands: &[&Value], span: Option<Span>) -> AstNode {
    ok(Value::null().with_deps(deps_of(env, operands)), span)
}

/// Null-strict binary numeric operation; the template behind `+ - * / %`.
/// Division by zero and overflow follow IEEE-754: infinities and NaN are
/// ordinary payloads.
pub fn numeric_binop(
    env: &Env,
    call: &CallExpr,
    span: Option<Span>,
    op: fn(f64, f64) -> f64,
) -> AstNode {
    let [a, b] = match strict_n_args::<2>(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    if a.is_null() || b.is_null() {
        return null_result(env, &[&a, &b], span);
    }
    let (Some(x), Some(y)) = (a.as_number(), b.as_number()) else {
        let offender = if a.as_number().is_none() { &a } else { &b };
        return ok(
            Value::error(errors::type_mismatch(
                &call.function,
                "numbers",
                offender.type_name(),
            ))
            .with_deps(deps_of(env, &[&a, &b])),
            span,
        );
    };
    ok(
        Value::number(op(x, y)).with_deps(deps_of(env, &[&a, &b])),
        span,
    )
}

/// Null-strict unary numeric operation; the template behind `floor`/`ceil`.
pub fn numeric_unop(
    env: &Env,
    call: &CallExpr,
    span: Option<Span>,
    op: fn(f64) -> f64,
) -> AstNode {
    let [a] = match strict_n_args::<1>(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    if a.is_null() {
        return null_result(env, &[&a], span);
    }
    match a.as_number() {
        Some(x) => ok(Value::number(op(x)).with_deps(deps_of(env, &[&a])), span),
        None => type_error_value(env, &call.function, "a number", &a, span),
    }
}

// ============================================================================
// CALLBACK APPLICATION
// ============================================================================

/// Applies a callback whose parameter binds the element value (`map`, `.`).
/// The current value is rebound to the element either way; a non-lambda
/// callback is simply evaluated against it.
pub fn apply_element_callback(env: &Env, callback: &AstNode, element: &Value) -> AstNode {
    let scoped = env.with_current(element.clone());
    match callback.expr.as_ref() {
        Expr::Lambda(lambda) => {
            let scoped = scoped.bind(lambda.param.clone(), AstNode::value(element.clone()));
            reduce(&scoped, &lambda.body)
        }
        _ => reduce(&scoped, callback),
    }
}

/// Applies a callback whose parameter binds the index, with the element
/// readable through the zero-arity `this` built-in (`[`, `first`,
/// `firstIndex`, `any`, `all`).
pub fn apply_index_callback(
    env: &Env,
    callback: &AstNode,
    element: &Value,
    index: usize,
) -> AstNode {
    let scoped = env.with_current(element.clone());
    match callback.expr.as_ref() {
        Expr::Lambda(lambda) => {
            let scoped = scoped.bind(
                lambda.param.clone(),
                AstNode::value(Value::number(index as f64)),
            );
            reduce(&scoped, &lambda.body)
        }
        _ => reduce(&scoped, callback),
    }
}

/// True when this environment may legitimately see symbolic results.
pub fn is_partial(env: &Env) -> bool {
    env.mode() == EvalMode::Partial
}
