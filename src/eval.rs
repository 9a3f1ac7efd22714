//! The structural reducer at the heart of every evaluation mode.
//!
//! One pass serves all three modes. Full and reactive reduction always
//! produce `Expr::Value` nodes; partial reduction may leave any expression
//! residual. Built-ins own their argument evaluation (many are lazy), so
//! this module only handles the structural variants and dispatch.

use std::collections::HashSet;

use crate::ast::{AstNode, CallExpr, Expr, LetExpr};
use crate::env::{Env, EvalMode};
use crate::errors;
use crate::value::{Dep, Value};

/// Fully evaluates an expression to a value.
///
/// # Panics
///
/// Panics if reduction leaves a residual expression, which can only happen
/// when a partial-mode environment is passed here; that is a programmer
/// error, not an evaluation failure.
pub fn evaluate(env: &Env, node: &AstNode) -> Value {
    let reduced = reduce(env, node);
    match reduced.as_value() {
        Some(value) => value.clone().at_location(node.span),
        None => panic!("full evaluation produced a residual expression; use evaluate_partial with a partial environment"),
    }
}

/// Partially evaluates an expression, returning the simplified residual.
/// Follow with [`crate::uninline::uninline`] to hoist repeated inlined
/// expressions back into `let` bindings.
pub fn evaluate_partial(env: &Env, node: &AstNode) -> AstNode {
    reduce(env, node)
}

/// One step of structural reduction, recursing through the tree.
pub fn reduce(env: &Env, node: &AstNode) -> AstNode {
    match node.expr.as_ref() {
        Expr::Value(_) => node.clone(),
        Expr::Var(name) => env.lookup_var(name, node),
        Expr::Property(name) => reduce_property(env, name, node),
        Expr::Array(items) => reduce_array(env, items, node),
        Expr::Lambda(_) => match env.mode() {
            EvalMode::Partial => node.clone(),
            _ => AstNode::value(Value::error(errors::bare_lambda()).at_location(node.span)),
        },
        Expr::Let(let_expr) => reduce_let(env, let_expr, node),
        Expr::Call(call) => reduce_call(env, call, node),
    }
}

// ============================================================================
// PROPERTY READS
// ============================================================================

fn reduce_property(env: &Env, name: &str, node: &AstNode) -> AstNode {
    let current = match env.current_value() {
        Some(value) => value,
        None => {
            return match env.mode() {
                // With no (or a still-symbolic) current value, a known
                // variable of the same name stands in for the field — this
                // is how partial_env's known vars fold into field reads.
                // Anything else is legitimate residual.
                EvalMode::Partial => env.lookup_var(name, node),
                _ => AstNode::value(
                    Value::error(errors::property_on_non_object(name, "null"))
                        .at_location(node.span),
                ),
            };
        }
    };
    AstNode::value(read_property(env, &current, name).at_location(node.span))
}

/// Reads one field, combining the parent object's deps with the field
/// value's own. Reading a missing field of an addressable object yields a
/// null tagged with the would-be path, so invalidation still works when the
/// field appears later.
pub fn read_property(env: &Env, parent: &Value, name: &str) -> Value {
    if parent.is_null() || !parent.is_object() {
        return Value::error(errors::property_on_non_object(name, parent.type_name()))
            .with_deps(vec![dep_of(env, parent)]);
    }
    match parent.field(name) {
        Some(mut child) => {
            child.deps.extend(parent.deps.iter().cloned());
            child
        }
        None => {
            let mut missing = Value::null();
            if let Some(parent_path) = &parent.path {
                missing = missing.at_path(parent_path.field(name));
            }
            missing.with_deps(parent.deps.clone())
        }
    }
}

// ============================================================================
// ARRAYS
// ============================================================================

fn reduce_array(env: &Env, items: &[AstNode], node: &AstNode) -> AstNode {
    let reduced: Vec<AstNode> = items.iter().map(|item| reduce(env, item)).collect();
    if reduced.iter().all(AstNode::is_value) {
        let elements = reduced
            .iter()
            .map(|item| {
                item.as_value()
                    .expect("checked value")
                    .clone()
                    .at_location(item.span)
            })
            .collect();
        // No array-level deps: each element keeps its own provenance.
        AstNode::value(Value::list(elements).at_location(node.span))
    } else {
        AstNode::new(Expr::Array(reduced)).with_span(node.span)
    }
}

// ============================================================================
// LET
// ============================================================================

fn reduce_let(env: &Env, let_expr: &LetExpr, node: &AstNode) -> AstNode {
    let mut bindings = im::HashMap::new();
    for (name, rhs) in &let_expr.bindings {
        bindings.insert(name.clone(), rhs.clone());
    }
    let scope = env.new_scope(bindings);
    let body = reduce(&scope, &let_expr.body);

    if env.mode() != EvalMode::Partial {
        return body;
    }

    // Rebuild residually: keep exactly the bindings still referenced by the
    // reduced body, transitively through the kept right-hand sides.
    let mut needed: HashSet<String> = HashSet::new();
    body.free_vars(&mut needed);
    let names: Vec<&String> = let_expr.bindings.iter().map(|(n, _)| n).collect();
    let mut kept: Vec<(String, AstNode)> = Vec::new();
    let mut changed = true;
    let mut included: HashSet<String> = HashSet::new();
    while changed {
        changed = false;
        for name in &names {
            if needed.contains(*name) && !included.contains(*name) {
                let rhs = scope
                    .lookup(name)
                    .expect("let scope binds the name");
                rhs.free_vars(&mut needed);
                included.insert((*name).clone());
                changed = true;
            }
        }
    }
    for (name, _) in &let_expr.bindings {
        if included.contains(name) {
            let rhs = scope.lookup(name).expect("let scope binds the name");
            kept.push((name.clone(), rhs.untagged()));
        }
    }

    if kept.is_empty() {
        body
    } else {
        AstNode::let_in(kept, body).with_span(node.span)
    }
}

// ============================================================================
// CALLS
// ============================================================================

fn reduce_call(env: &Env, call: &CallExpr, node: &AstNode) -> AstNode {
    match env.lookup_function(&call.function) {
        Some(handle) => (handle.eval)(env, call, node.span),
        None => match env.mode() {
            EvalMode::Partial => {
                let args = call.args.iter().map(|arg| reduce(env, arg)).collect();
                AstNode::new(Expr::Call(CallExpr {
                    function: call.function.clone(),
                    args,
                }))
                .with_span(node.span)
            }
            _ => AstNode::value(
                Value::error(errors::unknown_function(&call.function)).at_location(node.span),
            ),
        },
    }
}

// ============================================================================
// DEPENDENCY HELPERS
// ============================================================================

/// How a consumed input is recorded: full mode keeps the value itself in the
/// graph; reactive mode externalizes the graph to the host's cells, so only
/// the path survives.
pub fn dep_of(env: &Env, value: &Value) -> Dep {
    if env.mode() == EvalMode::Reactive {
        if let Some(path) = &value.path {
            return Dep::Path(path.clone());
        }
    }
    Dep::Value(std::rc::Rc::new(value.clone()))
}
