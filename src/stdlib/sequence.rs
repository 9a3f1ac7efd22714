// This module provides the sequence built-ins: construction, reductions and
// lazy scans. The dependency contracts here are the load-bearing part:
// consumption functions attach exactly the elements they touched, lazy scans
// stop attaching the moment they stop looking.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::ast::{AstNode, CallExpr, Span};
use crate::env::Env;
use crate::errors;
use crate::eval::{dep_of, reduce};
use crate::stdlib::{
    self, apply_index_callback, deps_of, null_result, ok, residual_with_callback, strict_args,
    strict_n_args, TYPE_BOOLEAN, TYPE_NUMBER,
};
use crate::types::{element_type, Type};
use crate::value::{Dep, NativeFn, Payload, TypeOfFn, Value};

/// Builds a list, flattening one level of nested array arguments.
///
/// Usage: $array(1, [2, 3], 4)  ; => [1, 2, 3, 4]
///
///   Element deps are preserved; the result has no array-level deps.
pub const FN_ARRAY: NativeFn = |env, call, span| {
    let values = match strict_args(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    let mut items: Vec<Rc<Value>> = Vec::new();
    for value in values {
        match value.elements() {
            Some(elements) => items.extend(elements),
            None => items.push(Rc::new(value)),
        }
    }
    ok(Value::new(Payload::List(items)), span)
};

// ============================================================================
// REDUCTIONS
// ============================================================================

enum Reduction {
    Sum,
    Min,
    Max,
}

/// Shared template for `sum`/`min`/`max`: every element is visited and
/// becomes a dep, nulls included; any null element nulls the result.
fn reduce_sequence(
    env: &Env,
    call: &CallExpr,
    span: Option<Span>,
    reduction: Reduction,
) -> AstNode {
    let [seq] = match strict_n_args::<1>(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    if seq.is_null() {
        return null_result(env, &[&seq], span);
    }
    let Some(elements) = seq.elements() else {
        return stdlib::type_error_value(env, &call.function, "an array", &seq, span);
    };
    let mut deps = vec![dep_of(env, &seq)];
    let mut numbers = Vec::with_capacity(elements.len());
    let mut saw_null = false;
    for element in &elements {
        deps.push(dep_of(env, element));
        if element.is_null() {
            saw_null = true;
        } else if let Some(n) = element.as_number() {
            numbers.push(n);
        } else {
            return ok(
                Value::error(errors::type_mismatch(
                    &call.function,
                    "numbers",
                    element.type_name(),
                ))
                .with_deps(deps),
                span,
            );
        }
    }
    if saw_null {
        return ok(Value::null().with_deps(deps), span);
    }
    let result = match reduction {
        Reduction::Sum => Some(numbers.iter().sum::<f64>()),
        Reduction::Min => numbers.iter().copied().reduce(f64::min),
        Reduction::Max => numbers.iter().copied().reduce(f64::max),
    };
    match result {
        Some(n) => ok(Value::number(n).with_deps(deps), span),
        None => ok(Value::null().with_deps(deps), span),
    }
}

/// Usage: $sum(numbers) — the sum of an empty array is 0.
pub const FN_SUM: NativeFn = |env, call, span| reduce_sequence(env, call, span, Reduction::Sum);

/// Usage: $min(numbers) — null on an empty array.
pub const FN_MIN: NativeFn = |env, call, span| reduce_sequence(env, call, span, Reduction::Min);

/// Usage: $max(numbers) — null on an empty array.
pub const FN_MAX: NativeFn = |env, call, span| reduce_sequence(env, call, span, Reduction::Max);

/// The length of a sequence. Depends on the container, not its elements.
///
/// Usage: $count(items)
pub const FN_COUNT: NativeFn = |env, call, span| {
    let [seq] = match strict_n_args::<1>(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    if seq.is_null() {
        return null_result(env, &[&seq], span);
    }
    match seq.elements() {
        Some(elements) => ok(
            Value::number(elements.len() as f64).with_deps(deps_of(env, &[&seq])),
            span,
        ),
        None => stdlib::type_error_value(env, &call.function, "an array", &seq, span),
    }
};

// ============================================================================
// LAZY SCANS
// ============================================================================

/// What a predicate scan is looking for, and what it produces.
enum Scan {
    Any,
    All,
    First,
    FirstIndex,
}

/// Shared template for the index-bound-lambda scans. The callback parameter
/// binds the element index; the element itself is read through `$this()`.
/// Deps cover every element visited, and only those.
fn scan_sequence(env: &Env, call: &CallExpr, span: Option<Span>, scan: Scan) -> AstNode {
    if call.args.len() != 2 {
        return stdlib::arity_error(&call.function, "2", call.args.len(), span);
    }
    let target = reduce(env, &call.args[0]);
    let Some(seq) = target.as_value() else {
        return residual_with_callback(call, target, span);
    };
    if seq.is_null() {
        return null_result(env, &[seq], span);
    }
    let Some(elements) = seq.elements() else {
        return stdlib::type_error_value(env, &call.function, "an array", seq, span);
    };
    let callback = &call.args[1];
    let mut deps = vec![dep_of(env, seq)];
    for (index, element) in elements.iter().enumerate() {
        let outcome = apply_index_callback(env, callback, element, index);
        let Some(verdict) = outcome.as_value() else {
            // The callback touched something symbolic; give up on folding.
            return residual_with_callback(call, target, span);
        };
        deps.push(dep_of(env, element));
        deps.push(dep_of(env, verdict));
        match verdict.as_bool() {
            Some(true) => match scan {
                Scan::Any => return ok(Value::bool(true).with_deps(deps), span),
                Scan::All => {}
                Scan::First => {
                    let mut found = element.as_ref().clone();
                    found.deps.extend(deps);
                    return ok(found, span);
                }
                Scan::FirstIndex => {
                    return ok(Value::number(index as f64).with_deps(deps), span);
                }
            },
            Some(false) => match scan {
                Scan::All => return ok(Value::bool(false).with_deps(deps), span),
                _ => {}
            },
            None => return ok(Value::null().with_deps(deps), span),
        }
    }
    match scan {
        Scan::Any => ok(Value::bool(false).with_deps(deps), span),
        Scan::All => ok(Value::bool(true).with_deps(deps), span),
        Scan::First | Scan::FirstIndex => ok(Value::null().with_deps(deps), span),
    }
}

/// Usage: $any(items, $i => $this() > 3)
pub const FN_ANY: NativeFn = |env, call, span| scan_sequence(env, call, span, Scan::Any);

/// Usage: $all(items, $i => $this() > 3)
pub const FN_ALL: NativeFn = |env, call, span| scan_sequence(env, call, span, Scan::All);

/// First matching element, else null.
///
/// Usage: $first(items, $i => $this() > 3)
pub const FN_FIRST: NativeFn = |env, call, span| scan_sequence(env, call, span, Scan::First);

/// Index of the first matching element, else null.
///
/// Usage: $firstIndex(items, $i => $this() > 3)
pub const FN_FIRST_INDEX: NativeFn =
    |env, call, span| scan_sequence(env, call, span, Scan::FirstIndex);

// ============================================================================
// EQUALITY SEARCHES
// ============================================================================

fn search_sequence(
    env: &Env,
    call: &CallExpr,
    span: Option<Span>,
    found: fn(usize) -> Value,
    missing: Value,
) -> AstNode {
    let [seq, needle] = match strict_n_args::<2>(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    if seq.is_null() {
        return null_result(env, &[&seq, &needle], span);
    }
    let Some(elements) = seq.elements() else {
        return stdlib::type_error_value(env, &call.function, "an array", &seq, span);
    };
    let mut deps = vec![dep_of(env, &seq), dep_of(env, &needle)];
    for (index, element) in elements.iter().enumerate() {
        deps.push(dep_of(env, element));
        if env.compare(element, &needle) == Some(Ordering::Equal) {
            return ok(found(index).with_deps(deps), span);
        }
    }
    ok(missing.with_deps(deps), span)
}

/// Membership by equality under the environment comparator. The scan stops
/// at the first hit, and deps cover only the elements visited.
///
/// Usage: $contains(items, value)
pub const FN_CONTAINS: NativeFn = |env, call, span| {
    search_sequence(env, call, span, |_| Value::bool(true), Value::bool(false))
};

/// Index of the first equal element, else null.
///
/// Usage: $indexOf(items, value)
pub const FN_INDEX_OF: NativeFn = |env, call, span| {
    search_sequence(
        env,
        call,
        span,
        |index| Value::number(index as f64),
        Value::null(),
    )
};

// ============================================================================
// INDEXING
// ============================================================================

/// Fetches one element by position. A dynamic index contributes its deps;
/// out-of-bounds is null.
///
/// Usage: $elem(items, index)
pub const FN_ELEM: NativeFn = |env, call, span| {
    let [seq, index] = match strict_n_args::<2>(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    if seq.is_null() || index.is_null() {
        return null_result(env, &[&seq, &index], span);
    }
    let Some(elements) = seq.elements() else {
        return stdlib::type_error_value(env, &call.function, "an array", &seq, span);
    };
    let Some(i) = index.as_number() else {
        return stdlib::type_error_value(env, &call.function, "a numeric index", &index, span);
    };
    fetch_element(env, &elements, &seq, i, dep_of(env, &index), span)
};

/// Shared element fetch for `elem` and the index form of `[`.
pub(crate) fn fetch_element(
    env: &Env,
    elements: &[Rc<Value>],
    container: &Value,
    index: f64,
    index_dep: Dep,
    span: Option<Span>,
) -> AstNode {
    let deps = vec![dep_of(env, container), index_dep];
    if index < 0.0 || index.fract() != 0.0 || index as usize >= elements.len() {
        return ok(Value::null().with_deps(deps), span);
    }
    let mut element = elements[index as usize].as_ref().clone();
    element.deps.extend(deps);
    ok(element, span)
}

// ============================================================================
// TYPE CALLBACKS
// ============================================================================

const TYPE_ARRAY: TypeOfFn = |env, call| {
    let mut element = Type::never();
    for arg in &call.args {
        let ty = crate::types::check_expr(env, arg);
        let contribution = if matches!(&ty, Type::Array { .. }) {
            element_type(&ty)
        } else {
            ty
        };
        element = crate::types::union_type(&element, &contribution);
    }
    Type::array_of(element)
};

const TYPE_FIRST: TypeOfFn = |env, call| {
    match call.args.first() {
        Some(target) => element_type(&crate::types::check_expr(env, target)),
        None => Type::any(),
    }
};

const TYPE_ELEM: TypeOfFn = TYPE_FIRST;

pub fn register(map: &mut im::HashMap<String, AstNode>) {
    stdlib::install(map, "array", FN_ARRAY, TYPE_ARRAY);
    stdlib::install(map, "sum", FN_SUM, TYPE_NUMBER);
    stdlib::install(map, "min", FN_MIN, TYPE_NUMBER);
    stdlib::install(map, "max", FN_MAX, TYPE_NUMBER);
    stdlib::install(map, "count", FN_COUNT, TYPE_NUMBER);
    stdlib::install(map, "any", FN_ANY, TYPE_BOOLEAN);
    stdlib::install(map, "all", FN_ALL, TYPE_BOOLEAN);
    stdlib::install(map, "first", FN_FIRST, TYPE_FIRST);
    stdlib::install(map, "firstIndex", FN_FIRST_INDEX, TYPE_NUMBER);
    stdlib::install(map, "contains", FN_CONTAINS, TYPE_BOOLEAN);
    stdlib::install(map, "indexOf", FN_INDEX_OF, TYPE_NUMBER);
    stdlib::install(map, "elem", FN_ELEM, TYPE_ELEM);
}
