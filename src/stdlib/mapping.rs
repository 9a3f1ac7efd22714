// This module provides the mapping built-ins: the `.` flatmap operator, the
// `[` filter/lookup operator, `map`, object construction and access, and
// value dispatch via `which`. The flatten rule is the subtle one: child
// array elements are augmented with the parent result's deps so flattening
// never loses provenance.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::ast::{AstNode, CallExpr, Expr, Span};
use crate::env::Env;
use crate::errors;
use crate::eval::{dep_of, read_property, reduce};
use crate::stdlib::{
    self, apply_element_callback, apply_index_callback, deps_of, null_result, ok,
    residual_call, residual_with_callback, strict_args,
};
use crate::types::{check_expr, element_type, union_type, Type};
use crate::value::{NativeFn, Payload, TypeOfFn, Value};

/// The current value.
///
/// Usage: $this() — inside index-bound callbacks this is the element.
pub const FN_THIS: NativeFn = |env, call, span| {
    if !call.args.is_empty() {
        return stdlib::arity_error(&call.function, "0", call.args.len(), span);
    }
    match env.current_value() {
        Some(value) => ok(value, span),
        None => match stdlib::is_partial(env) {
            true => residual_call(call, Vec::new(), span),
            false => ok(
                Value::error(errors::property_on_non_object("_", "null")),
                span,
            ),
        },
    }
};

// ============================================================================
// MAP AND FLATMAP
// ============================================================================

/// Applies the right side per element, with the element as the current
/// value; child arrays are flattened one level. On a scalar left side the
/// right side is applied once with the scalar as the current value.
///
/// Usage: items . values      (flatmap)
///        user . name         (scalar apply)
pub const FN_DOT: NativeFn = |env, call, span| {
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
    let callback = &call.args[1];
    let Some(elements) = seq.elements() else {
        // Scalar (or object) left side: one application.
        let applied = apply_element_callback(env, callback, seq);
        return match applied.as_value() {
            Some(result) => ok(result.clone(), span),
            None => residual_with_callback(call, target, span),
        };
    };
    let mut items: Vec<Rc<Value>> = Vec::new();
    for element in &elements {
        let applied = apply_element_callback(env, callback, element);
        let Some(result) = applied.as_value() else {
            return residual_with_callback(call, target, span);
        };
        match result.elements() {
            Some(children) => {
                // Flatten one level; the parent result's deps ride along on
                // every child so they survive the splice.
                for child in children {
                    if result.deps.is_empty() {
                        items.push(child);
                    } else {
                        let mut child = child.as_ref().clone();
                        child.deps.extend(result.deps.iter().cloned());
                        items.push(Rc::new(child));
                    }
                }
            }
            None => items.push(Rc::new(result.clone())),
        }
    }
    ok(Value::new(Payload::List(items)), span)
};

/// Like `.` without flattening; an error when the left side is not an
/// array.
///
/// Usage: $map(items, $x => $x + 1)
pub const FN_MAP: NativeFn = |env, call, span| {
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
    let mut items = Vec::with_capacity(elements.len());
    for element in &elements {
        let applied = apply_element_callback(env, callback, element);
        let Some(result) = applied.as_value() else {
            return residual_with_callback(call, target, span);
        };
        items.push(result.clone());
    }
    ok(Value::list(items), span)
};

// ============================================================================
// FILTER / LOOKUP
// ============================================================================

/// The bracket operator. On arrays: a boolean predicate keeps matching
/// elements; a numeric predicate selects that index. On objects: a string
/// key selects that property. Dynamic indices and keys attach their deps to
/// the result; a null index or key yields null with deps preserved.
///
/// Usage: nums[$i => $this() >= 3]   (filter)
///        lookup[$idx]               (index)
///        user["name"]               (key)
pub const FN_INDEX: NativeFn = |env, call, span| {
    if call.args.len() != 2 {
        return stdlib::arity_error(&call.function, "2", call.args.len(), span);
    }
    let target = reduce(env, &call.args[0]);
    let Some(subject) = target.as_value() else {
        return residual_with_callback(call, target, span);
    };
    if subject.is_null() {
        return null_result(env, &[subject], span);
    }
    let callback = &call.args[1];

    if let Some(elements) = subject.elements() {
        return index_array(env, call, span, &target, subject, &elements, callback);
    }
    if subject.is_object() {
        return index_object(env, call, span, &target, subject, callback);
    }
    stdlib::type_error_value(env, &call.function, "an array or object", subject, span)
};

fn index_array(
    env: &Env,
    call: &CallExpr,
    span: Option<Span>,
    target: &AstNode,
    subject: &Value,
    elements: &[Rc<Value>],
    callback: &AstNode,
) -> AstNode {
    if elements.is_empty() {
        if matches!(callback.expr.as_ref(), Expr::Lambda(_)) {
            return ok(Value::list(Vec::new()), span);
        }
        // No element to bind: a non-lambda predicate can only be an index
        // (or key) expression, which evaluates in the outer environment.
        let probe = reduce(env, callback);
        let Some(index) = probe.as_value() else {
            return residual_with_callback(call, target.clone(), span);
        };
        return match &index.payload {
            Payload::Number(n) => crate::stdlib::sequence::fetch_element(
                env,
                elements,
                subject,
                *n,
                dep_of(env, index),
                span,
            ),
            Payload::Bool(_) => ok(Value::list(Vec::new()), span),
            Payload::Null => ok(
                Value::null().with_deps(deps_of(env, &[subject, index])),
                span,
            ),
            _ => stdlib::type_error_value(env, &call.function, "a predicate or index", index, span),
        };
    }

    let mut kept: Vec<Rc<Value>> = Vec::new();
    for (i, element) in elements.iter().enumerate() {
        let applied = apply_index_callback(env, callback, element, i);
        let Some(verdict) = applied.as_value() else {
            return residual_with_callback(call, target.clone(), span);
        };
        match &verdict.payload {
            Payload::Bool(true) => {
                let mut chosen = element.as_ref().clone();
                chosen.deps.extend(verdict.deps.iter().cloned());
                kept.push(Rc::new(chosen));
            }
            Payload::Bool(false) => {}
            // A numeric predicate is an index lookup, decided on the first
            // application.
            Payload::Number(n) if i == 0 => {
                return crate::stdlib::sequence::fetch_element(
                    env,
                    elements,
                    subject,
                    *n,
                    dep_of(env, verdict),
                    span,
                );
            }
            Payload::Null => {
                return ok(
                    Value::null().with_deps(deps_of(env, &[subject, verdict])),
                    span,
                );
            }
            _ => {
                return stdlib::type_error_value(
                    env,
                    &call.function,
                    "a boolean predicate or numeric index",
                    verdict,
                    span,
                );
            }
        }
    }
    ok(Value::new(Payload::List(kept)), span)
}

fn index_object(
    env: &Env,
    call: &CallExpr,
    span: Option<Span>,
    target: &AstNode,
    subject: &Value,
    callback: &AstNode,
) -> AstNode {
    // Key expressions see the enclosing scope, not the object: `user[key]`
    // reads `key` from wherever the whole expression runs.
    let applied = reduce(env, callback);
    let Some(key) = applied.as_value() else {
        return residual_with_callback(call, target.clone(), span);
    };
    match &key.payload {
        Payload::String(name) => {
            let mut result = read_property(env, subject, name);
            // A computed key makes the whole ancestry depend on it.
            if !key.deps.is_empty() || key.path.is_some() {
                result.add_dep(dep_of(env, key));
            }
            ok(result, span)
        }
        Payload::Null => ok(
            Value::null().with_deps(deps_of(env, &[subject, key])),
            span,
        ),
        _ => stdlib::type_error_value(env, &call.function, "a string key", key, span),
    }
}

// ============================================================================
// OBJECTS
// ============================================================================

/// Builds a mapping from alternating key/value arguments; the desugaring
/// target of object literals. Field values keep their own deps; a dynamic
/// key's deps attach to the field it names.
///
/// Usage: $object("a", 1, "b", 2) — written `{a: 1, b: 2}`
pub const FN_OBJECT: NativeFn = |env, call, span| {
    if call.args.len() % 2 != 0 {
        return stdlib::arity_error(&call.function, "an even number of", call.args.len(), span);
    }
    let values = match strict_args(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    let mut fields = im::HashMap::new();
    for pair in values.chunks(2) {
        let (key, value) = (&pair[0], &pair[1]);
        let Some(name) = key.as_str() else {
            return stdlib::type_error_value(env, &call.function, "a string key", key, span);
        };
        let mut field = value.clone();
        if !key.deps.is_empty() || key.path.is_some() {
            field.add_dep(dep_of(env, key));
        }
        fields.insert(name.to_string(), Rc::new(field));
    }
    ok(Value::map(fields), span)
};

/// The field names of a mapping.
///
/// Usage: $keys(obj)
pub const FN_KEYS: NativeFn = |env, call, span| {
    let [subject] = match stdlib::strict_n_args::<1>(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    if subject.is_null() {
        return null_result(env, &[&subject], span);
    }
    match subject.field_names() {
        Some(mut names) => {
            names.sort();
            let items = names.into_iter().map(Value::string).collect();
            ok(
                Value::list(items).with_deps(deps_of(env, &[&subject])),
                span,
            )
        }
        None => stdlib::type_error_value(env, &call.function, "an object", &subject, span),
    }
};

/// The field values of a mapping, each keeping its own deps.
///
/// Usage: $values(obj)
pub const FN_VALUES: NativeFn = |env, call, span| {
    let [subject] = match stdlib::strict_n_args::<1>(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    if subject.is_null() {
        return null_result(env, &[&subject], span);
    }
    match subject.field_names() {
        Some(mut names) => {
            names.sort();
            let items = names
                .iter()
                .filter_map(|name| subject.field(name))
                .collect();
            ok(
                Value::list(items).with_deps(deps_of(env, &[&subject])),
                span,
            )
        }
        None => stdlib::type_error_value(env, &call.function, "an object", &subject, span),
    }
};

/// Shallow merge of mappings, later arguments winning.
///
/// Usage: $merge(defaults, overrides)
pub const FN_MERGE: NativeFn = |env, call, span| {
    if call.args.is_empty() {
        return stdlib::arity_error(&call.function, "at least 1", 0, span);
    }
    let values = match strict_args(env, call, span) {
        Ok(values) => values,
        Err(node) => return node,
    };
    let operands: Vec<&Value> = values.iter().collect();
    if values.iter().any(Value::is_null) {
        return null_result(env, &operands, span);
    }
    let mut merged = im::HashMap::new();
    for value in &values {
        let Some(names) = value.field_names() else {
            return stdlib::type_error_value(env, &call.function, "objects", value, span);
        };
        for name in names {
            if let Some(field) = value.field(&name) {
                merged.insert(name, Rc::new(field));
            }
        }
    }
    ok(
        Value::map(merged).with_deps(deps_of(env, &operands)),
        span,
    )
};

// ============================================================================
// WHICH
// ============================================================================

/// Dispatch on a value: `value, (match, result)*` pairs, first match wins
/// under the environment comparator. A match may be an array of candidates.
/// Only the chosen result is evaluated.
///
/// Usage: $which(code, 1, "one", [2, 3], "a few")
pub const FN_WHICH: NativeFn = |env, call, span| {
    if call.args.is_empty() || call.args.len() % 2 == 0 {
        return stdlib::arity_error(
            &call.function,
            "a value plus match/result pairs",
            call.args.len(),
            span,
        );
    }
    let subject_node = reduce(env, &call.args[0]);
    let Some(subject) = subject_node.as_value() else {
        return which_residual(call, subject_node, span);
    };
    let mut deps = vec![dep_of(env, subject)];
    for pair in call.args[1..].chunks(2) {
        let match_node = reduce(env, &pair[0]);
        let Some(candidate) = match_node.as_value() else {
            return which_residual(call, subject_node, span);
        };
        deps.push(dep_of(env, candidate));
        let hit = match candidate.elements() {
            Some(options) => options
                .iter()
                .any(|option| env.compare(subject, option) == Some(Ordering::Equal)),
            None => env.compare(subject, candidate) == Some(Ordering::Equal),
        };
        if hit {
            let result_node = reduce(env, &pair[1]);
            let Some(result) = result_node.as_value() else {
                return which_residual(call, subject_node, span);
            };
            let mut result = result.clone();
            result.deps.extend(deps);
            return ok(result, span);
        }
    }
    ok(Value::null().with_deps(deps), span)
};

/// Residual `which`: the subject is reduced, every match and result stays
/// raw so untaken results are never evaluated early.
fn which_residual(call: &CallExpr, subject: AstNode, span: Option<Span>) -> AstNode {
    let mut args = vec![subject];
    args.extend(call.args.iter().skip(1).cloned());
    residual_call(call, args, span)
}

// ============================================================================
// TYPE CALLBACKS
// ============================================================================

const TYPE_THIS: TypeOfFn = |env, _| env.data_type.clone();

const TYPE_DOT: TypeOfFn = |env, call| {
    if call.args.len() != 2 {
        return Type::any();
    }
    let target = check_expr(env, &call.args[0]);
    let element_env = env.with_data_type(element_type(&target));
    let body = check_expr(&element_env, &call.args[1]);
    if matches!(&body, Type::Array { .. }) {
        Type::array_of(element_type(&body))
    } else {
        Type::array_of(body)
    }
};

const TYPE_MAP: TypeOfFn = |env, call| {
    if call.args.len() != 2 {
        return Type::any();
    }
    let target = check_expr(env, &call.args[0]);
    let element_env = env.with_data_type(element_type(&target));
    Type::array_of(check_expr(&element_env, &call.args[1]))
};

const TYPE_INDEX: TypeOfFn = |env, call| {
    if call.args.len() != 2 {
        return Type::any();
    }
    let target = check_expr(env, &call.args[0]);
    let element_env = env.with_data_type(element_type(&target));
    match check_expr(&element_env, &call.args[1]) {
        Type::Primitive {
            kind: crate::types::PrimKind::Boolean,
            ..
        } => target,
        Type::Primitive {
            kind: crate::types::PrimKind::Number,
            ..
        } => element_type(&target),
        Type::Primitive {
            kind: crate::types::PrimKind::String,
            constant: Some(serde_json::Value::String(key)),
        } => match &target {
            Type::Object { fields } => fields.get(&key).cloned().unwrap_or_else(Type::any),
            _ => Type::any(),
        },
        _ => Type::any(),
    }
};

const TYPE_OBJECT: TypeOfFn = |env, call| {
    let mut fields = im::HashMap::new();
    for pair in call.args.chunks(2) {
        if pair.len() != 2 {
            return Type::any();
        }
        match pair[0].as_value().and_then(Value::as_str) {
            Some(key) => {
                fields.insert(key.to_string(), check_expr(env, &pair[1]));
            }
            None => return Type::any(),
        }
    }
    Type::Object { fields }
};

const TYPE_KEYS: TypeOfFn = |_, _| Type::array_of(Type::string());

const TYPE_VALUES: TypeOfFn = |env, call| {
    let target = call.args.first().map(|arg| check_expr(env, arg));
    match target {
        Some(Type::Object { fields }) => {
            let mut element = Type::never();
            for ty in fields.values() {
                element = union_type(&element, ty);
            }
            if element.is_never() {
                Type::array_of(Type::any())
            } else {
                Type::array_of(element)
            }
        }
        _ => Type::array_of(Type::any()),
    }
};

const TYPE_MERGE: TypeOfFn = |env, call| {
    let mut merged = Type::never();
    for arg in &call.args {
        merged = union_type(&merged, &check_expr(env, arg));
    }
    merged
};

const TYPE_WHICH: TypeOfFn = |env, call| {
    if call.args.is_empty() {
        return Type::any();
    }
    let mut result = Type::never();
    for pair in call.args[1..].chunks(2) {
        if pair.len() == 2 {
            result = union_type(&result, &check_expr(env, &pair[1]));
        }
    }
    union_type(&result, &Type::null())
};

pub fn register(map: &mut im::HashMap<String, AstNode>) {
    stdlib::install(map, "this", FN_THIS, TYPE_THIS);
    stdlib::install(map, ".", FN_DOT, TYPE_DOT);
    stdlib::install(map, "map", FN_MAP, TYPE_MAP);
    stdlib::install(map, "[", FN_INDEX, TYPE_INDEX);
    stdlib::install(map, "object", FN_OBJECT, TYPE_OBJECT);
    stdlib::install(map, "keys", FN_KEYS, TYPE_KEYS);
    stdlib::install(map, "values", FN_VALUES, TYPE_VALUES);
    stdlib::install(map, "merge", FN_MERGE, TYPE_MERGE);
    stdlib::install(map, "which", FN_WHICH, TYPE_WHICH);
}
