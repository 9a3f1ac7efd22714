//! Canonical runtime value type for the Mantra engine.
//!
//! Every evaluation produces a `Value`: a JSON-shaped payload tagged with the
//! path it was read from, the set of inputs it was derived from, and any
//! errors produced along the way. The payload is deeply compositional; lists
//! and maps contain other values, and each element keeps its own provenance
//! so downstream consumers track only what they actually touch.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::ast::{AstNode, CallExpr, Span};
use crate::env::Env;
use crate::path::{Path, Segment};
use crate::reactive::ControlBackedValue;
use crate::types::{Type, TypeEnv};

/// Evaluation callback of a built-in: reduces a call in the given
/// environment. Returns a fully-evaluated value node in full and reactive
/// mode, and possibly a residual call in partial mode.
pub type NativeFn = fn(env: &Env, call: &CallExpr, span: Option<Span>) -> AstNode;

/// Type-checking callback of a built-in: the result type of a call given the
/// typing environment.
pub type TypeOfFn = fn(env: &TypeEnv, call: &CallExpr) -> Type;

/// A named pair of evaluator and type-checker callbacks. Installed once as a
/// value in the base environment and immutable thereafter.
pub struct FunctionHandle {
    pub name: &'static str,
    pub eval: NativeFn,
    pub get_type: TypeOfFn,
}

impl fmt::Debug for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name)
    }
}

impl PartialEq for FunctionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.eval as usize == other.eval as usize
    }
}

/// The JSON-like payload universe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Payload {
    /// Absence of a value; also the result of most runtime failures.
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Ordered list; elements are shared so they can double as dependencies.
    List(Vec<Rc<Value>>),
    /// String-keyed mapping; insertion order is irrelevant.
    Map(im::HashMap<String, Rc<Value>>),
    /// A built-in or bound function (never serialized).
    #[serde(skip)]
    Function(Rc<FunctionHandle>),
    /// A reactive projection of an external input cell (never serialized).
    #[serde(skip)]
    Cell(ControlBackedValue),
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Payload::Null, Payload::Null) => true,
            (Payload::Bool(a), Payload::Bool(b)) => a == b,
            (Payload::Number(a), Payload::Number(b)) => a == b,
            (Payload::String(a), Payload::String(b)) => a == b,
            (Payload::List(a), Payload::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.as_ref() == y.as_ref())
            }
            (Payload::Map(a), Payload::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.as_ref() == w.as_ref()))
            }
            (Payload::Function(a), Payload::Function(b)) => a.as_ref() == b.as_ref(),
            (Payload::Cell(a), Payload::Cell(b)) => a.same_cell(b),
            _ => false,
        }
    }
}

/// A reference to an input that contributed to a computed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dep {
    Value(Rc<Value>),
    Path(Path),
}

/// A payload plus its provenance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Value {
    pub payload: Payload,
    /// The location this value was read from; absent for computed values.
    pub path: Option<Path>,
    /// The inputs actually consumed while computing this value.
    pub deps: Vec<Dep>,
    /// Errors produced while computing this value.
    pub errors: Vec<String>,
    /// Source range of the expression that produced this value.
    pub location: Option<Span>,
}

/// Equality is payload equality; provenance never participates. This is what
/// AST round-trip comparison and the canonical form rely on.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl Value {
    pub fn new(payload: Payload) -> Self {
        Value {
            payload,
            ..Value::default()
        }
    }

    pub fn null() -> Self {
        Value::new(Payload::Null)
    }

    pub fn bool(b: bool) -> Self {
        Value::new(Payload::Bool(b))
    }

    pub fn number(n: f64) -> Self {
        Value::new(Payload::Number(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::new(Payload::String(s.into()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::new(Payload::List(items.into_iter().map(Rc::new).collect()))
    }

    pub fn map(fields: im::HashMap<String, Rc<Value>>) -> Self {
        Value::new(Payload::Map(fields))
    }

    pub fn function(handle: FunctionHandle) -> Self {
        Value::new(Payload::Function(Rc::new(handle)))
    }

    /// A null value carrying an error message; the shape every recoverable
    /// runtime failure takes.
    pub fn error(message: impl Into<String>) -> Self {
        let mut v = Value::null();
        v.errors.push(message.into());
        v
    }

    // ------------------------------------------------------------------
    // Builder-style provenance attachment
    // ------------------------------------------------------------------

    pub fn at_path(mut self, path: Path) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_deps(mut self, deps: Vec<Dep>) -> Self {
        self.deps = deps;
        self
    }

    pub fn depending_on(mut self, inputs: &[&Value]) -> Self {
        for input in inputs {
            self.deps.push(Dep::Value(Rc::new((*input).clone())));
        }
        self
    }

    pub fn add_dep(&mut self, dep: Dep) {
        self.deps.push(dep);
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.errors.push(message.into());
        self
    }

    pub fn at_location(mut self, span: Option<Span>) -> Self {
        self.location = span.or(self.location);
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn type_name(&self) -> &'static str {
        match &self.payload {
            Payload::Null => "null",
            Payload::Bool(_) => "boolean",
            Payload::Number(_) => "number",
            Payload::String(_) => "string",
            Payload::List(_) => "array",
            Payload::Map(_) => "object",
            Payload::Function(_) => "function",
            Payload::Cell(cell) => cell.type_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.payload, Payload::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match &self.payload {
            Payload::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.payload {
            Payload::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<Rc<FunctionHandle>> {
        match &self.payload {
            Payload::Function(f) => Some(f.clone()),
            _ => None,
        }
    }

    /// The elements of a list value, materializing reactive projections on
    /// demand. `None` when the payload is not list-shaped.
    pub fn elements(&self) -> Option<Vec<Rc<Value>>> {
        match &self.payload {
            Payload::List(items) => Some(items.clone()),
            Payload::Cell(cell) => cell.elements().map(|vs| vs.into_iter().map(Rc::new).collect()),
            _ => None,
        }
    }

    /// Reads a field of an object value, materializing reactive projections
    /// on demand. `None` when the payload is not object-shaped or the field
    /// is absent.
    pub fn field(&self, name: &str) -> Option<Value> {
        match &self.payload {
            Payload::Map(fields) => fields.get(name).map(|v| v.as_ref().clone()),
            Payload::Cell(cell) => cell.child_field(name),
            _ => None,
        }
    }

    /// The field names of an object value.
    pub fn field_names(&self) -> Option<Vec<String>> {
        match &self.payload {
            Payload::Map(fields) => Some(fields.keys().cloned().collect()),
            Payload::Cell(cell) => cell.keys(),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        match &self.payload {
            Payload::Map(_) => true,
            Payload::Cell(cell) => cell.type_name() == "object",
            _ => false,
        }
    }

    pub fn is_list(&self) -> bool {
        match &self.payload {
            Payload::List(_) => true,
            Payload::Cell(cell) => cell.type_name() == "array",
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Stringification (templates and the `string` built-in)
    // ------------------------------------------------------------------

    /// Renders the payload for string concatenation: null is empty, numbers
    /// print without a trailing fraction when integral, containers render as
    /// JSON.
    pub fn stringify(&self) -> String {
        match &self.payload {
            Payload::Null => String::new(),
            Payload::Bool(b) => b.to_string(),
            Payload::Number(n) => format_number(*n),
            Payload::String(s) => s.clone(),
            Payload::List(_) | Payload::Map(_) => to_native(self).to_string(),
            Payload::Function(f) => format!("<fn {}>", f.name),
            Payload::Cell(cell) => from_native(&cell.read_native(), cell.path()).stringify(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Null => write!(f, "null"),
            Payload::String(s) => write!(f, "{s:?}"),
            _ => write!(f, "{}", self.stringify()),
        }
    }
}

/// Prints an f64 the way the surface language reads it: no fraction for
/// integral values.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ----------------------------------------------------------------------
// Native projection
// ----------------------------------------------------------------------

/// Strips paths, deps and errors, recursing into lists and mappings.
/// Functions project to null; reactive cells are forced.
pub fn to_native(value: &Value) -> serde_json::Value {
    match &value.payload {
        Payload::Null | Payload::Function(_) => serde_json::Value::Null,
        Payload::Bool(b) => serde_json::Value::Bool(*b),
        // Integral numbers project as JSON integers, the shape hosts put in.
        Payload::Number(n) if n.fract() == 0.0 && n.is_finite() && n.abs() < 9e15 => {
            serde_json::Value::from(*n as i64)
        }
        Payload::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Payload::String(s) => serde_json::Value::String(s.clone()),
        Payload::List(items) => {
            serde_json::Value::Array(items.iter().map(|v| to_native(v)).collect())
        }
        Payload::Map(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), to_native(v)))
                .collect(),
        ),
        Payload::Cell(cell) => cell.read_native(),
    }
}

/// Builds a value tree from plain data with no provenance at all; for
/// constants that were never read from the input tree.
pub fn native_value(data: &serde_json::Value) -> Value {
    match data {
        serde_json::Value::Null => Value::null(),
        serde_json::Value::Bool(b) => Value::bool(*b),
        serde_json::Value::Number(n) => Value::number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(items) => {
            Value::list(items.iter().map(native_value).collect())
        }
        serde_json::Value::Object(fields) => Value::map(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), Rc::new(native_value(v))))
                .collect(),
        ),
    }
}

/// Builds a value tree from plain data, tagging every node with the path it
/// was read from. Reads carry no deps; the path is the provenance.
pub fn from_native(data: &serde_json::Value, path: Path) -> Value {
    let payload = match data {
        serde_json::Value::Null => Payload::Null,
        serde_json::Value::Bool(b) => Payload::Bool(*b),
        serde_json::Value::Number(n) => Payload::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Payload::String(s.clone()),
        serde_json::Value::Array(items) => Payload::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| Rc::new(from_native(item, path.index(i))))
                .collect(),
        ),
        serde_json::Value::Object(fields) => Payload::Map(
            fields
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        Rc::new(from_native(v, path.child(Segment::field(k)))),
                    )
                })
                .collect(),
        ),
    };
    Value::new(payload).at_path(path)
}

// ----------------------------------------------------------------------
// Dependency-graph traversals
// ----------------------------------------------------------------------

/// Identity key for cycle tolerance: values are revisited by reference, not
/// by structural equality.
type Visited = std::collections::HashSet<usize>;

fn visit<'a>(value: &'a Value, visited: &mut Visited, f: &mut impl FnMut(&'a Value)) {
    f(value);
    for dep in &value.deps {
        match dep {
            Dep::Value(inner) => visit_rc(inner, visited, f),
            Dep::Path(_) => {}
        }
    }
    match &value.payload {
        Payload::List(items) => {
            for item in items {
                visit_rc(item, visited, f);
            }
        }
        Payload::Map(fields) => {
            for item in fields.values() {
                visit_rc(item, visited, f);
            }
        }
        _ => {}
    }
}

fn visit_rc<'a>(value: &'a Rc<Value>, visited: &mut Visited, f: &mut impl FnMut(&'a Value)) {
    if visited.insert(Rc::as_ptr(value) as usize) {
        visit(value, visited, f);
    }
}

/// Every input path this value transitively depended on, in first-seen order.
pub fn extract_all_paths(value: &Value) -> Vec<Path> {
    let mut visited = Visited::new();
    let mut seen = std::collections::HashSet::new();
    let mut paths = Vec::new();
    visit(value, &mut visited, &mut |v| {
        if let Some(path) = &v.path {
            if seen.insert(path.clone()) {
                paths.push(path.clone());
            }
        }
        for dep in &v.deps {
            if let Dep::Path(path) = dep {
                if seen.insert(path.clone()) {
                    paths.push(path.clone());
                }
            }
        }
    });
    paths
}

/// Every error message reachable through the value and its dependency graph.
pub fn collect_all_errors(value: &Value) -> Vec<String> {
    let mut visited = Visited::new();
    let mut seen = std::collections::HashSet::new();
    let mut errors = Vec::new();
    visit(value, &mut visited, &mut |v| {
        for error in &v.errors {
            if seen.insert(error.clone()) {
                errors.push(error.clone());
            }
        }
    });
    errors
}

pub fn has_errors(value: &Value) -> bool {
    let mut visited = Visited::new();
    let mut found = false;
    visit(value, &mut visited, &mut |v| {
        found |= !v.errors.is_empty();
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_round_trip_preserves_payload() {
        let data = serde_json::json!({"a": [1, true, "x"], "b": null});
        let value = from_native(&data, Path::root());
        assert_eq!(to_native(&value), data);
        // Paths survive the inbound direction only.
        let a0 = value.field("a").unwrap().elements().unwrap()[0].clone();
        assert_eq!(a0.path.as_ref().unwrap().to_string(), "a[0]");
    }

    #[test]
    fn extract_paths_walks_deps_and_elements() {
        let a = from_native(&serde_json::json!(5), Path::root().field("a"));
        let b = from_native(&serde_json::json!(3), Path::root().field("b"));
        let sum = Value::number(8.0).depending_on(&[&a, &b]);
        let paths: Vec<String> = extract_all_paths(&sum)
            .iter()
            .map(Path::to_string)
            .collect();
        assert_eq!(paths, vec!["a", "b"]);
    }

    #[test]
    fn error_collection_tolerates_shared_substructure() {
        let shared = Rc::new(Value::error("boom"));
        let mut v = Value::null();
        v.deps.push(Dep::Value(shared.clone()));
        v.deps.push(Dep::Value(shared));
        assert_eq!(collect_all_errors(&v), vec!["boom".to_string()]);
        assert!(has_errors(&v));
    }
}
