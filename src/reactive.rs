//! Reactive evaluation over host-supplied cells.
//!
//! The core does not implement a reactivity system. It expects the host to
//! provide one through two small traits: `ControlCell`, a tracked slot in
//! the host's dependency graph, and `CellRuntime`, the hook for creating
//! computed cells that re-run when anything they read changes. Evaluation in
//! reactive mode is ordinary full evaluation; the only difference is that
//! the current value is a `ControlBackedValue` projecting cell contents on
//! demand, so the host's graph tracks exactly the children an expression
//! touched.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::AstNode;
use crate::env::Env;
use crate::path::{Path, Segment};
use crate::value::{extract_all_paths, from_native, to_native, Payload, Value};

/// One tracked node of the host's reactive graph. Reading through `read`
/// must register a dependency; writing must invalidate dependents. `child`
/// scopes a cell to one field or element of a composite value.
pub trait ControlCell {
    /// Tracking read of this node's value.
    fn read(&self) -> serde_json::Value;

    fn write(&self, value: serde_json::Value);

    fn child(&self, segment: &Segment) -> Option<Rc<dyn ControlCell>>;

    /// Array length, as a tracking structural read.
    fn len(&self) -> Option<usize> {
        match self.read() {
            serde_json::Value::Array(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Object keys, as a tracking structural read.
    fn keys(&self) -> Option<Vec<String>> {
        match self.read() {
            serde_json::Value::Object(fields) => Some(fields.keys().cloned().collect()),
            _ => None,
        }
    }
}

/// Factory for computed cells: `compute` re-runs whenever a cell it read
/// changes, and the returned cell holds the latest result.
pub trait CellRuntime {
    fn computed(&self, compute: Rc<dyn Fn() -> serde_json::Value>) -> Rc<dyn ControlCell>;
}

// ============================================================================
// CONTROL-BACKED VALUES
// ============================================================================

/// A value whose payload lives in an external input cell. Scalar reads
/// materialize concrete values carrying their path; composite reads stay
/// lazy, handing out child wrappers scoped to child cells.
#[derive(Clone)]
pub struct ControlBackedValue {
    cell: Rc<dyn ControlCell>,
    path: Path,
}

impl fmt::Debug for ControlBackedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<cell {}>", self.path)
    }
}

impl ControlBackedValue {
    pub fn new(cell: Rc<dyn ControlCell>, path: Path) -> Self {
        ControlBackedValue { cell, path }
    }

    pub fn path(&self) -> Path {
        self.path.clone()
    }

    pub fn same_cell(&self, other: &ControlBackedValue) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    /// Wraps a root input cell as the current value of a reactive
    /// environment.
    pub fn root_value(cell: Rc<dyn ControlCell>) -> Value {
        project(cell, Path::root())
    }

    pub fn type_name(&self) -> &'static str {
        match self.cell.read() {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "boolean",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        }
    }

    /// Tracking read of the whole subtree, stripped of provenance.
    pub fn read_native(&self) -> serde_json::Value {
        self.cell.read()
    }

    pub fn child_field(&self, name: &str) -> Option<Value> {
        let segment = Segment::field(name);
        let child = self.cell.child(&segment)?;
        Some(project(child, self.path.child(segment)))
    }

    pub fn child_index(&self, index: usize) -> Option<Value> {
        let segment = Segment::Index(index);
        let child = self.cell.child(&segment)?;
        Some(project(child, self.path.child(segment)))
    }

    pub fn elements(&self) -> Option<Vec<Value>> {
        let len = self.cell.len()?;
        Some(
            (0..len)
                .map(|i| {
                    self.child_index(i)
                        .unwrap_or_else(|| Value::null().at_path(self.path.index(i)))
                })
                .collect(),
        )
    }

    pub fn keys(&self) -> Option<Vec<String>> {
        self.cell.keys()
    }
}

/// A scalar cell materializes now; a composite cell stays behind a wrapper
/// so children are only tracked when touched.
fn project(cell: Rc<dyn ControlCell>, path: Path) -> Value {
    match cell.read() {
        v @ (serde_json::Value::Null
        | serde_json::Value::Bool(_)
        | serde_json::Value::Number(_)
        | serde_json::Value::String(_)) => from_native(&v, path),
        _ => Value::new(Payload::Cell(ControlBackedValue::new(cell, path.clone()))).at_path(path),
    }
}

// ============================================================================
// COMPUTED VALUES
// ============================================================================

/// An expression bound to a computed cell: the thunk evaluates the AST in
/// the given environment, the host's runtime re-runs it when any input cell
/// it read changes, and `value` reads the latest result through the cell.
pub struct ComputedValueExpr {
    cell: Rc<dyn ControlCell>,
    paths: Rc<RefCell<Vec<Path>>>,
}

impl ComputedValueExpr {
    pub fn new(runtime: &dyn CellRuntime, env: &Env, node: &AstNode) -> Self {
        let env = env.clone();
        let node = node.clone();
        let paths = Rc::new(RefCell::new(Vec::new()));
        let paths_out = paths.clone();
        let cell = runtime.computed(Rc::new(move || {
            let value = crate::eval::evaluate(&env, &node);
            *paths_out.borrow_mut() = extract_all_paths(&value);
            to_native(&value)
        }));
        ComputedValueExpr { cell, paths }
    }

    /// Tracking read of the latest computed result, carrying the input paths
    /// of the last computation as its deps.
    pub fn value(&self) -> Value {
        crate::value::native_value(&self.cell.read()).with_deps(
            self.dependency_paths()
                .into_iter()
                .map(crate::value::Dep::Path)
                .collect(),
        )
    }

    /// The input paths the last computation consumed. In reactive mode the
    /// dependency graph proper lives in the host's cell system; these paths
    /// are the portable summary of it.
    pub fn dependency_paths(&self) -> Vec<Path> {
        self.paths.borrow().clone()
    }

    pub fn cell(&self) -> Rc<dyn ControlCell> {
        self.cell.clone()
    }
}
