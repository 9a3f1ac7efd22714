//! Mantra: a small, embeddable expression language for dynamic behaviour in
//! data-driven forms.
//!
//! One AST, three evaluation modes: full evaluation to a value with a
//! precise dependency set, partial evaluation to a simplified residual
//! expression, and reactive evaluation over host-supplied cells. The facade
//! below is the whole embedding surface; everything else is plumbing.

pub mod ast;
pub mod canon;
pub mod env;
pub mod errors;
pub mod eval;
pub mod parser;
pub mod path;
pub mod printer;
pub mod reactive;
pub mod stdlib;
pub mod types;
pub mod uninline;
pub mod value;

use std::rc::Rc;

pub use crate::ast::{AstNode, Expr, Span};
pub use crate::canon::{from_canonical, normalize, to_canonical};
pub use crate::env::{Env, EvalMode};
pub use crate::errors::{format_errors_with_locations, ParseError};
pub use crate::eval::{evaluate, evaluate_partial};
pub use crate::parser::{parse, parse_with_source};
pub use crate::path::{Path, Segment};
pub use crate::printer::{print_expr, print_path};
pub use crate::reactive::{CellRuntime, ComputedValueExpr, ControlCell};
pub use crate::types::{check_expr, Type, TypeEnv};
pub use crate::uninline::uninline;
pub use crate::value::{
    collect_all_errors, extract_all_paths, from_native, has_errors, to_native, Value,
};

/// A full-evaluation environment: standard functions installed and the
/// current value bound to the root of the given data.
pub fn basic_env(root: &serde_json::Value) -> Env {
    stdlib::install_standard(&Env::new(EvalMode::Full))
        .with_current(value::from_native(root, Path::root()))
}

/// A partial-evaluation environment: standard functions installed, the given
/// variables known, everything else symbolic.
pub fn partial_env<I>(known_vars: I) -> Env
where
    I: IntoIterator<Item = (String, serde_json::Value)>,
{
    let base = stdlib::install_standard(&Env::new(EvalMode::Partial));
    let mut bindings = im::HashMap::new();
    for (name, data) in known_vars {
        bindings.insert(name, AstNode::value(value::native_value(&data)));
    }
    base.new_scope(bindings)
}

/// A reactive-evaluation environment: standard functions installed and the
/// current value bound to a control-backed projection of the root cell.
pub fn reactive_env(root: Rc<dyn ControlCell>) -> Env {
    stdlib::install_standard(&Env::new(EvalMode::Reactive))
        .with_current(reactive::ControlBackedValue::root_value(root))
}

/// A typing environment that knows the standard functions, for checking
/// expressions against a data shape.
pub fn basic_type_env(data_type: Type) -> TypeEnv {
    stdlib::standard_type_env(data_type)
}
