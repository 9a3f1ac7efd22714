//! The evaluation environment: an immutable chain of lexical scopes.
//!
//! Each scope owns a map of unevaluated bindings and a write-once cache of
//! what those bindings reduced to in this scope. Binding right-hand sides
//! are reduced the first time the name is read, in the environment where the
//! binding was introduced, and memoized there; discarding the scope is the
//! only invalidation. The magic name `_` carries the current value that bare
//! identifiers read fields from.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;

use crate::ast::{AstNode, Expr, InlineTag};
use crate::errors;
use crate::value::{FunctionHandle, Value};

/// The magic current-value name.
pub const CURRENT: &str = "_";

/// How the single structural reducer behaves at the leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Strict reduction to values; unknown names become error values.
    Full,
    /// Symbolic reduction; unknown names stay residual.
    Partial,
    /// Strict reduction over control-backed inputs.
    Reactive,
}

/// Ordering decision for the language's comparison operators. `None` means
/// the operands are incomparable (and therefore not equal).
pub type Comparator = Rc<dyn Fn(&Value, &Value) -> Option<Ordering>>;

struct Shared {
    mode: EvalMode,
    compare: Comparator,
    next_scope_id: Cell<u64>,
}

pub struct Scope {
    bindings: im::HashMap<String, AstNode>,
    cache: RefCell<im::HashMap<String, AstNode>>,
    scope_id: u64,
    parent: Option<Rc<Scope>>,
    shared: Rc<Shared>,
}

/// A cheap-clone handle on the innermost scope of a chain.
#[derive(Clone)]
pub struct Env {
    scope: Rc<Scope>,
}

impl Env {
    pub fn new(mode: EvalMode) -> Self {
        let shared = Rc::new(Shared {
            mode,
            compare: Rc::new(compare_default),
            next_scope_id: Cell::new(1),
        });
        Env {
            scope: Rc::new(Scope {
                bindings: im::HashMap::new(),
                cache: RefCell::new(im::HashMap::new()),
                scope_id: 0,
                parent: None,
                shared,
            }),
        }
    }

    pub fn mode(&self) -> EvalMode {
        self.scope.shared.mode
    }

    pub fn is_partial(&self) -> bool {
        self.mode() == EvalMode::Partial
    }

    /// Replaces the comparator for this environment and its descendants.
    pub fn with_comparator(&self, compare: Comparator) -> Env {
        let shared = Rc::new(Shared {
            mode: self.scope.shared.mode,
            compare,
            next_scope_id: Cell::new(self.scope.shared.next_scope_id.get()),
        });
        Env {
            scope: Rc::new(Scope {
                bindings: self.scope.bindings.clone(),
                cache: RefCell::new(self.scope.cache.borrow().clone()),
                scope_id: self.scope.scope_id,
                parent: self.scope.parent.clone(),
                shared,
            }),
        }
    }

    pub fn compare(&self, a: &Value, b: &Value) -> Option<Ordering> {
        (self.scope.shared.compare)(a, b)
    }

    /// The id of the innermost scope; what uninlining uses to tell shadowed
    /// bindings apart.
    pub fn scope_id(&self) -> u64 {
        self.scope.scope_id
    }

    /// Pushes a scope with the given bindings. An empty map is a no-op.
    pub fn new_scope(&self, bindings: im::HashMap<String, AstNode>) -> Env {
        if bindings.is_empty() {
            return self.clone();
        }
        let shared = self.scope.shared.clone();
        let scope_id = shared.next_scope_id.get();
        shared.next_scope_id.set(scope_id + 1);
        Env {
            scope: Rc::new(Scope {
                bindings,
                cache: RefCell::new(im::HashMap::new()),
                scope_id,
                parent: Some(self.scope.clone()),
                shared,
            }),
        }
    }

    /// Binds one name; convenience over `new_scope`.
    pub fn bind(&self, name: impl Into<String>, node: AstNode) -> Env {
        let mut bindings = im::HashMap::new();
        bindings.insert(name.into(), node);
        self.new_scope(bindings)
    }

    /// Rebinds the current value `_`.
    pub fn with_current(&self, value: Value) -> Env {
        self.bind(CURRENT, AstNode::value(value))
    }

    /// The nearest current value, fully reduced. `None` when no scope binds
    /// `_` or (in partial mode) when it is still symbolic.
    pub fn current_value(&self) -> Option<Value> {
        let node = self.lookup(CURRENT)?;
        node.as_value().cloned()
    }

    fn find_scope(&self, name: &str) -> Option<Rc<Scope>> {
        let mut scope = Some(self.scope.clone());
        while let Some(s) = scope {
            if s.bindings.contains_key(name) {
                return Some(s);
            }
            scope = s.parent.clone();
        }
        None
    }

    /// Resolves `name` in the scope chain, reducing and memoizing its
    /// binding on first read. `None` when no scope binds it.
    pub fn lookup(&self, name: &str) -> Option<AstNode> {
        let scope = self.find_scope(name)?;
        if let Some(cached) = scope.cache.borrow().get(name) {
            return Some(cached.clone());
        }
        let rhs = scope.bindings.get(name).expect("binding exists").clone();
        // A binding of exactly `$x := $x` must not recurse into itself.
        let reduced = if matches!(rhs.expr.as_ref(), Expr::Var(n) if n == name) {
            rhs
        } else {
            let defining = Env { scope: scope.clone() };
            crate::eval::reduce(&defining, &rhs)
        };
        scope
            .cache
            .borrow_mut()
            .insert(name.to_string(), reduced.clone());
        Some(reduced)
    }

    /// Reduces a `Var` node per the evaluation mode: full/reactive modes turn
    /// unknown names into error values, partial mode keeps them symbolic and
    /// tags everything it inlines with the defining scope.
    pub fn lookup_var(&self, name: &str, node: &AstNode) -> AstNode {
        let Some(scope) = self.find_scope(name) else {
            return match self.mode() {
                EvalMode::Partial => node.clone(),
                _ => AstNode::value(
                    Value::error(errors::undefined_variable(name)).at_location(node.span),
                ),
            };
        };
        let defining = Env {
            scope: scope.clone(),
        };
        let reduced = defining.lookup(name).expect("scope binds the name");
        match self.mode() {
            EvalMode::Partial => {
                if reduced.is_call() {
                    // Call-shaped results stay behind their name; the
                    // enclosing let rebuild keeps the binding.
                    node.clone()
                } else if matches!(reduced.expr.as_ref(), Expr::Var(n) if n == name) {
                    // Self-referential or unknown further up: leave as-is.
                    node.clone()
                } else {
                    reduced.tagged(InlineTag {
                        name: name.to_string(),
                        scope_id: scope.scope_id,
                    })
                }
            }
            _ => {
                if reduced.is_value() {
                    reduced
                } else if matches!(reduced.expr.as_ref(), Expr::Var(n) if n == name) {
                    AstNode::value(
                        Value::error(format!("self-referential binding ${name}"))
                            .at_location(node.span),
                    )
                } else {
                    AstNode::value(
                        Value::error(errors::undefined_variable(name)).at_location(node.span),
                    )
                }
            }
        }
    }

    /// Resolves a function handle installed in the environment.
    pub fn lookup_function(&self, name: &str) -> Option<Rc<FunctionHandle>> {
        let node = self.lookup(name)?;
        node.as_value().and_then(Value::as_function)
    }
}

// ============================================================================
// DEFAULT COMPARATOR
// ============================================================================

/// Numbers compare after rounding to 5 significant digits, strings
/// lexicographically, booleans by equality only; everything else is
/// incomparable.
pub fn compare_default(a: &Value, b: &Value) -> Option<Ordering> {
    use crate::value::Payload;
    match (&a.payload, &b.payload) {
        (Payload::Number(x), Payload::Number(y)) => {
            round_significant(*x, 5).partial_cmp(&round_significant(*y, 5))
        }
        (Payload::String(x), Payload::String(y)) => Some(x.cmp(y)),
        (Payload::Bool(x), Payload::Bool(y)) if x == y => Some(Ordering::Equal),
        _ => None,
    }
}

/// Rounds to `digits` significant decimal digits.
pub fn round_significant(x: f64, digits: i32) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let magnitude = x.abs().log10().floor() as i32;
    let factor = 10f64.powi(digits - 1 - magnitude);
    (x * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn significant_digit_rounding() {
        assert_eq!(round_significant(123.456_789, 5), 123.46);
        assert_eq!(round_significant(0.000_123_456, 5), 0.000_123_46);
        // Large magnitudes collapse sub-significant differences.
        assert_eq!(
            round_significant(-987_654.0, 5),
            round_significant(-987_649.0, 5)
        );
    }

    #[test]
    fn comparator_equates_close_numbers() {
        let a = Value::number(1.000_001);
        let b = Value::number(1.000_002);
        assert_eq!(compare_default(&a, &b), Some(Ordering::Equal));
        let c = Value::number(1.001);
        assert_eq!(compare_default(&a, &c), Some(Ordering::Less));
    }

    #[test]
    fn incomparable_kinds() {
        assert_eq!(
            compare_default(&Value::bool(true), &Value::bool(false)),
            None
        );
        assert_eq!(compare_default(&Value::null(), &Value::null()), None);
        assert_eq!(
            compare_default(&Value::number(1.0), &Value::string("1")),
            None
        );
    }

    #[test]
    fn scope_ids_are_unique() {
        let env = Env::new(EvalMode::Full);
        let a = env.bind("x", AstNode::value(Value::number(1.0)));
        let b = a.bind("x", AstNode::value(Value::number(2.0)));
        assert_ne!(a.scope_id(), b.scope_id());
    }

    #[test]
    fn empty_scope_is_identity() {
        let env = Env::new(EvalMode::Full);
        let same = env.new_scope(im::HashMap::new());
        assert_eq!(env.scope_id(), same.scope_id());
    }
}
