//! The Mantra expression AST.
//!
//! All nodes carry an optional source span for error reporting and
//! explainability. Nodes are immutable; every transformation produces fresh
//! nodes, and the `Rc` payload keeps those transformations cheap.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A byte range in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }
}

/// Marker left by the partial evaluator when a variable is replaced by its
/// bound expression. The scope id disambiguates same-named bindings from
/// different scopes when hoisting repeats back into a `let`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InlineTag {
    pub name: String,
    pub scope_id: u64,
}

/// A function application. The callee is a name resolved in the environment;
/// there are no computed callees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpr {
    pub function: String,
    pub args: Vec<AstNode>,
}

/// A one-parameter deferred function, only ever invoked by built-ins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaExpr {
    pub param: String,
    pub body: AstNode,
}

/// An ordered set of bindings introduced over a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetExpr {
    pub bindings: Vec<(String, AstNode)>,
    pub body: AstNode,
}

/// The core expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A literal or an already-evaluated value.
    Value(Value),
    /// A `$name` reference, resolved in the scope chain.
    Var(String),
    /// A bare identifier, read as a field of the current value `_`.
    Property(String),
    Array(Vec<AstNode>),
    Call(CallExpr),
    Lambda(LambdaExpr),
    Let(LetExpr),
}

/// A spanned, possibly inline-tagged expression node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AstNode {
    pub expr: Rc<Expr>,
    pub span: Option<Span>,
    pub inlined: Option<InlineTag>,
}

/// Equality is structural on the expression alone; spans and inline tags are
/// metadata, exactly as a value's provenance is.
impl PartialEq for AstNode {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl AstNode {
    pub fn new(expr: Expr) -> Self {
        AstNode {
            expr: Rc::new(expr),
            span: None,
            inlined: None,
        }
    }

    pub fn spanned(expr: Expr, span: Span) -> Self {
        AstNode {
            expr: Rc::new(expr),
            span: Some(span),
            inlined: None,
        }
    }

    pub fn value(v: Value) -> Self {
        AstNode::new(Expr::Value(v))
    }

    pub fn var(name: impl Into<String>) -> Self {
        AstNode::new(Expr::Var(name.into()))
    }

    pub fn property(name: impl Into<String>) -> Self {
        AstNode::new(Expr::Property(name.into()))
    }

    pub fn array(items: Vec<AstNode>) -> Self {
        AstNode::new(Expr::Array(items))
    }

    pub fn call(function: impl Into<String>, args: Vec<AstNode>) -> Self {
        AstNode::new(Expr::Call(CallExpr {
            function: function.into(),
            args,
        }))
    }

    pub fn lambda(param: impl Into<String>, body: AstNode) -> Self {
        AstNode::new(Expr::Lambda(LambdaExpr {
            param: param.into(),
            body,
        }))
    }

    pub fn let_in(bindings: Vec<(String, AstNode)>, body: AstNode) -> Self {
        AstNode::new(Expr::Let(LetExpr { bindings, body }))
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span.or(self.span);
        self
    }

    pub fn tagged(mut self, tag: InlineTag) -> Self {
        self.inlined = Some(tag);
        self
    }

    pub fn untagged(mut self) -> Self {
        self.inlined = None;
        self
    }

    /// The contained value when this node is fully evaluated.
    pub fn as_value(&self) -> Option<&Value> {
        match self.expr.as_ref() {
            Expr::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self.expr.as_ref(), Expr::Value(_))
    }

    pub fn is_call(&self) -> bool {
        matches!(self.expr.as_ref(), Expr::Call(_))
    }

    /// Structural size of the expression, used by the uninlining pass to
    /// decide what is worth hoisting: values and variables are free,
    /// property reads cost one, every call, array or lambda costs one plus
    /// its children.
    pub fn complexity(&self) -> usize {
        match self.expr.as_ref() {
            Expr::Value(_) | Expr::Var(_) => 0,
            Expr::Property(_) => 1,
            Expr::Array(items) => 1 + items.iter().map(AstNode::complexity).sum::<usize>(),
            Expr::Call(call) => 1 + call.args.iter().map(AstNode::complexity).sum::<usize>(),
            Expr::Lambda(lambda) => 1 + lambda.body.complexity(),
            Expr::Let(let_expr) => {
                let_expr
                    .bindings
                    .iter()
                    .map(|(_, rhs)| rhs.complexity())
                    .sum::<usize>()
                    + let_expr.body.complexity()
            }
        }
    }

    /// Collects free variable names, honouring lambda parameters and let
    /// bindings. Used by the partial evaluator's let rebuild.
    pub fn free_vars(&self, out: &mut std::collections::HashSet<String>) {
        self.free_vars_bound(&mut Vec::new(), out);
    }

    fn free_vars_bound(
        &self,
        bound: &mut Vec<String>,
        out: &mut std::collections::HashSet<String>,
    ) {
        match self.expr.as_ref() {
            Expr::Var(name) => {
                if !bound.iter().any(|b| b == name) {
                    out.insert(name.clone());
                }
            }
            Expr::Value(_) | Expr::Property(_) => {}
            Expr::Array(items) => {
                for item in items {
                    item.free_vars_bound(bound, out);
                }
            }
            Expr::Call(call) => {
                for arg in &call.args {
                    arg.free_vars_bound(bound, out);
                }
            }
            Expr::Lambda(lambda) => {
                bound.push(lambda.param.clone());
                lambda.body.free_vars_bound(bound, out);
                bound.pop();
            }
            Expr::Let(let_expr) => {
                // Bindings in one scope are mutually visible (lookup is lazy),
                // so every bound name shadows throughout the whole form.
                let depth = bound.len();
                for (name, _) in &let_expr.bindings {
                    bound.push(name.clone());
                }
                for (_, rhs) in &let_expr.bindings {
                    rhs.free_vars_bound(bound, out);
                }
                let_expr.body.free_vars_bound(bound, out);
                bound.truncate(depth);
            }
        }
    }
}

impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::printer::print_expr(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complexity_counts_structure() {
        // $a + (b * 2) => call(+, var, call(*, property, value))
        let node = AstNode::call(
            "+",
            vec![
                AstNode::var("a"),
                AstNode::call(
                    "*",
                    vec![AstNode::property("b"), AstNode::value(Value::number(2.0))],
                ),
            ],
        );
        assert_eq!(node.complexity(), 3);
    }

    #[test]
    fn free_vars_respect_binders() {
        let node = AstNode::let_in(
            vec![("x".into(), AstNode::var("y"))],
            AstNode::call(
                ".",
                vec![
                    AstNode::var("x"),
                    AstNode::lambda("i", AstNode::var("i")),
                ],
            ),
        );
        let mut free = std::collections::HashSet::new();
        node.free_vars(&mut free);
        assert!(free.contains("y"));
        assert!(!free.contains("x"));
        assert!(!free.contains("i"));
    }
}
