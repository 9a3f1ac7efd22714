//! Best-effort structural types over the expression AST.
//!
//! The checker exists for editor tooling: it never blocks evaluation, and
//! anything it cannot see through is `any`. Function result types are
//! computed by the same handles the evaluator dispatches through, so a
//! built-in's two behaviours live side by side.

use std::fmt;

use crate::ast::{AstNode, CallExpr, Expr};
use crate::value::{Payload, TypeOfFn, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimKind {
    Number,
    String,
    Boolean,
    Null,
    Any,
    Never,
}

/// A structural type. `Primitive` may carry the literal constant it was
/// inferred from; `Array` types are positional with an optional rest
/// element; `Function` defers its return type to the handle's callback.
#[derive(Clone)]
pub enum Type {
    Primitive {
        kind: PrimKind,
        constant: Option<serde_json::Value>,
    },
    Array {
        positional: Vec<Type>,
        rest: Option<Box<Type>>,
    },
    Object {
        fields: im::HashMap<String, Type>,
    },
    Function {
        return_type: TypeOfFn,
    },
}

impl Type {
    pub fn any() -> Type {
        Type::Primitive {
            kind: PrimKind::Any,
            constant: None,
        }
    }

    pub fn never() -> Type {
        Type::Primitive {
            kind: PrimKind::Never,
            constant: None,
        }
    }

    pub fn primitive(kind: PrimKind) -> Type {
        Type::Primitive {
            kind,
            constant: None,
        }
    }

    pub fn number() -> Type {
        Type::primitive(PrimKind::Number)
    }

    pub fn string() -> Type {
        Type::primitive(PrimKind::String)
    }

    pub fn boolean() -> Type {
        Type::primitive(PrimKind::Boolean)
    }

    pub fn null() -> Type {
        Type::primitive(PrimKind::Null)
    }

    pub fn array_of(rest: Type) -> Type {
        Type::Array {
            positional: Vec::new(),
            rest: Some(Box::new(rest)),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(
            self,
            Type::Primitive {
                kind: PrimKind::Any,
                ..
            }
        )
    }

    pub fn is_never(&self) -> bool {
        matches!(
            self,
            Type::Primitive {
                kind: PrimKind::Never,
                ..
            }
        )
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive { kind, constant } => match constant {
                Some(c) => write!(f, "{kind:?}({c})"),
                None => write!(f, "{kind:?}"),
            },
            Type::Array { positional, rest } => {
                write!(f, "Array({positional:?}, rest: {rest:?})")
            }
            Type::Object { fields } => {
                write!(f, "Object{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v:?}")?;
                }
                write!(f, "}}")
            }
            Type::Function { .. } => write!(f, "Function"),
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Type::Primitive {
                    kind: a,
                    constant: ca,
                },
                Type::Primitive {
                    kind: b,
                    constant: cb,
                },
            ) => a == b && ca == cb,
            (
                Type::Array {
                    positional: pa,
                    rest: ra,
                },
                Type::Array {
                    positional: pb,
                    rest: rb,
                },
            ) => pa == pb && ra == rb,
            (Type::Object { fields: a }, Type::Object { fields: b }) => a == b,
            (Type::Function { return_type: a }, Type::Function { return_type: b }) => {
                *a as usize == *b as usize
            }
            _ => false,
        }
    }
}

/// The typing environment threaded through the checker: variable types plus
/// the type of the current value that property reads consult.
#[derive(Debug, Clone)]
pub struct TypeEnv {
    pub vars: im::HashMap<String, Type>,
    pub data_type: Type,
}

impl TypeEnv {
    pub fn new(data_type: Type) -> Self {
        TypeEnv {
            vars: im::HashMap::new(),
            data_type,
        }
    }

    pub fn with_var(&self, name: impl Into<String>, ty: Type) -> Self {
        let mut vars = self.vars.clone();
        vars.insert(name.into(), ty);
        TypeEnv {
            vars,
            data_type: self.data_type.clone(),
        }
    }

    pub fn with_data_type(&self, data_type: Type) -> Self {
        TypeEnv {
            vars: self.vars.clone(),
            data_type,
        }
    }
}

// ============================================================================
// CHECKING
// ============================================================================

/// Infers the type of an expression. Never fails; unknowns are `any`.
pub fn check_expr(env: &TypeEnv, node: &AstNode) -> Type {
    match node.expr.as_ref() {
        Expr::Value(v) => native_type(v),
        Expr::Var(name) => env.vars.get(name).cloned().unwrap_or_else(Type::any),
        Expr::Property(name) => match &env.data_type {
            Type::Object { fields } => fields.get(name).cloned().unwrap_or_else(Type::any),
            _ => Type::any(),
        },
        Expr::Array(items) => Type::Array {
            positional: items.iter().map(|item| check_expr(env, item)).collect(),
            rest: None,
        },
        Expr::Call(call) => check_call(env, call),
        Expr::Lambda(lambda) => check_expr(env, &lambda.body),
        Expr::Let(let_expr) => {
            let mut scoped = env.clone();
            for (name, rhs) in &let_expr.bindings {
                let ty = check_expr(&scoped, rhs);
                scoped = scoped.with_var(name.clone(), ty);
            }
            check_expr(&scoped, &let_expr.body)
        }
    }
}

fn check_call(env: &TypeEnv, call: &CallExpr) -> Type {
    match env.vars.get(&call.function) {
        Some(Type::Function { return_type }) => return_type(env, call),
        _ => Type::any(),
    }
}

/// The structural type of a concrete value, keeping literal constants where
/// the payload is scalar.
pub fn native_type(value: &Value) -> Type {
    match &value.payload {
        Payload::Null => Type::Primitive {
            kind: PrimKind::Null,
            constant: Some(serde_json::Value::Null),
        },
        Payload::Bool(b) => Type::Primitive {
            kind: PrimKind::Boolean,
            constant: Some(serde_json::Value::Bool(*b)),
        },
        Payload::Number(n) => Type::Primitive {
            kind: PrimKind::Number,
            constant: serde_json::Number::from_f64(*n).map(serde_json::Value::Number),
        },
        Payload::String(s) => Type::Primitive {
            kind: PrimKind::String,
            constant: Some(serde_json::Value::String(s.clone())),
        },
        Payload::List(items) => Type::Array {
            positional: items.iter().map(|item| native_type(item)).collect(),
            rest: None,
        },
        Payload::Map(fields) => Type::Object {
            fields: fields
                .iter()
                .map(|(k, v)| (k.clone(), native_type(v)))
                .collect(),
        },
        Payload::Function(handle) => Type::Function {
            return_type: handle.get_type,
        },
        Payload::Cell(_) => Type::any(),
    }
}

// ============================================================================
// TYPE ALGEBRA
// ============================================================================

/// Least upper bound, as coarse as it needs to be: `never` is the identity,
/// objects merge by field union, arrays merge element-wise, mismatched kinds
/// collapse to `any`.
pub fn union_type(a: &Type, b: &Type) -> Type {
    if a.is_never() {
        return b.clone();
    }
    if b.is_never() {
        return a.clone();
    }
    match (a, b) {
        (
            Type::Primitive {
                kind: ka,
                constant: ca,
            },
            Type::Primitive {
                kind: kb,
                constant: cb,
            },
        ) if ka == kb => Type::Primitive {
            kind: *ka,
            constant: if ca == cb { ca.clone() } else { None },
        },
        (Type::Object { fields: fa }, Type::Object { fields: fb }) => {
            let mut fields = fa.clone();
            for (k, tb) in fb {
                let merged = match fa.get(k) {
                    Some(ta) => union_type(ta, tb),
                    None => tb.clone(),
                };
                fields.insert(k.clone(), merged);
            }
            Type::Object { fields }
        }
        (
            Type::Array {
                positional: pa,
                rest: ra,
            },
            Type::Array {
                positional: pb,
                rest: rb,
            },
        ) => {
            let len = pa.len().max(pb.len());
            let positional = (0..len)
                .map(|i| match (pa.get(i), pb.get(i)) {
                    (Some(x), Some(y)) => union_type(x, y),
                    (Some(x), None) => x.clone(),
                    (None, Some(y)) => y.clone(),
                    (None, None) => Type::never(),
                })
                .collect();
            let rest = match (ra, rb) {
                (Some(x), Some(y)) => Some(Box::new(union_type(x, y))),
                (Some(x), None) => Some(x.clone()),
                (None, Some(y)) => Some(y.clone()),
                (None, None) => None,
            };
            Type::Array { positional, rest }
        }
        _ => Type::any(),
    }
}

/// The type of an element drawn from an array type: the union of every
/// positional type and the rest type.
pub fn element_type(array: &Type) -> Type {
    match array {
        Type::Array { positional, rest } => {
            let mut ty = Type::never();
            for p in positional {
                ty = union_type(&ty, p);
            }
            if let Some(rest) = rest {
                ty = union_type(&ty, rest);
            }
            if ty.is_never() {
                Type::any()
            } else {
                ty
            }
        }
        _ => Type::any(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_identity_and_collapse() {
        assert_eq!(union_type(&Type::never(), &Type::number()), Type::number());
        assert_eq!(union_type(&Type::number(), &Type::string()), Type::any());
    }

    #[test]
    fn union_merges_object_fields() {
        let a = Type::Object {
            fields: im::hashmap! {"x".to_string() => Type::number()},
        };
        let b = Type::Object {
            fields: im::hashmap! {"y".to_string() => Type::string()},
        };
        let Type::Object { fields } = union_type(&a, &b) else {
            panic!("expected object")
        };
        assert_eq!(fields.get("x"), Some(&Type::number()));
        assert_eq!(fields.get("y"), Some(&Type::string()));
    }

    #[test]
    fn union_drops_disagreeing_constants() {
        let one = native_type(&Value::number(1.0));
        let two = native_type(&Value::number(2.0));
        let merged = union_type(&one, &two);
        assert_eq!(merged, Type::number());
    }

    #[test]
    fn element_type_unions_positions() {
        let arr = Type::Array {
            positional: vec![Type::number(), Type::number()],
            rest: Some(Box::new(Type::number())),
        };
        assert_eq!(element_type(&arr), Type::number());
    }
}
