//! The canonical on-wire serialization.
//!
//! A prefix-dispatched, comma-separated grammar used for persistence and for
//! the property tests: `"` leads a string, `'` a property, `$name$` a
//! variable, `(fn,arg,…)` a call, `[,e1,e2,…]` an array, `=,name,expr,…=body`
//! a let, `\name,expr` a lambda, `t`/`f`/`n` the constants, `dN…` a double
//! and bare digits an integer. `\` escapes any character.
//!
//! Round-tripping holds modulo two documented normalizations: an
//! object-valued literal reads back as a `Call("object", …)` and an
//! array-valued literal as an `Array(…)` node; [`normalize`] applies exactly
//! those so `from_canonical(to_canonical(e)) == normalize(e)`.

use crate::ast::{AstNode, Expr, Span};
use crate::errors::{ParseError, ParseErrorKind, SourceContext};
use crate::value::{Payload, Value};

// ============================================================================
// WRITER
// ============================================================================

/// Serializes an expression to its canonical form.
pub fn to_canonical(node: &AstNode) -> String {
    let mut out = String::new();
    write_node(node, &mut out);
    out
}

/// Characters with structural meaning anywhere in the grammar; always
/// escaped inside strings and names.
const STRUCTURAL: &[char] = &['\\', ',', '(', ')', '[', ']', '=', '$', '\'', '"'];

fn write_escaped(text: &str, out: &mut String) {
    for ch in text.chars() {
        if STRUCTURAL.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
}

fn write_node(node: &AstNode, out: &mut String) {
    match node.expr.as_ref() {
        Expr::Value(value) => write_value(value, out),
        Expr::Var(name) => {
            out.push('$');
            write_escaped(name, out);
            out.push('$');
        }
        Expr::Property(name) => {
            out.push('\'');
            write_escaped(name, out);
        }
        Expr::Call(call) => {
            out.push('(');
            write_escaped(&call.function, out);
            for arg in &call.args {
                out.push(',');
                write_node(arg, out);
            }
            out.push(')');
        }
        Expr::Array(items) => {
            out.push('[');
            for item in items {
                out.push(',');
                write_node(item, out);
            }
            out.push(']');
        }
        Expr::Let(let_expr) => {
            out.push('=');
            for (name, rhs) in &let_expr.bindings {
                out.push(',');
                write_escaped(name, out);
                out.push(',');
                write_node(rhs, out);
            }
            out.push('=');
            write_node(&let_expr.body, out);
        }
        Expr::Lambda(lambda) => {
            out.push('\\');
            write_escaped(&lambda.param, out);
            out.push(',');
            write_node(&lambda.body, out);
        }
    }
}

fn write_value(value: &Value, out: &mut String) {
    match &value.payload {
        Payload::Null => out.push('n'),
        Payload::Bool(true) => out.push('t'),
        Payload::Bool(false) => out.push('f'),
        Payload::Number(n) => {
            if n.fract() == 0.0 && n.is_finite() && n.abs() <= 9_007_199_254_740_992.0 {
                out.push_str(&format!("{}", *n as i64));
            } else {
                out.push('d');
                out.push_str(&format!("{n}"));
            }
        }
        Payload::String(s) => {
            out.push('"');
            write_escaped(s, out);
        }
        // The two documented normalizations: composite literals serialize as
        // their expression forms.
        Payload::List(items) => {
            out.push('[');
            for item in items {
                out.push(',');
                write_value(item, out);
            }
            out.push(']');
        }
        Payload::Map(fields) => {
            out.push_str("(object");
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            for key in keys {
                out.push_str(",\"");
                write_escaped(key, out);
                out.push(',');
                write_value(fields.get(key).expect("key exists"), out);
            }
            out.push(')');
        }
        // Function handles and cells have no serial form.
        Payload::Function(_) | Payload::Cell(_) => out.push('n'),
    }
}

// ============================================================================
// READER
// ============================================================================

/// Parses the canonical form back into an AST.
pub fn from_canonical(text: &str) -> Result<AstNode, ParseError> {
    let mut reader = Reader {
        chars: text.chars().collect(),
        pos: 0,
        source: SourceContext::from_source("<canonical>", text),
    };
    let node = reader.parse_expr()?;
    if reader.pos != reader.chars.len() {
        return Err(reader.error("trailing input"));
    }
    Ok(node)
}

struct Reader {
    chars: Vec<char>,
    pos: usize,
    source: SourceContext,
}

impl Reader {
    fn error(&self, message: &str) -> ParseError {
        ParseError::new(
            ParseErrorKind::Syntax {
                message: message.to_string(),
            },
            Span::new(self.pos, self.pos),
            &self.source,
        )
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn expect(&mut self, ch: char) -> Result<(), ParseError> {
        if self.bump() == Some(ch) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{ch}'")))
        }
    }

    /// Reads escaped text until any unescaped terminator (not consumed).
    fn read_until(&mut self, terminators: &[char]) -> Result<String, ParseError> {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if ch == '\\' {
                self.bump();
                match self.bump() {
                    Some(escaped) => out.push(escaped),
                    None => return Err(self.error("dangling escape")),
                }
            } else if terminators.contains(&ch) {
                break;
            } else {
                self.bump();
                out.push(ch);
            }
        }
        Ok(out)
    }

    fn parse_expr(&mut self) -> Result<AstNode, ParseError> {
        match self.peek() {
            Some('"') => {
                self.bump();
                let text = self.read_until(&[',', ')', ']', '='])?;
                Ok(AstNode::value(Value::string(text)))
            }
            Some('\'') => {
                self.bump();
                let name = self.read_until(&[',', ')', ']', '='])?;
                Ok(AstNode::property(name))
            }
            Some('$') => {
                self.bump();
                let name = self.read_until(&['$'])?;
                self.expect('$')?;
                Ok(AstNode::var(name))
            }
            Some('(') => {
                self.bump();
                let function = self.read_until(&[',', ')'])?;
                let mut args = Vec::new();
                while self.peek() == Some(',') {
                    self.bump();
                    args.push(self.parse_expr()?);
                }
                self.expect(')')?;
                Ok(AstNode::call(function, args))
            }
            Some('[') => {
                self.bump();
                let mut items = Vec::new();
                while self.peek() == Some(',') {
                    self.bump();
                    items.push(self.parse_expr()?);
                }
                self.expect(']')?;
                Ok(AstNode::array(items))
            }
            Some('=') => {
                self.bump();
                let mut bindings = Vec::new();
                while self.peek() == Some(',') {
                    self.bump();
                    let name = self.read_until(&[','])?;
                    self.expect(',')?;
                    let rhs = self.parse_expr()?;
                    bindings.push((name, rhs));
                }
                self.expect('=')?;
                let body = self.parse_expr()?;
                Ok(AstNode::let_in(bindings, body))
            }
            Some('\\') => {
                self.bump();
                let param = self.read_until(&[','])?;
                self.expect(',')?;
                let body = self.parse_expr()?;
                Ok(AstNode::lambda(param, body))
            }
            Some('t') => {
                self.bump();
                Ok(AstNode::value(Value::bool(true)))
            }
            Some('f') => {
                self.bump();
                Ok(AstNode::value(Value::bool(false)))
            }
            Some('n') => {
                self.bump();
                Ok(AstNode::value(Value::null()))
            }
            Some('d') => {
                self.bump();
                let text = self.read_until(&[',', ')', ']', '='])?;
                let n = text
                    .parse::<f64>()
                    .map_err(|_| self.error("invalid double"))?;
                Ok(AstNode::value(Value::number(n)))
            }
            Some(ch) if ch.is_ascii_digit() || ch == '-' => {
                let text = self.read_until(&[',', ')', ']', '='])?;
                let n = text
                    .parse::<f64>()
                    .map_err(|_| self.error("invalid integer"))?;
                Ok(AstNode::value(Value::number(n)))
            }
            _ => Err(self.error("unexpected token")),
        }
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Applies the two documented canonical-form normalizations so ASTs can be
/// compared across a round trip: object-valued literals become
/// `Call("object", …)` and array-valued literals become `Array(…)` nodes,
/// recursively.
pub fn normalize(node: &AstNode) -> AstNode {
    let expr = match node.expr.as_ref() {
        Expr::Value(value) => return normalize_value(value),
        Expr::Var(_) | Expr::Property(_) => node.expr.as_ref().clone(),
        Expr::Array(items) => Expr::Array(items.iter().map(normalize).collect()),
        Expr::Call(call) => Expr::Call(crate::ast::CallExpr {
            function: call.function.clone(),
            args: call.args.iter().map(normalize).collect(),
        }),
        Expr::Lambda(lambda) => Expr::Lambda(crate::ast::LambdaExpr {
            param: lambda.param.clone(),
            body: normalize(&lambda.body),
        }),
        Expr::Let(let_expr) => Expr::Let(crate::ast::LetExpr {
            bindings: let_expr
                .bindings
                .iter()
                .map(|(name, rhs)| (name.clone(), normalize(rhs)))
                .collect(),
            body: normalize(&let_expr.body),
        }),
    };
    AstNode::new(expr)
}

fn normalize_value(value: &Value) -> AstNode {
    match &value.payload {
        Payload::List(items) => {
            AstNode::array(items.iter().map(|item| normalize_value(item)).collect())
        }
        Payload::Map(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            let mut args = Vec::new();
            for key in keys {
                args.push(AstNode::value(Value::string(key.clone())));
                args.push(normalize_value(
                    fields.get(key).expect("key exists"),
                ));
            }
            AstNode::call("object", args)
        }
        _ => AstNode::value(Value::new(value.payload.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn round_trip(source: &str) {
        let ast = parse(source).expect("parses");
        let canonical = to_canonical(&ast);
        let back = from_canonical(&canonical)
            .unwrap_or_else(|e| panic!("canonical reparse failed for {canonical:?}: {e}"));
        assert_eq!(back, normalize(&ast), "through {canonical:?}");
    }

    #[test]
    fn canonical_token_forms() {
        let ast = parse("let $x := a + 1 in $x").expect("parses");
        assert_eq!(to_canonical(&ast), "=,x,(+,'a,1)=$x$");
        // Structural characters in function names are escaped.
        let lambda = parse("$sum(items[$i => $this() >= 2])").expect("parses");
        assert_eq!(
            to_canonical(&lambda),
            "(sum,(\\[,'items,\\i,(>\\=,(this),2)))"
        );
    }

    #[test]
    fn escapes_structural_characters() {
        let ast = AstNode::value(Value::string("a,b\\c)d"));
        let canonical = to_canonical(&ast);
        assert_eq!(canonical, "\"a\\,b\\\\c\\)d");
        assert_eq!(from_canonical(&canonical).unwrap(), ast);
    }

    #[test]
    fn literals_and_numbers() {
        round_trip("true ? 1 : 2.5");
        round_trip("null ?? false");
        round_trip("[1, 2, 3]");
        round_trip("{a: 1, b: [true, \"x\"]}");
        round_trip("-42");
        round_trip("`a {b} c`");
    }

    #[test]
    fn round_trips_surface_programs() {
        round_trip("a + b * c - d");
        round_trip("$sum(nums[$i => $this() >= 3])");
        round_trip("let $idx := $min(array) in lookup[$idx]");
        round_trip("cond ? t : e");
        round_trip("items . values");
        round_trip("$which(code, 1, \"one\", [2, 3], \"few\")");
    }

    #[test]
    fn doubles_and_integers_are_distinct_tokens() {
        let double = AstNode::value(Value::number(2.5));
        assert_eq!(to_canonical(&double), "d2.5");
        let int = AstNode::value(Value::number(7.0));
        assert_eq!(to_canonical(&int), "7");
        assert_eq!(from_canonical("d2.5").unwrap(), double);
        assert_eq!(from_canonical("7").unwrap(), int);
    }
}
