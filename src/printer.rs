//! AST → source, with minimal parentheses.
//!
//! The printer is the inverse of the parser's desugarings: `string` calls
//! become backtick templates, `object` calls with literal keys become
//! object literals, the bracket and dot calls become postfix syntax, and
//! operator calls print infix with parentheses only where precedence
//! demands them.

use crate::ast::{AstNode, CallExpr, Expr};
use crate::path::Path;
use crate::value::{format_number, Payload, Value};

/// Prints an expression as parseable source.
pub fn print_expr(node: &AstNode) -> String {
    print_prec(node, 0)
}

/// Prints a path in the surface notation: dotted fields, bracketed indices.
pub fn print_path(path: &Path) -> String {
    path.to_string()
}

// Binding powers, loosest to tightest. A child below its context's power
// gets parentheses.
const PREC_TERNARY: u8 = 1;
const PREC_COALESCE: u8 = 2;
const PREC_OR: u8 = 3;
const PREC_AND: u8 = 4;
const PREC_REL: u8 = 5;
const PREC_ADD: u8 = 6;
const PREC_MUL: u8 = 7;
const PREC_DOT: u8 = 8;
const PREC_INDEX: u8 = 9;
const PREC_UNARY: u8 = 10;
const PREC_PRIMARY: u8 = 11;

fn binary_prec(op: &str) -> Option<u8> {
    match op {
        "??" => Some(PREC_COALESCE),
        "or" => Some(PREC_OR),
        "and" => Some(PREC_AND),
        "=" | "!=" | "<" | "<=" | ">" | ">=" => Some(PREC_REL),
        "+" | "-" => Some(PREC_ADD),
        "*" | "/" | "%" => Some(PREC_MUL),
        "." => Some(PREC_DOT),
        _ => None,
    }
}

fn print_prec(node: &AstNode, min_prec: u8) -> String {
    let (text, prec) = render(node);
    if prec < min_prec {
        format!("({text})")
    } else {
        text
    }
}

fn render(node: &AstNode) -> (String, u8) {
    match node.expr.as_ref() {
        Expr::Value(value) => (print_value(value), PREC_PRIMARY),
        Expr::Var(name) => (format!("${name}"), PREC_PRIMARY),
        Expr::Property(name) => (name.clone(), PREC_PRIMARY),
        Expr::Array(items) => {
            let inner: Vec<String> = items.iter().map(|item| print_prec(item, 0)).collect();
            (format!("[{}]", inner.join(", ")), PREC_PRIMARY)
        }
        // Lambda and let bodies extend as far right as the grammar allows,
        // so as an operand either form needs parentheses.
        Expr::Lambda(lambda) => (
            format!("${} => {}", lambda.param, print_prec(&lambda.body, 0)),
            PREC_TERNARY,
        ),
        Expr::Let(let_expr) => {
            let bindings: Vec<String> = let_expr
                .bindings
                .iter()
                .map(|(name, rhs)| format!("${name} := {}", print_prec(rhs, 0)))
                .collect();
            (
                format!(
                    "let {} in {}",
                    bindings.join(", "),
                    print_prec(&let_expr.body, 0)
                ),
                PREC_TERNARY,
            )
        }
        Expr::Call(call) => render_call(call),
    }
}

fn render_call(call: &CallExpr) -> (String, u8) {
    match call.function.as_str() {
        "?" if call.args.len() == 3 => {
            let cond = print_prec(&call.args[0], PREC_COALESCE);
            let then_branch = print_prec(&call.args[1], PREC_TERNARY);
            let else_branch = print_prec(&call.args[2], PREC_TERNARY);
            (
                format!("{cond} ? {then_branch} : {else_branch}"),
                PREC_TERNARY,
            )
        }
        "[" if call.args.len() == 2 => {
            let target = print_prec(&call.args[0], PREC_INDEX);
            let index = print_prec(&call.args[1], 0);
            (format!("{target}[{index}]"), PREC_INDEX)
        }
        "!" if call.args.len() == 1 => {
            let operand = print_prec(&call.args[0], PREC_UNARY);
            (format!("!{operand}"), PREC_UNARY)
        }
        // Subtraction from a literal zero reads back as unary minus.
        "-" if call.args.len() == 2 && is_literal_zero(&call.args[0]) => {
            let operand = print_prec(&call.args[1], PREC_UNARY);
            (format!("-{operand}"), PREC_UNARY)
        }
        "and" | "or" if call.args.len() >= 2 => {
            let prec = binary_prec(&call.function).expect("boolean chain precedence");
            // Chains are flat n-ary; a nested chain of the same operator
            // needs parentheses to survive re-parsing.
            let parts: Vec<String> = call
                .args
                .iter()
                .map(|arg| print_prec(arg, prec + 1))
                .collect();
            (parts.join(&format!(" {} ", call.function)), prec)
        }
        "string" if call.args.len() >= 2 => (render_template(call), PREC_PRIMARY),
        "object" if object_literal_keys(call).is_some() => {
            let keys = object_literal_keys(call).expect("checked keys");
            let entries: Vec<String> = keys
                .iter()
                .zip(call.args.iter().skip(1).step_by(2))
                .map(|(key, value)| format!("{}: {}", print_key(key), print_prec(value, 0)))
                .collect();
            (format!("{{{}}}", entries.join(", ")), PREC_PRIMARY)
        }
        op => match (binary_prec(op), call.args.len()) {
            (Some(prec), 2) => {
                let lhs = print_prec(&call.args[0], prec);
                let rhs = print_prec(&call.args[1], prec + 1);
                // Tight dots, except where a digit on each side would fuse
                // into a number literal on re-parse.
                let spacing = if op != "." {
                    " "
                } else if lhs.ends_with(|c: char| c.is_ascii_digit())
                    && rhs.starts_with(|c: char| c.is_ascii_digit())
                {
                    " "
                } else {
                    ""
                };
                (format!("{lhs}{spacing}{op}{spacing}{rhs}"), prec)
            }
            _ => {
                let args: Vec<String> =
                    call.args.iter().map(|arg| print_prec(arg, 0)).collect();
                (format!("${}({})", call.function, args.join(", ")), PREC_PRIMARY)
            }
        },
    }
}

/// The keys of an `object` call when every key is a literal string (the
/// object-literal reassembly condition).
fn object_literal_keys(call: &CallExpr) -> Option<Vec<String>> {
    if call.args.len() % 2 != 0 {
        return None;
    }
    call.args
        .iter()
        .step_by(2)
        .map(|key| key.as_value().and_then(|v| v.as_str().map(String::from)))
        .collect()
}

fn print_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        escape_string(key)
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_literal_zero(node: &AstNode) -> bool {
    node.as_value().and_then(Value::as_number) == Some(0.0)
}

fn render_template(call: &CallExpr) -> String {
    let mut out = String::from("`");
    for part in &call.args {
        match part.expr.as_ref() {
            Expr::Value(Value {
                payload: Payload::String(text),
                ..
            }) => {
                for ch in text.chars() {
                    match ch {
                        '`' | '{' | '\\' => {
                            out.push('\\');
                            out.push(ch);
                        }
                        _ => out.push(ch),
                    }
                }
            }
            _ => {
                out.push('{');
                out.push_str(&print_prec(part, 0));
                out.push('}');
            }
        }
    }
    out.push('`');
    out
}

// ============================================================================
// VALUES
// ============================================================================

fn print_value(value: &Value) -> String {
    match &value.payload {
        Payload::Null => "null".to_string(),
        Payload::Bool(b) => b.to_string(),
        Payload::Number(n) => format_number(*n),
        Payload::String(s) => escape_string(s),
        Payload::List(items) => {
            let inner: Vec<String> = items.iter().map(|item| print_value(item)).collect();
            format!("[{}]", inner.join(", "))
        }
        Payload::Map(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            let entries: Vec<String> = keys
                .iter()
                .map(|key| {
                    let field = fields.get(*key).expect("key exists");
                    format!("{}: {}", print_key(key), print_value(field))
                })
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        Payload::Function(handle) => format!("${}", handle.name),
        Payload::Cell(cell) => print_value(&crate::value::native_value(&cell.read_native())),
    }
}

/// Double-quoted with the standard JS escapes.
pub fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
