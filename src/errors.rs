//! Mantra error handling.
//!
//! Only the parser surfaces a Rust error type: evaluation never fails with an
//! exception, it attaches messages to the values it produces and lets the
//! host collect them through the dependency graph (`collect_all_errors`).
//! Parse failures carry a byte-range span and render as miette diagnostics
//! against the named source.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};

use crate::ast::Span;
use crate::value::{Dep, Value};

// ============================================================================
// SOURCE CONTEXT
// ============================================================================

/// The named source text a parse ran against, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    pub fn from_source(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }
}

// ============================================================================
// PARSE ERRORS
// ============================================================================

/// What stopped the parser, at the first unrecoverable token.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    IllegalToken { found: String },
    UnterminatedString,
    UnterminatedTemplate,
    UnterminatedComment,
    InvalidLiteral { literal_type: String, value: String },
    InvalidEscape { sequence: String },
    UnexpectedEof,
    Syntax { message: String },
}

/// A parse failure with its location in the named source.
#[derive(Debug, thiserror::Error)]
#[error("{}", self.message())]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
    pub source_code: Arc<NamedSource<String>>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, span: Span, source: &SourceContext) -> Self {
        ParseError {
            kind,
            span,
            source_code: source.to_named_source(),
        }
    }

    pub fn message(&self) -> String {
        match &self.kind {
            ParseErrorKind::IllegalToken { found } => {
                format!("parse error: illegal token '{found}'")
            }
            ParseErrorKind::UnterminatedString => "parse error: unterminated string".to_string(),
            ParseErrorKind::UnterminatedTemplate => {
                "parse error: unterminated template string".to_string()
            }
            ParseErrorKind::UnterminatedComment => {
                "parse error: unterminated block comment".to_string()
            }
            ParseErrorKind::InvalidLiteral {
                literal_type,
                value,
            } => format!("parse error: invalid {literal_type} '{value}'"),
            ParseErrorKind::InvalidEscape { sequence } => {
                format!("parse error: invalid escape sequence '\\{sequence}'")
            }
            ParseErrorKind::UnexpectedEof => "parse error: unexpected end of input".to_string(),
            ParseErrorKind::Syntax { message } => format!("parse error: {message}"),
        }
    }
}

impl Diagnostic for ParseError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new("mantra::parse"))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(self.source_code.as_ref())
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = SourceSpan::new(
            self.span.start.into(),
            self.span.end.saturating_sub(self.span.start),
        );
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some("here".to_string()),
            span,
        ))))
    }
}

// ============================================================================
// RUNTIME ERROR MESSAGES
// ============================================================================
//
// Runtime failures become strings inside values. Keeping the constructors in
// one place keeps the wording consistent across the standard library.

pub fn undefined_variable(name: &str) -> String {
    format!("unknown variable ${name}")
}

pub fn unknown_function(name: &str) -> String {
    format!("unknown function ${name}")
}

pub fn arity_mismatch(function: &str, expected: &str, actual: usize) -> String {
    format!("${function} expects {expected} argument(s), got {actual}")
}

pub fn type_mismatch(function: &str, expected: &str, actual: &str) -> String {
    format!("${function} expects {expected}, got {actual}")
}

pub fn property_on_non_object(name: &str, actual: &str) -> String {
    format!("cannot read property '{name}' of {actual}")
}

pub fn bare_lambda() -> String {
    "a lambda is only meaningful as an argument to a function".to_string()
}

// ============================================================================
// USER-VISIBLE ERROR REPORTS
// ============================================================================

/// Formats every error reachable from `value` together with the stack of
/// source locations leading to it, outermost first. `format_loc` renders one
/// span (hosts typically map byte offsets back to line/column).
pub fn format_errors_with_locations(
    value: &Value,
    format_loc: &dyn Fn(&Span) -> String,
) -> Vec<String> {
    let mut out = Vec::new();
    let mut visited = std::collections::HashSet::new();
    let mut stack = Vec::new();
    walk_error_stacks(value, format_loc, &mut stack, &mut visited, &mut out);
    out
}

fn walk_error_stacks(
    value: &Value,
    format_loc: &dyn Fn(&Span) -> String,
    stack: &mut Vec<Span>,
    visited: &mut std::collections::HashSet<usize>,
    out: &mut Vec<String>,
) {
    let pushed = if let Some(location) = value.location {
        stack.push(location);
        true
    } else {
        false
    };
    for error in &value.errors {
        if stack.is_empty() {
            out.push(error.clone());
        } else {
            let locations: Vec<String> = stack.iter().map(|s| format_loc(s)).collect();
            out.push(format!("{} (at {})", error, locations.join(" > ")));
        }
    }
    for dep in &value.deps {
        if let Dep::Value(inner) = dep {
            if visited.insert(std::rc::Rc::as_ptr(inner) as usize) {
                walk_error_stacks(inner, format_loc, stack, visited, out);
            }
        }
    }
    if pushed {
        stack.pop();
    }
}
