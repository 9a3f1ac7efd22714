//! Mantra parser.
//!
//! Converts surface syntax into spanned AST nodes. Purely syntactic: the
//! sugar documented in the grammar (object literals, templates, indexing,
//! unary minus, ternary) lowers to calls here, and nothing else happens.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::ast::{AstNode, Expr, Span};
use crate::errors::{ParseError, ParseErrorKind, SourceContext};
use crate::value::Value;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct MantraParser;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parses one expression, reporting diagnostics against `source_name`.
pub fn parse_with_source(text: &str, source_name: &str) -> Result<AstNode, ParseError> {
    let context = SourceContext::from_source(source_name, text);
    let mut pairs = MantraParser::parse(Rule::program, text)
        .map_err(|e| convert_pest_error(e, &context))?;
    let program = pairs.next().expect("pest guarantees the program rule");
    let expr = program
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .expect("program contains an expression");
    build_node(expr, &context)
}

/// Parses one expression from anonymous source text.
pub fn parse(text: &str) -> Result<AstNode, ParseError> {
    parse_with_source(text, "<expr>")
}

// ============================================================================
// AST BUILDING
// ============================================================================

fn build_node(pair: Pair<Rule>, source: &SourceContext) -> Result<AstNode, ParseError> {
    let span = extract_span(&pair);

    match pair.as_rule() {
        Rule::expr => {
            let inner = pair.into_inner().next().expect("expr has one child");
            build_node(inner, source)
        }

        Rule::ternary => {
            let mut inner = pair.into_inner();
            let condition = build_node(inner.next().expect("ternary condition"), source)?;
            match inner.next() {
                // The `question` token; its presence means both branches follow.
                Some(_) => {
                    let then_branch = build_node(inner.next().expect("then branch"), source)?;
                    let else_branch = build_node(inner.next().expect("else branch"), source)?;
                    Ok(AstNode::call("?", vec![condition, then_branch, else_branch])
                        .with_span(Some(span)))
                }
                None => Ok(condition),
            }
        }

        Rule::coalesce | Rule::or_expr | Rule::and_expr | Rule::rel_expr | Rule::add_expr
        | Rule::mul_expr | Rule::map_expr => build_binary_chain(pair, source),

        Rule::filter_expr => {
            let mut inner = pair.into_inner();
            let mut node = build_node(inner.next().expect("filter target"), source)?;
            for suffix in inner {
                let suffix_span = extract_span(&suffix);
                let index = build_node(
                    suffix.into_inner().next().expect("filter index"),
                    source,
                )?;
                node = AstNode::call("[", vec![node, index]).with_span(Some(Span::new(
                    span.start,
                    suffix_span.end,
                )));
            }
            Ok(node)
        }

        Rule::unary => {
            let mut prefixes = Vec::new();
            let mut operand = None;
            for child in pair.into_inner() {
                match child.as_rule() {
                    Rule::prefix_op => prefixes.push(child.as_str().to_string()),
                    _ => operand = Some(build_node(child, source)?),
                }
            }
            let mut node = operand.expect("unary operand");
            for op in prefixes.into_iter().rev() {
                node = match op.as_str() {
                    "!" => AstNode::call("!", vec![node]),
                    _ => AstNode::call(
                        "-",
                        vec![AstNode::value(Value::number(0.0)), node],
                    ),
                }
                .with_span(Some(span));
            }
            Ok(node)
        }

        Rule::primary => {
            let inner = pair.into_inner().next().expect("primary has one child");
            build_node(inner, source)
        }

        Rule::number => {
            let text = pair.as_str();
            let value = text.parse::<f64>().map_err(|_| {
                ParseError::new(
                    ParseErrorKind::InvalidLiteral {
                        literal_type: "number".into(),
                        value: text.into(),
                    },
                    span,
                    source,
                )
            })?;
            Ok(AstNode::spanned(Expr::Value(Value::number(value)), span))
        }

        Rule::boolean => Ok(AstNode::spanned(
            Expr::Value(Value::bool(pair.as_str() == "true")),
            span,
        )),

        Rule::null => Ok(AstNode::spanned(Expr::Value(Value::null()), span)),

        Rule::string => {
            let content = unescape_string(pair.as_str(), span, source)?;
            Ok(AstNode::spanned(Expr::Value(Value::string(content)), span))
        }

        Rule::template => build_template(pair, source),

        Rule::array_lit => {
            let items: Result<Vec<_>, _> =
                pair.into_inner().map(|p| build_node(p, source)).collect();
            Ok(AstNode::spanned(Expr::Array(items?), span))
        }

        Rule::object_lit => {
            let mut args = Vec::new();
            for entry in pair.into_inner() {
                let mut inner = entry.into_inner();
                let key_pair = inner.next().expect("object key");
                let key_span = extract_span(&key_pair);
                let key = build_object_key(key_pair, source)?;
                args.push(AstNode::spanned(Expr::Value(Value::string(key)), key_span));
                args.push(build_node(inner.next().expect("object value"), source)?);
            }
            Ok(AstNode::call("object", args).with_span(Some(span)))
        }

        Rule::variable => {
            let name = pair.into_inner().next().expect("variable name");
            Ok(AstNode::spanned(Expr::Var(name.as_str().to_string()), span))
        }

        Rule::call => {
            let mut inner = pair.into_inner();
            let name = inner
                .next()
                .expect("callee")
                .into_inner()
                .next()
                .expect("callee name")
                .as_str()
                .to_string();
            let args = match inner.next() {
                Some(list) => list
                    .into_inner()
                    .map(|p| build_node(p, source))
                    .collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            Ok(AstNode::call(name, args).with_span(Some(span)))
        }

        Rule::lambda => {
            let mut inner = pair.into_inner();
            let param = inner
                .next()
                .expect("lambda parameter")
                .into_inner()
                .next()
                .expect("parameter name")
                .as_str()
                .to_string();
            let body = build_node(inner.next().expect("lambda body"), source)?;
            Ok(AstNode::lambda(param, body).with_span(Some(span)))
        }

        Rule::let_expr => {
            let mut bindings = Vec::new();
            let mut body = None;
            for child in pair.into_inner() {
                match child.as_rule() {
                    Rule::kw_let | Rule::kw_in => {}
                    Rule::binding => {
                        let mut inner = child.into_inner();
                        let name = inner
                            .next()
                            .expect("binding name")
                            .into_inner()
                            .next()
                            .expect("binding name ident")
                            .as_str()
                            .to_string();
                        let rhs = build_node(inner.next().expect("binding value"), source)?;
                        bindings.push((name, rhs));
                    }
                    _ => body = Some(build_node(child, source)?),
                }
            }
            Ok(AstNode::let_in(bindings, body.expect("let body")).with_span(Some(span)))
        }

        Rule::ident => Ok(AstNode::spanned(
            Expr::Property(pair.as_str().to_string()),
            span,
        )),

        rule => Err(ParseError::new(
            ParseErrorKind::Syntax {
                message: format!("unsupported rule {rule:?}"),
            },
            span,
            source,
        )),
    }
}

/// Folds `lhs op rhs op rhs …` into left-associated calls. The boolean
/// chains are the exception: `and`/`or` are n-ary built-ins, so a whole
/// chain becomes one flat call.
fn build_binary_chain(pair: Pair<Rule>, source: &SourceContext) -> Result<AstNode, ParseError> {
    let span = extract_span(&pair);
    let is_bool_chain = matches!(pair.as_rule(), Rule::or_expr | Rule::and_expr);
    let mut inner = pair.into_inner();
    let mut node = build_node(inner.next().expect("chain head"), source)?;
    let mut operands = vec![node.clone()];
    let mut function = String::new();
    while let Some(op) = inner.next() {
        function = match op.as_rule() {
            Rule::coalesce_op => "??",
            Rule::or_op => "or",
            Rule::and_op => "and",
            Rule::map_op => ".",
            _ => op.as_str(),
        }
        .to_string();
        let rhs_pair = inner.next().expect("chain operand");
        let end = extract_span(&rhs_pair).end;
        let rhs = build_node(rhs_pair, source)?;
        operands.push(rhs.clone());
        node = AstNode::call(function.clone(), vec![node, rhs])
            .with_span(Some(Span::new(span.start, end)));
    }
    if is_bool_chain && operands.len() > 1 {
        return Ok(AstNode::call(function, operands).with_span(Some(span)));
    }
    Ok(node)
}

fn build_template(pair: Pair<Rule>, source: &SourceContext) -> Result<AstNode, ParseError> {
    let span = extract_span(&pair);
    let mut parts = Vec::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::template_text => {
                let text = unescape_body(part.as_str(), extract_span(&part), source)?;
                parts.push(AstNode::spanned(
                    Expr::Value(Value::string(text)),
                    extract_span(&part),
                ));
            }
            Rule::template_interp => {
                let inner = part.into_inner().next().expect("interpolation expression");
                parts.push(build_node(inner, source)?);
            }
            _ => {}
        }
    }
    // A lone part collapses to itself; concatenation only appears when the
    // template really concatenates.
    Ok(match parts.len() {
        0 => AstNode::spanned(Expr::Value(Value::string("")), span),
        1 => parts.into_iter().next().expect("one part"),
        _ => AstNode::call("string", parts).with_span(Some(span)),
    })
}

fn build_object_key(pair: Pair<Rule>, source: &SourceContext) -> Result<String, ParseError> {
    let span = extract_span(&pair);
    let inner = pair.into_inner().next();
    match inner {
        Some(p) if p.as_rule() == Rule::string => unescape_string(p.as_str(), span, source),
        Some(p) => Ok(p.as_str().to_string()),
        None => Ok(String::new()),
    }
}

// ============================================================================
// STRING ESCAPES
// ============================================================================

/// Strips the surrounding quotes and applies JS-style escapes.
fn unescape_string(text: &str, span: Span, source: &SourceContext) -> Result<String, ParseError> {
    unescape_body(&text[1..text.len() - 1], span, source)
}

/// JS-style escapes: named escapes, `\xHH`, `\uHHHH`, `\u{…}`, `\NNN` octal;
/// any other escaped character stands for itself.
fn unescape_body(text: &str, span: Span, source: &SourceContext) -> Result<String, ParseError> {
    let invalid = |sequence: &str| {
        ParseError::new(
            ParseErrorKind::InvalidEscape {
                sequence: sequence.to_string(),
            },
            span,
            source,
        )
    };

    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        let Some(escape) = chars.next() else {
            return Err(invalid(""));
        };
        match escape {
            'n' => result.push('\n'),
            't' => result.push('\t'),
            'r' => result.push('\r'),
            'b' => result.push('\u{0008}'),
            'f' => result.push('\u{000C}'),
            'v' => result.push('\u{000B}'),
            '0' if !matches!(chars.peek(), Some(c) if c.is_ascii_digit()) => {
                result.push('\0');
            }
            'x' => {
                let code = take_hex(&mut chars, 2).ok_or_else(|| invalid("x"))?;
                result.push(char::from_u32(code).ok_or_else(|| invalid("x"))?);
            }
            'u' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(d) if d.is_ascii_hexdigit() => digits.push(d),
                            _ => return Err(invalid("u{")),
                        }
                    }
                    let code =
                        u32::from_str_radix(&digits, 16).map_err(|_| invalid("u{"))?;
                    result.push(char::from_u32(code).ok_or_else(|| invalid("u{"))?);
                } else {
                    let code = take_hex(&mut chars, 4).ok_or_else(|| invalid("u"))?;
                    result.push(char::from_u32(code).ok_or_else(|| invalid("u"))?);
                }
            }
            d @ '0'..='7' => {
                // Octal: up to three digits including the first.
                let mut code = d as u32 - '0' as u32;
                for _ in 0..2 {
                    match chars.peek() {
                        Some(&o @ '0'..='7') => {
                            code = code * 8 + (o as u32 - '0' as u32);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                result.push(char::from_u32(code).ok_or_else(|| invalid(&d.to_string()))?);
            }
            other => result.push(other),
        }
    }
    Ok(result)
}

fn take_hex(chars: &mut std::iter::Peekable<std::str::Chars>, n: usize) -> Option<u32> {
    let mut digits = String::new();
    for _ in 0..n {
        let d = chars.next()?;
        if !d.is_ascii_hexdigit() {
            return None;
        }
        digits.push(d);
    }
    u32::from_str_radix(&digits, 16).ok()
}

// ============================================================================
// UTILITIES
// ============================================================================

fn extract_span(pair: &Pair<Rule>) -> Span {
    Span {
        start: pair.as_span().start(),
        end: pair.as_span().end(),
    }
}

fn convert_pest_error(error: pest::error::Error<Rule>, source: &SourceContext) -> ParseError {
    let span = match error.location {
        pest::error::InputLocation::Pos(pos) => Span {
            start: pos,
            end: pos,
        },
        pest::error::InputLocation::Span((start, end)) => Span { start, end },
    };

    let text = error.to_string();
    let kind = if text.contains("expected EOI") {
        ParseErrorKind::Syntax {
            message: "unexpected trailing input".to_string(),
        }
    } else if span.start >= source.content.len() {
        ParseErrorKind::UnexpectedEof
    } else {
        let found: String = source.content[span.start..]
            .chars()
            .take(1)
            .collect();
        match found.as_str() {
            "\"" | "'" => ParseErrorKind::UnterminatedString,
            "`" => ParseErrorKind::UnterminatedTemplate,
            _ => ParseErrorKind::IllegalToken { found },
        }
    };

    ParseError::new(kind, span, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    fn parse_ok(text: &str) -> AstNode {
        parse(text).unwrap_or_else(|e| panic!("parse failed for {text:?}: {e}"))
    }

    #[test]
    fn precedence_multiplication_over_addition() {
        let node = parse_ok("1 + 2 * 3");
        let Expr::Call(call) = node.expr.as_ref() else {
            panic!("expected a call")
        };
        assert_eq!(call.function, "+");
        let Expr::Call(rhs) = call.args[1].expr.as_ref() else {
            panic!("expected nested call")
        };
        assert_eq!(rhs.function, "*");
    }

    #[test]
    fn comparison_is_looser_than_addition() {
        let node = parse_ok("a + 1 = b");
        let Expr::Call(call) = node.expr.as_ref() else {
            panic!("expected a call")
        };
        assert_eq!(call.function, "=");
    }

    #[test]
    fn ternary_and_coalesce() {
        let node = parse_ok("a ?? b ? 1 : 2");
        let Expr::Call(call) = node.expr.as_ref() else {
            panic!("expected a call")
        };
        assert_eq!(call.function, "?");
        let Expr::Call(cond) = call.args[0].expr.as_ref() else {
            panic!("expected coalesce condition")
        };
        assert_eq!(cond.function, "??");
    }

    #[test]
    fn indexing_and_mapping_desugar_to_calls() {
        let node = parse_ok("items[0].name");
        let Expr::Call(call) = node.expr.as_ref() else {
            panic!("expected a call")
        };
        assert_eq!(call.function, ".");
        let Expr::Call(target) = call.args[0].expr.as_ref() else {
            panic!("expected filter call")
        };
        assert_eq!(target.function, "[");
    }

    #[test]
    fn unary_minus_is_subtraction_from_zero() {
        let node = parse_ok("-x");
        let Expr::Call(call) = node.expr.as_ref() else {
            panic!("expected a call")
        };
        assert_eq!(call.function, "-");
        assert_eq!(call.args[0].as_value().and_then(Value::as_number), Some(0.0));
    }

    #[test]
    fn let_lambda_and_variables() {
        let node = parse_ok("let $f := 2 in $sum(items . ($x => $x))");
        let Expr::Let(let_expr) = node.expr.as_ref() else {
            panic!("expected let")
        };
        assert_eq!(let_expr.bindings[0].0, "f");
    }

    #[test]
    fn template_with_single_interpolation_collapses() {
        let node = parse_ok("`{a}`");
        assert!(matches!(node.expr.as_ref(), Expr::Property(p) if p == "a"));
        let multi = parse_ok("`n = {n}!`");
        let Expr::Call(call) = multi.expr.as_ref() else {
            panic!("expected string call")
        };
        assert_eq!(call.function, "string");
        assert_eq!(call.args.len(), 3);
    }

    #[test]
    fn object_literal_lowers_to_object_call() {
        let node = parse_ok("{a: 1, \"b c\": 2}");
        let Expr::Call(call) = node.expr.as_ref() else {
            panic!("expected object call")
        };
        assert_eq!(call.function, "object");
        assert_eq!(call.args.len(), 4);
        assert_eq!(call.args[2].as_value().and_then(|v| v.as_str().map(String::from)),
            Some("b c".to_string()));
    }

    #[test]
    fn string_escapes() {
        let node = parse_ok(r#""a\n\x41B\u{1F600}\101""#);
        assert_eq!(
            node.as_value().and_then(Value::as_str),
            Some("a\nAB\u{1F600}A")
        );
    }

    #[test]
    fn comments_are_stripped() {
        let node = parse_ok("1 + /* two */ 2 // done");
        let Expr::Call(call) = node.expr.as_ref() else {
            panic!("expected a call")
        };
        assert_eq!(call.function, "+");
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(parse("\"abc").is_err());
        assert!(parse("(a").is_err());
        assert!(parse("1 +").is_err());
    }
}
