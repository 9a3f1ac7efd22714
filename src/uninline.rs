//! Hoisting repeated inlined expressions back into `let` bindings.
//!
//! Partial evaluation inlines variables at their use sites, tagging every
//! inlined expression with the binding name and the id of the scope it came
//! from. This pass counts those tags, rebinds any expression that occurs
//! often enough and is complex enough to be worth naming, and strips every
//! remaining tag — which is why running it twice is the same as running it
//! once.

use std::collections::{HashMap, HashSet};

use crate::ast::{AstNode, CallExpr, Expr, InlineTag, LambdaExpr, LetExpr};

pub const DEFAULT_MIN_OCCURRENCES: usize = 2;
pub const DEFAULT_COMPLEXITY_THRESHOLD: usize = 1;

/// Uninlines with the default thresholds.
pub fn uninline(node: &AstNode) -> AstNode {
    uninline_with(node, DEFAULT_MIN_OCCURRENCES, DEFAULT_COMPLEXITY_THRESHOLD)
}

/// Rebinds every `(scope_id, name)` whose tagged expression occurs at least
/// `min_occurrences` times with complexity at least `complexity_threshold`.
/// Shadowed-name collisions get numeric suffixes; the scope id in the tag is
/// what tells same-named bindings from different scopes apart.
pub fn uninline_with(
    node: &AstNode,
    min_occurrences: usize,
    complexity_threshold: usize,
) -> AstNode {
    let mut occurrences: HashMap<(u64, String), (usize, AstNode)> = HashMap::new();
    count_tags(node, &mut occurrences);

    let mut selected: Vec<((u64, String), AstNode)> = occurrences
        .into_iter()
        .filter(|(_, (count, expr))| {
            *count >= min_occurrences && expr.complexity() >= complexity_threshold
        })
        .map(|(key, (_, expr))| (key, expr))
        .collect();
    if selected.is_empty() {
        return strip_tags(node);
    }
    selected.sort_by(|((sa, na), _), ((sb, nb), _)| sa.cmp(sb).then_with(|| na.cmp(nb)));

    // Pick binding names, deferring to the original name unless something in
    // the tree (or an earlier hoist) already uses it.
    let mut used = HashSet::new();
    collect_names(node, &mut used);
    let mut renames: HashMap<(u64, String), String> = HashMap::new();
    for (key, _) in &selected {
        let base = key.1.clone();
        let mut candidate = base.clone();
        let mut suffix = 2;
        while used.contains(&candidate) {
            candidate = format!("{base}{suffix}");
            suffix += 1;
        }
        used.insert(candidate.clone());
        renames.insert(key.clone(), candidate);
    }

    let bindings = selected
        .iter()
        .map(|(key, expr)| {
            let name = renames.get(key).expect("selected keys are renamed").clone();
            // The hoisted expression may itself contain further hoisted
            // occurrences; rewrite it with its own tag dropped first.
            (name, rewrite(&expr.clone().untagged(), &renames))
        })
        .collect();
    let body = rewrite(node, &renames);
    AstNode::let_in(bindings, body).with_span(node.span)
}

// ============================================================================
// TREE WALKS
// ============================================================================

fn count_tags(node: &AstNode, out: &mut HashMap<(u64, String), (usize, AstNode)>) {
    if let Some(InlineTag { name, scope_id }) = &node.inlined {
        let entry = out
            .entry((*scope_id, name.clone()))
            .or_insert_with(|| (0, node.clone()));
        entry.0 += 1;
    }
    each_child(node, &mut |child| count_tags(child, out));
}

fn collect_names(node: &AstNode, out: &mut HashSet<String>) {
    match node.expr.as_ref() {
        Expr::Var(name) => {
            out.insert(name.clone());
        }
        Expr::Lambda(lambda) => {
            out.insert(lambda.param.clone());
        }
        Expr::Let(let_expr) => {
            for (name, _) in &let_expr.bindings {
                out.insert(name.clone());
            }
        }
        _ => {}
    }
    each_child(node, &mut |child| collect_names(child, out));
}

/// Replaces selected tagged occurrences with variables and strips every
/// other tag.
fn rewrite(node: &AstNode, renames: &HashMap<(u64, String), String>) -> AstNode {
    if let Some(InlineTag { name, scope_id }) = &node.inlined {
        if let Some(renamed) = renames.get(&(*scope_id, name.clone())) {
            return AstNode::var(renamed.clone()).with_span(node.span);
        }
    }
    let expr = match node.expr.as_ref() {
        Expr::Value(_) | Expr::Var(_) | Expr::Property(_) => node.expr.as_ref().clone(),
        Expr::Array(items) => Expr::Array(items.iter().map(|i| rewrite(i, renames)).collect()),
        Expr::Call(call) => Expr::Call(CallExpr {
            function: call.function.clone(),
            args: call.args.iter().map(|a| rewrite(a, renames)).collect(),
        }),
        Expr::Lambda(lambda) => Expr::Lambda(LambdaExpr {
            param: lambda.param.clone(),
            body: rewrite(&lambda.body, renames),
        }),
        Expr::Let(let_expr) => Expr::Let(LetExpr {
            bindings: let_expr
                .bindings
                .iter()
                .map(|(n, rhs)| (n.clone(), rewrite(rhs, renames)))
                .collect(),
            body: rewrite(&let_expr.body, renames),
        }),
    };
    AstNode::new(expr).with_span(node.span)
}

fn strip_tags(node: &AstNode) -> AstNode {
    rewrite(node, &HashMap::new())
}

fn each_child(node: &AstNode, f: &mut impl FnMut(&AstNode)) {
    match node.expr.as_ref() {
        Expr::Value(_) | Expr::Var(_) | Expr::Property(_) => {}
        Expr::Array(items) => items.iter().for_each(|i| f(i)),
        Expr::Call(call) => call.args.iter().for_each(|a| f(a)),
        Expr::Lambda(lambda) => f(&lambda.body),
        Expr::Let(let_expr) => {
            for (_, rhs) in &let_expr.bindings {
                f(rhs);
            }
            f(&let_expr.body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::InlineTag;
    use crate::value::Value;

    fn tagged(expr: AstNode, name: &str, scope_id: u64) -> AstNode {
        expr.tagged(InlineTag {
            name: name.into(),
            scope_id,
        })
    }

    fn sample_tree() -> AstNode {
        // (a.b + a.b) where both sides were inlined from $x in scope 7.
        let inlined = || {
            tagged(
                AstNode::call(".", vec![AstNode::property("a"), AstNode::property("b")]),
                "x",
                7,
            )
        };
        AstNode::call("+", vec![inlined(), inlined()])
    }

    #[test]
    fn hoists_repeated_inlines() {
        let result = uninline(&sample_tree());
        let Expr::Let(let_expr) = result.expr.as_ref() else {
            panic!("expected a let, got {result:?}")
        };
        assert_eq!(let_expr.bindings.len(), 1);
        assert_eq!(let_expr.bindings[0].0, "x");
        let Expr::Call(call) = let_expr.body.expr.as_ref() else {
            panic!("expected call body")
        };
        assert!(matches!(call.args[0].expr.as_ref(), Expr::Var(n) if n == "x"));
        assert!(matches!(call.args[1].expr.as_ref(), Expr::Var(n) if n == "x"));
    }

    #[test]
    fn below_threshold_occurrences_are_left_inline() {
        let once = AstNode::call(
            "+",
            vec![
                tagged(
                    AstNode::call(".", vec![AstNode::property("a"), AstNode::property("b")]),
                    "x",
                    7,
                ),
                AstNode::value(Value::number(1.0)),
            ],
        );
        let result = uninline(&once);
        assert!(!matches!(result.expr.as_ref(), Expr::Let(_)));
        // Tags are gone either way.
        assert!(result.inlined.is_none());
    }

    #[test]
    fn zero_complexity_values_are_never_hoisted() {
        let tree = AstNode::call(
            "+",
            vec![
                tagged(AstNode::value(Value::number(2.0)), "x", 7),
                tagged(AstNode::value(Value::number(2.0)), "x", 7),
            ],
        );
        let result = uninline(&tree);
        assert!(!matches!(result.expr.as_ref(), Expr::Let(_)));
    }

    #[test]
    fn shadowed_names_get_numeric_suffixes() {
        // Same name inlined from two different scopes, twice each.
        let from_scope = |scope_id| {
            tagged(
                AstNode::call(
                    "+",
                    vec![
                        AstNode::property("a"),
                        AstNode::value(Value::number(scope_id as f64)),
                    ],
                ),
                "x",
                scope_id,
            )
        };
        let tree = AstNode::call(
            "array",
            vec![
                from_scope(3),
                from_scope(3),
                from_scope(9),
                from_scope(9),
            ],
        );
        let result = uninline(&tree);
        let Expr::Let(let_expr) = result.expr.as_ref() else {
            panic!("expected a let")
        };
        let names: Vec<&str> = let_expr.bindings.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["x", "x2"]);
    }

    #[test]
    fn uninline_is_idempotent() {
        let once = uninline(&sample_tree());
        let twice = uninline(&once);
        assert_eq!(once, twice);
    }
}
