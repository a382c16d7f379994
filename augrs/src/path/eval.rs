//! Path resolution against a [`Tree`].
//!
//! Two entry points:
//!
//! * [`select`]: read resolution.  Returns every matching node in document
//!   order.  Append predicates (`[last()+K]`) are rejected here.
//! * [`select_for_write`]: write resolution.  Returns a single node,
//!   creating the unresolved suffix of the path when nothing matches yet.
//!   Never picks one of several existing matches.
//!
//! `$name` references are resolved through a [`VarTable`] first: path
//! macros are expanded textually, node-set bindings become the start set.

use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::tree::{NodeId, Tree};
use crate::var::{Binding, VarTable};

use super::parse::{is_var_char, parse_path, CmpOp, NameTest, PathExpr, Predicate, Start, Step};

/// Maximum nesting of path macros referring to other path macros.
const MAX_MACRO_DEPTH: usize = 16;

/// Everything a path needs besides its own text.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub vars: &'a VarTable,
    /// Absolute path that relative expressions are evaluated against.
    pub context: &'a str,
}

/// Result of write resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub node: NodeId,
    /// `true` if the final node did not exist before.
    pub created: bool,
}

// ── Preparation ───────────────────────────────────────────────────────────────

/// Expand leading path-macro references and parse the result.
///
/// Relative expressions are rebased onto the context path so that callers
/// only ever see [`Start::Root`] or [`Start::Var`].
pub fn compile(src: &str, scope: Scope<'_>) -> Result<PathExpr> {
    let text = expand_macros(src, scope.vars)?;
    let mut expr = parse_path(&text)?;
    if let Start::Context = expr.start {
        let ctx = parse_path(scope.context)?;
        let mut steps = ctx.steps;
        steps.append(&mut expr.steps);
        expr = PathExpr { start: Start::Root, steps };
    }
    Ok(expr)
}

fn expand_macros<'s>(src: &'s str, vars: &VarTable) -> Result<Cow<'s, str>> {
    let mut text = Cow::Borrowed(src.trim());
    for _ in 0..MAX_MACRO_DEPTH {
        let Some(rest) = text.strip_prefix('$') else { return Ok(text) };
        let name_len = rest.find(|c: char| !is_var_char(c)).unwrap_or(rest.len());
        let name = &rest[..name_len];
        match vars.get(name) {
            None if name.is_empty() => return Ok(text),
            None => return Err(Error::UnboundVariable(name.to_owned())),
            Some(Binding::Nodes(_)) => return Ok(text),
            Some(Binding::Path(p)) => {
                text = Cow::Owned(format!("{}{}", p.trim(), &rest[name_len..]));
            }
        }
    }
    Err(Error::syntax(src, 0, "variable expansion nests too deeply"))
}

// ── Read resolution ───────────────────────────────────────────────────────────

/// All nodes matching `src`, in document order.
pub fn select(tree: &Tree, scope: Scope<'_>, src: &str) -> Result<Vec<NodeId>> {
    let expr = compile(src, scope)?;
    let start = start_set(tree, scope, src, &expr.start)?;
    eval_steps(tree, src, start, &expr.steps)
}

/// The single node matching `src`, or [`Error::AmbiguousMatch`].
pub fn select_one(tree: &Tree, scope: Scope<'_>, src: &str) -> Result<NodeId> {
    match select(tree, scope, src)?.as_slice() {
        [one] => Ok(*one),
        nodes => Err(Error::AmbiguousMatch { path: src.to_owned(), found: nodes.len() }),
    }
}

fn start_set(tree: &Tree, scope: Scope<'_>, src: &str, start: &Start) -> Result<Vec<NodeId>> {
    match start {
        Start::Root => Ok(vec![tree.root()]),
        // compile() never leaves a Context start behind
        Start::Context => Ok(vec![tree.root()]),
        Start::Var { name, predicates } => {
            let nodes = match scope.vars.get(name) {
                Some(Binding::Nodes(nodes)) => {
                    nodes.iter().copied().filter(|&n| tree.contains(n)).collect()
                }
                Some(Binding::Path(_)) => {
                    // only reachable when the macro expanded to another `$`
                    return Err(Error::syntax(src, 0, "unexpanded path variable"));
                }
                None => return Err(Error::UnboundVariable(name.clone())),
            };
            filter(tree, src, nodes, predicates)
        }
    }
}

fn eval_steps(tree: &Tree, src: &str, start: Vec<NodeId>, steps: &[Step]) -> Result<Vec<NodeId>> {
    let mut cur = start;
    for step in steps {
        let mut next = Vec::new();
        for &node in &cur {
            next.extend(eval_step(tree, src, node, step)?);
        }
        cur = next;
        if cur.is_empty() {
            break;
        }
    }
    Ok(cur)
}

/// Children of `node` accepted by one step.
fn eval_step(tree: &Tree, src: &str, node: NodeId, step: &Step) -> Result<Vec<NodeId>> {
    let candidates: Vec<NodeId> = match &step.test {
        NameTest::Any => tree.children(node).to_vec(),
        NameTest::Label(l) => tree.children_labeled(node, l).collect(),
    };
    filter(tree, src, candidates, &step.predicates)
}

fn filter(
    tree: &Tree,
    src: &str,
    mut nodes: Vec<NodeId>,
    predicates: &[Predicate],
) -> Result<Vec<NodeId>> {
    for pred in predicates {
        nodes = match pred {
            Predicate::Position(n) => nodes.get(n - 1).copied().into_iter().collect(),
            Predicate::Last => nodes.last().copied().into_iter().collect(),
            Predicate::Append(_) => {
                return Err(Error::syntax(src, 0, "`last()+K` is only valid when creating nodes"));
            }
            Predicate::Has(path) => {
                let mut keep = Vec::new();
                for n in nodes {
                    if !eval_steps(tree, src, vec![n], path)?.is_empty() {
                        keep.push(n);
                    }
                }
                keep
            }
            Predicate::Compare { path, op, value } => {
                let mut keep = Vec::new();
                for n in nodes {
                    let targets = eval_steps(tree, src, vec![n], path)?;
                    if targets.iter().any(|&t| compare(tree.value(t), op, value)) {
                        keep.push(n);
                    }
                }
                keep
            }
        };
    }
    Ok(nodes)
}

fn compare(actual: Option<&str>, op: &CmpOp, expected: &str) -> bool {
    match op {
        CmpOp::Eq => actual == Some(expected),
        CmpOp::Ne => actual != Some(expected),
        CmpOp::Matches(re) => actual.is_some_and(|v| re.is_match(v)),
    }
}

// ── Write resolution ──────────────────────────────────────────────────────────

/// What write resolution would do, computed without touching the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    /// Existing node the path resolves to, or the node new ones go under.
    pub anchor: NodeId,
    /// Labels to create beneath `anchor`, outermost first.  Empty when the
    /// path already names exactly one node.
    pub create: Vec<String>,
}

/// Plan write resolution of `src`.
///
/// * One existing match: that node, nothing to create.
/// * Several existing matches: [`Error::AmbiguousMatch`].
/// * No match: the deepest prefix that does match must be a single node;
///   the remaining steps are created beneath it.
///
/// A `[last()+K]` step always creates a new sibling after the last existing
/// one with that label; everything before it must resolve to one node.
pub fn plan_write(tree: &Tree, scope: Scope<'_>, src: &str) -> Result<WritePlan> {
    let expr = compile(src, scope)?;
    let start = start_set(tree, scope, src, &expr.start)?;
    let append_at = expr.steps.iter().position(Step::has_append);

    if append_at.is_none() {
        let all = eval_steps(tree, src, start.clone(), &expr.steps)?;
        match all.as_slice() {
            [one] => return Ok(WritePlan { anchor: *one, create: Vec::new() }),
            [] => {}
            many => {
                return Err(Error::AmbiguousMatch { path: src.to_owned(), found: many.len() });
            }
        }
    }

    let mut depth = append_at.unwrap_or(expr.steps.len());
    let mut base = eval_steps(tree, src, start.clone(), &expr.steps[..depth])?;
    while base.is_empty() && depth > 0 {
        depth -= 1;
        base = eval_steps(tree, src, start.clone(), &expr.steps[..depth])?;
    }
    let anchor = match base.as_slice() {
        [one] => *one,
        [] => return Err(Error::cannot_create(src, "the start of the path matches no node")),
        many => {
            return Err(Error::AmbiguousMatch { path: src.to_owned(), found: many.len() });
        }
    };

    let mut create = Vec::new();
    for (i, step) in expr.steps[depth..].iter().enumerate() {
        let existing = match (&step.test, i) {
            (NameTest::Label(l), 0) => tree.children_labeled(anchor, l).count(),
            _ => 0,
        };
        create.push(creatable(src, step, existing)?.to_owned());
    }
    Ok(WritePlan { anchor, create })
}

/// Carry out a [`WritePlan`].
pub fn apply_plan(tree: &mut Tree, plan: WritePlan) -> Resolved {
    let created = !plan.create.is_empty();
    let mut cur = plan.anchor;
    for label in &plan.create {
        cur = tree.append_after_label(cur, label);
    }
    Resolved { node: cur, created }
}

/// Resolve `src` to exactly one node, creating it if nothing matches.
/// See [`plan_write`] for the rules.  A failure leaves the tree untouched.
pub fn select_for_write(tree: &mut Tree, scope: Scope<'_>, src: &str) -> Result<Resolved> {
    let plan = plan_write(tree, scope, src)?;
    Ok(apply_plan(tree, plan))
}

/// Check that `step` can be materialised beneath a parent that already has
/// `existing` children with the step's label; returns that label.
fn creatable<'s>(src: &str, step: &'s Step, existing: usize) -> Result<&'s str> {
    let NameTest::Label(label) = &step.test else {
        return Err(Error::cannot_create(src, "a wildcard step cannot be created"));
    };
    match step.predicates.as_slice() {
        [] | [Predicate::Append(_)] => Ok(label),
        [Predicate::Last] if existing == 0 => Ok(label),
        [Predicate::Last] => {
            Err(Error::cannot_create(src, format!("`{label}[last()]` already exists")))
        }
        [Predicate::Position(n)] if *n == existing + 1 => Ok(label),
        [Predicate::Position(n)] => Err(Error::syntax(
            src,
            0,
            format!("position {n} is out of range for `{label}` ({existing} existing)"),
        )),
        [Predicate::Has(_) | Predicate::Compare { .. }] => Err(Error::cannot_create(
            src,
            format!("`{label}` has a predicate that creation cannot satisfy"),
        )),
        _ => Err(Error::cannot_create(src, format!("`{label}` carries more than one predicate"))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
