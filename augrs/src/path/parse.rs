//! Path-expression lexer and parser.
//!
//! Grammar (informal):
//!
//! ```text
//! path      := '/' steps? | '$' name predicate* ('/' steps)? | steps
//! steps     := step ('/' step)*
//! step      := ('*' | label) predicate*
//! predicate := '[' N ']'                      positional, 1-based
//!            | '[' 'last()' ']'               last existing sibling
//!            | '[' 'last()' '+' K ']'         append (write only)
//!            | '[' relpath ']'                has child
//!            | '[' relpath op value ']'       op ∈ { =  !=  =~ }
//! relpath   := '.' | steps
//! value     := quoted string | bare text up to ']'
//! ```
//!
//! A path without a leading `/` or `$` is relative to the context node.
//! `.` and `..` are not accepted as location steps; only forward descent is
//! supported.  A backslash makes the next character part of a label; inside
//! predicate values it only escapes the closing quote (or `]`) and itself,
//! so regular expressions keep their backslashes.

use regex::Regex;

use crate::error::{Error, Result};

// ── AST ───────────────────────────────────────────────────────────────────────

/// Where evaluation of a path begins.
#[derive(Debug, Clone)]
pub enum Start {
    /// Leading `/`.
    Root,
    /// No leading `/` or `$`: the `/augeas/context` node.
    Context,
    /// `$name`: a node-set binding (path bindings are expanded textually
    /// before parsing and never reach the AST).
    Var { name: String, predicates: Vec<Predicate> },
}

/// What labels a step accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    Label(String),
    Any,
}

/// Comparison operator inside an attribute predicate.
#[derive(Debug, Clone)]
pub enum CmpOp {
    Eq,
    Ne,
    Matches(Regex),
}

/// A bracketed filter attached to a step.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// `[N]`
    Position(usize),
    /// `[last()]`
    Last,
    /// `[last()+K]`
    Append(usize),
    /// `[label]`, `[a/b]`
    Has(Vec<Step>),
    /// `[label=value]`, `[.!=value]`, `[a/b=~re]`; an empty path means the
    /// node itself.
    Compare { path: Vec<Step>, op: CmpOp, value: String },
}

impl Predicate {
    pub fn is_append(&self) -> bool {
        matches!(self, Predicate::Append(_))
    }
}

/// One `/`-separated location step.
#[derive(Debug, Clone)]
pub struct Step {
    pub test: NameTest,
    pub predicates: Vec<Predicate>,
}

impl Step {
    pub fn has_append(&self) -> bool {
        self.predicates.iter().any(Predicate::is_append)
    }
}

/// A parsed path expression.
#[derive(Debug, Clone)]
pub struct PathExpr {
    pub start: Start,
    pub steps: Vec<Step>,
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Parse `src` into a [`PathExpr`].
pub fn parse_path(src: &str) -> Result<PathExpr> {
    let mut p = Parser::new(src);
    let expr = p.path()?;
    p.skip_ws();
    if !p.at_end() {
        return Err(p.error("unexpected trailing input"));
    }
    Ok(expr)
}

/// `true` for characters allowed in a `$variable` name.
pub(crate) fn is_var_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

struct Parser<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, chars: src.chars().collect(), pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<char> {
        self.chars.get(self.pos + off).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        let n = s.chars().count();
        if self.chars[self.pos.min(self.chars.len())..]
            .iter()
            .take(n)
            .copied()
            .eq(s.chars())
        {
            self.pos += n;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::syntax(self.src, self.pos, message)
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{c}`")))
        }
    }

    // ── Top level ─────────────────────────────────────────────────────────────

    fn path(&mut self) -> Result<PathExpr> {
        self.skip_ws();
        if self.at_end() {
            return Err(self.error("empty path"));
        }
        if self.eat('/') {
            if self.at_end() {
                return Ok(PathExpr { start: Start::Root, steps: Vec::new() });
            }
            let steps = self.steps(false)?;
            return Ok(PathExpr { start: Start::Root, steps });
        }
        if self.eat('$') {
            let begin = self.pos;
            while self.peek().is_some_and(is_var_char) {
                self.pos += 1;
            }
            if self.pos == begin {
                return Err(self.error("expected variable name after `$`"));
            }
            let name: String = self.chars[begin..self.pos].iter().collect();
            let mut predicates = Vec::new();
            while self.peek() == Some('[') {
                predicates.push(self.predicate()?);
            }
            let steps = if self.eat('/') { self.steps(false)? } else { Vec::new() };
            return Ok(PathExpr { start: Start::Var { name, predicates }, steps });
        }
        let steps = self.steps(false)?;
        Ok(PathExpr { start: Start::Context, steps })
    }

    fn steps(&mut self, in_pred: bool) -> Result<Vec<Step>> {
        let mut steps = vec![self.step(in_pred)?];
        while self.eat('/') {
            steps.push(self.step(in_pred)?);
        }
        Ok(steps)
    }

    fn step(&mut self, in_pred: bool) -> Result<Step> {
        let test = if self.peek() == Some('*') && self.ends_step(1, in_pred) {
            self.pos += 1;
            NameTest::Any
        } else {
            NameTest::Label(self.label(in_pred)?)
        };
        let mut predicates = Vec::new();
        while self.peek() == Some('[') {
            predicates.push(self.predicate()?);
        }
        Ok(Step { test, predicates })
    }

    /// `true` if the character `off` ahead cannot continue a label.
    fn ends_step(&self, off: usize, in_pred: bool) -> bool {
        match self.peek_at(off) {
            None => true,
            Some(c) => is_label_end(c, in_pred),
        }
    }

    fn label(&mut self, in_pred: bool) -> Result<String> {
        let begin = self.pos;
        let mut label = String::new();
        let mut escaped_any = false;
        while let Some(c) = self.peek() {
            if c == '\\' {
                let Some(next) = self.peek_at(1) else {
                    return Err(self.error("dangling `\\` escape"));
                };
                label.push(next);
                escaped_any = true;
                self.pos += 2;
                continue;
            }
            if is_label_end(c, in_pred) {
                break;
            }
            label.push(c);
            self.pos += 1;
        }
        if label.is_empty() {
            self.pos = begin;
            return Err(self.error("empty location step"));
        }
        if !escaped_any && (label == "." || label == "..") {
            self.pos = begin;
            return Err(self.error(format!("`{label}` steps are not supported")));
        }
        Ok(label)
    }

    // ── Predicates ────────────────────────────────────────────────────────────

    fn predicate(&mut self) -> Result<Predicate> {
        self.expect('[')?;
        self.skip_ws();

        if self.peek().is_some_and(|c| c.is_ascii_digit()) {
            let n = self.number()?;
            self.skip_ws();
            self.expect(']')?;
            if n == 0 {
                return Err(self.error("positions are 1-based"));
            }
            return Ok(Predicate::Position(n));
        }

        if self.eat_str("last()") {
            self.skip_ws();
            if self.eat('+') {
                self.skip_ws();
                let k = self.number()?;
                self.skip_ws();
                self.expect(']')?;
                if k == 0 {
                    return Err(self.error("`last()+K` needs K >= 1"));
                }
                return Ok(Predicate::Append(k));
            }
            self.expect(']')?;
            return Ok(Predicate::Last);
        }

        let path = if self.peek() == Some('.') && self.ends_step(1, true) {
            self.pos += 1;
            Vec::new()
        } else {
            self.steps(true)?
        };
        self.skip_ws();

        if self.eat(']') {
            if path.is_empty() {
                return Err(self.error("empty predicate"));
            }
            return Ok(Predicate::Has(path));
        }

        let op = if self.eat_str("=~") {
            None
        } else if self.eat_str("!=") {
            Some(CmpOp::Ne)
        } else if self.eat('=') {
            Some(CmpOp::Eq)
        } else {
            return Err(self.error("expected `]`, `=`, `!=` or `=~`"));
        };
        self.skip_ws();
        let value = self.value()?;
        self.skip_ws();
        self.expect(']')?;

        let op = match op {
            Some(op) => op,
            None => {
                let re = Regex::new(&format!("^(?:{value})$"))
                    .map_err(|e| self.error(format!("bad regular expression: {e}")))?;
                CmpOp::Matches(re)
            }
        };
        Ok(Predicate::Compare { path, op, value })
    }

    fn number(&mut self) -> Result<usize> {
        let begin = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[begin..self.pos].iter().collect();
        digits.parse().map_err(|_| self.error("expected a number"))
    }

    fn value(&mut self) -> Result<String> {
        match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                let mut out = String::new();
                loop {
                    match self.peek() {
                        None => return Err(self.error("unterminated string")),
                        Some('\\') => {
                            let Some(next) = self.peek_at(1) else {
                                return Err(self.error("unterminated string"));
                            };
                            if next != q && next != '\\' {
                                out.push('\\');
                            }
                            out.push(next);
                            self.pos += 2;
                        }
                        Some(c) if c == q => {
                            self.pos += 1;
                            return Ok(out);
                        }
                        Some(c) => {
                            out.push(c);
                            self.pos += 1;
                        }
                    }
                }
            }
            _ => {
                let mut out = String::new();
                while let Some(c) = self.peek() {
                    if c == ']' {
                        break;
                    }
                    if c == '\\' {
                        if let Some(next) = self.peek_at(1) {
                            if next != ']' && next != '\\' {
                                out.push('\\');
                            }
                            out.push(next);
                            self.pos += 2;
                            continue;
                        }
                    }
                    out.push(c);
                    self.pos += 1;
                }
                Ok(out.trim_end().to_owned())
            }
        }
    }
}

/// Characters that end an unescaped label.  Inside predicates, comparison
/// operators and whitespace also terminate it.
fn is_label_end(c: char, in_pred: bool) -> bool {
    match c {
        '/' | '[' | ']' => true,
        '=' | '!' => in_pred,
        c if c.is_whitespace() => in_pred,
        _ => false,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(expr: &PathExpr) -> Vec<String> {
        expr.steps
            .iter()
            .map(|s| match &s.test {
                NameTest::Label(l) => l.clone(),
                NameTest::Any => "*".to_owned(),
            })
            .collect()
    }

    #[test]
    fn absolute_plain_steps() {
        let e = parse_path("/files/etc/hosts/1/ipaddr").unwrap();
        assert!(matches!(e.start, Start::Root));
        assert_eq!(labels(&e), ["files", "etc", "hosts", "1", "ipaddr"]);
    }

    #[test]
    fn root_only() {
        let e = parse_path("/").unwrap();
        assert!(e.steps.is_empty());
    }

    #[test]
    fn relative_is_context() {
        let e = parse_path("etc/hosts").unwrap();
        assert!(matches!(e.start, Start::Context));
    }

    #[test]
    fn wildcard_and_positional() {
        let e = parse_path("/files/*/alias[2]").unwrap();
        assert_eq!(e.steps[1].test, NameTest::Any);
        assert!(matches!(e.steps[2].predicates[..], [Predicate::Position(2)]));
    }

    #[test]
    fn star_inside_label_is_literal() {
        let e = parse_path("/a*b").unwrap();
        assert_eq!(labels(&e), ["a*b"]);
    }

    #[test]
    fn last_and_append() {
        let e = parse_path("/a/b[last()]/c[last()+1]").unwrap();
        assert!(matches!(e.steps[1].predicates[..], [Predicate::Last]));
        assert!(matches!(e.steps[2].predicates[..], [Predicate::Append(1)]));
        assert!(e.steps[2].has_append());
    }

    #[test]
    fn attribute_predicates() {
        let e = parse_path("/f/*[canonical='local host'][alias]").unwrap();
        match &e.steps[1].predicates[0] {
            Predicate::Compare { path, op: CmpOp::Eq, value } => {
                assert_eq!(path.len(), 1);
                assert_eq!(value, "local host");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(e.steps[1].predicates[1], Predicate::Has(_)));
    }

    #[test]
    fn self_value_and_negation() {
        let e = parse_path("/a/b[. != x]").unwrap();
        match &e.steps[1].predicates[0] {
            Predicate::Compare { path, op: CmpOp::Ne, value } => {
                assert!(path.is_empty());
                assert_eq!(value, "x");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn regex_predicate() {
        let e = parse_path("/a/*[ipaddr=~'127\\..*']").unwrap();
        match &e.steps[1].predicates[0] {
            Predicate::Compare { op: CmpOp::Matches(re), .. } => {
                assert!(re.is_match("127.0.0.1"));
                assert!(!re.is_match("10.0.0.1"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn variable_start_with_tail() {
        let e = parse_path("$hosts/1/ipaddr").unwrap();
        match &e.start {
            Start::Var { name, predicates } => {
                assert_eq!(name, "hosts");
                assert!(predicates.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(labels(&e), ["1", "ipaddr"]);
    }

    #[test]
    fn escaped_label() {
        let e = parse_path("/a\\/b/c\\ d").unwrap();
        assert_eq!(labels(&e), ["a/b", "c d"]);
    }

    #[test]
    fn syntax_errors() {
        for bad in ["", "/a//b", "/a/", "/a[", "/a[0]", "/a[last()+0]", "/a/../b", "/a/./b",
                    "$", "/a[b=", "/a[]", "/a]"] {
            match parse_path(bad) {
                Err(Error::PathSyntax { .. }) => {}
                other => panic!("{bad:?} should be a syntax error, got {other:?}"),
            }
        }
    }
}
