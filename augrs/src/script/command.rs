//! Textual command parsing.
//!
//! | Command | Effect |
//! |---------|--------|
//! | `set PATH [VALUE]` | set (or clear) one node, creating it |
//! | `setm BASE SUB [VALUE]` | set `SUB` beneath every match of `BASE` |
//! | `get PATH` | print the value of one node |
//! | `match PATH [VALUE]` | print matching paths, optionally filtered by value |
//! | `rm PATH` | remove matches |
//! | `mv SRC DST` / `move` | move one node |
//! | `ins LABEL before\|after PATH` / `insert` | create a sibling |
//! | `defvar NAME [PATH]` | bind or unbind a path macro |
//! | `defnode NAME PATH [VALUE]` | bind a node set, creating one node if needed |
//! | `clear PATH` | make a value absent |
//! | `touch PATH` | create a node without changing its value |
//! | `print [PATH]` | dump a subtree |
//! | `load` / `save` | run the load or save pass |
//!
//! Arguments are whitespace separated.  `"..."` and `'...'` quote, and a
//! backslash takes the next character literally.  Blank commands and lines
//! starting with `#` do nothing.

use crate::error::{Error, Result};

/// One parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { path: String, value: Option<String> },
    Setm { base: String, sub: String, value: Option<String> },
    Get { path: String },
    Match { path: String, value: Option<String> },
    Rm { path: String },
    Mv { src: String, dst: String },
    Insert { label: String, before: bool, path: String },
    Defvar { name: String, path: Option<String> },
    Defnode { name: String, path: String, value: Option<String> },
    Clear { path: String },
    Touch { path: String },
    Print { path: Option<String> },
    Load,
    Save,
}

impl Command {
    /// Parse one command.  Returns `Ok(None)` for blanks and comments.
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let bad = |message: &str| Error::ScriptParse {
            command: line.to_owned(),
            message: message.to_owned(),
        };
        let args = split_args(line).map_err(|m| bad(m))?;
        let Some((verb, rest)) = args.split_first() else { return Ok(None) };

        let arity = |min: usize, max: usize, usage: &str| -> Result<()> {
            if rest.len() < min || rest.len() > max {
                Err(bad(&format!("usage: {usage}")))
            } else {
                Ok(())
            }
        };
        let arg = |i: usize| rest[i].clone();
        let opt = |i: usize| rest.get(i).cloned();

        let cmd = match verb.as_str() {
            "set" => {
                arity(1, 2, "set PATH [VALUE]")?;
                Command::Set { path: arg(0), value: opt(1) }
            }
            "setm" => {
                arity(2, 3, "setm BASE SUB [VALUE]")?;
                Command::Setm { base: arg(0), sub: arg(1), value: opt(2) }
            }
            "get" => {
                arity(1, 1, "get PATH")?;
                Command::Get { path: arg(0) }
            }
            "match" => {
                arity(1, 2, "match PATH [VALUE]")?;
                Command::Match { path: arg(0), value: opt(1) }
            }
            "rm" => {
                arity(1, 1, "rm PATH")?;
                Command::Rm { path: arg(0) }
            }
            "mv" | "move" => {
                arity(2, 2, "mv SRC DST")?;
                Command::Mv { src: arg(0), dst: arg(1) }
            }
            "ins" | "insert" => {
                arity(3, 3, "ins LABEL before|after PATH")?;
                let before = match rest[1].as_str() {
                    "before" => true,
                    "after" => false,
                    _ => return Err(bad("expected `before` or `after`")),
                };
                Command::Insert { label: arg(0), before, path: arg(2) }
            }
            "defvar" => {
                arity(1, 2, "defvar NAME [PATH]")?;
                Command::Defvar { name: arg(0), path: opt(1) }
            }
            "defnode" => {
                arity(2, 3, "defnode NAME PATH [VALUE]")?;
                Command::Defnode { name: arg(0), path: arg(1), value: opt(2) }
            }
            "clear" => {
                arity(1, 1, "clear PATH")?;
                Command::Clear { path: arg(0) }
            }
            "touch" => {
                arity(1, 1, "touch PATH")?;
                Command::Touch { path: arg(0) }
            }
            "print" | "dump-xml" => {
                arity(0, 1, "print [PATH]")?;
                Command::Print { path: opt(0) }
            }
            "load" => {
                arity(0, 0, "load")?;
                Command::Load
            }
            "save" => {
                arity(0, 0, "save")?;
                Command::Save
            }
            other => return Err(bad(&format!("unknown command `{other}`"))),
        };
        Ok(Some(cmd))
    }
}

// ── Argument tokenizer ────────────────────────────────────────────────────────

/// Split `s` into whitespace-delimited tokens, honouring `"..."` and `'...'`
/// quoting and backslash escapes.  An empty quoted string is a token.
fn split_args(s: &str) -> std::result::Result<Vec<String>, &'static str> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut quote: Option<char> = None;
    let mut have_token = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' | '\'' if quote.is_none() => {
                quote = Some(ch);
                have_token = true;
            }
            c if Some(c) == quote => quote = None,
            '\\' => match chars.next() {
                Some(escaped) => {
                    cur.push(escaped);
                    have_token = true;
                }
                None => return Err("dangling `\\`"),
            },
            c if c.is_whitespace() && quote.is_none() => {
                if have_token {
                    args.push(std::mem::take(&mut cur));
                    have_token = false;
                }
            }
            c => {
                cur.push(c);
                have_token = true;
            }
        }
    }
    if quote.is_some() {
        return Err("unterminated quote");
    }
    if have_token {
        args.push(cur);
    }
    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
