//! Runs a list of commands against one tree.
//!
//! Commands execute in order; the first failure stops the run.  Effects of
//! the commands before it stay applied.

use tracing::debug;

use crate::engine::Augeas;
use crate::error::{Error, Result};

use super::command::Command;

/// Result of [`run`].
#[derive(Debug, Default)]
pub struct ScriptOutcome {
    /// Number of commands that completed (blanks and comments included).
    pub succeeded: usize,
    /// Zero-based index of the command that failed.
    pub failed_at: Option<usize>,
    /// Message of the failure.
    pub message: Option<String>,
    /// Lines printed by `get`, `match`, `print`, `rm` and `save`.
    pub output: Vec<String>,
    failure: Option<(String, Error)>,
}

impl ScriptOutcome {
    pub fn is_success(&self) -> bool {
        self.failed_at.is_none()
    }

    /// Convert a failed run into [`Error::ScriptAbort`].
    pub fn into_result(mut self) -> Result<ScriptOutcome> {
        match (self.failed_at, self.failure.take()) {
            (Some(index), Some((command, source))) => {
                Err(Error::ScriptAbort { index, command, source: Box::new(source) })
            }
            _ => Ok(self),
        }
    }
}

/// Execute `commands` against `aug`.
pub fn run<S: AsRef<str>>(aug: &mut Augeas, commands: &[S]) -> ScriptOutcome {
    let mut outcome = ScriptOutcome::default();
    for (index, raw) in commands.iter().enumerate() {
        let raw = raw.as_ref();
        let result = Command::parse(raw).and_then(|cmd| match cmd {
            Some(cmd) => exec(aug, cmd, &mut outcome.output),
            None => Ok(()),
        });
        if let Err(e) = result {
            debug!(index, command = raw, error = %e, "script stopped");
            outcome.failed_at = Some(index);
            outcome.message = Some(e.to_string());
            outcome.failure = Some((raw.trim().to_owned(), e));
            return outcome;
        }
        outcome.succeeded += 1;
    }
    outcome
}

fn exec(aug: &mut Augeas, cmd: Command, output: &mut Vec<String>) -> Result<()> {
    match cmd {
        Command::Set { path, value: Some(v) } => aug.set(&path, &v)?,
        Command::Set { path, value: None } | Command::Clear { path } => aug.clear(&path)?,
        Command::Setm { base, sub, value } => {
            aug.setm(&base, Some(&sub), value.as_deref())?;
        }
        Command::Get { path } => {
            let line = match aug.get(&path)? {
                Some(v) => format!("{path} = {v}"),
                None => format!("{path} (none)"),
            };
            output.push(line);
        }
        Command::Match { path, value } => {
            let nodes = aug.select(&path)?;
            let tree = aug.tree();
            let mut found = 0;
            for n in nodes {
                let v = tree.value(n);
                if value.is_some() && value.as_deref() != v {
                    continue;
                }
                found += 1;
                match v {
                    Some(v) => output.push(format!("{} = {v}", tree.path_of(n))),
                    None => output.push(format!("{} (none)", tree.path_of(n))),
                }
            }
            if found == 0 {
                output.push("  (no matches)".to_owned());
            }
        }
        Command::Rm { path } => {
            let n = aug.rm(&path)?;
            output.push(format!("rm : {path} {n}"));
        }
        Command::Mv { src, dst } => aug.mv(&src, &dst)?,
        Command::Insert { label, before, path } => aug.insert(&path, &label, before)?,
        Command::Defvar { name, path } => aug.defvar(&name, path.as_deref())?,
        Command::Defnode { name, path, value } => {
            aug.defnode(&name, &path, value.as_deref())?;
        }
        Command::Touch { path } => aug.touch(&path)?,
        Command::Print { path } => {
            let path = path.unwrap_or_else(|| "/*".to_owned());
            for (p, v) in aug.print(&path)? {
                match v {
                    Some(v) => output.push(format!("{p} = \"{v}\"")),
                    None => output.push(p),
                }
            }
        }
        Command::Load => aug.load()?,
        Command::Save => {
            if aug.save()? {
                output.push(format!("Saved {} file(s)", aug.nmatch("/augeas/events/saved")?));
            } else {
                output.push("Saving failed (see /augeas/files//error)".to_owned());
            }
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Flags, TreeOptions};

    fn bare() -> Augeas {
        Augeas::open(TreeOptions::new().flags(Flags::NO_LOAD | Flags::NO_MODULE_AUTOLOAD)).unwrap()
    }

    #[test]
    fn runs_in_order() {
        let mut aug = bare();
        let out = run(&mut aug, &["set /files/a 1", "get /files/a", "match /files/*"]);
        assert!(out.is_success());
        assert_eq!(out.succeeded, 3);
        assert_eq!(out.output, ["/files/a = 1", "/files/a = 1"]);
    }

    #[test]
    fn stops_at_first_failure() {
        let mut aug = bare();
        let out = run(&mut aug, &["set /files/a 1", "get /files/missing", "set /files/b 2"]);
        assert_eq!(out.succeeded, 1);
        assert_eq!(out.failed_at, Some(1));
        assert!(out.message.as_deref().unwrap_or_default().contains("/files/missing"));
        assert_eq!(aug.get("/files/a").unwrap().as_deref(), Some("1"));
        assert!(aug.get("/files/b").unwrap_err().is_no_match());
    }

    #[test]
    fn unknown_verb_stops_run() {
        let mut aug = bare();
        let out = run(&mut aug, &["set /files/a 1", "bogus /files/a", "set /files/a 2"]);
        assert_eq!(out.failed_at, Some(1));
        assert_eq!(aug.get("/files/a").unwrap().as_deref(), Some("1"));
        match out.into_result() {
            Err(Error::ScriptAbort { index: 1, command, source }) => {
                assert_eq!(command, "bogus /files/a");
                assert!(matches!(*source, Error::ScriptParse { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn comments_and_blanks_count_as_done() {
        let mut aug = bare();
        let out = run(&mut aug, &["# hello", "", "set /files/a 1"]);
        assert_eq!(out.succeeded, 3);
        assert!(out.into_result().is_ok());
    }

    #[test]
    fn match_filters_by_value_and_reports_none() {
        let mut aug = bare();
        let out = run(
            &mut aug,
            &["set /files/x[last()+1] a", "set /files/x[last()+1] b", "match /files/x b", "match /files/y"],
        );
        assert_eq!(out.output, ["/files/x[2] = b", "  (no matches)"]);
    }

    #[test]
    fn defnode_then_use_variable() {
        let mut aug = bare();
        let out = run(
            &mut aug,
            &["defnode e /files/hosts/1 ''", "set $e/ipaddr 10.0.0.1", "rm $e", "get /files/hosts/1"],
        );
        assert_eq!(out.failed_at, Some(3));
        assert_eq!(out.output, ["rm : $e 2"]);
    }
}
