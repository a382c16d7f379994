//! Crate-wide error type.
//!
//! Every fallible engine operation returns [`Result`].  Per-file load and
//! save failures are *not* represented here: they are recorded as data under
//! `/augeas/files/.../error` (see [`crate::save`]).

use std::io;

/// Errors returned by tree operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed path expression.
    #[error("invalid path `{path}` at offset {pos}: {message}")]
    PathSyntax {
        path: String,
        pos: usize,
        message: String,
    },

    /// The expression had to match exactly one node but matched `found`.
    ///
    /// `found == 0` is the "no match" case; see [`Error::is_no_match`].
    #[error("path `{path}` matched {found} nodes, expected exactly one")]
    AmbiguousMatch { path: String, found: usize },

    /// Write resolution reached a step it is not able to materialise.
    #[error("cannot create `{path}`: {reason}")]
    CannotCreate { path: String, reason: String },

    /// `$name` used in a path with no binding for `name`.
    #[error("variable `${0}` is not defined")]
    UnboundVariable(String),

    /// `mv` destination lies inside the source subtree.
    #[error("cannot move `{src}` into its own descendant `{dst}`")]
    MoveIntoDescendant { src: String, dst: String },

    /// The lens loader does not know the requested lens.
    #[error("lens `{0}` is not available")]
    UnknownLens(String),

    /// A script command could not be parsed.
    #[error("bad command `{command}`: {message}")]
    ScriptParse { command: String, message: String },

    /// A script stopped at command `index` (zero-based).
    #[error("command {index} (`{command}`) failed: {source}")]
    ScriptAbort {
        index: usize,
        command: String,
        #[source]
        source: Box<Error>,
    },

    /// The tree handle was closed before this operation ran.
    #[error("tree handle is closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn syntax(path: &str, pos: usize, message: impl Into<String>) -> Self {
        Error::PathSyntax {
            path: path.to_owned(),
            pos,
            message: message.into(),
        }
    }

    pub(crate) fn cannot_create(path: &str, reason: impl Into<String>) -> Self {
        Error::CannotCreate {
            path: path.to_owned(),
            reason: reason.into(),
        }
    }

    /// `true` for an [`Error::AmbiguousMatch`] that found nothing at all.
    pub fn is_no_match(&self) -> bool {
        matches!(self, Error::AmbiguousMatch { found: 0, .. })
    }

    /// `true` for an [`Error::AmbiguousMatch`] with more than one match.
    pub fn is_multiple_match(&self) -> bool {
        matches!(self, Error::AmbiguousMatch { found, .. } if *found > 1)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_match_is_distinguishable() {
        let zero = Error::AmbiguousMatch { path: "/a".into(), found: 0 };
        let many = Error::AmbiguousMatch { path: "/a".into(), found: 3 };
        assert!(zero.is_no_match() && !zero.is_multiple_match());
        assert!(many.is_multiple_match() && !many.is_no_match());
    }

    #[test]
    fn script_abort_message_names_index() {
        let e = Error::ScriptAbort {
            index: 1,
            command: "frob /x".into(),
            source: Box::new(Error::UnboundVariable("x".into())),
        };
        assert_eq!(
            e.to_string(),
            "command 1 (`frob /x`) failed: variable `$x` is not defined"
        );
    }
}
