//! Human-readable per-file error reports.
//!
//! [`ErrorReporter`] wraps a [`Handle`] and turns the error records kept
//! under `/augeas/files<file>/error` into one-line messages of the form
//! `file[:line[:char]]: message`.

use crate::engine::{meta_labels, Augeas, FILES_META};
use crate::error::Result;
use crate::executor::Handle;
use crate::tree::NodeId;

/// Message used when an error record has no `message` child.
const UNKNOWN: &str = "unknown error";

/// A [`Handle`] plus error formatting.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    handle: Handle,
}

impl ErrorReporter {
    pub fn new(handle: Handle) -> Self {
        ErrorReporter { handle }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn into_inner(self) -> Handle {
        self.handle
    }

    /// The formatted error for `file`, or `None` if it has none.
    pub async fn file_error_message(&self, file: &str) -> Result<Option<String>> {
        let file = file.to_owned();
        self.handle.exec(move |a| Ok(file_error(a, &file))).await
    }

    pub fn file_error_message_blocking(&self, file: &str) -> Result<Option<String>> {
        let file = file.to_owned();
        self.handle.exec_blocking(move |a| Ok(file_error(a, &file)))
    }

    /// One formatted line per file that currently has an error.
    pub async fn dump_file_errors(&self) -> Result<Vec<String>> {
        self.handle.exec(|a| Ok(all_file_errors(a))).await
    }

    pub fn dump_file_errors_blocking(&self) -> Result<Vec<String>> {
        self.handle.exec_blocking(|a| Ok(all_file_errors(a)))
    }
}

// ── Formatting ────────────────────────────────────────────────────────────────

pub(crate) fn file_error(aug: &Augeas, file: &str) -> Option<String> {
    let record = aug.lookup(meta_labels(file))?;
    format_error(aug, file, record)
}

pub(crate) fn all_file_errors(aug: &Augeas) -> Vec<String> {
    let t = aug.tree();
    let Some(meta) = aug.lookup(meta_labels("")) else { return Vec::new() };
    t.descendants(meta)
        .into_iter()
        .filter(|&n| t.child(n, "error").is_some())
        .filter_map(|n| {
            // the record's own path is authoritative; labels may be escaped
            let file = t
                .child(n, "path")
                .and_then(|p| t.value(p))
                .and_then(|p| p.strip_prefix("/files"))
                .map(str::to_owned)
                .unwrap_or_else(|| t.path_of(n).trim_start_matches(FILES_META).to_owned());
            format_error(aug, &file, n)
        })
        .collect()
}

fn format_error(aug: &Augeas, file: &str, record: NodeId) -> Option<String> {
    let t = aug.tree();
    let err = t.child(record, "error")?;
    let field = |name: &str| t.child(err, name).and_then(|n| t.value(n));
    let mut out = file.to_owned();
    if let Some(line) = field("line") {
        out.push(':');
        out.push_str(line);
        if let Some(ch) = field("char") {
            out.push(':');
            out.push_str(ch);
        }
    }
    out.push_str(": ");
    out.push_str(field("message").unwrap_or(UNKNOWN));
    Some(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Flags, TreeOptions};

    fn broken_hosts() -> (tempfile::TempDir, Augeas) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(dir.path().join("etc/hosts"), "127.0.0.1\n").unwrap();
        let opts = TreeOptions::new()
            .root(dir.path())
            .flags(Flags::NO_MODULE_AUTOLOAD)
            .lens("Hosts")
            .incl("/etc/hosts");
        let aug = Augeas::open(opts).unwrap();
        (dir, aug)
    }

    #[test]
    fn formats_line_and_char() {
        let (_dir, aug) = broken_hosts();
        let msg = file_error(&aug, "/etc/hosts").unwrap();
        assert!(msg.starts_with("/etc/hosts:1:"), "{msg}");
        assert_eq!(all_file_errors(&aug), vec![msg]);
    }

    #[test]
    fn missing_message_is_unknown() {
        let (_dir, mut aug) = broken_hosts();
        aug.rm("/augeas/files/etc/hosts/error/*").unwrap();
        assert_eq!(file_error(&aug, "/etc/hosts").as_deref(), Some("/etc/hosts: unknown error"));
    }

    #[test]
    fn no_error_no_message() {
        let aug = Augeas::open(TreeOptions::new().flags(Flags::NO_LOAD | Flags::NO_MODULE_AUTOLOAD))
            .unwrap();
        assert_eq!(file_error(&aug, "/etc/hosts"), None);
        assert!(all_file_errors(&aug).is_empty());
    }

    #[test]
    fn reporter_runs_through_handle() {
        let (_dir, aug) = broken_hosts();
        let reporter = ErrorReporter::new(Handle::from_engine(aug).unwrap());
        let lines = reporter.dump_file_errors_blocking().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(reporter.file_error_message_blocking("/etc/motd").unwrap().is_none());
    }
}
