//! Lens collaborator interface and the built-in lens registry.
//!
//! A [`Lens`] turns file text into tree [`Fragment`]s and back.  The engine
//! never looks inside a lens; it only asks a [`LensLoader`] for one by name
//! and records any [`LensError`] under `/augeas/files/.../error`.

pub mod hosts;
pub mod shellvars;

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::tree::Fragment;

pub use hosts::Hosts;
pub use shellvars::Shellvars;

// ── Errors ────────────────────────────────────────────────────────────────────

/// A parse or serialise failure reported by a lens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LensError {
    pub message: String,
    /// 1-based line, when known.
    pub line: Option<usize>,
    /// 1-based column, when known.
    pub char: Option<usize>,
}

impl LensError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), line: None, char: None }
    }

    pub fn at(message: impl Into<String>, line: usize, char: usize) -> Self {
        Self { message: message.into(), line: Some(line), char: Some(char) }
    }
}

impl std::fmt::Display for LensError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.char) {
            (Some(l), Some(c)) => write!(f, "line {l}, char {c}: {}", self.message),
            (Some(l), None) => write!(f, "line {l}: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for LensError {}

// ── Traits ────────────────────────────────────────────────────────────────────

/// Bidirectional text ↔ tree transform for one file format.
pub trait Lens: Send + Sync {
    /// Module name, e.g. `Hosts`.
    fn name(&self) -> &str;

    /// Parse `text` into the children of the file's tree node.
    fn get(&self, text: &str) -> std::result::Result<Vec<Fragment>, LensError>;

    /// Serialise `tree` back to text.  `original` is the current file
    /// content, if the file exists.
    fn put(&self, tree: &[Fragment], original: Option<&str>) -> std::result::Result<String, LensError>;
}

/// A default file set a lens module contributes to `/augeas/load`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transform {
    pub module: String,
    pub lens: String,
    pub incl: Vec<String>,
    pub excl: Vec<String>,
}

/// Resolves lens names to [`Lens`] instances.
pub trait LensLoader: Send {
    /// Load the lens called `name` (`Hosts`, `Hosts.lns` and `hosts` are
    /// equivalent), searching `search_path` for lens modules.
    fn load(&self, name: &str, search_path: &[PathBuf]) -> Result<Arc<dyn Lens>>;

    /// Transforms registered when module autoloading is enabled.
    fn autoload(&self) -> Vec<Transform>;
}

/// Strip a `.lns` suffix, yielding the module name.
pub fn module_name(lens: &str) -> &str {
    lens.strip_suffix(".lns").unwrap_or(lens)
}

// ── Built-in registry ─────────────────────────────────────────────────────────

/// Loader serving the lenses compiled into this crate.
///
/// The search path is accepted but not consulted: built-in modules need no
/// files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLenses;

impl LensLoader for BuiltinLenses {
    fn load(&self, name: &str, search_path: &[PathBuf]) -> Result<Arc<dyn Lens>> {
        let module = module_name(name);
        tracing::debug!(lens = module, search_path = ?search_path, "loading lens");
        if module.eq_ignore_ascii_case("hosts") {
            Ok(Arc::new(Hosts))
        } else if module.eq_ignore_ascii_case("shellvars") {
            Ok(Arc::new(Shellvars))
        } else {
            Err(Error::UnknownLens(name.to_owned()))
        }
    }

    fn autoload(&self) -> Vec<Transform> {
        vec![
            Transform {
                module: "Hosts".into(),
                lens: "Hosts.lns".into(),
                incl: vec!["/etc/hosts".into()],
                excl: Vec::new(),
            },
            Transform {
                module: "Shellvars".into(),
                lens: "Shellvars.lns".into(),
                incl: vec!["/etc/environment".into(), "/etc/default/*".into()],
                excl: vec!["*.dpkg-*".into(), "*~".into()],
            },
        ]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
