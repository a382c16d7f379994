//! Tree-creation options.
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `root` | file-system prefix every file path is resolved under |
//! | `loadpath` | extra lens search directories |
//! | `lens` + `incl` | an explicit transform registered at `/augeas/load` |
//! | `flags` | [`Flags`] bitmask |
//! | `script` | commands run once the tree is ready |

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;
use std::str::FromStr;

/// Lens directory searched unless [`Flags::NO_STDINC`] is given.
pub const DEFAULT_LOADPATH: &str = "/usr/share/augeas/lenses/dist";

// ── Flags ─────────────────────────────────────────────────────────────────────

/// Tree-creation flags.  Values match the long-standing numeric constants so
/// they can be passed through unchanged from other front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u32);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// Keep the original as `<file>.augsave` before replacing it.
    pub const SAVE_BACKUP: Flags = Flags(1);
    /// Write `<file>.augnew` and leave the original alone.
    pub const SAVE_NEW_FILE: Flags = Flags(2);
    /// Accepted for compatibility; lenses here are not type checked.
    pub const TYPE_CHECK: Flags = Flags(4);
    /// Do not search [`DEFAULT_LOADPATH`].
    pub const NO_STDINC: Flags = Flags(8);
    /// Run the save pass without writing anything.
    pub const SAVE_NOOP: Flags = Flags(16);
    /// Skip the initial load.
    pub const NO_LOAD: Flags = Flags(32);
    /// Register only explicitly requested transforms.
    pub const NO_MODULE_AUTOLOAD: Flags = Flags(64);

    pub const fn from_bits(bits: u32) -> Flags {
        Flags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

// ── SaveMode ──────────────────────────────────────────────────────────────────

/// How `save()` commits a changed file.  Stored as a word at `/augeas/save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    #[default]
    Overwrite,
    Backup,
    NewFile,
    Noop,
}

impl SaveMode {
    /// Mode selected by `flags`.  `SAVE_NOOP` wins over the others, then
    /// `SAVE_NEW_FILE`, then `SAVE_BACKUP`.
    pub fn from_flags(flags: Flags) -> SaveMode {
        if flags.contains(Flags::SAVE_NOOP) {
            SaveMode::Noop
        } else if flags.contains(Flags::SAVE_NEW_FILE) {
            SaveMode::NewFile
        } else if flags.contains(Flags::SAVE_BACKUP) {
            SaveMode::Backup
        } else {
            SaveMode::Overwrite
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SaveMode::Overwrite => "overwrite",
            SaveMode::Backup => "backup",
            SaveMode::NewFile => "newfile",
            SaveMode::Noop => "noop",
        }
    }
}

impl fmt::Display for SaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised `/augeas/save` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSaveModeError(pub String);

impl fmt::Display for ParseSaveModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown save mode `{}`", self.0)
    }
}

impl std::error::Error for ParseSaveModeError {}

impl FromStr for SaveMode {
    type Err = ParseSaveModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "overwrite" => Ok(SaveMode::Overwrite),
            "backup" => Ok(SaveMode::Backup),
            "newfile" => Ok(SaveMode::NewFile),
            "noop" => Ok(SaveMode::Noop),
            other => Err(ParseSaveModeError(other.to_owned())),
        }
    }
}

// ── TreeOptions ───────────────────────────────────────────────────────────────

/// Everything needed to create a tree.
#[derive(Debug, Clone)]
pub struct TreeOptions {
    pub root: PathBuf,
    pub loadpath: Vec<PathBuf>,
    pub lens: Option<String>,
    pub incl: Vec<String>,
    pub flags: Flags,
    pub script: Vec<String>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            loadpath: Vec::new(),
            lens: None,
            incl: Vec::new(),
            flags: Flags::NONE,
            script: Vec::new(),
        }
    }
}

impl TreeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn loadpath(mut self, dir: impl Into<PathBuf>) -> Self {
        self.loadpath.push(dir.into());
        self
    }

    pub fn lens(mut self, lens: impl Into<String>) -> Self {
        self.lens = Some(lens.into());
        self
    }

    pub fn incl(mut self, pattern: impl Into<String>) -> Self {
        self.incl.push(pattern.into());
        self
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn command(mut self, cmd: impl Into<String>) -> Self {
        self.script.push(cmd.into());
        self
    }

    /// Lens search path: explicit entries first, then [`DEFAULT_LOADPATH`]
    /// unless suppressed.
    pub fn search_path(&self) -> Vec<PathBuf> {
        let mut path = self.loadpath.clone();
        if !self.flags.contains(Flags::NO_STDINC) {
            path.push(PathBuf::from(DEFAULT_LOADPATH));
        }
        path
    }

    pub fn save_mode(&self) -> SaveMode {
        SaveMode::from_flags(self.flags)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
