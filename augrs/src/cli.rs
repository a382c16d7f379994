//! Command-line argument parsing for `augsh`.
//!
//! Usage:
//!   augsh [-r<root>] [-I<dir>]... [-l<lens>] [-i<incl>]... [-bnNLA]
//!         [-f<file>] [-e<cmd>]... [<command>...]
//!
//! Flags taking a value accept it attached (`-r/tmp/root`) or as the next
//! argument (`-r /tmp/root`).  Positional arguments form one command, either
//! as separate words or as a single quoted argument.

use std::path::PathBuf;

use crate::config::{Flags, TreeOptions};

/// Environment variable consulted when `-r` is absent.
pub const ROOT_ENV: &str = "AUGEAS_ROOT";

pub const USAGE: &str = "Usage: augsh [-r<root>] [-I<dir>]... [-l<lens>] [-i<incl>]... [-bnNLA] \
                         [-f<file>] [-e<cmd>]... [<command>...]";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// File-system root (`-r<root>`).
    pub root: Option<PathBuf>,
    /// Extra lens directories (`-I<dir>`).
    pub loadpath: Vec<PathBuf>,
    /// Lens for an explicit transform (`-l<lens>`).
    pub lens: Option<String>,
    /// Files for the explicit transform (`-i<incl>`).
    pub incl: Vec<String>,
    /// Tree flags collected from `-b`, `-n`, `-N`, `-L`, `-A`.
    pub flags: Flags,
    /// Read commands from this file (`-f<file>`).
    pub file: Option<PathBuf>,
    /// Commands given with `-e<cmd>`.
    pub commands: Vec<String>,
    /// Print usage and exit (`-h`).
    pub help: bool,
}

impl CliArgs {
    /// `true` when no command source was given and stdin should be read.
    pub fn wants_stdin(&self) -> bool {
        self.commands.is_empty() && self.file.is_none()
    }

    /// Tree options for these arguments.  `env_root` is the value of
    /// [`ROOT_ENV`], used when `-r` was not given.
    pub fn tree_options(&self, env_root: Option<String>) -> TreeOptions {
        let mut opts = TreeOptions::new().flags(self.flags);
        if let Some(root) = self.root.clone().or_else(|| env_root.map(PathBuf::from)) {
            opts = opts.root(root);
        }
        for dir in &self.loadpath {
            opts = opts.loadpath(dir.clone());
        }
        if let Some(lens) = &self.lens {
            opts = opts.lens(lens.clone());
        }
        for incl in &self.incl {
            opts = opts.incl(incl.clone());
        }
        opts
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        if arg == "--" {
            positional.extend(argv[i + 1..].iter().cloned());
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            let flag = chars[j];
            match flag {
                'b' => args.flags |= Flags::SAVE_BACKUP,
                'n' => args.flags |= Flags::SAVE_NEW_FILE,
                'N' => args.flags |= Flags::SAVE_NOOP,
                'L' => args.flags |= Flags::NO_LOAD,
                'A' => args.flags |= Flags::NO_MODULE_AUTOLOAD,
                'h' => args.help = true,

                'r' | 'I' | 'l' | 'i' | 'f' | 'e' => {
                    let value = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err(format!("-{flag} requires an argument"));
                    };
                    match flag {
                        'r' => args.root = Some(PathBuf::from(value)),
                        'I' => args.loadpath.push(PathBuf::from(value)),
                        'l' => args.lens = Some(value),
                        'i' => args.incl.push(value),
                        'f' => args.file = Some(PathBuf::from(value)),
                        _ => args.commands.push(value),
                    }
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    if !positional.is_empty() {
        args.commands.push(join_command(&positional));
    }
    if !args.incl.is_empty() && args.lens.is_none() {
        return Err("-i requires -l".to_owned());
    }

    Ok(args)
}

/// Rebuild one command line from separate words, quoting words that would
/// otherwise split.  A single word is taken as a whole command.
fn join_command(words: &[String]) -> String {
    if let [only] = words {
        return only.clone();
    }
    words
        .iter()
        .map(|w| {
            if w.is_empty() || w.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
                let escaped = w.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\"")
            } else {
                w.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// The user start-up script, `<config_dir>/augsh/augshrc`, if it exists.
pub fn find_user_config() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "augsh")?;
    let rc = dirs.config_dir().join("augshrc");
    rc.exists().then_some(rc)
}

/// Split script text into commands, one per line.
pub fn script_lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_owned).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
