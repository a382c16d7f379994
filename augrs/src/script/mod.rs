//! Command scripts: a fixed set of tree-operation verbs run as one unit.
//!
//! ```rust
//! use augrs::{Augeas, Flags, TreeOptions};
//!
//! let opts = TreeOptions::new().flags(Flags::NO_LOAD | Flags::NO_MODULE_AUTOLOAD);
//! let mut aug = Augeas::open(opts).unwrap();
//! let out = aug.srun(&["set /files/greeting hello", "get /files/greeting"]);
//! assert_eq!(out.output, vec!["/files/greeting = hello"]);
//! ```

pub mod command;
pub mod runner;

pub use command::Command;
pub use runner::{run, ScriptOutcome};
