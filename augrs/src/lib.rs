//! Configuration-tree engine.
//!
//! Configuration files are parsed by lenses into one in-memory tree under
//! `/files`, queried and edited with a small path language, and written back
//! by [`Augeas::save`].  Load and save problems are recorded as ordinary tree
//! data under `/augeas/files`.
//!
//! [`Augeas`] is the synchronous engine.  [`Handle`] moves it onto a worker
//! thread so many tasks can share one tree with strictly ordered operations.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fs;
pub mod glob;
pub mod lens;
pub mod path;
pub mod report;
pub mod save;
pub mod script;
pub mod tree;
pub mod var;

pub use config::{Flags, SaveMode, TreeOptions};
pub use engine::Augeas;
pub use error::{Error, Result};
pub use executor::Handle;
pub use report::ErrorReporter;
pub use script::ScriptOutcome;
pub use tree::{Fragment, NodeId, Tree};
