//! Path expressions: parsing and evaluation.

pub mod eval;
pub mod parse;

pub use eval::{
    apply_plan, compile, plan_write, select, select_for_write, select_one, Resolved, Scope,
    WritePlan,
};
pub use parse::{parse_path, PathExpr};
