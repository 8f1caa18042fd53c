#![warn(clippy::todo)]

pub mod ast;
pub mod cfg;
pub mod check;
mod expr_ext;
pub mod lower;
pub mod rewrite;
mod span;
mod stmt_ext;

pub use lower::to_cfg;
pub use span::{Position, Span};
