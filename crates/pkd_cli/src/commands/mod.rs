//! CLI command implementations.

pub mod check;
pub mod history;
pub mod roles;
pub mod run;
