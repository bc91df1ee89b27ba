//! Subcommand implementations

pub mod import;
pub mod render;
pub mod run;
