//! CLI subcommand implementations.

pub mod add;
pub mod run;
pub mod status;
