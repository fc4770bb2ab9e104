//! Cycle tracker CLI library.
//!
//! This crate provides the CLI interface for the cycle tracker.

mod cli;
pub mod commands;
mod config;
mod store;

pub use cli::{Cli, Commands};
pub use config::{Backend, Config, NotionConfig};
pub use store::Store;
