//! CLI subcommands.

pub mod common;
pub mod process;
pub mod roi;
pub mod scenes;
