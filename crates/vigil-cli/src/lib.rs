//! Vigil CLI: runs the scan pipeline workers and operator commands.
//!
//! Configuration comes from the environment (see `vigil_core::Config`).

pub mod cli;
pub mod setup;
pub mod workers;

pub use cli::{Cli, Commands};
