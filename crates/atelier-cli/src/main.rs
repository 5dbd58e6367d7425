//! # atelier CLI
//!
//! Command-line interface for the Atelier project engine.
//!
//! This binary provides human-friendly access to `atelier-core`.
//! Run `atelier --help` for usage information.

mod cli;
pub mod ui;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
