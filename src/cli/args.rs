//! Defines the command-line arguments for the polfmt CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::Parser;
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "polfmt",
    version,
    about = "Canonical formatter for network security policy files."
)]
pub struct PolfmtArgs {
    /// The policy file to format.
    #[arg(required = true)]
    pub file: PathBuf,

    /// Print the parsed syntax tree as JSON instead of formatted text.
    #[arg(long)]
    pub ast: bool,
}
