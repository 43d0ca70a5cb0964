//! CLI definitions for homeplc.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "homeplc",
    version,
    about = "Cyclic runtime for home automation controllers",
    after_help = "Examples:\n  homeplc run --config /etc/homeplc/homeplc.toml\n  homeplc check --config ./homeplc.toml --verbose"
)]
pub struct Cli {
    /// Show debug logs.
    #[arg(long, short, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start every task and run until Ctrl+C.
    Run {
        /// Configuration file.
        #[arg(long, default_value = "homeplc.toml")]
        config: PathBuf,
    },
    /// Validate a configuration without touching hardware.
    Check {
        /// Configuration file.
        #[arg(long, default_value = "homeplc.toml")]
        config: PathBuf,
    },
}
