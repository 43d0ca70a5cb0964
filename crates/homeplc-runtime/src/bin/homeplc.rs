//! CLI entrypoint for the home automation runtime.

#[path = "homeplc/check.rs"]
mod check;
#[path = "homeplc/cli.rs"]
mod cli;
#[path = "homeplc/run.rs"]
mod run;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { config } => run::run(&config, cli.verbose),
        Command::Check { config } => check::check(&config, cli.verbose),
    }
}

/// Install the stderr subscriber; `RUST_LOG` adds per-target directives.
pub(crate) fn init_tracing(level: &str, verbose: bool) {
    let level = if verbose {
        Level::DEBUG
    } else {
        level.parse().unwrap_or(Level::INFO)
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .try_init();
}
