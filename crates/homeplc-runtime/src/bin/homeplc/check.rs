//! `homeplc check`.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use homeplc_runtime::io::SimulatedChannels;
use homeplc_runtime::{HomeplcConfig, RuntimeBuilder};

pub fn check(config_path: &Path, verbose: bool) -> anyhow::Result<()> {
    let config = HomeplcConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    crate::init_tracing(&config.log_level, verbose);

    // no hardware access, also off-target
    let runtime = RuntimeBuilder::new()
        .with_channels(Arc::new(SimulatedChannels::new()))
        .build(&config)
        .context("invalid runtime configuration")?;

    println!("config: {}", config_path.display());
    for task in runtime.scheduler.tasks() {
        println!("task {} every {}", task.name(), task.interval());
        for program in task.program_names() {
            println!("  program {program}");
        }
        for io in task.io().names() {
            println!("  io {io}");
        }
    }
    for (namespace, name, value) in runtime.table.snapshot() {
        println!("{namespace}.{name} = {value}");
    }
    Ok(())
}
