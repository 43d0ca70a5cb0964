//! `homeplc run`.

use std::path::Path;

use anyhow::Context;
use homeplc_runtime::{HomeplcConfig, RuntimeBuilder, StopSignal};

pub fn run(config_path: &Path, verbose: bool) -> anyhow::Result<()> {
    let config = HomeplcConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    crate::init_tracing(&config.log_level, verbose);

    let mut runtime = RuntimeBuilder::new()
        .build(&config)
        .context("invalid runtime configuration")?;
    spawn_ctrl_c_watcher(runtime.scheduler.stop_signal())?;

    runtime
        .scheduler
        .start(Box::new(|| tracing::info!("shutdown requested")))
        .context("failed to start tasks")?;
    runtime.scheduler.wait();
    Ok(())
}

/// Trigger `signal` on Ctrl+C from a dedicated thread.
fn spawn_ctrl_c_watcher(signal: StopSignal) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create signal runtime")?;
    std::thread::Builder::new()
        .name("homeplc-signal".into())
        .spawn(move || {
            rt.block_on(async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %err, "failed to listen for Ctrl+C");
                    return;
                }
                signal.trigger();
            });
        })
        .context("failed to spawn signal thread")?;
    Ok(())
}
