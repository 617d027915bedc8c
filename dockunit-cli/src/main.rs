//! dockunit - run a docker container as a supervised systemd service
//!
//! The service manager only tracks processes it forked itself. dockunit
//! launches (or finds) the container, moves its processes into the unit's
//! cgroups and reports the container's main pid, so that the manager
//! supervises the container instead of the docker client.

use clap::Parser;
use dockunit_core::RuntimeConfig;
use std::process;
use std::time::Duration;
use tracing::{Level, error};
use tracing_subscriber::EnvFilter;

mod cli;
mod context;
mod pipeline;

use cli::Cli;
use context::RunContext;
use pipeline::Pipeline;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Default level from verbosity, RUST_LOG overrides
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    // stdout belongs to the container's logs
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli).await {
        error!("{e:#}");
        process::exit(1);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let env = std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
    let ctx = RunContext::from_cli(cli, env)?;

    let mut config = RuntimeConfig::from_env();
    if let Some(ms) = cli.interval {
        config = config.with_poll_interval(Duration::from_millis(ms));
    }

    Pipeline::from_config(&config).run(&ctx).await?;
    Ok(())
}
