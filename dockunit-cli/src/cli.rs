//! CLI argument definitions

use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dockunit")]
#[command(about = "Run a docker container as a supervised systemd service", long_about = None)]
#[command(version)]
#[command(override_usage = "dockunit [OPTIONS] run [DOCKER RUN ARGS]...")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Write the container's main pid to this file
    #[arg(short, long = "pid-file", value_name = "PATH")]
    pub pid_file: Option<PathBuf>,

    /// Stream container logs while attached
    #[arg(
        short,
        long,
        action = ArgAction::Set,
        default_value_t = true,
        default_missing_value = "true",
        num_args = 0..=1,
        require_equals = true
    )]
    pub logs: bool,

    /// Let the container send READY=1 itself through NOTIFY_SOCKET
    #[arg(short, long)]
    pub notify: bool,

    /// Pass this process's environment to the container
    #[arg(short, long)]
    pub env: bool,

    /// Cgroup controller to take ownership of, or `all`
    #[arg(short, long = "cgroups", value_name = "NAME", action = ArgAction::Append)]
    pub cgroups: Vec<String>,

    /// Poll interval in milliseconds while waiting for the container to stop
    #[arg(long, value_name = "MS")]
    pub interval: Option<u64>,

    /// `run` followed by arguments for `docker run`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}
