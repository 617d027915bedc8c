//! Engine implementation driving the `docker` client binary

use async_trait::async_trait;
use dockunit_core::{ContainerId, Error, ProcessId, Result, RuntimeConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

use crate::engine::{ContainerEngine, ContainerState};

/// Engine backed by the `docker` CLI
///
/// The client honours `DOCKER_HOST` by itself; an explicit host from the
/// configuration is passed as `--host` ahead of every subcommand.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
    host: Option<String>,
}

impl DockerCli {
    /// Client using `binary`, talking to the default endpoint
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            host: None,
        }
    }

    /// Client configured from `config`
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            binary: config.engine_binary.clone(),
            host: config.engine_host.clone(),
        }
    }

    /// Talk to a specific endpoint
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(ref host) = self.host {
            cmd.arg("--host").arg(host);
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    async fn run_captured(&self, args: &[&str]) -> Result<Output> {
        debug!(binary = %self.binary.display(), ?args, "Running engine command");

        self.command()
            .args(args)
            .output()
            .await
            .map_err(|e| Error::engine(format!("Failed to run {}: {e}", self.binary.display())))
    }

    async fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run_captured(args).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(Error::engine(failure_message(args, &output)))
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn inspect(&self, reference: &ContainerId) -> Result<Option<ContainerState>> {
        let args = ["inspect", "--type", "container", reference.as_str()];
        let output = self.run_captured(&args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_no_such_container(&stderr) {
                debug!(container = %reference, "Engine has no such container");
                return Ok(None);
            }
            return Err(Error::engine(failure_message(&args, &output)));
        }

        parse_inspect(&String::from_utf8_lossy(&output.stdout))
    }

    async fn start(&self, id: &ContainerId) -> Result<()> {
        info!(container_id = %id, "Starting existing container");
        self.run_checked(&["start", id.as_str()]).await?;
        Ok(())
    }

    async fn remove(&self, id: &ContainerId) -> Result<()> {
        info!(container_id = %id, "Removing container");
        self.run_checked(&["rm", "-f", id.as_str()]).await?;
        Ok(())
    }

    async fn launch(&self, run_args: &[String]) -> Result<ContainerId> {
        info!(args = ?run_args, "Launching container");

        // stdout carries the new id; progress and errors go straight to our stderr
        let output = self
            .command()
            .arg("run")
            .args(run_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|e| Error::engine(format!("Failed to run {}: {e}", self.binary.display())))?;

        if !output.status.success() {
            return Err(Error::engine(format!("run exited with {}", output.status)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let id = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .next_back()
            .ok_or_else(|| Error::resolution("Engine printed no container id"))?;

        ContainerId::new(id)
    }

    async fn stream_logs(&self, id: &ContainerId) -> Result<()> {
        debug!(container_id = %id, "Following container logs");

        let status = self
            .command()
            .args(["logs", "-f", id.as_str()])
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| Error::engine(format!("Failed to run {}: {e}", self.binary.display())))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::engine(format!("logs exited with {status}")))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectRecord {
    id: String,
    #[serde(default)]
    name: Option<String>,
    state: InspectState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    running: bool,
    pid: i32,
}

/// Decode `docker inspect` output
///
/// An empty array means the engine found nothing.
///
/// # Errors
/// Returns error if the output is not the expected JSON
pub fn parse_inspect(json: &str) -> Result<Option<ContainerState>> {
    let records: Vec<InspectRecord> = serde_json::from_str(json)?;

    let Some(record) = records.into_iter().next() else {
        return Ok(None);
    };

    let name = match record.name.as_deref() {
        Some(name) if !name.trim_start_matches('/').is_empty() => Some(ContainerId::new(name)?),
        _ => None,
    };

    Ok(Some(ContainerState {
        id: ContainerId::new(record.id)?,
        name,
        running: record.state.running,
        pid: ProcessId::from_raw(record.state.pid),
    }))
}

fn is_no_such_container(stderr: &str) -> bool {
    stderr.contains("No such container") || stderr.contains("No such object")
}

fn failure_message(args: &[&str], output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let command = args.first().copied().unwrap_or_default();

    if stderr.is_empty() {
        format!("{command} exited with {}", output.status)
    } else {
        format!("{command} failed: {stderr}")
    }
}
