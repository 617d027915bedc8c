//! Container engine trait for pluggable implementations

use async_trait::async_trait;
use dockunit_core::{ContainerId, ProcessId, Result};
use serde::{Deserialize, Serialize};

/// What the engine reports about one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    /// Engine-assigned id
    pub id: ContainerId,
    /// Name, if the engine reports one
    pub name: Option<ContainerId>,
    /// Whether the container is running
    pub running: bool,
    /// Host pid of the main process (0 when not running)
    pub pid: ProcessId,
}

/// The container engine, treated as an authoritative oracle
///
/// This allows for different implementations:
/// - [`DockerCli`](crate::DockerCli) - the `docker` client binary
/// - [`MockEngine`](crate::MockEngine) - scripted containers for tests
///
/// Errors are never retried by callers.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Look up a container by id or name
    ///
    /// Returns `Ok(None)` when the engine has no such container.
    ///
    /// # Errors
    /// Returns error if the engine cannot be queried
    async fn inspect(&self, reference: &ContainerId) -> Result<Option<ContainerState>>;

    /// Start an existing, stopped container
    ///
    /// # Errors
    /// Returns error if the engine refuses to start it
    async fn start(&self, id: &ContainerId) -> Result<()>;

    /// Forcibly remove a container, running or not
    ///
    /// # Errors
    /// Returns error if the engine refuses to remove it
    async fn remove(&self, id: &ContainerId) -> Result<()>;

    /// Create and start a detached container from `run` arguments
    ///
    /// # Errors
    /// Returns error if the engine fails to create or start the container
    async fn launch(&self, run_args: &[String]) -> Result<ContainerId>;

    /// Follow the container's output until it stops
    ///
    /// # Errors
    /// Returns error if the stream cannot be opened or ends abnormally
    async fn stream_logs(&self, id: &ContainerId) -> Result<()>;
}
