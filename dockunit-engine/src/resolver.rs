//! Reconciling a named container with what the engine already has
//!
//! | name | engine state      | remove-on-exit | action                       |
//! |------|-------------------|----------------|------------------------------|
//! | no   | -                 | -              | launch                       |
//! | yes  | no such container | -              | launch                       |
//! | yes  | running           | -              | adopt its id and pid         |
//! | yes  | stopped           | yes            | remove, then launch          |
//! | yes  | stopped           | no             | start in place, re-inspect   |

use dockunit_core::{ContainerHandle, ContainerId, Error, ReconciliationOutcome, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::engine::{ContainerEngine, ContainerState};

/// What the caller asked to run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Stable name, if the caller gave one
    pub name: Option<ContainerId>,
    /// Arguments for the engine's `run`, already including `-d` and `--name`
    pub run_args: Vec<String>,
    /// Remove the container once it stops
    pub remove_on_exit: bool,
}

/// A resolved container and how it was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// The container to supervise
    pub handle: ContainerHandle,
    /// Which branch produced it
    pub outcome: ReconciliationOutcome,
}

/// Decides between reuse, restart, recreate and launch
#[derive(Clone)]
pub struct Resolver {
    engine: Arc<dyn ContainerEngine>,
}

impl Resolver {
    /// Create a resolver over an engine
    #[must_use]
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Resolve the request to a container with a live pid
    ///
    /// # Errors
    /// Returns engine errors verbatim, and [`Error::Resolution`] when the
    /// container cannot be found after launch or reports a pid of zero
    pub async fn resolve(&self, request: &LaunchRequest) -> Result<Resolution> {
        let resolution = match request.name {
            None => Resolution {
                handle: self.launch(request).await?,
                outcome: ReconciliationOutcome::Launched,
            },
            Some(ref name) => self.reconcile(name, request).await?,
        };

        if !resolution.handle.pid.is_valid() {
            return Err(Error::resolution(format!(
                "Failed to launch container {}, pid is {}",
                resolution.handle.id, resolution.handle.pid
            )));
        }

        info!(
            container_id = %resolution.handle.id,
            pid = resolution.handle.pid.as_raw(),
            outcome = %resolution.outcome,
            "Container resolved"
        );

        Ok(resolution)
    }

    async fn reconcile(&self, name: &ContainerId, request: &LaunchRequest) -> Result<Resolution> {
        let Some(existing) = self.engine.inspect(name).await? else {
            debug!(name = %name, "No existing container, launching");
            return Ok(Resolution {
                handle: self.launch(request).await?,
                outcome: ReconciliationOutcome::Launched,
            });
        };

        if existing.running {
            debug!(name = %name, container_id = %existing.id, "Reattaching to running container");
            return Ok(Resolution {
                handle: handle_from(existing, Some(name)),
                outcome: ReconciliationOutcome::Reattached,
            });
        }

        if request.remove_on_exit {
            info!(name = %name, container_id = %existing.id, "Removing stale container");
            self.engine.remove(&existing.id).await?;
            return Ok(Resolution {
                handle: self.launch(request).await?,
                outcome: ReconciliationOutcome::Recreated,
            });
        }

        info!(name = %name, container_id = %existing.id, "Restarting stopped container");
        self.engine.start(&existing.id).await?;

        let restarted = self
            .engine
            .inspect(name)
            .await?
            .ok_or_else(|| Error::resolution(format!("Container {name} vanished after start")))?;

        Ok(Resolution {
            handle: handle_from(restarted, Some(name)),
            outcome: ReconciliationOutcome::Restarted,
        })
    }

    async fn launch(&self, request: &LaunchRequest) -> Result<ContainerHandle> {
        let id = self.engine.launch(&request.run_args).await?;

        let state = self
            .engine
            .inspect(&id)
            .await?
            .ok_or_else(|| Error::resolution(format!("Failed to find container {id}")))?;

        Ok(handle_from(state, request.name.as_ref()))
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

fn handle_from(state: ContainerState, requested: Option<&ContainerId>) -> ContainerHandle {
    ContainerHandle {
        id: state.id,
        name: requested.cloned().or(state.name),
        pid: state.pid,
        running: state.running,
    }
}
