//! End-of-life handling once a container is resolved
//!
//! After the supervisor has been notified, dockunit either detaches or stays
//! attached to the container: it follows its logs, polls the engine until the
//! container stops, and removes it if asked to.

use dockunit_core::{ContainerHandle, ContainerId, LifecycleEvent, ProcessId, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::ContainerEngine;

/// What to do after the container is up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizePlan {
    /// Where to record the container's pid
    pub pid_file: Option<PathBuf>,
    /// Stay with the container until it stops
    pub attached: bool,
    /// Copy the container's output to ours while attached
    pub stream_logs: bool,
    /// Remove the container once it stops
    pub remove_on_exit: bool,
}

impl FinalizePlan {
    /// Whether the engine has to be polled until the container stops
    #[must_use]
    pub const fn needs_keep_alive(&self) -> bool {
        self.attached && (self.stream_logs || self.remove_on_exit)
    }
}

/// Pid-file, keep-alive and teardown
#[derive(Clone)]
pub struct Finalizer {
    engine: Arc<dyn ContainerEngine>,
    poll_interval: Duration,
}

impl Finalizer {
    /// Create a finalizer polling every `poll_interval`
    #[must_use]
    pub fn new(engine: Arc<dyn ContainerEngine>, poll_interval: Duration) -> Self {
        Self {
            engine,
            poll_interval,
        }
    }

    /// Write `pid` in decimal to `path`
    ///
    /// A non-positive pid writes nothing.
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    pub async fn write_pid_file(path: &Path, pid: ProcessId) -> Result<()> {
        if !pid.is_valid() {
            debug!(pid = pid.as_raw(), "Not writing pid file for invalid pid");
            return Ok(());
        }

        tokio::fs::write(path, pid.as_raw().to_string())
            .await
            .map_err(|e| dockunit_core::Error::path_io(path, e))?;

        info!(path = %path.display(), pid = pid.as_raw(), "Wrote pid file");
        Ok(())
    }

    /// Poll the engine until it reports the container as not running
    ///
    /// There is no timeout. A container that disappears counts as stopped.
    ///
    /// # Errors
    /// Returns the engine's error if an inspect fails
    pub async fn keep_alive(&self, id: &ContainerId) -> Result<()> {
        loop {
            match self.engine.inspect(id).await? {
                Some(state) if state.running => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                _ => break,
            }
        }

        LifecycleEvent::Stopped {
            id: id.clone(),
            timestamp: SystemTime::now(),
        }
        .emit_trace();

        Ok(())
    }

    /// Forcibly remove the container
    ///
    /// # Errors
    /// Returns the engine's error if removal fails
    pub async fn teardown(&self, id: &ContainerId) -> Result<()> {
        self.engine.remove(id).await?;

        LifecycleEvent::Removed {
            id: id.clone(),
            timestamp: SystemTime::now(),
        }
        .emit_trace();

        Ok(())
    }

    /// Follow the container's logs in the background
    ///
    /// Nobody waits on the returned handle in normal operation; a failure is
    /// only logged.
    pub fn spawn_log_stream(&self, id: &ContainerId) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let id = id.clone();

        tokio::spawn(async move {
            if let Err(e) = engine.stream_logs(&id).await {
                warn!(container_id = %id, error = %e, "Log streaming failed");
            }
        })
    }

    /// Run every step of `plan` for `handle`, in order
    ///
    /// The pid-file comes first and is always written. The rest only happens
    /// when attached.
    ///
    /// # Errors
    /// Returns the first failing step's error; earlier steps are not undone
    pub async fn finalize(&self, handle: &ContainerHandle, plan: &FinalizePlan) -> Result<()> {
        if let Some(ref path) = plan.pid_file {
            Self::write_pid_file(path, handle.pid).await?;
        }

        if !plan.attached {
            debug!(container_id = %handle.id, "Detached, leaving container to the engine");
            return Ok(());
        }

        if plan.stream_logs {
            // Deliberately not joined
            drop(self.spawn_log_stream(&handle.id));
        }

        if plan.needs_keep_alive() {
            self.keep_alive(&handle.id).await?;
        }

        if plan.remove_on_exit {
            self.teardown(&handle.id).await?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for Finalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Finalizer")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
