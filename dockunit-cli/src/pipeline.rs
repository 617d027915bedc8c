//! One supervised container, start to finish
//!
//! resolve → migrate cgroups → notify → pid-file → (attached) logs, keep-alive, teardown

use anyhow::{Context, Result};
use dockunit_cgroup::{CgroupBackend, HostBackend, Migrator};
use dockunit_core::{
    ContainerHandle, Error, LifecycleEvent, Liveness, ProcTable, RuntimeConfig,
};
use dockunit_engine::{ContainerEngine, DockerCli, Finalizer, Resolver};
use dockunit_notify::Notifier;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{error, info};

use crate::context::RunContext;

pub struct Pipeline {
    resolver: Resolver,
    migrator: Migrator,
    notifier: Notifier,
    finalizer: Finalizer,
    liveness: Arc<dyn Liveness>,
}

impl Pipeline {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        cgroups: Arc<dyn CgroupBackend>,
        liveness: Arc<dyn Liveness>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            resolver: Resolver::new(Arc::clone(&engine)),
            migrator: Migrator::new(cgroups),
            notifier: Notifier::new(Arc::clone(&liveness)),
            finalizer: Finalizer::new(engine, poll_interval),
            liveness,
        }
    }

    /// Pipeline over the host's docker, proc and cgroup filesystems
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(
            Arc::new(DockerCli::from_config(config)),
            Arc::new(HostBackend::from_config(config)),
            Arc::new(ProcTable::new(&config.proc_root)),
            config.poll_interval,
        )
    }

    /// Run every step for `ctx`, returning the container that was supervised
    pub async fn run(&self, ctx: &RunContext) -> Result<ContainerHandle> {
        let resolution = self
            .resolver
            .resolve(&ctx.launch_request())
            .await
            .context("Failed to resolve container")?;
        let handle = resolution.handle;

        // Nothing below may touch cgroups for a pid that is already gone
        if !handle.is_usable(self.liveness.as_ref()) {
            return Err(Error::resolution(format!(
                "Container {} has no live process, pid {} is gone",
                handle.id, handle.pid
            )))
            .context("Failed to resolve container");
        }

        LifecycleEvent::Resolved {
            id: handle.id.clone(),
            pid: handle.pid,
            outcome: resolution.outcome,
            timestamp: SystemTime::now(),
        }
        .emit_trace();

        if let Err(e) = self.supervise(&handle, ctx).await {
            LifecycleEvent::Error {
                id: handle.id.clone(),
                message: format!("{e:#}"),
                timestamp: SystemTime::now(),
            }
            .emit_trace();
            error!(container_id = %handle.id, pid = handle.pid.as_raw(), "Supervision failed");
            return Err(e.context(format!("Container {} (pid {})", handle.id, handle.pid)));
        }

        info!(container_id = %handle.id, pid = handle.pid.as_raw(), "Done");
        Ok(handle)
    }

    async fn supervise(&self, handle: &ContainerHandle, ctx: &RunContext) -> Result<()> {
        let report = self
            .migrator
            .adopt(handle.pid, ctx.cgroups.clone())
            .await
            .context("Failed to move container processes into our cgroups")?;

        LifecycleEvent::Migrated {
            id: handle.id.clone(),
            moved: report.moved.len(),
            timestamp: SystemTime::now(),
        }
        .emit_trace();

        self.notifier
            .notify_container(&handle.id, &ctx.notification_state(handle.pid))
            .await
            .context("Failed to notify service manager")?;

        self.finalizer
            .finalize(handle, &ctx.finalize_plan())
            .await
            .context("Failed to finalize container")?;

        Ok(())
    }
}
