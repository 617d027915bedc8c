//! Moving a container's processes into the caller's cgroups
//!
//! The supervisor only accounts for what lives in the cgroups of the process it
//! forked. The container's processes were forked by the engine, so every pid in
//! the container's groups is rewritten into our own leaf, one controller at a
//! time.

use dockunit_core::{Error, ProcessId, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::CgroupBackend;
use crate::membership::{is_root_path, Membership};

/// Keyword selecting every controller of the target
pub const ALL_CONTROLLERS: &str = "all";

/// Which controllers a migration acts on
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerSelection {
    /// Every controller the target currently belongs to
    #[default]
    All,
    /// Only these controllers, in this order
    Only(Vec<String>),
}

impl ControllerSelection {
    /// Build a selection from user-supplied names
    ///
    /// No names, or `all` anywhere in the list, selects every controller.
    /// Duplicates are dropped.
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selected: Vec<String> = Vec::new();

        for name in names {
            let name = name.into();
            if name == ALL_CONTROLLERS {
                return Self::All;
            }
            if !selected.contains(&name) {
                selected.push(name);
            }
        }

        if selected.is_empty() {
            Self::All
        } else {
            Self::Only(selected)
        }
    }
}

/// Snapshot of both sides of a migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRequest {
    /// Membership of the process that will own the container's pids
    pub caller: Membership,
    /// Membership of the container's main process
    pub target: Membership,
    /// Controllers to act on
    pub selection: ControllerSelection,
}

/// One controller that will be migrated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedMove {
    /// Controller identifier as it appears in the membership record
    pub controller: String,
    /// Group the container currently lives in
    pub from: String,
    /// Caller's group the pids are written into
    pub to: String,
}

impl MigrationRequest {
    /// Controllers that will actually be migrated
    ///
    /// A controller is kept only when both sides belong to it, the paths differ,
    /// and the target is not at the hierarchy root.
    #[must_use]
    pub fn plan(&self) -> Vec<PlannedMove> {
        let candidates: Vec<&str> = match &self.selection {
            ControllerSelection::All => self.target.controllers().collect(),
            ControllerSelection::Only(names) => names.iter().map(String::as_str).collect(),
        };

        candidates
            .into_iter()
            .filter_map(|controller| {
                let to = self.caller.get(controller)?;
                let from = self.target.get(controller)?;

                if to == from || is_root_path(from) {
                    debug!(controller, from, to, "Controller needs no migration");
                    return None;
                }

                Some(PlannedMove {
                    controller: controller.to_string(),
                    from: from.to_string(),
                    to: to.to_string(),
                })
            })
            .collect()
    }
}

/// A pid written into the caller's group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovedPid {
    /// Controller it was moved in
    pub controller: String,
    /// The pid
    pub pid: ProcessId,
}

/// What a migration did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Pids moved, in write order
    pub moved: Vec<MovedPid>,
    /// Listed pids that had exited before they could be written
    pub skipped_exited: usize,
}

impl MigrationReport {
    /// Whether any pid was actually moved
    #[must_use]
    pub fn moved_any(&self) -> bool {
        !self.moved.is_empty()
    }
}

/// Relocates a container's processes into the caller's cgroups
#[derive(Clone)]
pub struct Migrator {
    backend: Arc<dyn CgroupBackend>,
}

impl Migrator {
    /// Create a migrator over a backend
    #[must_use]
    pub fn new(backend: Arc<dyn CgroupBackend>) -> Self {
        Self { backend }
    }

    /// Read both memberships before anything is written
    ///
    /// # Errors
    /// Returns error if either membership record cannot be read
    pub async fn snapshot(
        &self,
        caller: ProcessId,
        target: ProcessId,
        selection: ControllerSelection,
    ) -> Result<MigrationRequest> {
        let caller = self.backend.membership(caller).await?;
        let target = self.backend.membership(target).await?;

        Ok(MigrationRequest {
            caller,
            target,
            selection,
        })
    }

    /// Move every live pid of the target's groups into the caller's groups
    ///
    /// Pids that exit between listing and writing are skipped. Any other
    /// failure aborts the migration; pids already moved stay where they are.
    ///
    /// # Errors
    /// Returns the backend's error if a group cannot be listed, and
    /// [`Error::Migration`] if a pid cannot be written
    pub async fn migrate(&self, request: &MigrationRequest) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();

        for planned in request.plan() {
            let pids = self
                .backend
                .list_procs(&planned.controller, &planned.from)
                .await?;

            for pid in pids {
                if !self.backend.is_alive(pid) {
                    debug!(pid = pid.as_raw(), controller = %planned.controller, "Skipping exited pid");
                    report.skipped_exited += 1;
                    continue;
                }

                info!(
                    pid = pid.as_raw(),
                    controller = %planned.controller,
                    to = %planned.to,
                    "Moving pid"
                );

                self.backend
                    .add_process(&planned.controller, &planned.to, pid)
                    .await
                    .map_err(|e| Error::Migration {
                        controller: planned.controller.clone(),
                        pid,
                        moved: report.moved.len(),
                        source: Box::new(e),
                    })?;

                report.moved.push(MovedPid {
                    controller: planned.controller.clone(),
                    pid,
                });
            }
        }

        Ok(report)
    }

    /// Snapshot both sides, then migrate
    ///
    /// # Errors
    /// Returns error if a membership cannot be read or the migration fails
    pub async fn adopt(
        &self,
        target: ProcessId,
        selection: ControllerSelection,
    ) -> Result<MigrationReport> {
        let request = self
            .snapshot(ProcessId::current(), target, selection)
            .await?;
        self.migrate(&request).await
    }
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator").finish_non_exhaustive()
    }
}
