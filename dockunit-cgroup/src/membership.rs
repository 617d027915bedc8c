//! Per-process cgroup membership

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the per-group process list pseudo-file
pub const PROCS_FILE: &str = "cgroup.procs";

/// Path used by a process that is not grouped below the hierarchy root
pub const ROOT_PATH: &str = "/";

/// Prefix of named (controller-less) v1 hierarchies such as `name=systemd`
const NAMED_HIERARCHY_PREFIX: &str = "name=";

/// Controller → path mapping of one process
///
/// Read fresh from `/proc/<pid>/cgroup` every time. It goes stale as soon as the
/// process moves, so take both sides of a migration before writing anything.
/// On the unified v2 hierarchy the controller key is the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Membership {
    entries: BTreeMap<String, String>,
}

impl Membership {
    /// Parse the text of a `/proc/<pid>/cgroup` record
    ///
    /// Each line is `hierarchy-id:controller-list:path`. Lines that do not split
    /// into exactly three fields are skipped.
    #[must_use]
    pub fn parse(record: &str) -> Self {
        let mut entries = BTreeMap::new();

        for line in record.lines() {
            let mut fields = line.splitn(3, ':');
            let (Some(_hierarchy), Some(controllers), Some(path)) =
                (fields.next(), fields.next(), fields.next())
            else {
                tracing::trace!(line, "Skipping malformed cgroup line");
                continue;
            };

            entries.insert(controllers.to_string(), path.to_string());
        }

        Self { entries }
    }

    /// Path of this process in `controller`
    #[must_use]
    pub fn get(&self, controller: &str) -> Option<&str> {
        self.entries.get(controller).map(String::as_str)
    }

    /// Record the path for a controller
    pub fn insert(&mut self, controller: impl Into<String>, path: impl Into<String>) {
        self.entries.insert(controller.into(), path.into());
    }

    /// Controllers this process belongs to, in sorted order
    pub fn controllers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of controllers
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no controller was found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C, P> FromIterator<(C, P)> for Membership
where
    C: Into<String>,
    P: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (C, P)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(c, p)| (c.into(), p.into()))
                .collect(),
        }
    }
}

/// True for the hierarchy root path
#[must_use]
pub fn is_root_path(path: &str) -> bool {
    path == ROOT_PATH
}

/// Directory of the controller's hierarchy under `root`
///
/// `name=systemd` lives at `<root>/systemd`.
#[must_use]
pub fn controller_dir(root: &Path, controller: &str) -> PathBuf {
    root.join(
        controller
            .strip_prefix(NAMED_HIERARCHY_PREFIX)
            .unwrap_or(controller),
    )
}

/// `cgroup.procs` of the group at `path` in `controller`
#[must_use]
pub fn procs_file(root: &Path, controller: &str, path: &str) -> PathBuf {
    controller_dir(root, controller)
        .join(path.trim_start_matches('/'))
        .join(PROCS_FILE)
}
