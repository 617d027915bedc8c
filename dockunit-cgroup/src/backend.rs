//! Cgroup backend trait for pluggable implementations

use async_trait::async_trait;
use dockunit_core::{Error, Liveness, ProcessId, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::membership::Membership;

/// Narrow read/write capability over the proc and cgroup filesystems
///
/// This allows for different implementations:
/// - [`HostBackend`](crate::HostBackend) - the kernel's `/proc` and `/sys/fs/cgroup`
/// - [`MockBackend`] - an in-memory hierarchy for tests
///
/// # Thread Safety
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait CgroupBackend: Liveness {
    /// Read the membership record of `pid`
    ///
    /// # Errors
    /// Returns error if the record cannot be read (process gone, or no permission)
    async fn membership(&self, pid: ProcessId) -> Result<Membership>;

    /// List the pids filed directly under `path` in `controller`
    ///
    /// # Errors
    /// Returns error if the group's process list cannot be read
    async fn list_procs(&self, controller: &str, path: &str) -> Result<Vec<ProcessId>>;

    /// Move `pid` into the group at `path` in `controller`
    ///
    /// # Errors
    /// Returns error if the process list cannot be written
    async fn add_process(&self, controller: &str, path: &str, pid: ProcessId) -> Result<()>;
}

/// In-memory cgroup hierarchy for testing (doesn't touch filesystem)
///
/// A process moved with [`CgroupBackend::add_process`] leaves its old group and
/// its membership is updated, which is what the kernel does on a real write.
///
/// # Example
/// ```
/// use dockunit_cgroup::{CgroupBackend, MockBackend};
/// use dockunit_core::ProcessId;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let backend = MockBackend::new();
/// let pid = ProcessId::from_raw(123);
/// backend.spawn(pid, [("cpu", "/docker/abc")]);
///
/// backend.add_process("cpu", "/system.slice/web.service", pid).await.unwrap();
///
/// let membership = backend.membership(pid).await.unwrap();
/// assert_eq!(membership.get("cpu"), Some("/system.slice/web.service"));
/// # });
/// ```
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    memberships: HashMap<ProcessId, Membership>,
    groups: BTreeMap<(String, String), Vec<ProcessId>>,
    alive: HashSet<ProcessId>,
    failing_writes: HashSet<String>,
    failing_lists: HashSet<String>,
    writes: Vec<(String, String, ProcessId)>,
}

impl MockState {
    fn file(&mut self, pid: ProcessId, controller: &str, path: &str) {
        if let Some(old) = self
            .memberships
            .get(&pid)
            .and_then(|m| m.get(controller))
            .map(str::to_string)
        {
            if let Some(members) = self.groups.get_mut(&(controller.to_string(), old)) {
                members.retain(|p| *p != pid);
            }
        }

        self.memberships
            .entry(pid)
            .or_default()
            .insert(controller, path);
        self.groups
            .entry((controller.to_string(), path.to_string()))
            .or_default()
            .push(pid);
    }
}

impl MockBackend {
    /// Create an empty hierarchy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a live process filed under the given `(controller, path)` pairs
    pub fn spawn<'a>(
        &self,
        pid: ProcessId,
        groups: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) {
        let mut state = self.lock();
        state.alive.insert(pid);
        state.memberships.entry(pid).or_default();
        for (controller, path) in groups {
            state.file(pid, controller, path);
        }
    }

    /// Mark a process as exited while leaving it listed in its groups
    ///
    /// This mirrors the window between reading `cgroup.procs` and writing.
    pub fn kill(&self, pid: ProcessId) {
        self.lock().alive.remove(&pid);
    }

    /// Make every write into `controller` fail
    pub fn fail_writes_to(&self, controller: &str) {
        self.lock().failing_writes.insert(controller.to_string());
    }

    /// Make listing any group of `controller` fail
    pub fn fail_lists_of(&self, controller: &str) {
        self.lock().failing_lists.insert(controller.to_string());
    }

    /// Pids currently filed under `path` in `controller`
    #[must_use]
    pub fn members(&self, controller: &str, path: &str) -> Vec<ProcessId> {
        self.lock()
            .groups
            .get(&(controller.to_string(), path.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Every successful write, in order, as `(controller, path, pid)`
    #[must_use]
    pub fn writes(&self) -> Vec<(String, String, ProcessId)> {
        self.lock().writes.clone()
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend").finish_non_exhaustive()
    }
}

impl Liveness for MockBackend {
    fn is_alive(&self, pid: ProcessId) -> bool {
        self.lock().alive.contains(&pid)
    }
}

#[async_trait]
impl CgroupBackend for MockBackend {
    async fn membership(&self, pid: ProcessId) -> Result<Membership> {
        let state = self.lock();

        if !state.alive.contains(&pid) {
            return Err(Error::path_io(
                format!("/proc/{pid}/cgroup"),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }

        Ok(state.memberships.get(&pid).cloned().unwrap_or_default())
    }

    async fn list_procs(&self, controller: &str, path: &str) -> Result<Vec<ProcessId>> {
        let state = self.lock();

        if state.failing_lists.contains(controller) {
            return Err(Error::path_io(
                format!("{controller}{path}"),
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ));
        }

        let members = state
            .groups
            .get(&(controller.to_string(), path.to_string()))
            .cloned()
            .unwrap_or_default();

        tracing::trace!(controller, path, count = members.len(), "Mock: Listed procs");

        Ok(members)
    }

    async fn add_process(&self, controller: &str, path: &str, pid: ProcessId) -> Result<()> {
        let mut state = self.lock();

        if state.failing_writes.contains(controller) {
            return Err(Error::path_io(
                format!("{controller}{path}"),
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ));
        }

        if !state.alive.contains(&pid) {
            // The kernel rejects writes of pids that no longer exist
            return Err(Error::from(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such process",
            )));
        }

        state.file(pid, controller, path);
        state
            .writes
            .push((controller.to_string(), path.to_string(), pid));

        tracing::debug!(controller, path, pid = pid.as_raw(), "Mock: Moved process");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend_move_updates_groups() {
        let backend = MockBackend::new();
        let pid = ProcessId::from_raw(10);
        backend.spawn(pid, [("cpu", "/b"), ("freezer", "/")]);

        assert_eq!(backend.members("cpu", "/b"), vec![pid]);

        backend.add_process("cpu", "/a", pid).await.unwrap();

        assert!(backend.members("cpu", "/b").is_empty());
        assert_eq!(backend.members("cpu", "/a"), vec![pid]);
        assert_eq!(backend.membership(pid).await.unwrap().get("cpu"), Some("/a"));
        assert_eq!(backend.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_backend_dead_process() {
        let backend = MockBackend::new();
        let pid = ProcessId::from_raw(11);
        backend.spawn(pid, [("cpu", "/b")]);
        backend.kill(pid);

        assert!(!backend.is_alive(pid));
        // Still listed: the snapshot is stale, not the hierarchy
        assert_eq!(backend.list_procs("cpu", "/b").await.unwrap(), vec![pid]);

        let err = backend.membership(pid).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(backend.add_process("cpu", "/a", pid).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_backend_failure_injection() {
        let backend = MockBackend::new();
        let pid = ProcessId::from_raw(12);
        backend.spawn(pid, [("memory", "/b")]);

        backend.fail_writes_to("memory");
        assert!(backend.add_process("memory", "/a", pid).await.is_err());

        backend.fail_lists_of("memory");
        assert!(backend.list_procs("memory", "/b").await.is_err());
    }
}
