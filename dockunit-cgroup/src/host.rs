//! Host cgroup backend over the real proc and cgroup filesystems

use async_trait::async_trait;
use dockunit_core::{Error, Liveness, ProcTable, ProcessId, Result, RuntimeConfig};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::backend::CgroupBackend;
use crate::membership::{procs_file, Membership};

/// Backend over `/proc` and `/sys/fs/cgroup`
///
/// Both roots come from [`RuntimeConfig`] so that tests can point them at a
/// scratch directory laid out like the kernel's.
#[derive(Debug, Clone)]
pub struct HostBackend {
    /// Process table, usually at /proc
    procs: ProcTable,

    /// Cgroup filesystem root
    /// example: /sys/fs/cgroup
    cgroup_root: PathBuf,
}

impl HostBackend {
    /// Backend over explicit roots
    #[must_use]
    pub fn new(proc_root: impl Into<PathBuf>, cgroup_root: impl Into<PathBuf>) -> Self {
        Self {
            procs: ProcTable::new(proc_root),
            cgroup_root: cgroup_root.into(),
        }
    }

    /// Backend over the roots named in `config`
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(&config.proc_root, &config.cgroup_root)
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

impl Liveness for HostBackend {
    fn is_alive(&self, pid: ProcessId) -> bool {
        self.procs.is_alive(pid)
    }
}

#[async_trait]
impl CgroupBackend for HostBackend {
    async fn membership(&self, pid: ProcessId) -> Result<Membership> {
        let path = self.procs.cgroup_file(pid);

        let record = fs::read_to_string(&path)
            .await
            .map_err(|e| Error::path_io(&path, e))?;

        let membership = Membership::parse(&record);
        trace!(pid = pid.as_raw(), controllers = membership.len(), "Read cgroup membership");

        Ok(membership)
    }

    async fn list_procs(&self, controller: &str, path: &str) -> Result<Vec<ProcessId>> {
        let file = procs_file(&self.cgroup_root, controller, path);

        let content = fs::read_to_string(&file)
            .await
            .map_err(|e| Error::path_io(&file, e))?;

        let pids = content
            .lines()
            .filter_map(|line| match line.parse::<ProcessId>() {
                Ok(pid) => Some(pid),
                Err(_) => {
                    trace!(line, file = %file.display(), "Skipping unparseable cgroup.procs line");
                    None
                }
            })
            .collect();

        Ok(pids)
    }

    async fn add_process(&self, controller: &str, path: &str, pid: ProcessId) -> Result<()> {
        let file = procs_file(&self.cgroup_root, controller, path);

        debug!(pid = pid.as_raw(), file = %file.display(), "Moving pid");

        // Never create the file: a missing group must fail rather than leave a
        // regular file behind on a writable root.
        let mut handle = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&file)
            .await
            .map_err(|e| Error::path_io(&file, e))?;

        handle
            .write_all(pid.as_raw().to_string().as_bytes())
            .await
            .map_err(|e| Error::path_io(&file, e))?;
        handle.flush().await.map_err(|e| Error::path_io(&file, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    fn layout() -> (tempfile::TempDir, HostBackend) {
        let dir = tempfile::tempdir().unwrap();
        let proc_root = dir.path().join("proc");
        let cgroup_root = dir.path().join("cgroup");
        stdfs::create_dir_all(&proc_root).unwrap();
        stdfs::create_dir_all(&cgroup_root).unwrap();
        let backend = HostBackend::new(proc_root, cgroup_root);
        (dir, backend)
    }

    #[tokio::test]
    async fn test_membership_reads_record() {
        let (dir, backend) = layout();
        let pid_dir = dir.path().join("proc/4321");
        stdfs::create_dir_all(&pid_dir).unwrap();
        stdfs::write(pid_dir.join("cgroup"), "3:cpu:/docker/abc\nbroken\n").unwrap();

        let membership = backend.membership(ProcessId::from_raw(4321)).await.unwrap();
        assert_eq!(membership.get("cpu"), Some("/docker/abc"));
        assert_eq!(membership.len(), 1);
        assert!(backend.is_alive(ProcessId::from_raw(4321)));
    }

    #[tokio::test]
    async fn test_membership_missing_process() {
        let (_dir, backend) = layout();

        let err = backend.membership(ProcessId::from_raw(99)).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!backend.is_alive(ProcessId::from_raw(99)));
    }

    #[tokio::test]
    async fn test_list_procs_skips_garbage() {
        let (dir, backend) = layout();
        let group = dir.path().join("cgroup/systemd/docker/abc");
        stdfs::create_dir_all(&group).unwrap();
        stdfs::write(group.join("cgroup.procs"), "10\n\n  11 \nnope\n").unwrap();

        let pids = backend
            .list_procs("name=systemd", "/docker/abc")
            .await
            .unwrap();
        assert_eq!(pids, vec![ProcessId::from_raw(10), ProcessId::from_raw(11)]);
    }

    #[tokio::test]
    async fn test_add_process_writes_decimal_pid() {
        let (dir, backend) = layout();
        let group = dir.path().join("cgroup/cpu/system.slice");
        stdfs::create_dir_all(&group).unwrap();
        stdfs::write(group.join("cgroup.procs"), "").unwrap();

        backend
            .add_process("cpu", "/system.slice", ProcessId::from_raw(77))
            .await
            .unwrap();

        assert_eq!(stdfs::read_to_string(group.join("cgroup.procs")).unwrap(), "77");
    }

    #[tokio::test]
    async fn test_add_process_missing_group_fails() {
        let (dir, backend) = layout();

        let err = backend
            .add_process("cpu", "/nowhere", ProcessId::from_raw(77))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!dir.path().join("cgroup/cpu/nowhere/cgroup.procs").exists());
    }
}
