//! Core type definitions with strong typing and validation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Error, Result};

/// Container reference: an engine-assigned id or a user-chosen name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl ContainerId {
    /// Maximum length for container references
    pub const MAX_LENGTH: usize = 128;

    /// Create a new `ContainerId` with validation
    ///
    /// A single leading `/` is dropped, since the engine reports names that way.
    ///
    /// # Errors
    /// Returns error if the reference is empty, too long, or contains invalid characters
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let id = match id.strip_prefix('/') {
            Some(rest) => rest.to_string(),
            None => id,
        };
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Validate a container reference
    fn validate(id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidConfig {
                message: "Empty container reference".to_string(),
            });
        }

        if id.len() > Self::MAX_LENGTH {
            return Err(Error::InvalidConfig {
                message: format!("Container reference longer than {} chars", Self::MAX_LENGTH),
            });
        }

        if !id.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidConfig {
                message: format!("Container reference must start with a letter or digit: {id}"),
            });
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(Error::InvalidConfig {
                message: format!("Container reference has characters outside [A-Za-z0-9_.-]: {id}"),
            });
        }

        Ok(())
    }

    /// Get the container ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContainerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContainerId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ProcessId(i32);

impl ProcessId {
    /// Create from raw PID
    #[must_use]
    pub const fn from_raw(pid: i32) -> Self {
        Self(pid)
    }

    /// Get the current process ID
    #[must_use]
    pub fn current() -> Self {
        Self::from(nix::unistd::getpid())
    }

    /// Get raw PID value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }

    /// A pid of zero or below never names a real process
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProcessId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<nix::unistd::Pid> for ProcessId {
    fn from(pid: nix::unistd::Pid) -> Self {
        Self(pid.as_raw())
    }
}

impl From<ProcessId> for nix::unistd::Pid {
    fn from(pid: ProcessId) -> Self {
        nix::unistd::Pid::from_raw(pid.0)
    }
}

/// Liveness oracle over the process table
pub trait Liveness: Send + Sync {
    /// Whether `pid` still has an entry in the process table
    fn is_alive(&self, pid: ProcessId) -> bool;
}

/// The host process table, checked through `<root>/<pid>`
#[derive(Debug, Clone)]
pub struct ProcTable {
    root: PathBuf,
}

impl ProcTable {
    /// Process table mounted at `root` (usually `/proc`)
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory of a single process
    #[must_use]
    pub fn pid_dir(&self, pid: ProcessId) -> PathBuf {
        self.root.join(pid.as_raw().to_string())
    }

    /// The per-process cgroup membership record
    #[must_use]
    pub fn cgroup_file(&self, pid: ProcessId) -> PathBuf {
        self.pid_dir(pid).join("cgroup")
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl Liveness for ProcTable {
    fn is_alive(&self, pid: ProcessId) -> bool {
        // Only a definite NotFound counts as exited; permission errors mean the entry exists.
        match std::fs::metadata(self.pid_dir(pid)) {
            Ok(_) => true,
            Err(e) => e.kind() != std::io::ErrorKind::NotFound,
        }
    }
}

/// How a container came to be running for this invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// Freshly launched through the engine
    Launched,
    /// Adopted an already running named container
    Reattached,
    /// Started a stopped named container in place
    Restarted,
    /// Deleted a stale named container and launched a new one
    Recreated,
}

impl fmt::Display for ReconciliationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Launched => "launched",
            Self::Reattached => "reattached",
            Self::Restarted => "restarted",
            Self::Recreated => "recreated",
        };
        f.write_str(s)
    }
}

/// The container this invocation supervises
///
/// Built up while resolving (id first, then pid) and then threaded through
/// migration, notification and finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Engine-assigned container id
    pub id: ContainerId,
    /// User-chosen name, if any
    pub name: Option<ContainerId>,
    /// Host pid of the container's main process
    pub pid: ProcessId,
    /// Running state as last reported by the engine
    pub running: bool,
}

impl ContainerHandle {
    /// A handle is usable once its pid is positive and present in the process table
    #[must_use]
    pub fn is_usable(&self, liveness: &dyn Liveness) -> bool {
        self.pid.is_valid() && liveness.is_alive(self.pid)
    }
}
