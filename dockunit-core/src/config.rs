//! Runtime configuration
//!
//! Everything that used to be a process-wide tunable (filesystem roots, the
//! keep-alive interval, the engine endpoint) lives here and is handed to each
//! component at construction.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default cgroup filesystem mount point
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Default proc filesystem mount point
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Default keep-alive poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default engine client binary
pub const DEFAULT_ENGINE_BINARY: &str = "docker";

/// Environment variable naming the engine endpoint
pub const ENGINE_HOST_ENV: &str = "DOCKER_HOST";

/// Environment variable naming the supervisor notification socket
pub const NOTIFY_SOCKET_ENV: &str = "NOTIFY_SOCKET";

/// Runtime configuration shared by all components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Root of the cgroup filesystem
    pub cgroup_root: PathBuf,

    /// Root of the proc filesystem
    pub proc_root: PathBuf,

    /// Interval between keep-alive polls
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// Engine client executable
    pub engine_binary: PathBuf,

    /// Engine endpoint, passed to the client as `--host`
    pub engine_host: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cgroup_root: PathBuf::from(DEFAULT_CGROUP_ROOT),
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
            poll_interval: DEFAULT_POLL_INTERVAL,
            engine_binary: PathBuf::from(DEFAULT_ENGINE_BINARY),
            engine_host: None,
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with the engine endpoint taken from `DOCKER_HOST`
    #[must_use]
    pub fn from_env() -> Self {
        let engine_host = std::env::var(ENGINE_HOST_ENV)
            .ok()
            .filter(|v| !v.is_empty());

        tracing::debug!(engine_host = ?engine_host, "Loaded runtime configuration");

        Self {
            engine_host,
            ..Self::default()
        }
    }

    /// Set the cgroup filesystem root
    #[must_use]
    pub fn with_cgroup_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cgroup_root = root.into();
        self
    }

    /// Set the proc filesystem root
    #[must_use]
    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    /// Set the keep-alive poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the engine client executable
    #[must_use]
    pub fn with_engine_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.engine_binary = binary.into();
        self
    }

    /// Set the engine endpoint
    #[must_use]
    pub fn with_engine_host(mut self, host: impl Into<String>) -> Self {
        self.engine_host = Some(host.into());
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
