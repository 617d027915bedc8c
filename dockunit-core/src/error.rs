//! Error types for dockunit

use thiserror::Error;

use crate::ProcessId;

/// dockunit error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error on the proc or cgroup filesystem
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error with the path that caused it
    #[error("I/O error on {path}")]
    PathIo {
        /// File that could not be read or written
        path: std::path::PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A cgroup migration aborted part way through
    #[error("Failed to move pid {pid} in controller '{controller}' ({moved} already moved)")]
    Migration {
        /// Controller being migrated
        controller: String,
        /// Pid whose write failed
        pid: ProcessId,
        /// Number of pids moved before the failure
        moved: usize,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// Container lookup or launch did not produce a usable process
    #[error("Resolution error: {message}")]
    Resolution {
        /// Error message
        message: String,
    },

    /// The workload exited between the liveness checks around notification
    #[error("Container exited before notification completed (pid {pid})")]
    ExitedBeforeNotify {
        /// Pid that disappeared
        pid: ProcessId,
    },

    /// Failure reported by the container engine
    #[error("Engine error: {message}")]
    Engine {
        /// Error message, verbatim from the engine where possible
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Engine output could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a [`Error::Resolution`]
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution {
            message: message.into(),
        }
    }

    /// Build a [`Error::Engine`]
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    /// Attach a path to an I/O error
    #[must_use]
    pub fn path_io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        Self::PathIo {
            path: path.into(),
            source,
        }
    }

    /// True for the "exited before notification" race
    ///
    /// This points at a short-lived workload rather than at a broken host.
    #[must_use]
    pub const fn is_race(&self) -> bool {
        matches!(self, Self::ExitedBeforeNotify { .. })
    }

    /// True when the underlying cause is a missing file
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io(e) | Self::PathIo { source: e, .. } => {
                e.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}

/// Result type alias for dockunit operations
pub type Result<T> = std::result::Result<T, Error>;
