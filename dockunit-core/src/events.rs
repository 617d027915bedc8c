//! Container lifecycle events with structured tracing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::{ContainerId, ProcessId, ReconciliationOutcome};

/// Milestones of one supervised container lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Container resolved to a live process
    Resolved {
        /// Container the event is about
        id: ContainerId,
        /// Main process id
        pid: ProcessId,
        /// How the container was obtained
        outcome: ReconciliationOutcome,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Container processes moved into our cgroups
    Migrated {
        /// Container the event is about
        id: ContainerId,
        /// Number of pids moved across all controllers
        moved: usize,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Supervisor told about the main pid
    Notified {
        /// Container the event is about
        id: ContainerId,
        /// Pid reported as MAINPID
        pid: ProcessId,
        /// Whether READY=1 was left to the workload
        delegated: bool,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Engine reports the container is no longer running
    Stopped {
        /// Container the event is about
        id: ContainerId,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Container forcibly removed
    Removed {
        /// Container the event is about
        id: ContainerId,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Error occurred
    Error {
        /// Container the event is about
        id: ContainerId,
        /// Error message
        message: String,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },
}

impl LifecycleEvent {
    /// Emit structured tracing event
    pub fn emit_trace(&self) {
        match self {
            Self::Resolved {
                id, pid, outcome, ..
            } => {
                tracing::info!(
                    container_id = %id,
                    pid = pid.as_raw(),
                    outcome = %outcome,
                    event = "resolved",
                    "Container resolved"
                );
            }
            Self::Migrated { id, moved, .. } => {
                tracing::info!(
                    container_id = %id,
                    moved,
                    event = "migrated",
                    "Container cgroups migrated"
                );
            }
            Self::Notified { id, pid, delegated, .. } => {
                tracing::info!(
                    container_id = %id,
                    pid = pid.as_raw(),
                    delegated,
                    event = "notified",
                    "Supervisor notified"
                );
            }
            Self::Stopped { id, .. } => {
                tracing::info!(
                    container_id = %id,
                    event = "stopped",
                    "Container stopped"
                );
            }
            Self::Removed { id, .. } => {
                tracing::info!(
                    container_id = %id,
                    event = "removed",
                    "Container removed"
                );
            }
            Self::Error { id, message, .. } => {
                tracing::error!(
                    container_id = %id,
                    message = %message,
                    event = "error",
                    "Container error"
                );
            }
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved {
                id, pid, outcome, ..
            } => write!(f, "Container {id} {outcome} with pid {pid}"),
            Self::Migrated { id, moved, .. } => {
                write!(f, "Container {id} moved {moved} pid(s) into our cgroups")
            }
            Self::Notified { id, pid, .. } => write!(f, "Container {id} notified MAINPID={pid}"),
            Self::Stopped { id, .. } => write!(f, "Container {id} stopped"),
            Self::Removed { id, .. } => write!(f, "Container {id} removed"),
            Self::Error { id, message, .. } => write!(f, "Container {id} error: {message}"),
        }
    }
}

// Custom SystemTime serialization
mod systemtime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(since_epoch.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + std::time::Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serde() {
        let id = ContainerId::new("test").unwrap();
        let event = LifecycleEvent::Resolved {
            id,
            pid: ProcessId::from_raw(4321),
            outcome: ReconciliationOutcome::Reattached,
            timestamp: SystemTime::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "resolved");
        assert_eq!(json["outcome"], "reattached");
        assert_eq!(json["pid"], 4321);

        let deserialized: LifecycleEvent = serde_json::from_value(json).unwrap();
        assert!(matches!(
            deserialized,
            LifecycleEvent::Resolved { ref id, outcome: ReconciliationOutcome::Reattached, .. }
                if id.as_str() == "test"
        ));
    }

    #[test]
    fn test_event_display() {
        let event = LifecycleEvent::Notified {
            id: ContainerId::new("web").unwrap(),
            pid: ProcessId::from_raw(12),
            delegated: false,
            timestamp: SystemTime::now(),
        };
        assert_eq!(event.to_string(), "Container web notified MAINPID=12");
    }
}
