//! Main-pid and readiness notification

use dockunit_core::{ContainerId, Error, LifecycleEvent, Liveness, ProcessId, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::UnixDatagram;
use tracing::{debug, info, warn};

use crate::message::NotifyMessage;

/// Everything the notifier needs, gathered once per invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationState {
    /// Manager's datagram socket; `None` when not running under one
    pub socket_path: Option<PathBuf>,
    /// The container's main process
    pub main_pid: ProcessId,
    /// The workload sends `READY=1` itself
    pub delegated: bool,
}

/// Sends the readiness handshake, racing the workload's death
///
/// The sequence is check, send `MAINPID`, check again, then `READY=1`. A
/// workload that exits between the checks gets its `MAINPID` overwritten by
/// ours, so the manager tracks a live process while we report the failure.
#[derive(Clone)]
pub struct Notifier {
    liveness: Arc<dyn Liveness>,
    own_pid: ProcessId,
}

impl Notifier {
    /// Create a notifier checking liveness through `liveness`
    #[must_use]
    pub fn new(liveness: Arc<dyn Liveness>) -> Self {
        Self {
            liveness,
            own_pid: ProcessId::current(),
        }
    }

    /// Pid reported in place of a workload that died mid-handshake
    #[must_use]
    pub const fn own_pid(&self) -> ProcessId {
        self.own_pid
    }

    /// Run the handshake for `state`
    ///
    /// # Errors
    /// Returns [`Error::ExitedBeforeNotify`] if the main process is gone before
    /// or during the handshake, and an I/O error if the socket cannot be used
    pub async fn notify(&self, state: &NotificationState) -> Result<()> {
        let pid = state.main_pid;

        if !self.liveness.is_alive(pid) {
            return Err(Error::ExitedBeforeNotify { pid });
        }

        let Some(ref path) = state.socket_path else {
            debug!(pid = pid.as_raw(), "No notify socket, skipping notification");
            return Ok(());
        };

        let socket = connect(path)?;
        send(&socket, path, NotifyMessage::MainPid(pid)).await?;

        if !self.liveness.is_alive(pid) {
            warn!(
                pid = pid.as_raw(),
                own_pid = self.own_pid.as_raw(),
                "Container exited during notification, reporting own pid"
            );
            if let Err(e) = send(&socket, path, NotifyMessage::MainPid(self.own_pid)).await {
                warn!(error = ?e, "Failed to reclaim MAINPID");
            }
            return Err(Error::ExitedBeforeNotify { pid });
        }

        if state.delegated {
            debug!(pid = pid.as_raw(), "Readiness left to the container");
        } else {
            send(&socket, path, NotifyMessage::Ready).await?;
        }

        info!(
            pid = pid.as_raw(),
            socket = %path.display(),
            delegated = state.delegated,
            "Notified service manager"
        );

        Ok(())
    }

    /// Like [`notify`](Self::notify), also producing the lifecycle event
    pub async fn notify_container(&self, id: &ContainerId, state: &NotificationState) -> Result<()> {
        self.notify(state).await?;

        if state.socket_path.is_some() {
            LifecycleEvent::Notified {
                id: id.clone(),
                pid: state.main_pid,
                delegated: state.delegated,
                timestamp: SystemTime::now(),
            }
            .emit_trace();
        }

        Ok(())
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("own_pid", &self.own_pid)
            .finish_non_exhaustive()
    }
}

/// Open an unbound datagram socket connected to the manager
///
/// A leading `@` names a socket in the abstract namespace.
fn connect(path: &Path) -> Result<UnixDatagram> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::ffi::OsStrExt;

        if let Some(name) = path.as_os_str().as_bytes().strip_prefix(b"@") {
            return connect_abstract(name).map_err(|e| Error::path_io(path, e));
        }
    }

    let socket = UnixDatagram::unbound().map_err(|e| Error::path_io(path, e))?;
    socket.connect(path).map_err(|e| Error::path_io(path, e))?;
    Ok(socket)
}

#[cfg(target_os = "linux")]
fn connect_abstract(name: &[u8]) -> std::io::Result<UnixDatagram> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::{SocketAddr, UnixDatagram as StdDatagram};

    let addr = SocketAddr::from_abstract_name(name)?;
    let socket = StdDatagram::unbound()?;
    socket.connect_addr(&addr)?;
    socket.set_nonblocking(true)?;
    UnixDatagram::from_std(socket)
}

async fn send(socket: &UnixDatagram, path: &Path, message: NotifyMessage) -> Result<()> {
    debug!(message = %message, "Sending notification");
    socket
        .send(&message.to_datagram())
        .await
        .map_err(|e| Error::path_io(path, e))?;
    Ok(())
}
