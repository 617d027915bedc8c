//! Datagrams understood by the service manager

use dockunit_core::ProcessId;
use std::fmt;

/// One `KEY=VALUE` notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMessage {
    /// `MAINPID=<pid>`: the process the manager should track
    MainPid(ProcessId),
    /// `READY=1`: startup finished
    Ready,
}

impl NotifyMessage {
    /// Wire form, without a trailing newline
    #[must_use]
    pub fn to_datagram(self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for NotifyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MainPid(pid) => write!(f, "MAINPID={pid}"),
            Self::Ready => f.write_str("READY=1"),
        }
    }
}
