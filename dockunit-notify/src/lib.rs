//! Readiness handshake with the service manager
//!
//! Reports the container's main pid over `$NOTIFY_SOCKET` and, unless the
//! workload does it itself, signals readiness.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod message;
pub mod notifier;

pub use message::NotifyMessage;
pub use notifier::{NotificationState, Notifier};
