//! dockunit core - shared types, errors, configuration and events
//!
//! This crate provides the vocabulary used by every other dockunit crate.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use events::LifecycleEvent;
pub use types::{ContainerHandle, ContainerId, Liveness, ProcTable, ProcessId, ReconciliationOutcome};
