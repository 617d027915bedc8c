//! Cgroup discovery and migration with pluggable backends
//!
//! This crate reads which cgroups a process belongs to and moves a container's
//! processes into the cgroups of the calling process, over either the host's
//! proc/cgroup filesystems or an in-memory mock.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod backend;
pub mod host;
pub mod membership;
pub mod migrate;

pub use backend::{CgroupBackend, MockBackend};
pub use host::HostBackend;
pub use membership::Membership;
pub use migrate::{ControllerSelection, MigrationReport, MigrationRequest, Migrator};
