//! Container engine access, reconciliation and end-of-life handling
//!
//! The engine is reached through the [`ContainerEngine`] trait, with
//! [`DockerCli`] for real hosts and [`MockEngine`] for tests. On top of it,
//! [`Resolver`] turns a launch request into a running container and
//! [`Finalizer`] handles the pid-file, keep-alive and removal.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod docker;
pub mod engine;
pub mod lifecycle;
pub mod mock;
pub mod resolver;

pub use docker::DockerCli;
pub use engine::{ContainerEngine, ContainerState};
pub use lifecycle::{FinalizePlan, Finalizer};
pub use mock::{EngineCall, MockEngine};
pub use resolver::{LaunchRequest, Resolution, Resolver};
