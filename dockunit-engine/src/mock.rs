//! Scripted engine for testing (doesn't talk to a daemon)

use async_trait::async_trait;
use dockunit_core::{ContainerId, Error, ProcessId, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::engine::{ContainerEngine, ContainerState};

/// A call the mock engine received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    /// `inspect(reference)`
    Inspect(String),
    /// `start(id)`
    Start(String),
    /// `remove(id)`
    Remove(String),
    /// `launch(args)`
    Launch(Vec<String>),
    /// `stream_logs(id)`
    Logs(String),
}

/// Engine with canned containers and a call log
///
/// Launched containers get ids `mock1`, `mock2`, ... and pids counting up
/// from 1000. A launch honours `--name` in its arguments and fails with a
/// conflict if the name is taken, as the real engine does.
#[derive(Clone)]
pub struct MockEngine {
    state: Arc<Mutex<MockEngineState>>,
}

struct MockEngineState {
    containers: Vec<ContainerState>,
    calls: Vec<EngineCall>,
    next_id: u32,
    next_pid: i32,
    launch_pid: Option<ProcessId>,
    stop_after: HashMap<String, usize>,
    fail_logs: bool,
    fail_inspect: bool,
}

impl Default for MockEngineState {
    fn default() -> Self {
        Self {
            containers: Vec::new(),
            calls: Vec::new(),
            next_id: 1,
            next_pid: 1000,
            launch_pid: None,
            stop_after: HashMap::new(),
            fail_logs: false,
            fail_inspect: false,
        }
    }
}

impl MockEngineState {
    fn position(&self, reference: &str) -> Option<usize> {
        self.containers.iter().position(|c| {
            c.id.as_str() == reference || c.name.as_ref().is_some_and(|n| n.as_str() == reference)
        })
    }

    fn allocate_pid(&mut self) -> ProcessId {
        let pid = ProcessId::from_raw(self.next_pid);
        self.next_pid += 1;
        pid
    }
}

impl MockEngine {
    /// Create an engine with no containers
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockEngineState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockEngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an existing container
    ///
    /// # Panics
    /// Panics if `id` or `name` is not a valid container reference
    pub fn add_container(&self, id: &str, name: Option<&str>, running: bool, pid: i32) {
        let state = ContainerState {
            id: ContainerId::new(id).expect("valid mock container id"),
            name: name.map(|n| ContainerId::new(n).expect("valid mock container name")),
            running,
            pid: ProcessId::from_raw(pid),
        };
        self.lock().containers.push(state);
    }

    /// Report `pid` for every container launched from now on
    pub fn set_launch_pid(&self, pid: i32) {
        self.lock().launch_pid = Some(ProcessId::from_raw(pid));
    }

    /// Report the container as stopped once it has been inspected `polls` more times
    pub fn stop_after_polls(&self, id: &str, polls: usize) {
        self.lock().stop_after.insert(id.to_string(), polls);
    }

    /// Stop a container now, as if its main process had exited
    pub fn stop(&self, reference: &str) {
        let mut state = self.lock();
        if let Some(i) = state.position(reference) {
            let container = &mut state.containers[i];
            container.running = false;
            container.pid = ProcessId::from_raw(0);
        }
    }

    /// Make log streaming fail
    pub fn fail_logs(&self) {
        self.lock().fail_logs = true;
    }

    /// Make every inspect fail
    pub fn fail_inspect(&self) {
        self.lock().fail_inspect = true;
    }

    /// Every call received, in order
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    /// Whether a container with this id or name exists
    #[must_use]
    pub fn exists(&self, reference: &str) -> bool {
        self.lock().position(reference).is_some()
    }

    /// Current state of a container
    #[must_use]
    pub fn container(&self, reference: &str) -> Option<ContainerState> {
        let state = self.lock();
        state.position(reference).map(|i| state.containers[i].clone())
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngine").finish_non_exhaustive()
    }
}

/// Value following `--name` / `-name` in run arguments
fn name_from_args(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let flag = arg.trim_start_matches('-');
        if flag == "name" {
            return iter.next().cloned();
        }
        if let Some(value) = flag.strip_prefix("name=") {
            return Some(value.to_string());
        }
    }
    None
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn inspect(&self, reference: &ContainerId) -> Result<Option<ContainerState>> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.calls.push(EngineCall::Inspect(reference.to_string()));

        if state.fail_inspect {
            return Err(Error::engine("Cannot connect to the engine"));
        }

        let Some(index) = state.position(reference.as_str()) else {
            return Ok(None);
        };

        let id = state.containers[index].id.to_string();
        if let Some(remaining) = state.stop_after.get_mut(&id) {
            if *remaining == 0 {
                let container = &mut state.containers[index];
                container.running = false;
                container.pid = ProcessId::from_raw(0);
            } else {
                *remaining -= 1;
            }
        }

        tracing::trace!(container = %reference, "Mock: Inspected container");

        Ok(Some(state.containers[index].clone()))
    }

    async fn start(&self, id: &ContainerId) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(EngineCall::Start(id.to_string()));

        let index = state
            .position(id.as_str())
            .ok_or_else(|| Error::engine(format!("No such container: {id}")))?;

        let pid = state.allocate_pid();
        let container = &mut state.containers[index];
        container.running = true;
        container.pid = pid;

        Ok(())
    }

    async fn remove(&self, id: &ContainerId) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(EngineCall::Remove(id.to_string()));

        let index = state
            .position(id.as_str())
            .ok_or_else(|| Error::engine(format!("No such container: {id}")))?;
        state.containers.remove(index);

        Ok(())
    }

    async fn launch(&self, run_args: &[String]) -> Result<ContainerId> {
        let mut state = self.lock();
        state.calls.push(EngineCall::Launch(run_args.to_vec()));

        let name = name_from_args(run_args)
            .map(ContainerId::new)
            .transpose()?;

        if let Some(ref name) = name {
            if state.position(name.as_str()).is_some() {
                return Err(Error::engine(format!(
                    "Conflict. The container name \"/{name}\" is already in use"
                )));
            }
        }

        let id = ContainerId::new(format!("mock{}", state.next_id))?;
        state.next_id += 1;

        let pid = match state.launch_pid {
            Some(pid) => pid,
            None => state.allocate_pid(),
        };

        state.containers.push(ContainerState {
            id: id.clone(),
            name,
            running: true,
            pid,
        });

        Ok(id)
    }

    async fn stream_logs(&self, id: &ContainerId) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(EngineCall::Logs(id.to_string()));

        if state.fail_logs {
            return Err(Error::engine("logs exited with exit status: 1"));
        }

        Ok(())
    }
}
