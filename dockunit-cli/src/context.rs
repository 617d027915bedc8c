//! Turning the command line into one invocation's settings
//!
//! Everything after `run` goes to `docker run` mostly untouched. The only
//! arguments consumed or added here are the ones dockunit needs to supervise
//! the container: `--rm` is taken over, `-d` is forced, and notify/env
//! forwarding are prepended.

use anyhow::{Context, Result, bail};
use dockunit_cgroup::ControllerSelection;
use dockunit_core::config::NOTIFY_SOCKET_ENV;
use dockunit_core::{ContainerId, ProcessId};
use dockunit_engine::{FinalizePlan, LaunchRequest};
use dockunit_notify::NotificationState;
use std::path::PathBuf;

use crate::cli::Cli;

/// Variables never forwarded with `--env`
const UNFORWARDED_ENV: [&str; 2] = ["HOME", "PATH"];

/// Settings for one supervised container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Arguments for `docker run`
    pub run_args: Vec<String>,
    /// Container name from `--name`
    pub name: Option<ContainerId>,
    /// `--rm` was given
    pub remove_on_exit: bool,
    /// The user passed `-d` themselves
    pub detach: bool,
    /// Follow logs while attached
    pub logs: bool,
    /// Where to write the main pid
    pub pid_file: Option<PathBuf>,
    /// Controllers to take over
    pub cgroups: ControllerSelection,
    /// The manager's notify socket, if any
    pub notify_socket: Option<PathBuf>,
    /// Readiness is sent by the container
    pub delegated: bool,
}

impl RunContext {
    /// Build the context from parsed flags and this process's environment
    ///
    /// # Errors
    /// Returns error if `run` is missing or the container name is invalid
    pub fn from_cli<I>(cli: &Cli, env: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let Some(("run", docker_args)) = cli.args.split_first().map(|(f, r)| (f.as_str(), r))
        else {
            bail!("run not found in arguments: {:?}", cli.args);
        };

        let env: Vec<(String, String)> = env.into_iter().collect();
        let notify_socket = env
            .iter()
            .find(|(k, v)| k == NOTIFY_SOCKET_ENV && !v.is_empty())
            .map(|(_, v)| PathBuf::from(v));

        let scanned = scan_run_args(docker_args);
        let name = scanned
            .name
            .map(ContainerId::new)
            .transpose()
            .context("Invalid container name")?;

        let delegated = cli.notify && notify_socket.is_some();

        let mut prefix = Vec::new();
        if let Some(socket) = notify_socket.as_ref().filter(|_| delegated) {
            let socket = socket.display();
            prefix.push("-e".to_string());
            prefix.push(format!("{NOTIFY_SOCKET_ENV}={socket}"));
            prefix.push("-v".to_string());
            prefix.push(format!("{socket}:{socket}"));
        }
        if cli.env {
            for (key, value) in &env {
                if !UNFORWARDED_ENV.contains(&key.as_str()) {
                    prefix.push("-e".to_string());
                    prefix.push(format!("{key}={value}"));
                }
            }
        }

        let mut run_args = prefix;
        run_args.extend(scanned.args);

        Ok(Self {
            run_args,
            name,
            remove_on_exit: scanned.remove_on_exit,
            detach: scanned.detach,
            logs: cli.logs,
            pid_file: cli.pid_file.clone(),
            cgroups: ControllerSelection::from_names(cli.cgroups.iter().cloned()),
            notify_socket,
            delegated,
        })
    }

    /// What the resolver should do
    #[must_use]
    pub fn launch_request(&self) -> LaunchRequest {
        LaunchRequest {
            name: self.name.clone(),
            run_args: self.run_args.clone(),
            remove_on_exit: self.remove_on_exit,
        }
    }

    /// What the finalizer should do
    #[must_use]
    pub fn finalize_plan(&self) -> FinalizePlan {
        FinalizePlan {
            pid_file: self.pid_file.clone(),
            attached: !self.detach,
            stream_logs: self.logs,
            remove_on_exit: self.remove_on_exit,
        }
    }

    /// Notification settings for the resolved main pid
    #[must_use]
    pub fn notification_state(&self, main_pid: ProcessId) -> NotificationState {
        NotificationState {
            socket_path: self.notify_socket.clone(),
            main_pid,
            delegated: self.delegated,
        }
    }
}

#[derive(Debug, Default)]
struct ScannedArgs {
    args: Vec<String>,
    name: Option<String>,
    remove_on_exit: bool,
    detach: bool,
}

/// Strip `--rm`, note `-d` and `--name`, and force detached mode
fn scan_run_args(args: &[String]) -> ScannedArgs {
    let mut scanned = ScannedArgs::default();

    for (i, arg) in args.iter().enumerate() {
        match arg.as_str() {
            "-rm" | "--rm" => {
                scanned.remove_on_exit = true;
                continue;
            }
            "-d" | "-detach" | "--detach" => scanned.detach = true,
            "-name" | "--name" => {
                if let Some(value) = args.get(i + 1) {
                    scanned.name = Some(value.clone());
                }
            }
            other => {
                if let Some(value) = other
                    .strip_prefix("--name=")
                    .or_else(|| other.strip_prefix("-name="))
                {
                    scanned.name = Some(value.to_string());
                }
            }
        }
        scanned.args.push(arg.clone());
    }

    if !scanned.detach {
        scanned.args.insert(0, "-d".to_string());
    }

    scanned
}
