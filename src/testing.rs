//! In-memory container runtime for tests.
//!
//! [`FakeDocker`] implements [`CommandRunner`] by interpreting the subset of
//! the docker CLI this crate issues (`ps`, `inspect`, `run`, `start`, `stop`,
//! `rm`) against an in-memory container table. Every command is recorded so
//! tests can assert exactly which mutations were made.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docker_starter::{ContainerHandle, ContainerSpec};
//! use docker_starter::testing::FakeDocker;
//!
//! # async fn example() {
//! let docker = Arc::new(FakeDocker::new().with_container("db", "postgres:15", true));
//! let handle = ContainerHandle::new(ContainerSpec::new("db", "postgres:16", 5432), docker.clone());
//! handle.ensure_running().await.unwrap();
//! assert_eq!(docker.container("db").unwrap().image, "postgres:16");
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::runtime::command::{CommandOutput, CommandRunner, display_command};

const PROGRAM: &str = "docker";

/// A container known to [`FakeDocker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeContainer {
    pub image: String,
    pub running: bool,
    /// Bridge network address, reported only while running.
    pub address: String,
    /// Options given to `docker run` between the name and the image.
    pub run_options: Vec<String>,
    /// `-p` mapping given to `docker run`.
    pub port_mapping: Option<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    containers: BTreeMap<String, FakeContainer>,
    commands: Vec<Vec<String>>,
    next_address: u8,
    unavailable: bool,
    reject_next_run: Option<String>,
}

impl FakeState {
    fn allocate_address(&mut self) -> String {
        self.next_address = self.next_address.wrapping_add(1);
        format!("172.17.0.{}", u16::from(self.next_address) + 1)
    }
}

/// In-memory stand-in for the docker CLI.
#[derive(Debug, Default)]
pub struct FakeDocker {
    state: Mutex<FakeState>,
}

impl FakeDocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a container that exists before the test starts.
    pub fn with_container(self, name: &str, image: &str, running: bool) -> Self {
        {
            let mut state = self.lock();
            let address = state.allocate_address();
            state.containers.insert(
                name.to_string(),
                FakeContainer {
                    image: image.to_string(),
                    running,
                    address,
                    run_options: Vec::new(),
                    port_mapping: None,
                },
            );
        }
        self
    }

    /// Snapshot of a container, if it exists.
    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.lock().containers.get(name).cloned()
    }

    /// Every command run so far, rendered as command lines.
    pub fn commands(&self) -> Vec<String> {
        self.lock()
            .commands
            .iter()
            .map(|args| {
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                display_command(PROGRAM, &args)
            })
            .collect()
    }

    /// Only the commands that change runtime state.
    pub fn mutations(&self) -> Vec<String> {
        let mutating = ["run", "start", "stop", "rm"];
        self.lock()
            .commands
            .iter()
            .filter(|args| args.first().is_some_and(|verb| mutating.contains(&verb.as_str())))
            .map(|args| {
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                display_command(PROGRAM, &args)
            })
            .collect()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    /// Simulate a missing binary: every command fails to execute.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Make the next `docker run` exit non-zero with `stderr`.
    pub fn reject_next_run(&self, stderr: &str) {
        self.lock().reject_next_run = Some(stderr.to_string());
    }

    /// Stop a container behind the handle's back.
    pub fn kill(&self, name: &str) {
        if let Some(container) = self.lock().containers.get_mut(name) {
            container.running = false;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        // A panicking test must not hide the state from later assertions.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn execute(state: &mut FakeState, args: &[&str]) -> CommandOutput {
        match args.first().copied() {
            Some("ps") => Self::ps(state, &args[1..]),
            Some("inspect") => Self::inspect(state, &args[1..]),
            Some("run") => Self::run_container(state, &args[1..]),
            Some("start") => Self::with_existing(state, &args[1..], |c| {
                c.running = true;
                CommandOutput::default()
            }),
            Some("stop") => Self::with_existing(state, &args[1..], |c| {
                c.running = false;
                CommandOutput::default()
            }),
            Some("rm") => Self::rm(state, &args[1..]),
            other => CommandOutput::failed(
                1,
                format!("docker: '{}' is not a docker command.", other.unwrap_or("")),
            ),
        }
    }

    fn ps(state: &FakeState, args: &[&str]) -> CommandOutput {
        let all = args.contains(&"-a");
        let filter = args
            .windows(2)
            .find(|pair| pair[0] == "--filter")
            .and_then(|pair| pair[1].strip_prefix("name="))
            .unwrap_or("");

        let names: String = state
            .containers
            .iter()
            .filter(|(name, c)| name.contains(filter) && (all || c.running))
            .map(|(name, _)| format!("{name}\n"))
            .collect();
        CommandOutput::ok(names)
    }

    fn inspect(state: &FakeState, args: &[&str]) -> CommandOutput {
        let mut format = "";
        let mut name = "";
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if *arg == "--format" {
                format = iter.next().copied().unwrap_or("");
            } else {
                name = *arg;
            }
        }

        let Some(container) = state.containers.get(name) else {
            return CommandOutput::failed(1, format!("Error: No such object: {name}"));
        };

        let value = if format.contains(".Config.Image") {
            container.image.clone()
        } else if format.contains(".NetworkSettings.IPAddress") {
            if container.running {
                container.address.clone()
            } else {
                String::new()
            }
        } else {
            return CommandOutput::failed(1, format!("unsupported format: {format}"));
        };
        CommandOutput::ok(format!("{value}\n"))
    }

    fn run_container(state: &mut FakeState, args: &[&str]) -> CommandOutput {
        if let Some(stderr) = state.reject_next_run.take() {
            return CommandOutput::failed(125, stderr);
        }

        let mut name = None;
        let mut port_mapping = None;
        let mut rest = Vec::new();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match *arg {
                "-d" => {}
                "-p" => port_mapping = iter.next().map(|s| s.to_string()),
                "--name" if name.is_none() => name = iter.next().map(|s| s.to_string()),
                other => rest.push(other.to_string()),
            }
        }

        let (Some(name), Some(image)) = (name, rest.pop()) else {
            return CommandOutput::failed(125, "docker: invalid run arguments");
        };
        if state.containers.contains_key(&name) {
            return CommandOutput::failed(
                125,
                format!("Conflict. The container name \"/{name}\" is already in use"),
            );
        }

        let address = state.allocate_address();
        state.containers.insert(
            name.clone(),
            FakeContainer {
                image,
                running: true,
                address,
                run_options: rest,
                port_mapping,
            },
        );
        CommandOutput::ok(format!("{name}-id\n"))
    }

    fn rm(state: &mut FakeState, args: &[&str]) -> CommandOutput {
        let name = args.first().copied().unwrap_or("");
        match state.containers.get(name) {
            None => CommandOutput::failed(
                1,
                format!("Error response from daemon: No such container: {name}"),
            ),
            Some(c) if c.running => CommandOutput::failed(
                1,
                format!(
                    "Error response from daemon: cannot remove container \"/{name}\": container is running"
                ),
            ),
            Some(_) => {
                state.containers.remove(name);
                CommandOutput::ok(format!("{name}\n"))
            }
        }
    }

    fn with_existing(
        state: &mut FakeState,
        args: &[&str],
        f: impl FnOnce(&mut FakeContainer) -> CommandOutput,
    ) -> CommandOutput {
        let name = args.first().copied().unwrap_or("");
        match state.containers.get_mut(name) {
            Some(container) => f(container),
            None => CommandOutput::failed(
                1,
                format!("Error response from daemon: No such container: {name}"),
            ),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeDocker {
    fn program(&self) -> &str {
        PROGRAM
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(Error::CommandFailure {
                command: display_command(PROGRAM, args),
                reason: "No such file or directory (os error 2)".to_string(),
            });
        }
        state
            .commands
            .push(args.iter().map(|s| s.to_string()).collect());
        Ok(Self::execute(&mut state, args))
    }
}
