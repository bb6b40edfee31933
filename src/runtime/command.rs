//! Execution of container runtime commands.

use std::process::Stdio;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Captured result of a finished runtime command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (-1 when the process was terminated by a signal).
    pub code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Executes commands against the container runtime.
///
/// Implementations return `Err` only when the command could not be run at
/// all. A command that ran and exited non-zero is reported through
/// [`CommandOutput::code`] so callers can decide whether that is an answer
/// or a failure.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Name of the runtime binary, used in logs and error messages.
    fn program(&self) -> &str;

    /// Run the runtime binary with `args` and capture its output.
    async fn run(&self, args: &[&str]) -> Result<CommandOutput>;
}

/// Render a command line for logs and errors.
pub fn display_command(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Run a command and turn a non-zero exit into [`Error::CommandRejected`].
pub(crate) async fn run_checked(runner: &dyn CommandRunner, args: &[&str]) -> Result<CommandOutput> {
    let output = runner.run(args).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(Error::CommandRejected {
            command: display_command(runner.program(), args),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

/// Runs the `docker` command line client as a child process.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    /// Use a specific docker-compatible binary (e.g. `podman`).
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl CommandRunner for DockerCli {
    fn program(&self) -> &str {
        &self.binary
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        tracing::trace!("Running: {}", display_command(&self.binary, args));

        let output = tokio::process::Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::CommandFailure {
                command: display_command(&self.binary, args),
                reason: e.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
