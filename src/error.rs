//! Error types for container reconciliation.

use std::time::Duration;

use thiserror::Error;

/// Result type for docker-starter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reconciling or tearing down a container.
#[derive(Debug, Error)]
pub enum Error {
    /// The runtime command could not be executed at all.
    #[error("Failed to execute `{command}`: {reason}")]
    CommandFailure {
        /// Command line that was attempted.
        command: String,
        /// Reason for failure.
        reason: String,
    },

    /// The runtime executed the command but reported failure.
    #[error("`{command}` exited with code {code}: {stderr}")]
    CommandRejected {
        /// Command line that was run.
        command: String,
        /// Exit code reported by the runtime.
        code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The readiness probe never succeeded; the container has been removed.
    #[error(
        "Readiness probe failed for container '{container}' after {attempts} attempt(s) within {timeout:?}: {source}"
    )]
    ReadinessFailed {
        /// Container name.
        container: String,
        /// Readiness timeout that elapsed.
        timeout: Duration,
        /// Number of probe invocations.
        attempts: u32,
        /// Last error returned by the probe.
        #[source]
        source: ProbeError,
    },

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// A single failed readiness check.
///
/// Carries a human-readable message only; probes report whatever detail
/// helps explain why the container is not ready yet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProbeError {
    message: String,
}

impl ProbeError {
    /// Create a probe error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure detail.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ProbeError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProbeError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        Self::new(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_failed_includes_probe_detail() {
        let err = Error::ReadinessFailed {
            container: "db".to_string(),
            timeout: Duration::from_secs(5),
            attempts: 6,
            source: ProbeError::new("blob"),
        };

        let msg = err.to_string();
        assert!(msg.contains("Readiness probe failed"));
        assert!(msg.contains("blob"));
        assert!(msg.contains("'db'"));
    }

    #[test]
    fn test_command_rejected_display() {
        let err = Error::CommandRejected {
            command: "docker rm db".to_string(),
            code: 1,
            stderr: "No such container: db".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "`docker rm db` exited with code 1: No such container: db"
        );
    }

    #[test]
    fn test_probe_error_conversions() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(ProbeError::from(io).message(), "refused");
        assert_eq!(ProbeError::from("nope").message(), "nope");
        assert_eq!(ProbeError::from("later".to_string()).to_string(), "later");
    }
}
