//! Desired state of the managed container.

use std::time::Duration;

/// Readiness timeout used when none is configured.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable description of the container a handle manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name; at most one container with this name exists.
    pub name: String,
    /// Image reference the container must run.
    pub image: String,
    /// Extra options passed verbatim to `docker run`, before the image.
    pub extra_options: Vec<String>,
    /// Port the service listens on inside the container.
    pub container_port: u16,
    /// Port published on the host.
    pub published_port: u16,
    /// How long the readiness probe may keep failing.
    pub readiness_timeout: Duration,
}

impl ContainerSpec {
    /// Spec publishing `port` on the same host port.
    pub fn new(name: impl Into<String>, image: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            extra_options: Vec::new(),
            container_port: port,
            published_port: port,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
        }
    }

    pub fn with_published_port(mut self, port: u16) -> Self {
        self.published_port = port;
        self
    }

    pub fn with_extra_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Arguments for `docker run` creating this container, detached.
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "-p".to_string(),
            format!("{}:{}", self.published_port, self.container_port),
            "--name".to_string(),
            self.name.clone(),
        ];
        args.extend(self.extra_options.iter().cloned());
        args.push(self.image.clone());
        args
    }
}

/// Split a shell-style option string on whitespace.
///
/// Quoting is not interpreted; pass a list when an option value contains spaces.
pub fn split_options(options: &str) -> Vec<String> {
    options.split_whitespace().map(str::to_string).collect()
}
