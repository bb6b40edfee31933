//! Read-only queries against the container runtime.

use std::sync::Arc;

use crate::error::Result;
use crate::runtime::command::{CommandRunner, run_checked};

const IMAGE_FORMAT: &str = "{{.Config.Image}}";
const ADDRESS_FORMAT: &str = "{{.NetworkSettings.IPAddress}}";
const NAMES_FORMAT: &str = "{{.Names}}";

/// Snapshot of what the runtime reports for a container name.
///
/// Never cached: every reconciliation takes a fresh one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerObservation {
    /// A container with this exact name exists (running or not).
    pub exists: bool,
    /// Image the container was created from, if it exists.
    pub image: Option<String>,
    /// The container is currently running.
    pub running: bool,
}

/// Issues read-only queries for a single container name.
#[derive(Clone)]
pub struct RuntimeInspector {
    runner: Arc<dyn CommandRunner>,
}

impl RuntimeInspector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Whether a container with exactly this name exists, in any state.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        self.list_names(name, true).await
    }

    /// Whether a container with exactly this name is running.
    pub async fn is_running(&self, name: &str) -> Result<bool> {
        self.list_names(name, false).await
    }

    /// Image reference the container was created from.
    ///
    /// Only meaningful when [`exists`](Self::exists) is true; the runtime
    /// rejects the query otherwise.
    pub async fn image_of(&self, name: &str) -> Result<String> {
        self.inspect(name, IMAGE_FORMAT).await
    }

    /// Address of the container on the runtime's default network.
    ///
    /// Empty when the container is stopped or not attached to that network.
    pub async fn address_of(&self, name: &str) -> Result<String> {
        self.inspect(name, ADDRESS_FORMAT).await
    }

    /// Observe existence, image and running status in one pass.
    ///
    /// `image` is left as `None` without querying when the container is absent.
    pub async fn observe(&self, name: &str) -> Result<ContainerObservation> {
        if !self.exists(name).await? {
            return Ok(ContainerObservation::default());
        }

        let image = self.image_of(name).await?;
        let running = self.is_running(name).await?;

        Ok(ContainerObservation {
            exists: true,
            image: Some(image),
            running,
        })
    }

    async fn list_names(&self, name: &str, all: bool) -> Result<bool> {
        let filter = format!("name={name}");
        let mut args = vec!["ps"];
        if all {
            args.push("-a");
        }
        args.extend(["--filter", filter.as_str(), "--format", NAMES_FORMAT]);

        let output = run_checked(self.runner.as_ref(), &args).await?;

        // The name filter is a substring match, so compare exactly here.
        let found = output.stdout.lines().any(|line| line.trim() == name);
        tracing::debug!(container = name, all, found, "Listed containers");
        Ok(found)
    }

    async fn inspect(&self, name: &str, format: &str) -> Result<String> {
        let output = run_checked(self.runner.as_ref(), &["inspect", "--format", format, name]).await?;
        Ok(output.stdout.trim().to_string())
    }
}
