//! Host platform detection and endpoint resolution.
//!
//! On macOS and Windows the Docker daemon runs inside a VM, so container
//! addresses on the bridge network are not routable from the host. There the
//! container is reached through its published port on localhost. On Linux the
//! container address and internal port are used directly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::container::ContainerSpec;
use crate::error::Result;
use crate::runtime::RuntimeInspector;

/// Host operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
}

impl Platform {
    /// Detect the current platform.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::MacOS,
            "windows" => Platform::Windows,
            _ => Platform::Linux,
        }
    }

    /// Whether the runtime's container network is unreachable from the host.
    pub fn has_isolated_network(&self) -> bool {
        matches!(self, Platform::MacOS | Platform::Windows)
    }
}

/// How to pick the endpoint for a running container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Decide from the host platform.
    #[default]
    Auto,
    /// Always `localhost` and the published port.
    Published,
    /// Always the container address and internal port.
    Container,
}

impl FromStr for NetworkMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(NetworkMode::Auto),
            "published" => Ok(NetworkMode::Published),
            "container" => Ok(NetworkMode::Container),
            other => Err(format!(
                "unknown network mode '{other}' (expected auto, published or container)"
            )),
        }
    }
}

/// Host and port through which the container is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEndpoint {
    pub host: String,
    pub port: u16,
}

impl ResolvedEndpoint {
    fn published(spec: &ContainerSpec) -> Self {
        Self {
            host: "localhost".to_string(),
            port: spec.published_port,
        }
    }
}

impl fmt::Display for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Chooses the endpoint strategy for the host platform.
#[derive(Debug, Clone, Copy)]
pub struct PlatformResolver {
    platform: Platform,
    mode: NetworkMode,
}

impl PlatformResolver {
    pub fn new(platform: Platform, mode: NetworkMode) -> Self {
        Self { platform, mode }
    }

    /// Resolver for the current platform in [`NetworkMode::Auto`].
    pub fn detect() -> Self {
        Self::new(Platform::current(), NetworkMode::Auto)
    }

    pub fn with_mode(mut self, mode: NetworkMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether the published port on localhost will be used.
    pub fn uses_published_port(&self) -> bool {
        match self.mode {
            NetworkMode::Auto => self.platform.has_isolated_network(),
            NetworkMode::Published => true,
            NetworkMode::Container => false,
        }
    }

    /// Compute the endpoint for a running container.
    pub async fn resolve(
        &self,
        spec: &ContainerSpec,
        inspector: &RuntimeInspector,
    ) -> Result<ResolvedEndpoint> {
        if self.uses_published_port() {
            return Ok(ResolvedEndpoint::published(spec));
        }

        let address = inspector.address_of(&spec.name).await?;
        if address.is_empty() {
            tracing::warn!(
                "Container \"{}\" has no address on the default network, using published port {}",
                spec.name,
                spec.published_port
            );
            return Ok(ResolvedEndpoint::published(spec));
        }

        Ok(ResolvedEndpoint {
            host: address,
            port: spec.container_port,
        })
    }
}

impl Default for PlatformResolver {
    fn default() -> Self {
        Self::detect()
    }
}
