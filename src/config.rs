//! Configuration from TOML files and environment variables.
//!
//! File values are read first; `DOCKER_STARTER_*` environment variables
//! override them, and CLI flags override both. Nothing is required until the
//! merged result is turned into a [`ContainerSpec`].

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::container::{ContainerSpec, DEFAULT_READINESS_TIMEOUT, split_options};
use crate::error::ConfigError;
use crate::platform::{NetworkMode, PlatformResolver};
use crate::readiness::{HttpProbe, ReadinessProbe, TcpProbe};
use crate::runtime::DockerCli;

/// Built-in readiness probe selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum ProbeConfig {
    /// Ready as soon as the container runs.
    #[default]
    None,
    /// TCP connect to the endpoint.
    Tcp,
    /// HTTP GET on a path.
    Http { path: String },
}

impl ProbeConfig {
    pub fn build(&self) -> Option<Arc<dyn ReadinessProbe>> {
        match self {
            ProbeConfig::None => None,
            ProbeConfig::Tcp => Some(Arc::new(TcpProbe::new())),
            ProbeConfig::Http { path } => Some(Arc::new(HttpProbe::new(path.clone()))),
        }
    }
}

impl FromStr for ProbeConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "" | "none" => Ok(ProbeConfig::None),
            "tcp" => Ok(ProbeConfig::Tcp),
            "http" => Ok(ProbeConfig::Http {
                path: "/".to_string(),
            }),
            _ => match s.strip_prefix("http:") {
                Some(path) => Ok(ProbeConfig::Http {
                    path: path.to_string(),
                }),
                None => Err(format!(
                    "unknown probe '{s}' (expected none, tcp, http or http:/path)"
                )),
            },
        }
    }
}

impl TryFrom<String> for ProbeConfig {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Partially specified configuration, as read from one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StarterConfig {
    pub container: Option<String>,
    pub image: Option<String>,
    /// Whitespace-separated options for `docker run`.
    pub extra_options: Option<String>,
    pub container_port: Option<u16>,
    /// Defaults to `container_port`.
    pub published_port: Option<u16>,
    pub readiness_timeout_secs: Option<u64>,
    pub probe: Option<ProbeConfig>,
    pub network: Option<NetworkMode>,
    /// Docker-compatible binary to run.
    pub docker_bin: Option<String>,
}

impl StarterConfig {
    /// Load a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Read `DOCKER_STARTER_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(optional_env)
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<Option<String>, ConfigError>,
    {
        let lookup = |key: &str| -> Result<Option<String>, ConfigError> {
            Ok(get(key)?.filter(|v| !v.trim().is_empty()))
        };

        Ok(Self {
            container: lookup("DOCKER_STARTER_CONTAINER")?,
            image: lookup("DOCKER_STARTER_IMAGE")?,
            extra_options: lookup("DOCKER_STARTER_EXTRA_OPTIONS")?,
            container_port: parse_var("DOCKER_STARTER_CONTAINER_PORT", &lookup)?,
            published_port: parse_var("DOCKER_STARTER_PUBLISHED_PORT", &lookup)?,
            readiness_timeout_secs: parse_var("DOCKER_STARTER_READINESS_TIMEOUT_SECS", &lookup)?,
            probe: parse_var("DOCKER_STARTER_PROBE", &lookup)?,
            network: parse_var("DOCKER_STARTER_NETWORK", &lookup)?,
            docker_bin: lookup("DOCKER_STARTER_DOCKER_BIN")?,
        })
    }

    /// Layer `other` on top of `self`; values set in `other` win.
    pub fn merge(self, other: StarterConfig) -> Self {
        Self {
            container: other.container.or(self.container),
            image: other.image.or(self.image),
            extra_options: other.extra_options.or(self.extra_options),
            container_port: other.container_port.or(self.container_port),
            published_port: other.published_port.or(self.published_port),
            readiness_timeout_secs: other.readiness_timeout_secs.or(self.readiness_timeout_secs),
            probe: other.probe.or(self.probe),
            network: other.network.or(self.network),
            docker_bin: other.docker_bin.or(self.docker_bin),
        }
    }

    /// Validate and build the container spec.
    pub fn to_spec(&self) -> Result<ContainerSpec, ConfigError> {
        let container = required("container", self.container.as_deref())?;
        let image = required("image", self.image.as_deref())?;
        let container_port = self.container_port.ok_or_else(|| ConfigError::MissingRequired {
            key: "container_port".to_string(),
        })?;
        if container_port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "container_port".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        let published_port = self.published_port.unwrap_or(container_port);
        if published_port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "published_port".to_string(),
                message: "must be non-zero".to_string(),
            });
        }

        let timeout = self
            .readiness_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_READINESS_TIMEOUT);

        Ok(ContainerSpec::new(container, image, container_port)
            .with_published_port(published_port)
            .with_extra_options(split_options(self.extra_options.as_deref().unwrap_or("")))
            .with_readiness_timeout(timeout))
    }

    pub fn readiness_probe(&self) -> Option<Arc<dyn ReadinessProbe>> {
        self.probe.as_ref().and_then(ProbeConfig::build)
    }

    pub fn resolver(&self) -> PlatformResolver {
        PlatformResolver::detect().with_mode(self.network.unwrap_or_default())
    }

    pub fn runner(&self) -> DockerCli {
        self.docker_bin
            .as_deref()
            .map(DockerCli::new)
            .unwrap_or_default()
    }
}

/// Read an environment variable, treating "not set" as `None`.
pub fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

fn parse_var<T, F>(key: &str, lookup: &F) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Result<Option<String>, ConfigError>,
{
    lookup(key)?
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

fn required<'a>(key: &str, value: Option<&'a str>) -> Result<&'a str, ConfigError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingRequired {
            key: key.to_string(),
        }),
    }
}
