//! CLI command handling.
//!
//! Provides subcommands for:
//! - Ensuring the container is running and ready (`up`)
//! - Stopping and removing it (`down`)
//! - Showing its observed state (`status`)

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ColorChoice, Parser, Subcommand};

use crate::config::{ProbeConfig, StarterConfig};
use crate::container::ContainerSpec;
use crate::error::ConfigError;
use crate::handle::ContainerHandle;
use crate::platform::NetworkMode;

#[derive(Parser, Debug)]
#[command(name = "docker-starter")]
#[command(about = "Keep a named Docker container running and ready for tests")]
#[command(
    long_about = "Reconciles a single named container against an image, waits until it is ready and prints its endpoint.\nExamples:\n  docker-starter up --container test-db --image postgres:16 --port 5432 --probe tcp\n  docker-starter down --container test-db"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML); DOCKER_STARTER_* env vars override it
    #[arg(short, long, global = true, env = "DOCKER_STARTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Container name
    #[arg(long, global = true)]
    pub container: Option<String>,

    /// Image the container must run
    #[arg(long, global = true)]
    pub image: Option<String>,

    /// Port the service listens on inside the container
    #[arg(long = "port", global = true)]
    pub container_port: Option<u16>,

    /// Port published on the host (defaults to --port)
    #[arg(long, global = true)]
    pub published_port: Option<u16>,

    /// Extra `docker run` options, whitespace separated
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub extra_options: Option<String>,

    /// Readiness timeout in seconds
    #[arg(long = "timeout", global = true)]
    pub readiness_timeout_secs: Option<u64>,

    /// Readiness probe: none, tcp, http or http:/path
    #[arg(long, global = true)]
    pub probe: Option<ProbeConfig>,

    /// Endpoint strategy: auto, published or container
    #[arg(long, global = true)]
    pub network: Option<NetworkMode>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ensure the container is running and ready
    #[command(
        about = "Start or reuse the container",
        long_about = "Creates, restarts or reuses the container, waits for readiness and prints host:port.\nExample: docker-starter up --json"
    )]
    Up {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stop and remove the container
    #[command(about = "Stop and remove the container")]
    Down,

    /// Show the observed container state
    #[command(about = "Show container state")]
    Status,
}

impl Cli {
    /// Configuration given directly as flags.
    pub fn overrides(&self) -> StarterConfig {
        StarterConfig {
            container: self.container.clone(),
            image: self.image.clone(),
            extra_options: self.extra_options.clone(),
            container_port: self.container_port,
            published_port: self.published_port,
            readiness_timeout_secs: self.readiness_timeout_secs,
            probe: self.probe.clone(),
            network: self.network,
            docker_bin: None,
        }
    }

    /// Merge file, environment and flag configuration.
    pub fn load_config(&self) -> Result<StarterConfig, ConfigError> {
        let file = match &self.config {
            Some(path) => StarterConfig::from_file(path)?,
            None => StarterConfig::default(),
        };
        Ok(file
            .merge(StarterConfig::from_env()?)
            .merge(self.overrides()))
    }
}

/// Run a parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.load_config()?;

    match cli.command {
        Command::Up { json } => {
            let running = build_handle(&config, config.to_spec()?)
                .ensure_running()
                .await?;
            if json {
                println!("{}", serde_json::to_string(&running)?);
            } else {
                println!("{running}");
            }
        }
        Command::Down => {
            build_handle(&config, teardown_spec(&config)?)
                .stop_and_remove()
                .await?;
            tracing::info!("Container \"{}\" removed", config.container.unwrap_or_default());
        }
        Command::Status => {
            let state = build_handle(&config, config.to_spec()?).status().await?;
            println!("{state}");
        }
    }

    Ok(())
}

fn build_handle(config: &StarterConfig, spec: ContainerSpec) -> ContainerHandle {
    let handle =
        ContainerHandle::new(spec, Arc::new(config.runner())).with_resolver(config.resolver());
    match config.readiness_probe() {
        Some(probe) => handle.with_shared_probe(probe),
        None => handle,
    }
}

/// Teardown only needs the container name.
fn teardown_spec(config: &StarterConfig) -> Result<ContainerSpec, ConfigError> {
    let name = config
        .container
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ConfigError::MissingRequired {
            key: "container".to_string(),
        })?;
    Ok(ContainerSpec::new(
        name,
        config.image.clone().unwrap_or_default(),
        config.container_port.unwrap_or_default(),
    ))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_up_flags() {
        let cli = Cli::try_parse_from([
            "docker-starter",
            "up",
            "--json",
            "--container",
            "test-db",
            "--image",
            "postgres:16",
            "--port",
            "5432",
            "--extra-options",
            "-e POSTGRES_PASSWORD=pw",
            "--probe",
            "http:/health",
            "--network",
            "published",
        ])
        .unwrap();

        assert!(matches!(cli.command, Command::Up { json: true }));
        let overrides = cli.overrides();
        assert_eq!(overrides.container.as_deref(), Some("test-db"));
        assert_eq!(overrides.container_port, Some(5432));
        assert_eq!(
            overrides.extra_options.as_deref(),
            Some("-e POSTGRES_PASSWORD=pw")
        );
        assert_eq!(
            overrides.probe,
            Some(ProbeConfig::Http {
                path: "/health".to_string()
            })
        );
        assert_eq!(overrides.network, Some(NetworkMode::Published));
    }

    #[test]
    fn test_parse_rejects_unknown_probe() {
        let result = Cli::try_parse_from(["docker-starter", "up", "--probe", "grpc"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_teardown_spec_needs_only_name() {
        let config = StarterConfig {
            container: Some("test-db".to_string()),
            ..Default::default()
        };
        assert_eq!(teardown_spec(&config).unwrap().name, "test-db");

        assert!(matches!(
            teardown_spec(&StarterConfig::default()),
            Err(ConfigError::MissingRequired { .. })
        ));
    }
}
