//! Keep a single named Docker container running and ready.
//!
//! A [`ContainerHandle`] reconciles the runtime against a [`ContainerSpec`]:
//! it creates the container when it is missing, replaces it when it runs a
//! different image, restarts it when stopped and leaves it alone when it is
//! already running. It then resolves an endpoint for the host platform and
//! waits for an optional readiness probe. A container that never becomes
//! ready is removed before the error is returned.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          ContainerHandle                             │
//! │                                                                      │
//! │   ensure_running()                                                   │
//! │         │                                                            │
//! │         ▼                                                            │
//! │   ┌──────────────────┐   ┌──────────────────┐   ┌────────────────┐   │
//! │   │ Lifecycle        │──▶│ PlatformResolver │──▶│ Readiness      │   │
//! │   │ (observe, apply) │   │ (host, port)     │   │ Poller         │   │
//! │   └──────────────────┘   └──────────────────┘   └────────────────┘   │
//! │         │                        │                   │ timeout       │
//! │         ▼                        ▼                   ▼               │
//! │   ┌──────────────────────────────────┐      ┌────────────────────┐   │
//! │   │ RuntimeInspector / CommandRunner │◀─────│ stop + remove      │   │
//! │   └──────────────────────────────────┘      └────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use docker_starter::{ContainerHandle, ContainerSpec, TcpProbe};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = ContainerSpec::new("test-postgres", "postgres:16", 5432)
//!     .with_published_port(15432)
//!     .with_extra_options(["-e", "POSTGRES_PASSWORD=secret"]);
//!
//! let postgres = ContainerHandle::docker(spec).with_readiness_probe(TcpProbe::new());
//!
//! let running = postgres.ensure_running().await?;
//! println!("Postgres available at {running}");
//!
//! postgres.stop_and_remove().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod container;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod platform;
pub mod readiness;
pub mod runtime;
pub mod testing;

pub use config::{ProbeConfig, StarterConfig};
pub use container::{ContainerSpec, DEFAULT_READINESS_TIMEOUT};
pub use error::{ConfigError, Error, ProbeError, Result};
pub use handle::{ContainerHandle, RunningContainer};
pub use lifecycle::{LifecycleController, ObservedState, RunState};
pub use platform::{NetworkMode, Platform, PlatformResolver, ResolvedEndpoint};
pub use readiness::{
    HttpProbe, ReadinessContext, ReadinessPoller, ReadinessProbe, TcpProbe, probe_fn,
};
pub use runtime::{CommandOutput, CommandRunner, ContainerObservation, DockerCli, RuntimeInspector};
