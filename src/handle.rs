//! The public handle on a managed container.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::container::ContainerSpec;
use crate::error::{Error, Result};
use crate::lifecycle::{LifecycleController, ObservedState};
use crate::platform::{PlatformResolver, ResolvedEndpoint};
use crate::readiness::{ReadinessContext, ReadinessPoller, ReadinessProbe};
use crate::runtime::{CommandRunner, DockerCli};

/// A container that is running and ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningContainer {
    pub host: String,
    pub port: u16,
    /// The container was already running with the right image before the
    /// first `ensure_running` call on this handle.
    pub was_already_running: bool,
}

impl RunningContainer {
    pub fn endpoint(&self) -> ResolvedEndpoint {
        ResolvedEndpoint {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

impl fmt::Display for RunningContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Keeps one named container running for the lifetime of the handle.
///
/// The first successful [`ensure_running`](Self::ensure_running) reconciles
/// the container, resolves its endpoint and waits for the readiness probe.
/// The result is memoized: later calls return it without touching the
/// runtime, even after [`stop_and_remove`](Self::stop_and_remove).
///
/// Concurrent `ensure_running` calls are serialized; the ones that wait
/// receive the memoized result of the first.
pub struct ContainerHandle {
    controller: LifecycleController,
    resolver: PlatformResolver,
    poller: ReadinessPoller,
    probe: Option<Arc<dyn ReadinessProbe>>,
    ready: Mutex<Option<RunningContainer>>,
}

impl ContainerHandle {
    /// Create a handle using the given command runner.
    pub fn new(spec: ContainerSpec, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            controller: LifecycleController::new(spec, runner),
            resolver: PlatformResolver::detect(),
            poller: ReadinessPoller::new(),
            probe: None,
            ready: Mutex::new(None),
        }
    }

    /// Create a handle driving the local `docker` binary.
    pub fn docker(spec: ContainerSpec) -> Self {
        Self::new(spec, Arc::new(DockerCli::default()))
    }

    /// Wait for `probe` to succeed before reporting the container ready.
    pub fn with_readiness_probe(self, probe: impl ReadinessProbe + 'static) -> Self {
        self.with_shared_probe(Arc::new(probe))
    }

    pub fn with_shared_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_resolver(mut self, resolver: PlatformResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_poller(mut self, poller: ReadinessPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn spec(&self) -> &ContainerSpec {
        self.controller.spec()
    }

    /// The memoized result, if `ensure_running` has succeeded.
    pub async fn running(&self) -> Option<RunningContainer> {
        self.ready.lock().await.clone()
    }

    /// Ensure the container is running and ready, returning its endpoint.
    ///
    /// If the readiness probe keeps failing past the timeout, the container
    /// is stopped and removed before [`Error::ReadinessFailed`] is returned.
    pub async fn ensure_running(&self) -> Result<RunningContainer> {
        let mut ready = self.ready.lock().await;
        if let Some(running) = ready.as_ref() {
            return Ok(running.clone());
        }

        let spec = self.controller.spec();
        let run_state = self.controller.ensure_running().await?;
        let was_already_running = run_state.was_already_running();

        let endpoint = self
            .resolver
            .resolve(spec, self.controller.inspector())
            .await?;

        if let Some(probe) = &self.probe {
            let ctx = ReadinessContext {
                host: endpoint.host.clone(),
                port: endpoint.port,
                was_already_running,
            };

            if let Err(failure) = self
                .poller
                .poll_with_timeout(probe.as_ref(), &ctx, spec.readiness_timeout)
                .await
            {
                tracing::warn!(
                    "Container \"{}\" not ready after {} attempt(s): {}; removing it",
                    spec.name,
                    failure.attempts,
                    failure.last_error
                );
                self.controller.ensure_removed().await?;
                return Err(Error::ReadinessFailed {
                    container: spec.name.clone(),
                    timeout: spec.readiness_timeout,
                    attempts: failure.attempts,
                    source: failure.last_error,
                });
            }
        }

        tracing::info!(
            "Container \"{}\" is running, and can be controlled on: {}",
            spec.name,
            endpoint
        );

        let running = RunningContainer {
            host: endpoint.host,
            port: endpoint.port,
            was_already_running,
        };
        *ready = Some(running.clone());
        Ok(running)
    }

    /// Stop and remove the container. Safe to call at any time, repeatedly.
    pub async fn stop_and_remove(&self) -> Result<()> {
        self.controller.ensure_removed().await
    }

    /// Current state of the container, without changing anything.
    pub async fn status(&self) -> Result<ObservedState> {
        self.controller.observe().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{NetworkMode, Platform};
    use crate::testing::FakeDocker;

    fn handle(docker: &Arc<FakeDocker>) -> ContainerHandle {
        ContainerHandle::new(ContainerSpec::new("web", "nginx:alpine", 80), docker.clone())
            .with_resolver(PlatformResolver::new(Platform::Linux, NetworkMode::Auto))
    }

    #[tokio::test]
    async fn test_running_is_none_before_first_call() {
        let docker = Arc::new(FakeDocker::new());
        let handle = handle(&docker);

        assert!(handle.running().await.is_none());
        handle.ensure_running().await.unwrap();
        assert!(handle.running().await.is_some());
    }

    #[tokio::test]
    async fn test_status_does_not_mutate() {
        let docker = Arc::new(FakeDocker::new().with_container("web", "nginx:1.25", false));
        let handle = handle(&docker);

        assert_eq!(
            handle.status().await.unwrap(),
            ObservedState::WrongImage {
                current: "nginx:1.25".to_string()
            }
        );
        assert!(docker.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_command_failure_does_not_memoize() {
        let docker = Arc::new(FakeDocker::new());
        let handle = handle(&docker);

        docker.set_unavailable(true);
        assert!(matches!(
            handle.ensure_running().await,
            Err(Error::CommandFailure { .. })
        ));

        docker.set_unavailable(false);
        let running = handle.ensure_running().await.unwrap();
        assert!(!running.was_already_running);
    }

    #[test]
    fn test_new_handle_touches_nothing() {
        let docker = Arc::new(FakeDocker::new());
        let handle = handle(&docker);

        assert_eq!(handle.spec().name, "web");
        assert!(tokio_test::block_on(handle.running()).is_none());
        assert!(docker.commands().is_empty());
    }

    #[test]
    fn test_running_container_display() {
        let running = RunningContainer {
            host: "localhost".to_string(),
            port: 8080,
            was_already_running: false,
        };
        assert_eq!(running.to_string(), "localhost:8080");
        assert_eq!(running.endpoint().port, 8080);
    }
}
