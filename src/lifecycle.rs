//! Reconciliation of a named container against its desired spec.
//!
//! Each reconciliation observes the runtime, classifies the result into an
//! [`ObservedState`] and then applies the one action that converges it:
//!
//! | Observed            | Action                                | Result            |
//! |---------------------|---------------------------------------|-------------------|
//! | `Absent`            | create & start                        | `Fresh`           |
//! | `WrongImage`        | stop, remove, create & start          | `Fresh`           |
//! | `Stopped`           | start existing container              | `Reused`          |
//! | `Running`           | nothing                               | `AlreadyRunning`  |

use std::fmt;
use std::sync::Arc;

use crate::container::ContainerSpec;
use crate::error::Result;
use crate::runtime::command::{CommandRunner, display_command, run_checked};
use crate::runtime::{ContainerObservation, RuntimeInspector};

/// Condition of the named container relative to the spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedState {
    /// No container with this name.
    Absent,
    /// A container exists but was created from a different image.
    WrongImage {
        /// Image the existing container runs.
        current: String,
    },
    /// Correct image, not running.
    Stopped,
    /// Correct image, running.
    Running,
}

impl ObservedState {
    /// Classify an observation against the desired image.
    pub fn classify(observation: &ContainerObservation, image: &str) -> Self {
        if !observation.exists {
            return ObservedState::Absent;
        }
        match observation.image.as_deref() {
            Some(current) if current == image => {
                if observation.running {
                    ObservedState::Running
                } else {
                    ObservedState::Stopped
                }
            }
            current => ObservedState::WrongImage {
                current: current.unwrap_or_default().to_string(),
            },
        }
    }
}

impl fmt::Display for ObservedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservedState::Absent => write!(f, "absent"),
            ObservedState::WrongImage { current } => write!(f, "outdated image ({current})"),
            ObservedState::Stopped => write!(f, "stopped"),
            ObservedState::Running => write!(f, "running"),
        }
    }
}

/// How the container came to be running after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Created from scratch.
    Fresh,
    /// An existing stopped container was started.
    Reused,
    /// Was already running with the right image; nothing was done.
    AlreadyRunning,
}

impl RunState {
    pub fn was_already_running(&self) -> bool {
        matches!(self, RunState::AlreadyRunning)
    }
}

/// Drives a single named container towards its spec.
pub struct LifecycleController {
    spec: ContainerSpec,
    runner: Arc<dyn CommandRunner>,
    inspector: RuntimeInspector,
}

impl LifecycleController {
    pub fn new(spec: ContainerSpec, runner: Arc<dyn CommandRunner>) -> Self {
        let inspector = RuntimeInspector::new(runner.clone());
        Self {
            spec,
            runner,
            inspector,
        }
    }

    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    pub fn inspector(&self) -> &RuntimeInspector {
        &self.inspector
    }

    /// Observe and classify the container's current state.
    pub async fn observe(&self) -> Result<ObservedState> {
        let observation = self.inspector.observe(&self.spec.name).await?;
        Ok(ObservedState::classify(&observation, &self.spec.image))
    }

    /// Make sure the container runs the spec's image.
    pub async fn ensure_running(&self) -> Result<RunState> {
        let state = self.observe().await?;
        tracing::debug!(container = %self.spec.name, %state, "Observed container");
        self.apply(state).await
    }

    /// Apply the action that converges `state`.
    pub async fn apply(&self, state: ObservedState) -> Result<RunState> {
        match state {
            ObservedState::Absent => {
                self.create_and_start().await?;
                Ok(RunState::Fresh)
            }
            ObservedState::WrongImage { current } => {
                tracing::warn!(
                    "Container {} running but with outdated image {} (want {}), recreating",
                    self.spec.name,
                    current,
                    self.spec.image
                );
                self.create_and_start().await?;
                Ok(RunState::Fresh)
            }
            ObservedState::Stopped => {
                self.mutate(&["start", self.spec.name.as_str()]).await?;
                Ok(RunState::Reused)
            }
            ObservedState::Running => Ok(RunState::AlreadyRunning),
        }
    }

    /// Stop and remove the container if present.
    ///
    /// Does nothing when there is nothing to stop or remove.
    pub async fn ensure_removed(&self) -> Result<()> {
        let name = self.spec.name.as_str();
        if self.inspector.is_running(name).await? {
            self.mutate(&["stop", name]).await?;
        }
        if self.inspector.exists(name).await? {
            self.mutate(&["rm", name]).await?;
        }
        Ok(())
    }

    async fn create_and_start(&self) -> Result<()> {
        self.ensure_removed().await?;
        let args = self.spec.run_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.mutate(&args).await
    }

    async fn mutate(&self, args: &[&str]) -> Result<()> {
        tracing::info!("{}", display_command(self.runner.program(), args));
        run_checked(self.runner.as_ref(), args).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::FakeDocker;

    fn observation(image: Option<&str>, running: bool) -> ContainerObservation {
        ContainerObservation {
            exists: image.is_some(),
            image: image.map(str::to_string),
            running,
        }
    }

    fn controller(docker: &Arc<FakeDocker>) -> LifecycleController {
        LifecycleController::new(ContainerSpec::new("db", "postgres:16", 5432), docker.clone())
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            ObservedState::classify(&observation(None, false), "postgres:16"),
            ObservedState::Absent
        );
        assert_eq!(
            ObservedState::classify(&observation(Some("postgres:15"), true), "postgres:16"),
            ObservedState::WrongImage {
                current: "postgres:15".to_string()
            }
        );
        assert_eq!(
            ObservedState::classify(&observation(Some("postgres:16"), false), "postgres:16"),
            ObservedState::Stopped
        );
        assert_eq!(
            ObservedState::classify(&observation(Some("postgres:16"), true), "postgres:16"),
            ObservedState::Running
        );
    }

    #[test]
    fn test_only_running_path_was_already_running() {
        assert!(RunState::AlreadyRunning.was_already_running());
        assert!(!RunState::Fresh.was_already_running());
        assert!(!RunState::Reused.was_already_running());
    }

    #[tokio::test]
    async fn test_absent_is_created() {
        let docker = Arc::new(FakeDocker::new());
        let run_state = controller(&docker).ensure_running().await.unwrap();

        assert_eq!(run_state, RunState::Fresh);
        let container = docker.container("db").unwrap();
        assert!(container.running);
        assert_eq!(container.image, "postgres:16");
        assert_eq!(
            docker.mutations(),
            vec!["docker run -d -p 5432:5432 --name db postgres:16"]
        );
    }

    #[tokio::test]
    async fn test_wrong_image_is_replaced() {
        let docker = Arc::new(FakeDocker::new().with_container("db", "postgres:15", true));
        let run_state = controller(&docker).ensure_running().await.unwrap();

        assert_eq!(run_state, RunState::Fresh);
        assert_eq!(docker.container("db").unwrap().image, "postgres:16");
        assert_eq!(
            docker.mutations(),
            vec![
                "docker stop db",
                "docker rm db",
                "docker run -d -p 5432:5432 --name db postgres:16",
            ]
        );
    }

    #[tokio::test]
    async fn test_stopped_wrong_image_is_removed_without_stop() {
        let docker = Arc::new(FakeDocker::new().with_container("db", "postgres:15", false));
        controller(&docker).ensure_running().await.unwrap();

        assert_eq!(
            docker.mutations(),
            vec![
                "docker rm db",
                "docker run -d -p 5432:5432 --name db postgres:16",
            ]
        );
    }

    #[tokio::test]
    async fn test_stopped_is_started() {
        let docker = Arc::new(FakeDocker::new().with_container("db", "postgres:16", false));
        let run_state = controller(&docker).ensure_running().await.unwrap();

        assert_eq!(run_state, RunState::Reused);
        assert!(docker.container("db").unwrap().running);
        assert_eq!(docker.mutations(), vec!["docker start db"]);
    }

    #[tokio::test]
    async fn test_running_is_left_alone() {
        let docker = Arc::new(FakeDocker::new().with_container("db", "postgres:16", true));
        let run_state = controller(&docker).ensure_running().await.unwrap();

        assert_eq!(run_state, RunState::AlreadyRunning);
        assert!(docker.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_removed_is_idempotent() {
        let docker = Arc::new(FakeDocker::new().with_container("db", "postgres:16", true));
        let controller = controller(&docker);

        controller.ensure_removed().await.unwrap();
        assert!(docker.container("db").is_none());

        controller.ensure_removed().await.unwrap();
        assert_eq!(docker.mutations(), vec!["docker stop db", "docker rm db"]);
    }

    #[tokio::test]
    async fn test_ensure_removed_when_absent() {
        let docker = Arc::new(FakeDocker::new());
        controller(&docker).ensure_removed().await.unwrap();
        assert!(docker.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_run_surfaces_stderr() {
        let docker = Arc::new(FakeDocker::new());
        docker.reject_next_run("port is already allocated");

        let err = controller(&docker).ensure_running().await.unwrap_err();
        match err {
            Error::CommandRejected { stderr, .. } => {
                assert!(stderr.contains("port is already allocated"));
            }
            other => panic!("expected CommandRejected, got {other:?}"),
        }
    }
}
