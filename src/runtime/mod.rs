//! Container runtime access.
//!
//! Everything that talks to the runtime goes through a [`CommandRunner`].
//! [`DockerCli`] spawns the real `docker` binary; tests substitute
//! [`FakeDocker`](crate::testing::FakeDocker).

pub mod command;
pub mod inspector;

pub use command::{CommandOutput, CommandRunner, DockerCli, display_command};
pub use inspector::{ContainerObservation, RuntimeInspector};
