//! Container runtime abstraction.
//!
//! The [`ContainerRuntime`] trait is the only way the rest of the crate talks
//! to Docker (or a compatible CLI). [`DockerCli`] shells out to the runtime
//! binary; tests substitute an in-memory fake.
//!
//! Nothing here caches container state. Every query goes to the runtime.

mod docker;
#[cfg(test)]
pub(crate) mod fake;

pub use docker::DockerCli;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Port PostgreSQL listens on inside the container.
pub const CONTAINER_PG_PORT: u16 = 5432;

/// Data directory of the official postgres image.
pub const CONTAINER_DATA_DIR: &str = "/var/lib/postgresql/data";

/// Observed lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
}

/// Parameters for creating a database container.
#[derive(Clone)]
pub struct CreateSpec {
    pub name: String,
    pub volume: String,
    pub host_port: u16,
    pub image: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl std::fmt::Debug for CreateSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateSpec")
            .field("name", &self.name)
            .field("volume", &self.volume)
            .field("host_port", &self.host_port)
            .field("image", &self.image)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, -1 when killed by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Operations consumed from the container runtime CLI.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Existence and running state of a container.
    async fn inspect(&self, name: &str) -> Result<ContainerState>;

    /// Host port published for the container's postgres port, if any.
    async fn mapped_port(&self, name: &str) -> Result<Option<u16>>;

    /// Create and start a detached database container.
    async fn create(&self, spec: &CreateSpec) -> Result<()>;

    async fn start(&self, name: &str) -> Result<()>;

    async fn stop(&self, name: &str) -> Result<()>;

    /// Force-remove a container.
    async fn remove(&self, name: &str) -> Result<()>;

    /// Remove a named volume.
    async fn remove_volume(&self, volume: &str) -> Result<()>;

    /// Whether the runtime daemon answers.
    async fn info(&self) -> bool;

    /// Run the runtime CLI with raw arguments, e.g. `run --rm ...`.
    async fn run(&self, args: &[String]) -> Result<CommandOutput>;

    /// Runtime name for messages.
    fn runtime_name(&self) -> &str;
}
