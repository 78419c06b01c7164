//! # dbmirror
//!
//! Mirror a hosted PostgreSQL database to a local container and back.
//!
//! The library covers the connectivity and provisioning side:
//!
//! - **Region discovery** by probing every pooler with a startup handshake
//! - **URL rewriting** between direct and pooled forms, and for container networking
//! - **Execution backend** that runs `pg_dump`/`psql` natively or in a container
//! - **Local instance lifecycle** with port allocation and readiness polling
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dbmirror::{Config, ContainerDescriptor, DockerCli, InstanceManager, PgConnectionTester};
//!
//! #[tokio::main]
//! async fn main() -> dbmirror::Result<()> {
//!     let config = Config::load("dbmirror.yaml")?;
//!     let runtime = Arc::new(DockerCli::new(config.runtime.binary.clone()));
//!     let manager = InstanceManager::new(runtime, Arc::new(PgConnectionTester), config.local.clone());
//!     let mut instance = ContainerDescriptor::from_config(&config.local);
//!     let port = manager.ensure_running(&mut instance).await?;
//!     println!("Local database on port {}", port);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod health;
pub mod instance;
pub mod mirror;
pub mod platform;
pub mod port;
pub mod region;
pub mod runtime;
pub mod tls;

pub use backend::{ExecutionBackend, ExecutionMode, RunOptions};
pub use config::Config;
pub use endpoint::{DatabaseEndpoint, EndpointKind, UrlTransform};
pub use error::{MirrorError, Result};
pub use health::{ConnectionTest, ConnectionTester, PgConnectionTester};
pub use instance::{ContainerDescriptor, InstanceManager, InstanceStatus};
pub use platform::HostPlatform;
pub use port::find_free_port;
pub use region::{ProbeOutcome, ProbeResult, RegionProbe};
pub use runtime::{ContainerRuntime, ContainerState, DockerCli};
