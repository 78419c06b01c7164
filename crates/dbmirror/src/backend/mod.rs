//! Execution backend for PostgreSQL client tools.
//!
//! `pg_dump` and `psql` run natively when both are on `PATH`, otherwise
//! inside a throwaway container. The choice is made once per
//! [`ExecutionBackend`] and cached; call [`ExecutionBackend::reset`] to
//! force a new detection.

mod command;

pub use command::{container_invocation, native_invocation, ContainerInvocation};

use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::endpoint::UrlTransform;
use crate::error::{MirrorError, Result};
use crate::runtime::{CommandOutput, ContainerRuntime};

/// Where client tools run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Native,
    Containerized,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Native => write!(f, "native"),
            ExecutionMode::Containerized => write!(f, "containerized"),
        }
    }
}

/// PostgreSQL client executables this crate drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientTool {
    PgDump,
    Psql,
}

impl ClientTool {
    pub const REQUIRED: [ClientTool; 2] = [ClientTool::PgDump, ClientTool::Psql];

    pub fn binary(&self) -> &'static str {
        match self {
            ClientTool::PgDump => "pg_dump",
            ClientTool::Psql => "psql",
        }
    }
}

/// Environment checks used during mode detection.
#[async_trait]
pub trait EnvironmentProbe: Send + Sync {
    /// Executable resolves on the native search path.
    async fn tool_on_path(&self, tool: &str) -> bool;

    /// Container runtime daemon answers.
    async fn runtime_reachable(&self) -> bool;

    fn runtime_name(&self) -> String;
}

/// Probe backed by `which` and the runtime's `info` command.
pub struct SystemProbe {
    runtime: Arc<dyn ContainerRuntime>,
}

impl SystemProbe {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl EnvironmentProbe for SystemProbe {
    async fn tool_on_path(&self, tool: &str) -> bool {
        let tool = tool.to_string();
        tokio::task::spawn_blocking(move || which::which(&tool).is_ok())
            .await
            .unwrap_or(false)
    }

    async fn runtime_reachable(&self) -> bool {
        self.runtime.info().await
    }

    fn runtime_name(&self) -> String {
        self.runtime.runtime_name().to_string()
    }
}

/// One step of mode detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Every required tool is on `PATH`.
    NativeTools,
    /// The container runtime is reachable.
    ContainerRuntime,
}

/// Detection order; the first strategy that resolves wins.
pub const RESOLUTION_ORDER: [ResolutionStrategy; 2] = [
    ResolutionStrategy::NativeTools,
    ResolutionStrategy::ContainerRuntime,
];

/// What a strategy concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Resolved(ExecutionMode),
    Unavailable(String),
}

impl ResolutionStrategy {
    pub async fn attempt(&self, probe: &dyn EnvironmentProbe) -> StrategyOutcome {
        match self {
            ResolutionStrategy::NativeTools => {
                let [dump, psql] = ClientTool::REQUIRED;
                let (has_dump, has_psql) = tokio::join!(
                    probe.tool_on_path(dump.binary()),
                    probe.tool_on_path(psql.binary())
                );
                let missing: Vec<&str> = [(dump, has_dump), (psql, has_psql)]
                    .iter()
                    .filter(|(_, found)| !found)
                    .map(|(tool, _)| tool.binary())
                    .collect();
                if missing.is_empty() {
                    StrategyOutcome::Resolved(ExecutionMode::Native)
                } else {
                    StrategyOutcome::Unavailable(format!("not on PATH: {}", missing.join(", ")))
                }
            }
            ResolutionStrategy::ContainerRuntime => {
                if probe.runtime_reachable().await {
                    StrategyOutcome::Resolved(ExecutionMode::Containerized)
                } else {
                    StrategyOutcome::Unavailable(format!("{} is not reachable", probe.runtime_name()))
                }
            }
        }
    }
}

/// Caller options for [`ExecutionBackend::run_client_command`].
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Turn a non-zero exit into [`MirrorError::CommandFailed`].
    pub reject: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { reject: true }
    }
}

/// Runs client tools natively or through the container runtime.
pub struct ExecutionBackend {
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn EnvironmentProbe>,
    transform: UrlTransform,
    client_image: String,
    mount_dir: String,
    mode: OnceCell<ExecutionMode>,
}

impl ExecutionBackend {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn EnvironmentProbe>,
        transform: UrlTransform,
        client_image: impl Into<String>,
        mount_dir: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            probe,
            transform,
            client_image: client_image.into(),
            mount_dir: mount_dir.into(),
            mode: OnceCell::new(),
        }
    }

    /// Backend for the current host using the system probe.
    pub fn from_config(config: &Config, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let probe = Arc::new(SystemProbe::new(runtime.clone()));
        Self::new(
            runtime,
            probe,
            UrlTransform::from_config(config),
            config.runtime.client_image.clone(),
            config.runtime.mount_dir.clone(),
        )
    }

    /// Skip detection and use `mode`.
    pub fn with_mode(self, mode: ExecutionMode) -> Self {
        Self {
            mode: OnceCell::new_with(Some(mode)),
            ..self
        }
    }

    /// Forget the cached mode.
    pub fn reset(&mut self) {
        self.mode = OnceCell::new();
    }

    /// Cached mode, if detection already ran.
    pub fn cached_mode(&self) -> Option<ExecutionMode> {
        self.mode.get().copied()
    }

    /// Resolved mode, detecting on first use.
    pub async fn mode(&self) -> Result<ExecutionMode> {
        self.mode.get_or_try_init(|| self.resolve()).await.copied()
    }

    async fn resolve(&self) -> Result<ExecutionMode> {
        for strategy in RESOLUTION_ORDER {
            match strategy.attempt(self.probe.as_ref()).await {
                StrategyOutcome::Resolved(mode) => {
                    info!("Running PostgreSQL client tools in {} mode", mode);
                    return Ok(mode);
                }
                StrategyOutcome::Unavailable(reason) => {
                    debug!("{:?} unavailable: {}", strategy, reason);
                }
            }
        }
        Err(MirrorError::NoExecutionBackend {
            runtime: self.probe.runtime_name(),
        })
    }

    pub fn transform(&self) -> &UrlTransform {
        &self.transform
    }

    /// Run `tool` with `args` in the resolved mode.
    pub async fn run_client_command(
        &self,
        tool: ClientTool,
        args: &[String],
        options: RunOptions,
    ) -> Result<CommandOutput> {
        let output = match self.mode().await? {
            ExecutionMode::Native => run_native(&native_invocation(tool.binary(), args)).await?,
            ExecutionMode::Containerized => {
                let cwd = std::env::current_dir()?;
                let invocation = container_invocation(
                    &self.transform,
                    &self.client_image,
                    &self.mount_dir,
                    tool.binary(),
                    args,
                    &cwd,
                );
                if invocation.unreachable_direct_url {
                    warn!(
                        "{} targets a direct connection URL; containers usually cannot reach it \
                         over IPv6. Use the pooled URL instead.",
                        tool.binary()
                    );
                }
                self.runtime.run(&invocation.args).await?
            }
        };

        if options.reject && !output.success() {
            return Err(MirrorError::CommandFailed {
                tool: tool.binary().to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

async fn run_native(argv: &[String]) -> Result<CommandOutput> {
    let (binary, args) = argv
        .split_first()
        .ok_or_else(|| MirrorError::Config("empty command line".to_string()))?;
    debug!("Running {} natively", binary);
    let output = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await?;
    Ok(CommandOutput {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
