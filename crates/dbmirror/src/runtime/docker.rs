//! Docker CLI implementation of [`ContainerRuntime`].

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::{
    CommandOutput, ContainerRuntime, ContainerState, CreateSpec, CONTAINER_DATA_DIR,
    CONTAINER_PG_PORT,
};
use crate::endpoint::DatabaseEndpoint;
use crate::error::{MirrorError, Result};

/// Runtime driven through the `docker` CLI (or a drop-in like `podman`).
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn exec(&self, args: &[String]) -> Result<CommandOutput> {
        debug!("{} {}", self.binary, redact_args(args).join(" "));
        let output = Command::new(&self.binary)
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

    /// Run and turn a non-zero exit into a `Runtime` error.
    async fn exec_checked(&self, args: Vec<String>) -> Result<CommandOutput> {
        let output = self.exec(&args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(MirrorError::runtime(
                format!("{} {}", self.binary, redact_args(&args).join(" ")),
                output.stderr.trim().to_string(),
            ))
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn inspect(&self, name: &str) -> Result<ContainerState> {
        let output = self.exec(&inspect_args(name)).await?;
        if output.success() {
            Ok(parse_running(&output.stdout))
        } else if output.stderr.to_lowercase().contains("no such") {
            Ok(ContainerState::Absent)
        } else {
            Err(MirrorError::runtime(
                format!("{} inspect {}", self.binary, name),
                output.stderr.trim().to_string(),
            ))
        }
    }

    async fn mapped_port(&self, name: &str) -> Result<Option<u16>> {
        let target = format!("{}/tcp", CONTAINER_PG_PORT);
        let output = self.exec(&strings(&["port", name, &target])).await?;
        if !output.success() {
            return Ok(None);
        }
        Ok(parse_port_output(&output.stdout))
    }

    async fn create(&self, spec: &CreateSpec) -> Result<()> {
        self.exec_checked(create_args(spec)).await.map(|_| ())
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.exec_checked(strings(&["start", name])).await.map(|_| ())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.exec_checked(strings(&["stop", name])).await.map(|_| ())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.exec_checked(strings(&["rm", "-f", name])).await.map(|_| ())
    }

    async fn remove_volume(&self, volume: &str) -> Result<()> {
        self.exec_checked(strings(&["volume", "rm", volume]))
            .await
            .map(|_| ())
    }

    async fn info(&self) -> bool {
        match self.exec(&strings(&["info"])).await {
            Ok(output) => output.success(),
            Err(e) => {
                debug!("{} info failed: {}", self.binary, e);
                false
            }
        }
    }

    async fn run(&self, args: &[String]) -> Result<CommandOutput> {
        self.exec(args).await
    }

    fn runtime_name(&self) -> &str {
        &self.binary
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

/// `docker run -d` arguments for a database container.
pub(crate) fn create_args(spec: &CreateSpec) -> Vec<String> {
    vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "-v".to_string(),
        format!("{}:{}", spec.volume, CONTAINER_DATA_DIR),
        "-p".to_string(),
        format!("{}:{}", spec.host_port, CONTAINER_PG_PORT),
        "-e".to_string(),
        format!("POSTGRES_USER={}", spec.user),
        "-e".to_string(),
        format!("POSTGRES_PASSWORD={}", spec.password),
        "-e".to_string(),
        format!("POSTGRES_DB={}", spec.database),
        spec.image.clone(),
    ]
}

/// Restricted to containers so a same-named image or volume reads as absent.
fn inspect_args(name: &str) -> Vec<String> {
    strings(&[
        "inspect",
        "--type",
        "container",
        "--format",
        "{{.State.Running}}",
        name,
    ])
}

/// Output of `inspect --format {{.State.Running}}`.
fn parse_running(stdout: &str) -> ContainerState {
    if stdout.trim() == "true" {
        ContainerState::Running
    } else {
        ContainerState::Stopped
    }
}

/// First host port in `docker port` output such as `0.0.0.0:54320\n[::]:54320`.
fn parse_port_output(stdout: &str) -> Option<u16> {
    stdout
        .lines()
        .filter_map(|line| line.trim().rsplit_once(':'))
        .find_map(|(_, port)| port.parse().ok())
}

/// Mask credential environment values and connection URLs before logging.
fn redact_args(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|a| {
            if let Some(ep) = DatabaseEndpoint::parse(a) {
                return ep.redacted();
            }
            match a.split_once('=') {
                Some((key, _)) if key.ends_with("PASSWORD") => format!("{}=[REDACTED]", key),
                Some((flag, value)) if flag.starts_with('-') => match DatabaseEndpoint::parse(value) {
                    Some(ep) => format!("{}={}", flag, ep.redacted()),
                    None => a.clone(),
                },
                _ => a.clone(),
            }
        })
        .collect()
}
