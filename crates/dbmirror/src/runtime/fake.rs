//! In-memory runtime for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{CommandOutput, ContainerRuntime, ContainerState, CreateSpec};
use crate::error::{MirrorError, Result};

#[derive(Debug, Clone)]
struct FakeContainer {
    running: bool,
    port: u16,
    volume: String,
}

#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<HashMap<String, FakeContainer>>,
    volumes: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    runs: Mutex<Vec<Vec<String>>>,
    pub reachable: bool,
    pub fail_create: bool,
    pub fail_volume_removal: bool,
    pub run_exit_code: i32,
    /// Stderr for `run`; defaults to a role error when the exit code is non-zero.
    pub run_stderr: String,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            reachable: true,
            ..Self::default()
        }
    }

    /// Seed an existing container.
    pub fn with_container(self, name: &str, volume: &str, port: u16, running: bool) -> Self {
        self.containers.lock().unwrap().insert(
            name.to_string(),
            FakeContainer {
                running,
                port,
                volume: volume.to_string(),
            },
        );
        self.volumes.lock().unwrap().insert(volume.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn runs(&self) -> Vec<Vec<String>> {
        self.runs.lock().unwrap().clone()
    }

    pub fn has_volume(&self, volume: &str) -> bool {
        self.volumes.lock().unwrap().contains(volume)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn inspect(&self, name: &str) -> Result<ContainerState> {
        self.record(format!("inspect {}", name));
        Ok(match self.containers.lock().unwrap().get(name) {
            None => ContainerState::Absent,
            Some(c) if c.running => ContainerState::Running,
            Some(_) => ContainerState::Stopped,
        })
    }

    async fn mapped_port(&self, name: &str) -> Result<Option<u16>> {
        self.record(format!("port {}", name));
        Ok(self
            .containers
            .lock()
            .unwrap()
            .get(name)
            .filter(|c| c.running)
            .map(|c| c.port))
    }

    async fn create(&self, spec: &CreateSpec) -> Result<()> {
        self.record(format!("create {} {}", spec.name, spec.host_port));
        if self.fail_create {
            return Err(MirrorError::runtime("docker run -d", "port is already allocated"));
        }
        self.containers.lock().unwrap().insert(
            spec.name.clone(),
            FakeContainer {
                running: true,
                port: spec.host_port,
                volume: spec.volume.clone(),
            },
        );
        self.volumes.lock().unwrap().insert(spec.volume.clone());
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.record(format!("start {}", name));
        match self.containers.lock().unwrap().get_mut(name) {
            Some(c) => {
                c.running = true;
                Ok(())
            }
            None => Err(MirrorError::runtime("docker start", "No such container")),
        }
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.record(format!("stop {}", name));
        if let Some(c) = self.containers.lock().unwrap().get_mut(name) {
            c.running = false;
        }
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.record(format!("rm {}", name));
        self.containers.lock().unwrap().remove(name);
        Ok(())
    }

    async fn remove_volume(&self, volume: &str) -> Result<()> {
        self.record(format!("volume rm {}", volume));
        let in_use = self
            .containers
            .lock()
            .unwrap()
            .values()
            .any(|c| c.volume == volume);
        if self.fail_volume_removal || in_use || !self.volumes.lock().unwrap().remove(volume) {
            return Err(MirrorError::runtime("docker volume rm", "no such volume"));
        }
        Ok(())
    }

    async fn info(&self) -> bool {
        self.reachable
    }

    async fn run(&self, args: &[String]) -> Result<CommandOutput> {
        self.runs.lock().unwrap().push(args.to_vec());
        Ok(CommandOutput {
            code: self.run_exit_code,
            stdout: String::new(),
            stderr: if !self.run_stderr.is_empty() {
                self.run_stderr.clone()
            } else if self.run_exit_code == 0 {
                String::new()
            } else {
                "ERROR: role \"supabase_admin\" does not exist".to_string()
            },
        })
    }

    fn runtime_name(&self) -> &str {
        "fake"
    }
}
