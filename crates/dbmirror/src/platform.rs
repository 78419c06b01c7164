//! Host operating system classification for container networking.

use serde::Serialize;

/// Host platform as far as container networking is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPlatform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl HostPlatform {
    /// Platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            HostPlatform::Linux
        } else if cfg!(target_os = "macos") {
            HostPlatform::MacOs
        } else if cfg!(target_os = "windows") {
            HostPlatform::Windows
        } else {
            HostPlatform::Other
        }
    }

    /// Containers can join the host network namespace and reach its loopback.
    ///
    /// Desktop runtimes on macOS/Windows run containers inside a VM, so
    /// `--network host` does not expose the host's loopback there.
    pub fn shares_host_network(&self) -> bool {
        matches!(self, HostPlatform::Linux)
    }
}
