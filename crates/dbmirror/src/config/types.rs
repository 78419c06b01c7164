//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::endpoint::DatabaseEndpoint;

/// Regions served by the hosted pooling service.
pub const DEFAULT_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "ca-central-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "eu-central-2",
    "eu-north-1",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "ap-northeast-2",
    "sa-east-1",
];

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote (hosted) database.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Hosting provider naming conventions.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Locally managed instance.
    #[serde(default)]
    pub local: LocalConfig,

    /// Container runtime settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Dump/restore settings.
    #[serde(default)]
    pub mirror: MirrorConfig,
}

/// Remote database configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Connection URL, direct or pooled form.
    #[serde(default)]
    pub url: Option<String>,

    /// Pooler region, when already known.
    #[serde(default)]
    pub region: Option<String>,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = self.url.as_deref().map(|u| match DatabaseEndpoint::parse(u) {
            Some(ep) => ep.redacted(),
            None => "[REDACTED]".to_string(),
        });
        f.debug_struct("RemoteConfig")
            .field("url", &url)
            .field("region", &self.region)
            .finish()
    }
}

/// Hosting provider hostname conventions.
///
/// Direct hosts look like `db.<tenant>.<direct_domain>`, pooled hosts like
/// `<pooler_host_prefix><region>.<pooler_domain>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_direct_domain")]
    pub direct_domain: String,

    #[serde(default = "default_pooler_domain")]
    pub pooler_domain: String,

    #[serde(default = "default_pooler_prefix")]
    pub pooler_host_prefix: String,

    /// Session-mode pooler port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub pooler_port: u16,

    /// Candidate regions, probed in this order.
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,

    /// Per-region probe timeout in seconds (default: 5).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Error text the pooler sends for an unknown tenant.
    #[serde(default = "default_tenant_marker")]
    pub tenant_not_found_marker: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            direct_domain: default_direct_domain(),
            pooler_domain: default_pooler_domain(),
            pooler_host_prefix: default_pooler_prefix(),
            pooler_port: default_pg_port(),
            regions: default_regions(),
            probe_timeout_secs: default_probe_timeout(),
            tenant_not_found_marker: default_tenant_marker(),
        }
    }
}

impl ProviderConfig {
    /// Pooler hostname for a region.
    pub fn pooler_host(&self, region: &str) -> String {
        format!("{}{}.{}", self.pooler_host_prefix, region, self.pooler_domain)
    }
}

/// Locally managed instance configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_container_name")]
    pub container_name: String,

    #[serde(default = "default_volume_name")]
    pub volume_name: String,

    #[serde(default = "default_image")]
    pub image: String,

    /// First port tried when allocating a host port (default: 54320).
    #[serde(default = "default_port_start")]
    pub port_start: u16,

    #[serde(default = "default_postgres")]
    pub user: String,

    #[serde(default = "default_postgres")]
    pub password: String,

    #[serde(default = "default_postgres")]
    pub database: String,

    /// Readiness wait bound in seconds (default: 30).
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,

    /// Readiness poll interval in milliseconds (default: 1000).
    #[serde(default = "default_ready_interval")]
    pub ready_poll_interval_ms: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            container_name: default_container_name(),
            volume_name: default_volume_name(),
            image: default_image(),
            port_start: default_port_start(),
            user: default_postgres(),
            password: default_postgres(),
            database: default_postgres(),
            ready_timeout_secs: default_ready_timeout(),
            ready_poll_interval_ms: default_ready_interval(),
        }
    }
}

impl fmt::Debug for LocalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalConfig")
            .field("container_name", &self.container_name)
            .field("volume_name", &self.volume_name)
            .field("image", &self.image)
            .field("port_start", &self.port_start)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("ready_timeout_secs", &self.ready_timeout_secs)
            .field("ready_poll_interval_ms", &self.ready_poll_interval_ms)
            .finish()
    }
}

/// Container runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Runtime CLI executable (default: "docker").
    #[serde(default = "default_runtime_binary")]
    pub binary: String,

    /// Image used for one-shot client tool runs.
    #[serde(default = "default_image")]
    pub client_image: String,

    /// In-container directory where `--file` arguments are mounted.
    #[serde(default = "default_mount_dir")]
    pub mount_dir: String,

    /// Hostname containers use to reach the host on non-Linux platforms.
    #[serde(default = "default_host_alias")]
    pub host_alias: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: default_runtime_binary(),
            client_image: default_image(),
            mount_dir: default_mount_dir(),
            host_alias: default_host_alias(),
        }
    }
}

/// Dump/restore configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    #[serde(default = "default_dump_file")]
    pub dump_file: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            dump_file: default_dump_file(),
        }
    }
}

impl MirrorConfig {
    /// Full path of the dump file.
    pub fn dump_path(&self) -> PathBuf {
        self.work_dir.join(&self.dump_file)
    }
}

fn default_direct_domain() -> String {
    "supabase.co".to_string()
}

fn default_pooler_domain() -> String {
    "pooler.supabase.com".to_string()
}

fn default_pooler_prefix() -> String {
    "aws-0-".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_regions() -> Vec<String> {
    DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect()
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_tenant_marker() -> String {
    "Tenant or user not found".to_string()
}

fn default_container_name() -> String {
    "dbmirror-postgres".to_string()
}

fn default_volume_name() -> String {
    "dbmirror-data".to_string()
}

fn default_image() -> String {
    "postgres:17".to_string()
}

fn default_port_start() -> u16 {
    54320
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_ready_timeout() -> u64 {
    30
}

fn default_ready_interval() -> u64 {
    1000
}

fn default_runtime_binary() -> String {
    "docker".to_string()
}

fn default_mount_dir() -> String {
    "/backup".to_string()
}

fn default_host_alias() -> String {
    "host.docker.internal".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".dbmirror")
}

fn default_dump_file() -> String {
    "dump.sql".to_string()
}
