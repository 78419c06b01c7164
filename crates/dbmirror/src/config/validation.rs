//! Configuration validation.

use super::Config;
use crate::endpoint::DatabaseEndpoint;
use crate::error::{MirrorError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if let Some(ref url) = config.remote.url {
        if DatabaseEndpoint::parse(url).is_none() {
            return Err(MirrorError::Config(
                "remote.url must be a postgres:// or postgresql:// URL".into(),
            ));
        }
    }

    if config.provider.regions.is_empty() {
        return Err(MirrorError::Config(
            "provider.regions must list at least one region".into(),
        ));
    }
    if config.provider.probe_timeout_secs == 0 {
        return Err(MirrorError::Config(
            "provider.probe_timeout_secs must be at least 1".into(),
        ));
    }

    if config.local.container_name.is_empty() {
        return Err(MirrorError::Config("local.container_name is required".into()));
    }
    if config.local.volume_name.is_empty() {
        return Err(MirrorError::Config("local.volume_name is required".into()));
    }
    if config.local.port_start == 0 {
        return Err(MirrorError::Config(
            "local.port_start must be a non-zero port".into(),
        ));
    }
    if config.local.ready_timeout_secs == 0 {
        return Err(MirrorError::Config(
            "local.ready_timeout_secs must be at least 1".into(),
        ));
    }
    if config.local.ready_poll_interval_ms == 0 {
        return Err(MirrorError::Config(
            "local.ready_poll_interval_ms must be at least 1".into(),
        ));
    }

    if !config.runtime.mount_dir.starts_with('/') {
        return Err(MirrorError::Config(format!(
            "runtime.mount_dir must be an absolute path, got '{}'",
            config.runtime.mount_dir
        )));
    }

    Ok(())
}
