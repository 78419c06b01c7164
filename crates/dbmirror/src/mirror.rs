//! Dump and restore between the remote database and the local instance.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::backend::{ClientTool, ExecutionBackend, RunOptions};
use crate::config::MirrorConfig;
use crate::endpoint::{DatabaseEndpoint, UrlTransform};
use crate::error::{MirrorError, Result};
use crate::region::RegionProbe;

/// Rewrite a direct-form remote URL to pooled form, probing for the region
/// when none is given.
///
/// Returns the input unchanged when it is not direct form or no region
/// could be found.
pub async fn resolve_remote_url(
    transform: &UrlTransform,
    probe: &RegionProbe,
    url: &str,
    region: Option<&str>,
) -> String {
    match require_remote_url(transform, probe, url, region).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("{}", e);
            url.to_string()
        }
    }
}

/// Like [`resolve_remote_url`], but a direct-form URL whose region cannot be
/// found is an error instead of being passed through.
pub async fn require_remote_url(
    transform: &UrlTransform,
    probe: &RegionProbe,
    url: &str,
    region: Option<&str>,
) -> Result<String> {
    if !transform.is_direct_form(url) {
        return Ok(url.to_string());
    }
    if let Some(region) = region {
        return Ok(transform.ensure_pooled_form(url, Some(region)));
    }

    let tenant = transform.extract_tenant_ref(url).ok_or_else(|| {
        MirrorError::InvalidUrl("no tenant reference in URL host or user".to_string())
    })?;
    match probe
        .detect_region(&tenant, &transform.provider().regions)
        .await
    {
        Some(region) => Ok(transform.ensure_pooled_form(url, Some(&region))),
        None => Err(MirrorError::region_not_found(&tenant)),
    }
}

/// `pg_dump` `url` into `file` as a plain SQL script.
pub async fn dump(backend: &ExecutionBackend, url: &str, file: &Path) -> Result<()> {
    info!("Dumping {} to {}", redact(url), file.display());
    let args = vec![
        "--clean".to_string(),
        "--if-exists".to_string(),
        "--no-owner".to_string(),
        "--no-privileges".to_string(),
        "--file".to_string(),
        file.display().to_string(),
        "--dbname".to_string(),
        url.to_string(),
    ];
    backend
        .run_client_command(ClientTool::PgDump, &args, RunOptions { reject: true })
        .await?;
    Ok(())
}

/// Replay `file` into `url` with `psql`.
///
/// Hosted dumps reference roles and extensions a plain instance lacks. psql
/// reports those on stderr but still exits 0, so they are only logged. A
/// non-zero exit means psql could not connect or read the file.
pub async fn restore(backend: &ExecutionBackend, url: &str, file: &Path) -> Result<()> {
    info!("Restoring {} into {}", file.display(), redact(url));
    let args = vec![
        "--dbname".to_string(),
        url.to_string(),
        "--file".to_string(),
        file.display().to_string(),
        "--quiet".to_string(),
    ];
    let output = backend
        .run_client_command(ClientTool::Psql, &args, RunOptions { reject: true })
        .await?;
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        warn!("psql reported: {}", stderr);
    }
    Ok(())
}

/// Copy the remote database into the local instance. Returns the dump path.
pub async fn pull(
    backend: &ExecutionBackend,
    mirror: &MirrorConfig,
    remote_url: &str,
    local_url: &str,
) -> Result<PathBuf> {
    let file = prepare_dump_path(mirror).await?;
    dump(backend, remote_url, &file).await?;
    restore(backend, local_url, &file).await?;
    info!("Pulled remote database into the local instance");
    Ok(file)
}

/// Copy the local instance into the remote database. Returns the dump path.
pub async fn push(
    backend: &ExecutionBackend,
    mirror: &MirrorConfig,
    local_url: &str,
    remote_url: &str,
) -> Result<PathBuf> {
    let file = prepare_dump_path(mirror).await?;
    dump(backend, local_url, &file).await?;
    restore(backend, remote_url, &file).await?;
    info!("Pushed the local instance to the remote database");
    Ok(file)
}

async fn prepare_dump_path(mirror: &MirrorConfig) -> Result<PathBuf> {
    tokio::fs::create_dir_all(&mirror.work_dir).await?;
    Ok(mirror.dump_path())
}

fn redact(url: &str) -> String {
    DatabaseEndpoint::parse(url)
        .map(|e| e.redacted())
        .unwrap_or_else(|| "[invalid url]".to_string())
}
