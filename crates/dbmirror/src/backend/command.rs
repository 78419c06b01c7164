//! Building the argument vector for a client tool run.
//!
//! Native runs pass arguments through untouched. Containerized runs wrap them
//! in `docker run --rm`: connection URLs are rewritten for container
//! networking, `--file` paths are bind-mounted, and network flags come from
//! the caller's original URL.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::endpoint::{DatabaseEndpoint, UrlTransform};

/// Flags whose value is a host file path.
const FILE_FLAGS: &[&str] = &["--file", "-f"];

/// Runtime arguments for one containerized tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInvocation {
    pub args: Vec<String>,
    /// The caller passed a direct-form URL, which containers usually cannot
    /// reach over IPv6.
    pub unreachable_direct_url: bool,
}

/// Build `<tool> <args>` for a run on the host. Nothing is rewritten.
pub fn native_invocation(tool: &str, args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len() + 1);
    out.push(tool.to_string());
    out.extend(args.iter().cloned());
    out
}

/// Build `run --rm [network] [mounts] <image> <tool> <args>`.
///
/// Relative `--file` paths resolve against `cwd`.
pub fn container_invocation(
    transform: &UrlTransform,
    image: &str,
    mount_dir: &str,
    tool: &str,
    args: &[String],
    cwd: &Path,
) -> ContainerInvocation {
    let original_url = args.iter().find_map(|a| url_in_arg(a)).map(str::to_string);

    let mut mounts = Mounts::new(mount_dir, cwd);
    let mut rewritten = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if FILE_FLAGS.contains(&arg.as_str()) {
            rewritten.push(arg.clone());
            if let Some(path) = iter.next() {
                rewritten.push(mounts.container_path(path));
            }
            continue;
        }
        if let Some(path) = arg.strip_prefix("--file=") {
            rewritten.push(format!("--file={}", mounts.container_path(path)));
            continue;
        }
        rewritten.push(rewrite_url_arg(transform, arg));
    }

    let mut out = vec!["run".to_string(), "--rm".to_string()];
    if let Some(ref url) = original_url {
        out.extend(transform.container_network_args(url));
    }
    for (host_dir, container_dir) in mounts.into_volumes() {
        out.push("-v".to_string());
        out.push(format!("{}:{}", host_dir.display(), container_dir));
    }
    out.push(image.to_string());
    out.push(tool.to_string());
    out.extend(rewritten);

    ContainerInvocation {
        args: out,
        unreachable_direct_url: original_url
            .as_deref()
            .map(|u| transform.is_direct_form(u))
            .unwrap_or(false),
    }
}

/// The connection URL carried by an argument, bare or as `--flag=<url>`.
fn url_in_arg(arg: &str) -> Option<&str> {
    if DatabaseEndpoint::looks_like_url(arg) {
        return Some(arg);
    }
    match arg.split_once('=') {
        Some((flag, value)) if flag.starts_with('-') && DatabaseEndpoint::looks_like_url(value) => {
            Some(value)
        }
        _ => None,
    }
}

fn rewrite_url_arg(transform: &UrlTransform, arg: &str) -> String {
    if DatabaseEndpoint::looks_like_url(arg) {
        return transform.rewrite_host_for_container_networking(arg);
    }
    match arg.split_once('=') {
        Some((flag, value)) if flag.starts_with('-') && DatabaseEndpoint::looks_like_url(value) => {
            format!("{}={}", flag, transform.rewrite_host_for_container_networking(value))
        }
        _ => arg.to_string(),
    }
}

/// Host directories mounted into the container, first one at `mount_dir`.
struct Mounts<'a> {
    mount_dir: &'a str,
    cwd: &'a Path,
    dirs: Vec<(PathBuf, String)>,
    index: HashMap<PathBuf, usize>,
}

impl<'a> Mounts<'a> {
    fn new(mount_dir: &'a str, cwd: &'a Path) -> Self {
        Self {
            mount_dir: mount_dir.trim_end_matches('/'),
            cwd,
            dirs: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// In-container path for a host path, registering its directory.
    fn container_path(&mut self, host_path: &str) -> String {
        let path = Path::new(host_path);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        };
        let file_name = absolute
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.cwd.to_path_buf());

        let slot = match self.index.get(&dir) {
            Some(&i) => i,
            None => {
                let i = self.dirs.len();
                let container_dir = if i == 0 {
                    self.mount_dir.to_string()
                } else {
                    format!("{}{}", self.mount_dir, i)
                };
                self.dirs.push((dir.clone(), container_dir));
                self.index.insert(dir, i);
                i
            }
        };
        format!("{}/{}", self.dirs[slot].1, file_name)
    }

    fn into_volumes(self) -> Vec<(PathBuf, String)> {
        self.dirs
    }
}
