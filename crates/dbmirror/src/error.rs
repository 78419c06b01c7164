//! Error types for the mirroring library.

use thiserror::Error;

/// Main error type for mirroring operations.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Configuration error (invalid YAML, bad values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A connection URL could not be parsed
    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    /// Neither native client tools nor a container runtime are usable
    #[error(
        "No execution backend available: pg_dump and psql were not found on PATH \
         and the container runtime '{runtime}' is not reachable.\n  \
         Fix one of:\n    - install and start Docker (or a compatible runtime)\n    \
         - install the PostgreSQL client tools (pg_dump, psql)"
    )]
    NoExecutionBackend { runtime: String },

    /// No free port in the scanned window
    #[error("No free port in range {start}-{end}")]
    PortExhausted { start: u16, end: u16 },

    /// Container runtime invocation failed
    #[error("Container runtime error: {message}\n  Command: {command}")]
    Runtime { command: String, message: String },

    /// Local instance did not accept connections in time
    #[error("Instance {name} was not ready after {waited_secs}s")]
    ReadinessTimeout { name: String, waited_secs: u64 },

    /// A wrapped client tool exited non-zero
    #[error("{tool} exited with code {code}: {stderr}")]
    CommandFailed {
        tool: String,
        code: i32,
        stderr: String,
    },

    /// Lifecycle operation requested on an instance this tool does not own
    #[error("Instance {0} is not managed by dbmirror")]
    Unmanaged(String),

    /// PostgreSQL client error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// IO error (process spawn, sockets, files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MirrorError {
    /// Create a Runtime error for a failed container runtime command.
    pub fn runtime(command: impl Into<String>, message: impl Into<String>) -> Self {
        MirrorError::Runtime {
            command: command.into(),
            message: message.into(),
        }
    }

    /// No candidate pooler recognised the tenant.
    pub fn region_not_found(tenant: &str) -> Self {
        MirrorError::Config(format!(
            "No pooler region recognised tenant {}; set remote.region manually",
            tenant
        ))
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MirrorError::Config(_) | MirrorError::InvalidUrl(_) | MirrorError::Yaml(_) => 2,
            MirrorError::NoExecutionBackend { .. } => 3,
            MirrorError::ReadinessTimeout { .. } => 4,
            MirrorError::CommandFailed { .. } => 5,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for mirroring operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_backend_names_both_remedies() {
        let err = MirrorError::NoExecutionBackend {
            runtime: "docker".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Docker"));
        assert!(msg.contains("pg_dump"));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_readiness_timeout_mentions_bound() {
        let err = MirrorError::ReadinessTimeout {
            name: "dbmirror-postgres".into(),
            waited_secs: 30,
        };
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "docker: not found");
        let err = MirrorError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error"));
    }
}
