//! dbmirror CLI - mirror a hosted PostgreSQL database to a local container.

use clap::{Parser, Subcommand};
use dbmirror::mirror::{self, require_remote_url, resolve_remote_url};
use dbmirror::{
    Config, ConnectionTester, ContainerDescriptor, ContainerRuntime, DatabaseEndpoint, DockerCli,
    ExecutionBackend, InstanceManager, MirrorError, PgConnectionTester, RegionProbe, UrlTransform,
};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "dbmirror")]
#[command(about = "Mirror a hosted PostgreSQL database to a local instance and back")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (optional)
    #[arg(short, long, default_value = "dbmirror.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the pooler region serving a direct connection URL
    DetectRegion {
        /// Direct-form connection URL
        #[arg(long)]
        url: String,
    },

    /// Print the pooled form of a connection URL
    PooledUrl {
        /// Connection URL
        #[arg(long)]
        url: String,

        /// Pooler region; probed when omitted
        #[arg(long)]
        region: Option<String>,
    },

    /// Show where pg_dump and psql will run
    Backend,

    /// Manage the local database instance
    Local {
        #[command(subcommand)]
        action: LocalCommand,
    },

    /// Test a database connection
    HealthCheck {
        /// Connection URL
        #[arg(long)]
        url: String,
    },

    /// Copy the remote database into the local instance
    Pull {
        /// Remote connection URL (default: remote.url from config)
        #[arg(long)]
        url: Option<String>,
    },

    /// Copy the local instance into the remote database
    Push {
        /// Remote connection URL (default: remote.url from config)
        #[arg(long)]
        url: Option<String>,
    },
}

#[derive(Subcommand)]
enum LocalCommand {
    /// Create or start the instance and wait until it accepts connections
    Start,
    /// Stop the instance
    Stop,
    /// Show whether the instance exists and is running
    Status,
    /// Remove the instance and its data volume
    Rm,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MirrorError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(MirrorError::Config)?;

    let config = Config::load_or_default(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let transform = UrlTransform::from_config(&config);
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(config.runtime.binary.clone()));
    let pulling = matches!(cli.command, Commands::Pull { .. });

    match cli.command {
        Commands::DetectRegion { url } => {
            let tenant = transform.extract_tenant_ref(&url).ok_or_else(|| {
                MirrorError::InvalidUrl("no tenant reference in URL host or user".to_string())
            })?;
            let probe = RegionProbe::new(config.provider.clone());
            let results = probe.probe_all(&tenant, &config.provider.regions).await;
            let region = dbmirror::region::select_region(&results).map(str::to_string);

            if cli.output_json {
                let out = json!({ "tenant": tenant, "region": region, "probes": results });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else if let Some(ref region) = region {
                println!("{}", region);
            }

            if region.is_none() {
                return Err(MirrorError::region_not_found(&tenant));
            }
        }

        Commands::PooledUrl { url, region } => {
            if DatabaseEndpoint::parse(&url).is_none() {
                return Err(MirrorError::InvalidUrl(
                    "expected postgres:// or postgresql:// URL".to_string(),
                ));
            }
            let region = region.or_else(|| config.remote.region.clone());
            let probe = RegionProbe::new(config.provider.clone());
            let pooled = resolve_remote_url(&transform, &probe, &url, region.as_deref()).await;
            println!("{}", pooled);
        }

        Commands::Backend => {
            let backend = ExecutionBackend::from_config(&config, runtime);
            let mode = backend.mode().await?;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&json!({ "mode": mode }))?);
            } else {
                println!("{}", mode);
            }
        }

        Commands::Local { action } => {
            let manager = InstanceManager::new(
                runtime,
                Arc::new(PgConnectionTester),
                config.local.clone(),
            );
            let mut instance = ContainerDescriptor::from_config(&config.local);
            match action {
                LocalCommand::Start => {
                    let port = manager.ensure_running(&mut instance).await?;
                    let url = ContainerDescriptor::connection_url(&config.local, port);
                    if cli.output_json {
                        let out = json!({ "instance": instance, "url": url });
                        println!("{}", serde_json::to_string_pretty(&out)?);
                    } else {
                        println!("Local instance {} ready on port {}", instance.name, port);
                        println!("  URL: {}", url);
                    }
                }
                LocalCommand::Stop => {
                    manager.stop(&instance).await?;
                    println!("Local instance {} stopped", instance.name);
                }
                LocalCommand::Status => {
                    let status = manager.status(&instance).await?;
                    if cli.output_json {
                        println!("{}", serde_json::to_string_pretty(&status)?);
                    } else {
                        println!("Local instance {}:", instance.name);
                        println!("  Exists: {}", status.exists);
                        println!("  Running: {}", status.running);
                        match status.port {
                            Some(port) => println!("  Port: {}", port),
                            None => println!("  Port: -"),
                        }
                    }
                }
                LocalCommand::Rm => {
                    manager.remove(&mut instance).await?;
                    println!("Local instance {} removed", instance.name);
                }
            }
        }

        Commands::HealthCheck { url } => {
            let result = PgConnectionTester.test(&url).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  {}: {}",
                    redact(&url),
                    if result.connected { "OK" } else { "FAILED" }
                );
                if let Some(ref version) = result.version {
                    println!("    Version: {}", version);
                }
                if let Some(ref err) = result.error {
                    println!("    Error: {}", err);
                }
            }

            if !result.connected {
                return Err(MirrorError::Config("Health check failed".to_string()));
            }
        }

        Commands::Pull { url } | Commands::Push { url } => {
            let url = url.or_else(|| config.remote.url.clone()).ok_or_else(|| {
                MirrorError::Config("remote URL required: pass --url or set remote.url".to_string())
            })?;
            let probe = RegionProbe::new(config.provider.clone());
            let remote =
                require_remote_url(&transform, &probe, &url, config.remote.region.as_deref())
                    .await?;

            let manager = InstanceManager::new(
                runtime.clone(),
                Arc::new(PgConnectionTester),
                config.local.clone(),
            );
            let mut instance = ContainerDescriptor::from_config(&config.local);
            let port = manager.ensure_running(&mut instance).await?;
            let local = ContainerDescriptor::connection_url(&config.local, port);

            let backend = ExecutionBackend::from_config(&config, runtime);
            let file = if pulling {
                mirror::pull(&backend, &config.mirror, &remote, &local).await?
            } else {
                mirror::push(&backend, &config.mirror, &local, &remote).await?
            };

            if cli.output_json {
                let out = json!({
                    "direction": if pulling { "pull" } else { "push" },
                    "remote": redact(&remote),
                    "local_port": port,
                    "dump_file": file,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{} completed", if pulling { "Pull" } else { "Push" });
                println!("  Remote: {}", redact(&remote));
                println!("  Local port: {}", port);
                println!("  Dump file: {}", file.display());
            }
        }
    }

    Ok(())
}

fn redact(url: &str) -> String {
    DatabaseEndpoint::parse(url)
        .map(|e| e.redacted())
        .unwrap_or_else(|| url.to_string())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries command output.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
