//! Sensor Host binary.
//!
//! Runs the built-in sources behind a publish server until interrupted.
//! On Unix, SIGHUP re-reads the configuration file and reconfigures.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sensor_host::{
    HostConfig, SensorHost, SourceRegistry, SystemSource, ThermalSource, DEFAULT_PORT,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "sensor_host")]
#[command(about = "Publishes sensor readings as static JSON over HTTP")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Source to publish (repeatable)
    #[arg(short, long = "sensor")]
    sensors: Vec<String>,

    /// Publish server port
    #[arg(short, long)]
    port: Option<i64>,

    /// Refresh interval in seconds
    #[arg(short, long)]
    refresh: Option<f64>,

    /// Directory under which snapshot directories are created
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll and serve until interrupted (default)
    Serve,

    /// List the sources this binary can publish
    ListSources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let registry = builtin_registry();
    match &cli.command {
        Some(Commands::ListSources) => {
            for name in registry.names() {
                println!("{}", name);
            }
            Ok(())
        }
        Some(Commands::Serve) | None => serve_command(&cli, registry).await,
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn builtin_registry() -> SourceRegistry {
    SourceRegistry::new()
        .with_source(Arc::new(SystemSource::new("system")))
        .with_source(Arc::new(ThermalSource::new("thermal")))
}

/// Merge the configuration file (if any) with command-line overrides.
fn load_config(cli: &Cli) -> anyhow::Result<HostConfig> {
    let mut config = match &cli.config {
        Some(path) => HostConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => HostConfig::new(["system"], i64::from(DEFAULT_PORT)),
    };

    if !cli.sensors.is_empty() {
        config.sensors = cli.sensors.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(refresh) = cli.refresh {
        config.refresh = Some(refresh);
    }
    if let Some(base_dir) = &cli.base_dir {
        config.base_dir = Some(base_dir.clone());
    }
    if cli.no_cors {
        config.enable_cors = false;
    }
    Ok(config)
}

async fn serve_command(cli: &Cli, registry: SourceRegistry) -> anyhow::Result<()> {
    let host = SensorHost::new(registry);
    let config = load_config(cli)?;
    let status = host
        .configure(&config)
        .await
        .context("Failed to start sensor host")?;

    info!("Serving snapshots from {}", status.temp_dir);
    for sensor in &status.sensors {
        info!("  - http://0.0.0.0:{}/{}/current.json", status.port, sensor);
    }

    wait_for_signals(cli, &host).await?;

    host.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signals(cli: &Cli, host: &SensorHost) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => return result.context("Failed to wait for Ctrl-C"),
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading configuration");
                // A reload that fails to start leaves nothing running until the next SIGHUP.
                match load_config(cli) {
                    Ok(config) => {
                        if let Err(e) = host.configure(&config).await {
                            error!("Reconfiguration failed: {}", e);
                        }
                    }
                    Err(e) => error!("{:#}", e),
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(_cli: &Cli, _host: &SensorHost) -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")
}
