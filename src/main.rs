use std::path::PathBuf;
use std::sync::OnceLock;

use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use cronfleet::config::{Config, DEFAULT_CONFIG_PATH};
use cronfleet::coordinator::CoordinatorContext;
use cronfleet::error::{FleetError, Result};
use cronfleet::shutdown::install_shutdown_handler;
use cronfleet::worker::WorkerContext;

#[derive(Parser, Debug)]
#[command(name = "cronfleet")]
#[command(about = "Distributed cron control plane")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Run the coordinator: operator API, worker registry, liveness loop
    Coordinator,
    /// Run a worker: a local cron scheduler driven by the coordinator
    Worker,
}

/// Keeps the non-blocking appender flushing for the life of the process.
static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if config.log.filename.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(());
    }

    // Opened eagerly so a bad path fails the process at startup instead of
    // silently dropping log lines later.
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log.filename)
        .map_err(|e| FleetError::Config(format!("open log file {}: {e}", config.log.filename)))?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stdout.and(writer))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;
    init_logging(&config)?;

    let role = match args.role {
        Role::Coordinator => "coordinator",
        Role::Worker => "worker",
    };
    let shutdown = install_shutdown_handler(role);

    match args.role {
        Role::Coordinator => {
            tracing::info!(
                api = %config.api.uri,
                rpc = %config.server.uri,
                ping_interval_secs = config.server.ping_interval_seconds,
                "starting coordinator"
            );
            CoordinatorContext::new(config).run(shutdown).await
        }
        Role::Worker => {
            tracing::info!(
                rpc = %config.worker.uri,
                name = %config.worker.name,
                coordinator = %config.server.uri,
                "starting worker"
            );
            WorkerContext::new(config).run(shutdown).await
        }
    }
}
