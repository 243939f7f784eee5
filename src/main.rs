//! `phase-timeout` command line.
//!
//! ```text
//! check <config>      validate a config file and print it as JSON
//! simulate <config>   play a scripted request lifecycle on a virtual clock
//! watch <config>      follow a config file and log each reload
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use phase_timeout::config::{load_config, ConfigWatcher, LiveConfig, SupervisorConfig};
use phase_timeout::observability::{init_logging, metrics};
use phase_timeout::sim::Scenario;
use phase_timeout::ConnectionContext;

#[derive(Parser)]
#[command(name = "phase-timeout")]
#[command(about = "Phase-based request timeout supervisor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file and print the effective config
    Check { config: PathBuf },
    /// Run a scripted request lifecycle against the configured delays
    Simulate(SimulateArgs),
    /// Watch a config file and log each reload until Ctrl-C
    Watch { config: PathBuf },
}

/// Offsets are milliseconds after attach; an omitted signal never happens.
#[derive(Args)]
struct SimulateArgs {
    config: PathBuf,
    #[arg(long, default_value = "example.com")]
    host: String,
    /// Target a literal IP address instead of `--host`
    #[arg(long)]
    ip_literal: bool,
    /// Use https
    #[arg(long)]
    secure: bool,
    /// Start on an already established keep-alive connection
    #[arg(long)]
    reused: bool,
    /// Connect through a unix domain socket
    #[arg(long)]
    unix_socket: bool,
    /// Transport lacks a native idle timeout
    #[arg(long)]
    no_idle_primitive: bool,
    #[arg(long, value_name = "MS")]
    lookup: Option<u64>,
    #[arg(long)]
    lookup_fails: bool,
    #[arg(long, value_name = "MS")]
    connect: Option<u64>,
    #[arg(long, value_name = "MS")]
    secure_connect: Option<u64>,
    #[arg(long, value_name = "MS")]
    upload: Option<u64>,
    #[arg(long, value_name = "MS")]
    response: Option<u64>,
    #[arg(long, value_name = "MS")]
    end: Option<u64>,
    #[arg(long, value_name = "MS")]
    horizon: Option<u64>,
}

impl SimulateArgs {
    fn scenario(&self) -> Scenario {
        let host = if self.ip_literal { "192.0.2.1" } else { self.host.as_str() };
        let protocol = if self.secure { "https" } else { "http" };
        Scenario {
            context: ConnectionContext::new(host, protocol),
            reused: self.reused,
            unix_socket: self.unix_socket,
            no_idle_primitive: self.no_idle_primitive,
            lookup_ms: self.lookup,
            lookup_fails: self.lookup_fails,
            connect_ms: self.connect,
            secure_connect_ms: self.secure_connect,
            upload_ms: self.upload,
            response_ms: self.response,
            end_ms: self.end,
            horizon_ms: self.horizon,
        }
    }
}

fn load(path: &Path) -> Result<SupervisorConfig, Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    init_logging(&config.observability)?;
    metrics::set_enabled(config.observability.metrics_enabled);
    tracing::info!(
        path = %path.display(),
        phases = config.delays.enabled().count(),
        "Configuration loaded"
    );
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => {
            let config = load(&config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Simulate(args) => {
            let config = load(&args.config)?;
            let outcome = args.scenario().run(&config.delays);
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Watch { config: path } => {
            let live = Arc::new(LiveConfig::new(load(&path)?));
            let (watcher, mut changes) = ConfigWatcher::new(&path, Arc::clone(&live));
            let _watcher = watcher.run()?;

            loop {
                tokio::select! {
                    change = changes.recv() => {
                        let Some(change) = change else { break };
                        metrics::set_enabled(change.current.observability.metrics_enabled);
                        tracing::info!(
                            changed = ?change.changed_phases(),
                            delays = ?live.delays(),
                            "Delays reloaded"
                        );
                    }
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
