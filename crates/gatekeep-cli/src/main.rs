//! `gatekeepd`: runs the access engine against the locally attached gate
//! controller.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gatekeep_access::memory::{
    InMemoryAccessLog, InMemorySettings, InMemoryUserDirectory, TracingRealtimeSink,
};
use gatekeep_access::{AccessController, Collaborators, GatekeepConfig};
use gatekeep_hardware::discovery::select_controller_port;
use gatekeep_hardware::serial::SerialPortConnector;
use gatekeep_hardware::{DeviceConnectionManager, SerialConnector};

/// RFID gate access-control daemon.
#[derive(Parser, Debug)]
#[command(name = "gatekeepd", version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "GATEKEEP_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port of the controller; skips discovery
    #[arg(short, long)]
    port: Option<String>,

    /// List serial ports, mark the one discovery would pick, and exit
    #[arg(long)]
    list_ports: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config =
        GatekeepConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.serial.port = Some(port);
    }

    if cli.list_ports {
        return list_ports(&config);
    }

    let users = InMemoryUserDirectory::with_users(
        config
            .directory_entries()
            .context("invalid user directory in configuration")?,
    );

    info!(
        users = config.users.len(),
        port = config.serial.port.as_deref().unwrap_or("auto"),
        "Starting gatekeepd"
    );

    let manager =
        DeviceConnectionManager::new(config.connection_config(), SerialPortConnector::new());
    let (connection, events) = manager.start();

    let controller = AccessController::start(
        config.access_config(),
        connection,
        events,
        Collaborators {
            users: Arc::new(users),
            settings: Arc::new(InMemorySettings::new()),
            access_log: Arc::new(InMemoryAccessLog::new()),
        },
    );
    let _relay = controller.broadcaster().forward_to(Arc::new(TracingRealtimeSink));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    controller.shutdown().await;
    Ok(())
}

fn list_ports(config: &GatekeepConfig) -> anyhow::Result<()> {
    let ports = SerialPortConnector::new()
        .available_ports()
        .context("failed to enumerate serial ports")?;
    let connection = config.connection_config();
    let selected =
        select_controller_port(&ports, &connection.signatures, &connection.path_patterns);

    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in &ports {
        let marker = if selected.as_ref() == Some(port) { "*" } else { " " };
        println!("{marker} {port}");
    }
    Ok(())
}
