use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tracing::{error, info, warn};

use uart2ip::config::{get_default_config_path, ConfigLoader};
use uart2ip::logging::init_tracing;
use uart2ip::port::{list_ports, TokioSerialPort};
use uart2ip::{Config, Gateway, GatewayError, GatewayResult};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Bridge TCP clients to a device behind a half-duplex UART.",
    long_about = "Accepts one command per TCP connection, streams it to the device in \
                  acknowledged chunks, and returns the device's result on the same connection."
)]
struct Args {
    /// Serial device path, e.g. /dev/ttyUSB0 or COM3.
    #[arg(short, long)]
    device: Option<String>,

    /// Serial baud rate.
    #[arg(short, long)]
    baud: Option<u32>,

    /// TCP port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind the listener to.
    #[arg(long)]
    host: Option<String>,

    /// Configuration file (overrides the standard search path).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive, e.g. "debug" or "uart2ip=trace".
    #[arg(long)]
    log_level: Option<String>,

    /// List available serial ports and exit.
    #[arg(long)]
    list_ports: bool,

    /// Write the effective configuration to a file and exit.
    /// Without a path, the user config location is used.
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    init_config: Option<Option<PathBuf>>,
}

// --- Main Application Entry Point ---
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(args: Args) -> GatewayResult<()> {
    if args.list_ports {
        for name in list_ports()? {
            println!("{name}");
        }
        return Ok(());
    }

    let mut loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    apply_args(loader.config_mut(), &args);

    if let Some(target) = &args.init_config {
        let path = match target.clone().or_else(get_default_config_path) {
            Some(path) => path,
            None => {
                return Err(uart2ip::ConfigError::validation(
                    "--init-config",
                    "no config directory found, pass a path",
                )
                .into())
            }
        };
        loader.save_to(&path)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let config_path = loader.config_path.clone();
    let config = loader.into_validated()?;
    init_tracing(&config.logging)?;

    match &config_path {
        Some(path) => info!(path = %path.display(), "Loaded configuration"),
        None => info!("Using built-in configuration defaults"),
    }

    let port = TokioSerialPort::open(&config.serial.device, &config.serial.port_configuration())
        .map_err(|e| {
            error!(device = %config.serial.device, error = %e, "No device connected");
            GatewayError::from(e)
        })?;
    info!(
        device = %config.serial.device,
        baud_rate = config.serial.baud_rate,
        "Serial device opened"
    );

    let gateway = Gateway::bind(&config, Box::new(port)).await?;
    gateway.run(shutdown_signal()).await
}

/// CLI flags win over file and environment.
fn apply_args(config: &mut Config, args: &Args) {
    if let Some(device) = &args.device {
        config.serial.device = device.clone();
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Signal received, starting graceful shutdown");
}
