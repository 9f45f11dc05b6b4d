//! Swiftmeal CLI - command line client for the delivery API

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::Commands;
use std::path::PathBuf;
use std::time::Duration;
use swiftmeal_http::ClientError;
use swiftmeal_http::client::payments::PaymentError;
use tracing::{Level, debug, error, info};

#[derive(Parser)]
#[command(name = "swiftmeal")]
#[command(about = "Track and manage Swiftmeal deliveries")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Data directory for the session, config and logs
    #[arg(short = 'd', long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (defaults to <data-dir>/config.toml when present)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// API base URL, overriding the configuration
    #[arg(long, global = true, env = "SWIFTMEAL_API_URL")]
    api_url: Option<String>,

    /// Timeout for the whole command in seconds (0 = no timeout)
    #[arg(short = 't', long, global = true, default_value = "60")]
    timeout: u64,

    /// Disable file logging (only log to stderr)
    #[arg(long, global = true)]
    no_file_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = config::resolve_data_dir(cli.data_dir);

    logging::init_logging(cli.log_level.into(), &data_dir, cli.no_file_log)?;
    info!(data_dir = %data_dir.display(), "Starting Swiftmeal CLI");

    let context = commands::Context {
        data_dir,
        config_path: cli.config,
        api_url: cli.api_url,
    };

    // Follow mode runs until interrupted, so it ignores the timeout.
    let unbounded = cli.timeout == 0 || cli.command.is_long_running();
    let outcome = if unbounded {
        cli.command.execute(context).await
    } else {
        let timeout_duration = Duration::from_secs(cli.timeout);
        match tokio::time::timeout(timeout_duration, cli.command.execute(context)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Command timed out after {} seconds", cli.timeout);
                std::process::exit(1);
            }
        }
    };

    match outcome {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            if already_reported(&e) {
                debug!("Command failed: {e:#}");
            } else {
                error!("Command failed: {e:#}");
            }
            std::process::exit(1);
        }
    }
}

/// Whether the client's notifier has shown this failure already
fn already_reported(error: &anyhow::Error) -> bool {
    let client_error = match error.downcast_ref::<PaymentError>() {
        Some(PaymentError::Client(inner)) => Some(inner),
        Some(PaymentError::Pending { .. }) => None,
        None => error.downcast_ref::<ClientError>(),
    };
    client_error.is_some_and(|e| e.is_user_facing() || e.is_session_expired())
}

#[derive(Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}
