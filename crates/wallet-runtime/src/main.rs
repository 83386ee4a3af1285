//! # Taler Wallet
//!
//! Command-line wallet. Runs the wallet engine as a child process and
//! talks to it through the relay service.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use wallet_runtime::commands::{self, Command};
use wallet_runtime::{load_config, WalletRuntime};
use wallet_telemetry::{init_telemetry, TelemetryConfig};

/// Taler wallet command-line client
#[derive(Parser, Debug)]
#[command(name = "taler-wallet")]
#[command(about = "Command-line client for the GNU Taler wallet engine")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "WALLET_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;

    let mut telemetry = TelemetryConfig::from_env();
    if args.verbose {
        telemetry = telemetry.with_log_level("debug");
    }
    let _telemetry = init_telemetry(telemetry).context("Failed to initialize telemetry")?;

    let runtime = WalletRuntime::start(config).await?;
    info!(command = ?args.command, "Running command");

    let mut stdout = io::stdout();
    let result = commands::execute(args.command, &runtime, &mut stdout).await;
    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }

    runtime.shutdown().await;
    result
}
