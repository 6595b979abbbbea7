//! escrowd - reputation-weighted escrow daemon
//!
//! Runs the escrow engine with:
//! - an auto-release tick for contracts whose countdown has run out
//! - periodic reconciliation against the deposit address's ledger records
//! - periodic snapshots, plus a final one on shutdown

use clap::Parser;
use escrow_daemon::config::{DaemonConfig, LedgerMode};
use escrow_daemon::{DaemonError, DaemonResult, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Escrow daemon CLI
#[derive(Parser)]
#[command(name = "escrowd")]
#[command(about = "Reputation-weighted escrow daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ESCROW_CONFIG")]
    config: Option<String>,

    /// Ledger mode (simulated, explorer)
    #[arg(long, env = "ESCROW_LEDGER_MODE")]
    ledger: Option<LedgerMode>,

    /// Escrow deposit address
    #[arg(long, env = "ESCROW_DEPOSIT_ADDRESS")]
    deposit_address: Option<String>,

    /// Log level
    #[arg(long, env = "ESCROW_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "ESCROW_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(mode) = cli.ledger {
        config.ledger.mode = mode;
    }
    if let Some(address) = cli.deposit_address {
        config.engine.deposit_address = address;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    println!(
        r#"
  escrowd - reputation-weighted escrow
  Version: {}
  Ledger: {:?}
  Deposit address: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.ledger.mode,
        config.engine.deposit_address
    );

    let server = Server::new(config).await?;
    server.run().await
}
