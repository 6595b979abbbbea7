//! Configuration for escrowd

use escrow_engine::{EngineConfig, SchedulerConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ergo mainnet explorer API
pub const DEFAULT_EXPLORER_API_URL: &str = "https://api.ergoplatform.com/api/v1";

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Background loop cadences
    #[serde(default)]
    pub scheduler: LoopConfig,

    /// Ledger access
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Snapshot storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Worker registry
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Background loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Auto-release tick in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Ledger reconciliation interval in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Snapshot interval in seconds
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            reconcile_interval_secs: default_reconcile_interval(),
            autosave_interval_secs: default_autosave_interval(),
        }
    }
}

impl LoopConfig {
    pub fn release_scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval_ms: self.tick_interval_ms,
        }
    }
}

/// Where ledger records come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    /// In-process ledger with a connected wallet
    #[default]
    Simulated,
    /// Read-only explorer API; no signing wallet
    Explorer,
}

impl std::str::FromStr for LedgerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simulated" | "simulation" | "sim" => Ok(LedgerMode::Simulated),
            "explorer" => Ok(LedgerMode::Explorer),
            other => Err(format!("Unknown ledger mode: {}", other)),
        }
    }
}

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub mode: LedgerMode,

    /// Explorer API base URL
    #[serde(default = "default_explorer_api_url")]
    pub explorer_api_url: String,

    /// Explorer request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Wallet address used by the simulated ledger
    #[serde(default = "default_wallet_address")]
    pub wallet_address: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mode: LedgerMode::default(),
            explorer_api_url: default_explorer_api_url(),
            request_timeout_secs: default_request_timeout(),
            wallet_address: default_wallet_address(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Keep snapshots in memory (lost on exit)
    #[default]
    Memory,

    /// JSON snapshot file
    File {
        /// Snapshot path
        path: PathBuf,
    },
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Start with the default worker set when no snapshot exists
    #[serde(default = "default_true")]
    pub seed_defaults: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            seed_defaults: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    100
}

fn default_reconcile_interval() -> u64 {
    30
}

fn default_autosave_interval() -> u64 {
    15
}

fn default_explorer_api_url() -> String {
    DEFAULT_EXPLORER_API_URL.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_wallet_address() -> String {
    "sim-client-wallet".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `ESCROW_`-prefixed environment variables (`__` separates sections,
    /// e.g. `ESCROW_LEDGER__MODE=explorer`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ESCROW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
