//! Escrow daemon library
//!
//! Hosts an [`escrow_engine::EscrowEngine`] as a long-running process:
//! - configuration loading
//! - explorer-backed or simulated ledger access
//! - auto-release, reconciliation and autosave loops
//! - graceful shutdown with a final snapshot

pub mod config;
pub mod error;
pub mod explorer;
pub mod server;

pub use config::DaemonConfig;
pub use error::{DaemonError, DaemonResult};
pub use explorer::ExplorerClient;
pub use server::Server;
