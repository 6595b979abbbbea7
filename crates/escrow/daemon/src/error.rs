//! Daemon error types

use escrow_types::EscrowError;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Engine(#[from] EscrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger client error: {0}")]
    Ledger(String),
}

pub type DaemonResult<T> = Result<T, DaemonError>;
