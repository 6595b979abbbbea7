//! Capabilities the engine consumes from the external ledger and wallet

mod simulated;

pub use simulated::{DisconnectedWallet, SimulatedLedger};

use async_trait::async_trait;
use escrow_types::{Amount, DepositMetadata, LedgerRef, UnspentRecord};

/// Failures reported by ledger and wallet collaborators
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("wallet not connected")]
    NotConnected,

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Read access to an address's unspent records
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    async fn list_unspent_records(&self, address: &str) -> Result<Vec<UnspentRecord>, LedgerError>;
}

/// A signing wallet that builds and submits escrow transactions
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Address of the connected account, if any
    fn connected_address(&self) -> Option<String>;

    /// Lock `amount` at `destination`. Returns the id of the created record.
    async fn deposit(
        &self,
        amount: Amount,
        destination: &str,
        metadata: &DepositMetadata,
    ) -> Result<LedgerRef, LedgerError>;

    /// Spend a locked record to `destination`. Returns the payout transaction id.
    async fn payout(&self, record: &LedgerRef, destination: &str) -> Result<LedgerRef, LedgerError>;
}
