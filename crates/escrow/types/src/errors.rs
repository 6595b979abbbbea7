//! Error types for the escrow engine

use crate::{ContractId, ContractStatus, WorkerId};

/// Errors that can occur in escrow operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EscrowError {
    #[error("Invalid state: cannot {event} contract {contract_id} in status {status}")]
    InvalidState {
        contract_id: ContractId,
        status: ContractStatus,
        event: &'static str,
    },

    #[error("Worker not found: {0}")]
    WorkerNotFound(WorkerId),

    #[error("Worker already registered: {0}")]
    DuplicateWorker(WorkerId),

    #[error("Contract not found: {0}")]
    ContractNotFound(ContractId),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("Ledger {operation} failed: {reason}")]
    LedgerOperationFailed {
        operation: &'static str,
        reason: String,
    },

    #[error("Contract {contract_id} unlocks in {remaining_ms}ms")]
    NotYetUnlocked {
        contract_id: ContractId,
        remaining_ms: u64,
    },

    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl EscrowError {
    /// Whether the caller may retry the same operation later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EscrowError::LedgerOperationFailed { .. }
                | EscrowError::WalletNotConnected
                | EscrowError::NotYetUnlocked { .. }
                | EscrowError::ReconciliationFailed(_)
        )
    }
}

/// Result type alias for escrow operations
pub type EscrowResult<T> = Result<T, EscrowError>;
