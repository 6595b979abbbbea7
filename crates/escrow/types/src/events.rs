//! Engine events published to observers

use crate::{Amount, ContractId, DisputeOutcome, ReleaseTrigger, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event wrapper with identity and timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Component that emitted the event
    pub source: EventSource,

    /// The actual event
    pub event: EscrowEvent,
}

impl EscrowEventEnvelope {
    pub fn new(event: EscrowEvent, source: EventSource, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            source,
            event,
        }
    }
}

/// Event sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    /// Caller-initiated operations
    Engine,
    /// Auto-release loop
    Scheduler,
    /// Ledger reconciliation
    Reconciler,
    /// Worker bookkeeping
    Registry,
}

/// Escrow events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowEvent {
    GigCreated {
        contract_id: ContractId,
        worker_id: WorkerId,
        amount: Amount,
        unlock_duration_ms: u64,
    },

    WorkDelivered {
        contract_id: ContractId,
        unlock_at: DateTime<Utc>,
    },

    PaymentReleased {
        contract_id: ContractId,
        worker_id: WorkerId,
        amount: Amount,
        trigger: ReleaseTrigger,
    },

    DisputeRaised {
        contract_id: ContractId,
        reason: String,
    },

    DisputeResolved {
        contract_id: ContractId,
        outcome: DisputeOutcome,
        resolved_by: String,
    },

    /// A stake decrement would have gone negative
    StakeClamped {
        worker_id: WorkerId,
        staked: Amount,
        requested: Amount,
    },

    LedgerRecordsMerged {
        merged: usize,
        skipped: usize,
    },

    ReconciliationFailed {
        reason: String,
    },
}
