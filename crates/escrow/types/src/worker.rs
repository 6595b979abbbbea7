//! Worker profiles: the mutable history reputation is derived from

use crate::{Amount, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lost dispute. Entries are never removed; their weight decays with age.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeRecord {
    /// When the dispute was decided against the worker
    pub occurred_at: DateTime<Utc>,
    /// Amount of the contract in dispute
    pub amount: Amount,
}

impl DisputeRecord {
    pub fn new(occurred_at: DateTime<Utc>, amount: Amount) -> Self {
        Self {
            occurred_at,
            amount,
        }
    }
}

/// A worker's reputation-bearing history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerProfile {
    /// Stable worker identifier
    pub id: WorkerId,
    /// Display name
    pub name: String,
    /// Number of contracts released to this worker
    pub jobs_completed: u64,
    /// Lost disputes, oldest first
    #[serde(default)]
    pub dispute_history: Vec<DisputeRecord>,
    /// Funds currently locked in this worker's open contracts
    #[serde(default)]
    pub staked_amount: Amount,
    /// True for the placeholder profile used for unattributed ledger records
    #[serde(default)]
    pub provisional: bool,
}

impl WorkerProfile {
    pub fn new(id: WorkerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            jobs_completed: 0,
            dispute_history: Vec::new(),
            staked_amount: Amount::zero(),
            provisional: false,
        }
    }

    /// Placeholder profile for ledger records that cannot be attributed
    pub fn provisional() -> Self {
        Self {
            provisional: true,
            ..Self::new(WorkerId::unknown(), "From Chain")
        }
    }

    pub fn with_jobs_completed(mut self, jobs: u64) -> Self {
        self.jobs_completed = jobs;
        self
    }

    pub fn with_dispute(mut self, record: DisputeRecord) -> Self {
        self.dispute_history.push(record);
        self
    }

    pub fn with_staked_amount(mut self, amount: Amount) -> Self {
        self.staked_amount = amount;
        self
    }

    /// Number of disputes lost over the worker's whole history
    pub fn disputes_lost(&self) -> u64 {
        self.dispute_history.len() as u64
    }
}
