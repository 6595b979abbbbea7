//! Shapes exchanged with the external ledger and wallet

use crate::{Amount, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Register holding the client address
pub const REGISTER_CLIENT: &str = "R4";
/// Register holding the worker id
pub const REGISTER_WORKER: &str = "R5";
/// Register holding the unlock timestamp in milliseconds
pub const REGISTER_UNLOCK_AT: &str = "R6";
/// Register holding the gig amount
pub const REGISTER_AMOUNT: &str = "R7";

/// An unspent record held at an address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentRecord {
    /// Ledger-wide unique record id
    pub id: String,
    /// Value locked in the record
    pub value: Amount,
    /// Block height the record was created at
    pub created_at_height: u64,
    /// Rendered register values keyed by register name (`R4`..`R9`)
    #[serde(default)]
    pub registers: BTreeMap<String, String>,
}

impl UnspentRecord {
    pub fn new(id: impl Into<String>, value: Amount, created_at_height: u64) -> Self {
        Self {
            id: id.into(),
            value,
            created_at_height,
            registers: BTreeMap::new(),
        }
    }

    pub fn with_register(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.registers.insert(name.into(), value.into());
        self
    }

    pub fn register(&self, name: &str) -> Option<&str> {
        self.registers.get(name).map(String::as_str)
    }

    /// Worker id claimed by the record, if any
    pub fn worker_hint(&self) -> Option<WorkerId> {
        self.register(REGISTER_WORKER)
            .filter(|v| !v.is_empty())
            .map(WorkerId::new)
    }

    /// Unlock timestamp claimed by the record, if present and well formed
    pub fn unlock_at_hint(&self) -> Option<DateTime<Utc>> {
        self.register(REGISTER_UNLOCK_AT)
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }
}

/// Metadata attached to a deposit, written into the record's registers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositMetadata {
    pub client_address: String,
    pub worker_id: WorkerId,
    pub unlock_at: DateTime<Utc>,
    pub amount: Amount,
}

impl DepositMetadata {
    pub fn to_registers(&self) -> BTreeMap<String, String> {
        let mut registers = BTreeMap::new();
        registers.insert(REGISTER_CLIENT.to_string(), self.client_address.clone());
        registers.insert(REGISTER_WORKER.to_string(), self.worker_id.0.clone());
        registers.insert(
            REGISTER_UNLOCK_AT.to_string(),
            self.unlock_at.timestamp_millis().to_string(),
        );
        registers.insert(REGISTER_AMOUNT.to_string(), self.amount.0.to_string());
        registers
    }
}
