//! Ledger reconciliation
//!
//! Folds unspent records at the deposit address into the contract store.
//! A record's id is its identity: anything already tracked is skipped and
//! never updated.

use crate::ledger::LedgerQuery;
use crate::registry::WorkerRegistry;
use crate::score::ScoreEngine;
use crate::store::ContractStore;
use chrono::{DateTime, Utc};
use escrow_types::{
    Contract, ContractId, ContractOrigin, EscrowError, EscrowResult, LedgerRef, UnspentRecord,
    WorkerId, REGISTER_CLIENT,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Records returned by the ledger
    pub fetched: usize,
    /// Contracts created from previously unknown records
    pub merged: Vec<ContractId>,
    /// Records already tracked or unusable
    pub skipped: usize,
}

pub struct LedgerReconciler {
    ledger: Arc<dyn LedgerQuery>,
    address: String,
}

impl LedgerReconciler {
    pub fn new(ledger: Arc<dyn LedgerQuery>, address: impl Into<String>) -> Self {
        Self {
            ledger,
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Query the ledger. Nothing local is touched.
    pub async fn fetch(&self) -> EscrowResult<Vec<UnspentRecord>> {
        self.ledger
            .list_unspent_records(&self.address)
            .await
            .map_err(|e| EscrowError::ReconciliationFailed(e.to_string()))
    }

    /// Merge fetched records into the store
    pub fn merge(
        &self,
        records: Vec<UnspentRecord>,
        registry: &WorkerRegistry,
        store: &ContractStore,
        scorer: &ScoreEngine,
        now: DateTime<Utc>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport {
            fetched: records.len(),
            ..Default::default()
        };

        for record in records {
            let ledger_ref = LedgerRef::new(record.id.clone());
            if store.contains_ledger_ref(&ledger_ref) {
                report.skipped += 1;
                continue;
            }
            if record.value.is_zero() {
                debug!(record = %ledger_ref, "skipping empty ledger record");
                report.skipped += 1;
                continue;
            }

            let worker_id = self.attribute(&record, registry);
            let profile = match registry.add_stake(&worker_id, record.value) {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(record = %ledger_ref, error = %e, "cannot attribute ledger record");
                    report.skipped += 1;
                    continue;
                }
            };

            let mut contract = Contract::new(
                &profile,
                record.value,
                now,
                scorer.unlock_duration(&profile),
            )
            .with_id(ContractId::from_ledger(&ledger_ref))
            .with_ledger_ref(ledger_ref.clone())
            .with_origin(ContractOrigin::Ledger {
                creation_height: record.created_at_height,
            });

            if let Some(unlock_at) = record.unlock_at_hint().filter(|at| *at > now) {
                contract = contract.with_unlock_at(unlock_at);
            }
            if let Some(client) = record.register(REGISTER_CLIENT) {
                contract = contract.with_client_address(client);
            }

            let id = contract.id.clone();
            if store.insert(contract) {
                debug!(contract_id = %id, worker_id = %worker_id, amount = record.value.0, "merged ledger record");
                report.merged.push(id);
            } else {
                match registry.remove_stake(&worker_id, record.value) {
                    Ok(None) => {}
                    Ok(Some(clamp)) => warn!(
                        worker_id = %worker_id,
                        staked = clamp.staked.0,
                        requested = clamp.requested.0,
                        "stake clamped while undoing duplicate record"
                    ),
                    Err(e) => {
                        warn!(worker_id = %worker_id, record = %ledger_ref, error = %e, "cannot undo stake for duplicate record")
                    }
                }
                report.skipped += 1;
            }
        }

        report
    }

    /// Worker named by the record if registered, otherwise the provisional worker
    fn attribute(&self, record: &UnspentRecord, registry: &WorkerRegistry) -> WorkerId {
        match record.worker_hint() {
            Some(id) if registry.contains(&id) => id,
            _ => registry.ensure_provisional().id,
        }
    }
}
