//! Contract store
//!
//! Owns every [`Contract`] behind its own async mutex. Callers that need a
//! check-then-act sequence (release with a ledger payout in between) take
//! the contract's lock through [`ContractStore::handle`] and hand the guard
//! back to [`ContractStore::apply`], which is the only place status changes.
//!
//! Two secondary indexes are kept alongside:
//!
//! - ledger ref to contract id, used to deduplicate ledger records
//! - the pending-release set (contract id to unlock time) the scheduler
//!   scans; removing an entry is how a countdown stops

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use escrow_types::{
    Contract, ContractEvent, ContractId, ContractStatus, EscrowError, EscrowResult, LedgerRef,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle to one contract
pub type ContractHandle = Arc<Mutex<Contract>>;

#[derive(Debug, Default)]
pub struct ContractStore {
    contracts: DashMap<ContractId, ContractHandle>,
    by_ledger_ref: DashMap<LedgerRef, ContractId>,
    pending: DashMap<ContractId, DateTime<Utc>>,
}

impl ContractStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new contract.
    ///
    /// Returns `false`, leaving the store unchanged, when the id or the
    /// ledger ref is already tracked.
    pub fn insert(&self, contract: Contract) -> bool {
        if self.contracts.contains_key(&contract.id) {
            return false;
        }

        if let Some(ledger_ref) = &contract.ledger_ref {
            match self.by_ledger_ref.entry(ledger_ref.clone()) {
                Entry::Occupied(_) => return false,
                Entry::Vacant(slot) => {
                    slot.insert(contract.id.clone());
                }
            }
        }

        match self.contracts.entry(contract.id.clone()) {
            Entry::Occupied(_) => {
                // Lost a race on the id; undo the index claims
                if let Some(ledger_ref) = &contract.ledger_ref {
                    self.by_ledger_ref.remove(ledger_ref);
                }
                false
            }
            Entry::Vacant(slot) => {
                if contract.status == ContractStatus::PendingRelease {
                    self.pending.insert(contract.id.clone(), contract.unlock_at);
                }
                slot.insert(Arc::new(Mutex::new(contract)));
                true
            }
        }
    }

    /// Lockable handle to a contract
    pub fn handle(&self, id: &ContractId) -> EscrowResult<ContractHandle> {
        self.contracts
            .get(id)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| EscrowError::ContractNotFound(id.clone()))
    }

    /// Snapshot of one contract
    pub async fn get(&self, id: &ContractId) -> EscrowResult<Contract> {
        let handle = self.handle(id)?;
        let contract = handle.lock().await;
        Ok(contract.clone())
    }

    /// Snapshot of all contracts, oldest first
    pub async fn list(&self) -> Vec<Contract> {
        let handles: Vec<ContractHandle> =
            self.contracts.iter().map(|h| Arc::clone(h.value())).collect();

        let mut contracts = Vec::with_capacity(handles.len());
        for handle in handles {
            contracts.push(handle.lock().await.clone());
        }
        contracts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        contracts
    }

    /// Apply a transition to a locked contract and keep the indexes in step
    pub fn apply(
        &self,
        contract: &mut Contract,
        event: ContractEvent,
        now: DateTime<Utc>,
    ) -> EscrowResult<Option<ContractStatus>> {
        let next = contract.apply(event, now)?;

        if next.is_some() {
            if contract.status == ContractStatus::PendingRelease {
                self.pending.insert(contract.id.clone(), contract.unlock_at);
            } else {
                self.pending.remove(&contract.id);
            }
        }

        Ok(next)
    }

    /// Lock a contract and apply a transition to it
    pub async fn transition(
        &self,
        id: &ContractId,
        event: ContractEvent,
        now: DateTime<Utc>,
    ) -> EscrowResult<Option<ContractStatus>> {
        let handle = self.handle(id)?;
        let mut contract = handle.lock().await;
        self.apply(&mut contract, event, now)
    }

    pub fn contains(&self, id: &ContractId) -> bool {
        self.contracts.contains_key(id)
    }

    pub fn contains_ledger_ref(&self, ledger_ref: &LedgerRef) -> bool {
        self.by_ledger_ref.contains_key(ledger_ref)
    }

    /// Pending contracts whose unlock time has passed
    pub fn due(&self, now: DateTime<Utc>) -> Vec<ContractId> {
        self.pending
            .iter()
            .filter(|entry| *entry.value() <= now)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of contracts with a running countdown
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn clear(&self) {
        self.pending.clear();
        self.by_ledger_ref.clear();
        self.contracts.clear();
    }

    /// Replace the store's contents and rebuild both indexes
    pub fn restore(&self, contracts: impl IntoIterator<Item = Contract>) -> usize {
        self.clear();
        contracts
            .into_iter()
            .filter(|contract| self.insert(contract.clone()))
            .count()
    }
}
