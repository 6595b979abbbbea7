//! In-process ledger used in simulation mode and in tests

use super::{LedgerError, LedgerQuery, Wallet};
use async_trait::async_trait;
use dashmap::DashMap;
use escrow_types::{Amount, Contract, DepositMetadata, LedgerRef, UnspentRecord};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// A ledger and wallet in one, with call counters and failure switches
#[derive(Debug)]
pub struct SimulatedLedger {
    wallet_address: String,
    connected: AtomicBool,
    unspent: DashMap<String, Vec<UnspentRecord>>,
    height: AtomicU64,
    deposits: AtomicUsize,
    payouts: AtomicUsize,
    queries: AtomicUsize,
    fail_deposits: AtomicBool,
    fail_payouts: AtomicBool,
    fail_queries: AtomicBool,
    payout_delay: Option<Duration>,
}

impl SimulatedLedger {
    /// A connected wallet for `wallet_address`
    pub fn new(wallet_address: impl Into<String>) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            connected: AtomicBool::new(true),
            unspent: DashMap::new(),
            height: AtomicU64::new(1),
            deposits: AtomicUsize::new(0),
            payouts: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            fail_deposits: AtomicBool::new(false),
            fail_payouts: AtomicBool::new(false),
            fail_queries: AtomicBool::new(false),
            payout_delay: None,
        }
    }

    /// Sleep inside every payout, widening race windows in tests
    pub fn with_payout_delay(mut self, delay: Duration) -> Self {
        self.payout_delay = Some(delay);
        self
    }

    pub fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn fail_deposits(&self, fail: bool) {
        self.fail_deposits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_payouts(&self, fail: bool) {
        self.fail_payouts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Successful deposits so far
    pub fn deposit_count(&self) -> usize {
        self.deposits.load(Ordering::SeqCst)
    }

    /// Successful payouts so far
    pub fn payout_count(&self) -> usize {
        self.payouts.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Place a record at an address directly, as another client would
    pub fn insert_record(&self, address: &str, record: UnspentRecord) {
        self.unspent
            .entry(address.to_string())
            .or_default()
            .push(record);
    }

    /// Unspent records currently held at an address
    pub fn unspent_at(&self, address: &str) -> Vec<UnspentRecord> {
        self.unspent
            .get(address)
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Re-create the escrowed records of restored contracts at `address`
    ///
    /// The simulated ledger lives only in memory, so after a restart the
    /// records behind unsettled contracts must be put back before anything
    /// tries to pay them out. Returns how many records were added.
    pub fn restore_escrowed<'a>(
        &self,
        address: &str,
        contracts: impl IntoIterator<Item = &'a Contract>,
    ) -> usize {
        let mut restored = 0;
        for contract in contracts {
            if contract.status.is_terminal() {
                continue;
            }
            let Some(ledger_ref) = &contract.ledger_ref else {
                continue;
            };
            if self.holds(ledger_ref) {
                continue;
            }

            let metadata = DepositMetadata {
                client_address: contract
                    .client_address
                    .clone()
                    .unwrap_or_else(|| self.wallet_address.clone()),
                worker_id: contract.worker_id.clone(),
                unlock_at: contract.unlock_at,
                amount: contract.amount,
            };
            let mut record =
                UnspentRecord::new(ledger_ref.0.clone(), contract.amount, self.next_height());
            record.registers = metadata.to_registers();
            self.insert_record(address, record);
            restored += 1;
        }
        if restored > 0 {
            debug!(address, restored, "restored escrowed records");
        }
        restored
    }

    fn holds(&self, record: &LedgerRef) -> bool {
        self.unspent
            .iter()
            .any(|entry| entry.iter().any(|r| r.id == record.0))
    }

    fn next_height(&self) -> u64 {
        self.height.fetch_add(1, Ordering::SeqCst)
    }

    fn spend(&self, record: &LedgerRef) -> Option<UnspentRecord> {
        for mut entry in self.unspent.iter_mut() {
            if let Some(pos) = entry.iter().position(|r| r.id == record.0) {
                return Some(entry.remove(pos));
            }
        }
        None
    }
}

#[async_trait]
impl LedgerQuery for SimulatedLedger {
    async fn list_unspent_records(&self, address: &str) -> Result<Vec<UnspentRecord>, LedgerError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("explorer offline".into()));
        }
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.unspent_at(address))
    }
}

#[async_trait]
impl Wallet for SimulatedLedger {
    fn connected_address(&self) -> Option<String> {
        self.connected
            .load(Ordering::SeqCst)
            .then(|| self.wallet_address.clone())
    }

    async fn deposit(
        &self,
        amount: Amount,
        destination: &str,
        metadata: &DepositMetadata,
    ) -> Result<LedgerRef, LedgerError> {
        if self.connected_address().is_none() {
            return Err(LedgerError::NotConnected);
        }
        if self.fail_deposits.load(Ordering::SeqCst) {
            return Err(LedgerError::Rejected("insufficient funds".into()));
        }

        let mut record = UnspentRecord::new(
            Uuid::new_v4().simple().to_string(),
            amount,
            self.next_height(),
        );
        record.registers = metadata.to_registers();
        let id = LedgerRef::new(record.id.clone());

        self.insert_record(destination, record);
        self.deposits.fetch_add(1, Ordering::SeqCst);
        debug!(record = %id, destination, amount = amount.0, "simulated deposit");
        Ok(id)
    }

    async fn payout(&self, record: &LedgerRef, destination: &str) -> Result<LedgerRef, LedgerError> {
        if self.connected_address().is_none() {
            return Err(LedgerError::NotConnected);
        }
        if let Some(delay) = self.payout_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_payouts.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("node unreachable".into()));
        }

        self.spend(record)
            .ok_or_else(|| LedgerError::Rejected(format!("record {} is not unspent", record)))?;

        let tx = LedgerRef::new(format!("tx-{}", Uuid::new_v4().simple()));
        self.payouts.fetch_add(1, Ordering::SeqCst);
        debug!(record = %record, tx = %tx, destination, "simulated payout");
        Ok(tx)
    }
}

/// A wallet with no signing account; every write reports `NotConnected`
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedWallet;

#[async_trait]
impl Wallet for DisconnectedWallet {
    fn connected_address(&self) -> Option<String> {
        None
    }

    async fn deposit(
        &self,
        _amount: Amount,
        _destination: &str,
        _metadata: &DepositMetadata,
    ) -> Result<LedgerRef, LedgerError> {
        Err(LedgerError::NotConnected)
    }

    async fn payout(&self, _record: &LedgerRef, _destination: &str) -> Result<LedgerRef, LedgerError> {
        Err(LedgerError::NotConnected)
    }
}
