//! Escrow engine facade
//!
//! Every caller-facing operation lives here. Status changes go through
//! [`ContractStore::apply`] while the contract's lock is held, and the
//! ledger call that accompanies a transition happens under that same lock,
//! so exactly one of two racing releases reaches the wallet. A failed
//! ledger call returns before `apply`, leaving the contract as it was.

use crate::authority::DisputeAuthority;
use crate::clock::Clock;
use crate::ledger::{LedgerError, LedgerQuery, Wallet};
use crate::persistence::EngineSnapshot;
use crate::reconciler::{LedgerReconciler, ReconcileReport};
use crate::registry::{StakeClamp, WorkerRegistry};
use crate::score::{ScoreEngine, UnlockPolicy};
use crate::store::ContractStore;
use chrono::Duration as ChronoDuration;
use escrow_types::{
    Amount, Contract, ContractEvent, ContractId, DepositMetadata, DisputeOutcome, DisputeRecord,
    EscrowError, EscrowEvent, EscrowEventEnvelope, EscrowResult, EventSource, LedgerRef,
    ReleaseTrigger, ReputationBreakdown, TransitionKind, TransitionRule, WorkerId, WorkerProfile,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Default address deposits are locked at
pub const DEFAULT_DEPOSIT_ADDRESS: &str = "escrow-deposit";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Unlock duration constants
    pub policy: UnlockPolicy,

    /// Address deposits are locked at and reconciled from
    pub deposit_address: String,

    /// Append a dispute record to the worker when a dispute is resolved for the client
    pub record_dispute_on_refund: bool,

    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: UnlockPolicy::default(),
            deposit_address: DEFAULT_DEPOSIT_ADDRESS.to_string(),
            record_dispute_on_refund: true,
            event_capacity: 1024,
        }
    }
}

pub struct EscrowEngine {
    config: EngineConfig,
    scorer: ScoreEngine,
    registry: WorkerRegistry,
    store: ContractStore,
    reconciler: LedgerReconciler,
    wallet: Arc<dyn Wallet>,
    clock: Arc<dyn Clock>,
    /// Deposits hold it shared from submission until the contract is
    /// tracked; reconciliation merges hold it exclusively.
    ledger_gate: RwLock<()>,
    event_tx: broadcast::Sender<EscrowEventEnvelope>,
}

impl EscrowEngine {
    pub fn new(
        config: EngineConfig,
        registry: WorkerRegistry,
        wallet: Arc<dyn Wallet>,
        ledger: Arc<dyn LedgerQuery>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            scorer: ScoreEngine::new(config.policy.clone()),
            reconciler: LedgerReconciler::new(ledger, config.deposit_address.clone()),
            config,
            registry,
            store: ContractStore::new(),
            wallet,
            clock,
            ledger_gate: RwLock::new(()),
            event_tx,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ContractStore {
        &self.store
    }

    pub fn scorer(&self) -> &ScoreEngine {
        &self.scorer
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EscrowEventEnvelope> {
        self.event_tx.subscribe()
    }

    // ---- Workers ----

    pub fn register_worker(
        &self,
        id: WorkerId,
        name: impl Into<String>,
    ) -> EscrowResult<WorkerProfile> {
        self.registry.register_worker(id, name)
    }

    pub fn worker(&self, id: &WorkerId) -> EscrowResult<WorkerProfile> {
        self.registry.require(id)
    }

    pub fn workers(&self) -> Vec<WorkerProfile> {
        self.registry.list()
    }

    /// Reputation of a worker as of now
    pub fn breakdown(&self, id: &WorkerId) -> EscrowResult<ReputationBreakdown> {
        let profile = self.registry.require(id)?;
        Ok(self.scorer.breakdown(&profile, self.clock.now()))
    }

    // ---- Contracts ----

    pub async fn contract(&self, id: &ContractId) -> EscrowResult<Contract> {
        self.store.get(id).await
    }

    pub async fn contracts(&self) -> Vec<Contract> {
        self.store.list().await
    }

    /// Lock a payment for a worker.
    ///
    /// The stake is committed only once the deposit has succeeded, so no
    /// reader ever sees stake for a deposit still in flight.
    pub async fn create_gig(&self, worker_id: &WorkerId, amount: Amount) -> EscrowResult<Contract> {
        if amount.is_zero() {
            return Err(EscrowError::InvalidAmount("amount must be positive".into()));
        }
        let current = self.registry.require(worker_id)?;
        let client_address = self
            .wallet
            .connected_address()
            .ok_or(EscrowError::WalletNotConnected)?;

        let _gate = self.ledger_gate.read().await;

        let staked = current.staked_amount.saturating_add(amount);
        let profile = current.with_staked_amount(staked);
        let now = self.clock.now();
        let contract = Contract::new(&profile, amount, now, self.scorer.unlock_duration(&profile))
            .with_client_address(client_address.clone());

        let metadata = DepositMetadata {
            client_address,
            worker_id: worker_id.clone(),
            unlock_at: contract.unlock_at,
            amount,
        };

        let ledger_ref = match self
            .wallet
            .deposit(amount, &self.config.deposit_address, &metadata)
            .await
        {
            Ok(ledger_ref) => ledger_ref,
            Err(e) => {
                warn!(worker_id = %worker_id, amount = amount.0, error = %e, "deposit failed");
                return Err(match e {
                    LedgerError::NotConnected => EscrowError::WalletNotConnected,
                    other => ledger_failure("deposit", other),
                });
            }
        };

        if let Err(e) = self.registry.add_stake(worker_id, amount) {
            // Not tracked locally; the next reconciliation picks the record up
            warn!(worker_id = %worker_id, ledger_ref = %ledger_ref, error = %e, "worker vanished during deposit");
            return Err(e);
        }

        let contract = contract.with_ledger_ref(ledger_ref.clone());
        if !self.store.insert(contract.clone()) {
            self.rollback_stake(worker_id, amount);
            return Err(EscrowError::LedgerOperationFailed {
                operation: "deposit",
                reason: format!("ledger record {} is already tracked", ledger_ref),
            });
        }

        info!(
            contract_id = %contract.id,
            worker_id = %worker_id,
            amount = amount.0,
            unlock_duration_ms = contract.unlock_duration_ms,
            ledger_ref = %ledger_ref,
            "gig created"
        );
        self.emit(
            EscrowEvent::GigCreated {
                contract_id: contract.id.clone(),
                worker_id: worker_id.clone(),
                amount,
                unlock_duration_ms: contract.unlock_duration_ms,
            },
            EventSource::Engine,
        );

        Ok(contract)
    }

    /// Mark work delivered and start the countdown.
    ///
    /// The unlock time comes from the worker's profile as it is now.
    pub async fn deliver_work(&self, id: &ContractId) -> EscrowResult<Contract> {
        let handle = self.store.handle(id)?;
        let mut contract = handle.lock().await;
        contract.check(TransitionKind::DeliverWork)?;

        let profile = self.registry.require(&contract.worker_id)?;
        let duration = self.scorer.unlock_duration(&profile);
        let now = self.clock.now();
        let unlock_at = now + to_chrono(duration);

        self.store.apply(
            &mut contract,
            ContractEvent::DeliverWork {
                unlock_at,
                unlock_duration_ms: duration.as_millis() as u64,
            },
            now,
        )?;

        info!(
            contract_id = %contract.id,
            worker_id = %contract.worker_id,
            unlock_duration_ms = contract.unlock_duration_ms,
            "work delivered"
        );
        self.emit(
            EscrowEvent::WorkDelivered {
                contract_id: contract.id.clone(),
                unlock_at,
            },
            EventSource::Engine,
        );

        Ok(contract.clone())
    }

    /// Manually release a contract whose countdown has run out.
    ///
    /// A contract that already left `PendingRelease` is returned unchanged.
    pub async fn claim(&self, id: &ContractId) -> EscrowResult<Contract> {
        let (contract, _) = self.release(id, ReleaseTrigger::Claim).await?;
        Ok(contract)
    }

    /// Timer-driven release. Returns whether this call released the contract.
    pub async fn release_expired(&self, id: &ContractId) -> EscrowResult<bool> {
        let (_, released) = self.release(id, ReleaseTrigger::Timer).await?;
        Ok(released)
    }

    pub async fn raise_dispute(
        &self,
        id: &ContractId,
        reason: impl Into<String>,
    ) -> EscrowResult<Contract> {
        let reason = reason.into();
        let handle = self.store.handle(id)?;
        let mut contract = handle.lock().await;

        self.store.apply(
            &mut contract,
            ContractEvent::RaiseDispute {
                reason: reason.clone(),
            },
            self.clock.now(),
        )?;

        info!(contract_id = %contract.id, reason = %reason, "dispute raised");
        self.emit(
            EscrowEvent::DisputeRaised {
                contract_id: contract.id.clone(),
                reason,
            },
            EventSource::Engine,
        );

        Ok(contract.clone())
    }

    /// Settle a disputed contract.
    ///
    /// In the worker's favour this pays out like a claim. In the client's
    /// favour no funds move through the wallet; the stake is released and,
    /// if configured, the worker is charged a lost dispute.
    pub async fn resolve_dispute(
        &self,
        id: &ContractId,
        outcome: DisputeOutcome,
        authority: &DisputeAuthority,
    ) -> EscrowResult<Contract> {
        let handle = self.store.handle(id)?;
        let mut contract = handle.lock().await;
        contract.check(TransitionKind::Resolve(outcome))?;

        let payout_ref = match outcome {
            DisputeOutcome::Worker => Some(self.request_payout(&contract).await?),
            DisputeOutcome::Client => None,
        };

        let now = self.clock.now();
        self.store.apply(
            &mut contract,
            ContractEvent::Resolve {
                outcome,
                payout_ref,
            },
            now,
        )?;

        let clamp = match outcome {
            DisputeOutcome::Worker => self
                .registry
                .record_release(&contract.worker_id, contract.amount),
            DisputeOutcome::Client => {
                let dispute = self
                    .config
                    .record_dispute_on_refund
                    .then(|| DisputeRecord::new(now, contract.amount));
                self.registry
                    .record_refund(&contract.worker_id, contract.amount, dispute)
            }
        };
        self.settle_worker(&contract.worker_id, clamp);

        info!(
            contract_id = %contract.id,
            outcome = %outcome,
            resolved_by = authority.holder(),
            "dispute resolved"
        );
        self.emit(
            EscrowEvent::DisputeResolved {
                contract_id: contract.id.clone(),
                outcome,
                resolved_by: authority.holder().to_string(),
            },
            EventSource::Engine,
        );
        if outcome == DisputeOutcome::Worker {
            self.emit(
                EscrowEvent::PaymentReleased {
                    contract_id: contract.id.clone(),
                    worker_id: contract.worker_id.clone(),
                    amount: contract.amount,
                    trigger: ReleaseTrigger::Resolution,
                },
                EventSource::Engine,
            );
        }

        Ok(contract.clone())
    }

    /// Countdown left on a contract. Never mutates anything.
    pub async fn get_time_remaining(&self, id: &ContractId) -> EscrowResult<Duration> {
        let contract = self.store.get(id).await?;
        Ok(contract.time_remaining(self.clock.now()))
    }

    // ---- Ledger ----

    /// Merge unknown ledger records into the store.
    ///
    /// A failed query leaves local state untouched and is not retried here.
    pub async fn reconcile(&self) -> EscrowResult<ReconcileReport> {
        let records = match self.reconciler.fetch().await {
            Ok(records) => records,
            Err(e) => {
                warn!(address = self.reconciler.address(), error = %e, "reconciliation failed");
                self.emit(
                    EscrowEvent::ReconciliationFailed {
                        reason: e.to_string(),
                    },
                    EventSource::Reconciler,
                );
                return Err(e);
            }
        };

        let report = {
            let _gate = self.ledger_gate.write().await;
            self.reconciler.merge(
                records,
                &self.registry,
                &self.store,
                &self.scorer,
                self.clock.now(),
            )
        };

        if report.merged.is_empty() {
            debug!(fetched = report.fetched, "reconciliation found nothing new");
        } else {
            info!(
                fetched = report.fetched,
                merged = report.merged.len(),
                skipped = report.skipped,
                "reconciled ledger records"
            );
            self.emit(
                EscrowEvent::LedgerRecordsMerged {
                    merged: report.merged.len(),
                    skipped: report.skipped,
                },
                EventSource::Reconciler,
            );
        }

        Ok(report)
    }

    // ---- State ----

    pub async fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            workers: self.registry.list(),
            contracts: self.store.list().await,
            saved_at: self.clock.now(),
        }
    }

    /// Replace all workers and contracts with a snapshot's contents
    pub async fn restore(&self, snapshot: EngineSnapshot) {
        let _gate = self.ledger_gate.write().await;
        self.registry.clear();
        self.registry.restore(snapshot.workers);
        let contracts = self.store.restore(snapshot.contracts);
        info!(
            workers = self.registry.len(),
            contracts,
            pending = self.store.pending_len(),
            saved_at = %snapshot.saved_at,
            "engine state restored"
        );
    }

    /// Back to the default workers with no contracts
    pub async fn reset(&self) {
        let _gate = self.ledger_gate.write().await;
        self.store.clear();
        self.registry.reset(self.clock.now());
    }

    async fn release(
        &self,
        id: &ContractId,
        trigger: ReleaseTrigger,
    ) -> EscrowResult<(Contract, bool)> {
        let handle = self.store.handle(id)?;
        let mut contract = handle.lock().await;

        if contract.check(TransitionKind::Release)? == TransitionRule::Noop {
            debug!(contract_id = %contract.id, status = %contract.status, "release already settled");
            return Ok((contract.clone(), false));
        }

        let now = self.clock.now();
        if !contract.is_due(now) {
            return match trigger {
                ReleaseTrigger::Timer => Ok((contract.clone(), false)),
                _ => Err(EscrowError::NotYetUnlocked {
                    contract_id: contract.id.clone(),
                    remaining_ms: contract.time_remaining(now).as_millis() as u64,
                }),
            };
        }

        let payout_ref = self.request_payout(&contract).await?;
        self.store.apply(
            &mut contract,
            ContractEvent::Release {
                trigger,
                payout_ref: Some(payout_ref),
            },
            self.clock.now(),
        )?;

        let clamp = self
            .registry
            .record_release(&contract.worker_id, contract.amount);
        self.settle_worker(&contract.worker_id, clamp);

        let source = match trigger {
            ReleaseTrigger::Timer => EventSource::Scheduler,
            _ => EventSource::Engine,
        };
        info!(
            contract_id = %contract.id,
            worker_id = %contract.worker_id,
            amount = contract.amount.0,
            trigger = ?trigger,
            "payment released"
        );
        self.emit(
            EscrowEvent::PaymentReleased {
                contract_id: contract.id.clone(),
                worker_id: contract.worker_id.clone(),
                amount: contract.amount,
                trigger,
            },
            source,
        );

        Ok((contract.clone(), true))
    }

    async fn request_payout(&self, contract: &Contract) -> EscrowResult<LedgerRef> {
        let record = contract
            .ledger_ref
            .as_ref()
            .ok_or_else(|| EscrowError::LedgerOperationFailed {
                operation: "payout",
                reason: format!("contract {} has no ledger record", contract.id),
            })?;

        self.wallet
            .payout(record, contract.worker_id.as_str())
            .await
            .map_err(|e| {
                warn!(contract_id = %contract.id, record = %record, error = %e, "payout failed");
                ledger_failure("payout", e)
            })
    }

    fn rollback_stake(&self, worker_id: &WorkerId, amount: Amount) {
        let clamp = self.registry.remove_stake(worker_id, amount);
        self.settle_worker(worker_id, clamp);
    }

    /// Report the outcome of a post-transition registry update. The
    /// transition already happened, so failures here are logged, not returned.
    fn settle_worker(&self, worker_id: &WorkerId, result: EscrowResult<Option<StakeClamp>>) {
        match result {
            Ok(None) => {}
            Ok(Some(clamp)) => self.emit(
                EscrowEvent::StakeClamped {
                    worker_id: worker_id.clone(),
                    staked: clamp.staked,
                    requested: clamp.requested,
                },
                EventSource::Registry,
            ),
            Err(e) => warn!(worker_id = %worker_id, error = %e, "worker bookkeeping skipped"),
        }
    }

    fn emit(&self, event: EscrowEvent, source: EventSource) {
        let envelope = EscrowEventEnvelope::new(event, source, self.clock.now());
        // No subscribers is fine
        let _ = self.event_tx.send(envelope);
    }
}

fn ledger_failure(operation: &'static str, error: LedgerError) -> EscrowError {
    EscrowError::LedgerOperationFailed {
        operation,
        reason: error.to_string(),
    }
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::milliseconds(duration.as_millis() as i64)
}
