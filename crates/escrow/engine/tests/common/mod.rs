#![allow(dead_code)]

use chrono::{Duration, Utc};
use escrow_engine::{
    Clock, EngineConfig, EscrowEngine, ManualClock, SimulatedLedger, WorkerRegistry,
};
use escrow_types::{Amount, Contract, WorkerId};
use std::sync::Arc;

pub const CLIENT: &str = "9fClientWalletAddress";

pub struct Harness {
    pub engine: Arc<EscrowEngine>,
    pub ledger: Arc<SimulatedLedger>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_ledger(SimulatedLedger::new(CLIENT))
    }

    pub fn with_ledger(ledger: SimulatedLedger) -> Self {
        Self::with_config(ledger, EngineConfig::default())
    }

    pub fn with_config(ledger: SimulatedLedger, config: EngineConfig) -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ledger = Arc::new(ledger);
        let engine = Arc::new(EscrowEngine::new(
            config,
            WorkerRegistry::seeded(clock.now()),
            ledger.clone(),
            ledger.clone(),
            clock.clone(),
        ));
        Self {
            engine,
            ledger,
            clock,
        }
    }

    pub fn deposit_address(&self) -> String {
        self.engine.config().deposit_address.clone()
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(Duration::seconds(secs));
    }

    pub async fn gig(&self, worker: &str, amount: u64) -> Contract {
        self.engine
            .create_gig(&WorkerId::new(worker), Amount::new(amount))
            .await
            .unwrap()
    }

    /// Create and deliver, leaving the contract pending
    pub async fn pending_gig(&self, worker: &str, amount: u64) -> Contract {
        let contract = self.gig(worker, amount).await;
        self.engine.deliver_work(&contract.id).await.unwrap()
    }

    pub fn staked(&self, worker: &str) -> Amount {
        self.engine
            .worker(&WorkerId::new(worker))
            .unwrap()
            .staked_amount
    }

    pub fn jobs(&self, worker: &str) -> u64 {
        self.engine
            .worker(&WorkerId::new(worker))
            .unwrap()
            .jobs_completed
    }
}
