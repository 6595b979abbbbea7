//! Reputation-weighted escrow engine
//!
//! The engine ties five components together:
//!
//! - [`ScoreEngine`]: worker history to trust score and unlock duration.
//! - [`WorkerRegistry`]: the only writer of worker profiles.
//! - [`ContractStore`]: the only writer of contract status.
//! - [`ReleaseScheduler`]: one shared tick that auto-releases due contracts.
//! - [`LedgerReconciler`]: folds unknown ledger deposits into the store.
//!
//! [`EscrowEngine`] is the facade hosts call. Ledger and wallet access come
//! in through the [`LedgerQuery`] and [`Wallet`] traits, and time through
//! [`Clock`], so every component can be driven deterministically in tests.

#![deny(unsafe_code)]

pub mod authority;
pub mod clock;
pub mod engine;
pub mod ledger;
pub mod persistence;
pub mod reconciler;
pub mod registry;
pub mod scheduler;
pub mod score;
pub mod store;

pub use authority::DisputeAuthority;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EngineConfig, EscrowEngine, DEFAULT_DEPOSIT_ADDRESS};
pub use ledger::{DisconnectedWallet, LedgerError, LedgerQuery, SimulatedLedger, Wallet};
pub use persistence::{
    EngineSnapshot, InMemorySnapshotStore, JsonFileSnapshotStore, SnapshotStore,
};
pub use reconciler::{LedgerReconciler, ReconcileReport};
pub use registry::{StakeClamp, WorkerRegistry};
pub use scheduler::{ReleaseScheduler, SchedulerConfig, TickSummary};
pub use score::{ScoreEngine, UnlockPolicy};
pub use store::{ContractHandle, ContractStore};

/// Re-export the domain types
pub use escrow_types as types;
