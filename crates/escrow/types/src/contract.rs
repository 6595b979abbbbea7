//! Escrow contracts and their lifecycle state machine
//!
//! ```text
//! Locked ──deliver──▶ PendingRelease ──release──▶ Released
//!                          │
//!                       dispute
//!                          ▼
//!                      Disputed ──resolve(worker)──▶ Released
//!                          └─────resolve(client)──▶ Refunded
//! ```

use crate::{Amount, ContractId, EscrowError, EscrowResult, LedgerRef, WorkerId, WorkerProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle status of a contract
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ContractStatus {
    /// Funds locked, work not yet delivered
    #[default]
    Locked,
    /// Work delivered, countdown to release running
    PendingRelease,
    /// Countdown halted, waiting for an authority to resolve
    Disputed,
    /// Funds paid out to the worker
    Released,
    /// Funds returned to the client
    Refunded,
}

impl ContractStatus {
    /// Released and Refunded contracts never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContractStatus::Released | ContractStatus::Refunded)
    }

    /// Whether the transition kind may be applied from this status
    pub fn rule(&self, kind: TransitionKind) -> TransitionRule {
        use ContractStatus::*;
        match (self, kind) {
            (Locked, TransitionKind::DeliverWork) => TransitionRule::Apply(PendingRelease),
            (PendingRelease, TransitionKind::Release) => TransitionRule::Apply(Released),
            // A release racing another release, a dispute or a resolution loses quietly
            (Released | Disputed | Refunded, TransitionKind::Release) => TransitionRule::Noop,
            (PendingRelease, TransitionKind::RaiseDispute) => TransitionRule::Apply(Disputed),
            (Disputed, TransitionKind::Resolve(DisputeOutcome::Worker)) => {
                TransitionRule::Apply(Released)
            }
            (Disputed, TransitionKind::Resolve(DisputeOutcome::Client)) => {
                TransitionRule::Apply(Refunded)
            }
            _ => TransitionRule::Invalid,
        }
    }
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ContractStatus::Locked => "LOCKED",
            ContractStatus::PendingRelease => "PENDING_RELEASE",
            ContractStatus::Disputed => "DISPUTED",
            ContractStatus::Released => "RELEASED",
            ContractStatus::Refunded => "REFUNDED",
        };
        write!(f, "{}", label)
    }
}

/// Who a dispute is resolved in favour of
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeOutcome {
    /// Pay the worker, as if the contract had been claimed
    Worker,
    /// Return the funds to the client
    Client,
}

impl std::fmt::Display for DisputeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisputeOutcome::Worker => write!(f, "WORKER"),
            DisputeOutcome::Client => write!(f, "CLIENT"),
        }
    }
}

/// What caused a release
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseTrigger {
    /// Manual claim by the worker or client
    Claim,
    /// Scheduler tick after the unlock time passed
    Timer,
    /// Dispute resolved in the worker's favour
    Resolution,
}

/// Payload-free transition discriminant, used for guard checks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    DeliverWork,
    Release,
    RaiseDispute,
    Resolve(DisputeOutcome),
}

impl TransitionKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransitionKind::DeliverWork => "deliver_work",
            TransitionKind::Release => "release",
            TransitionKind::RaiseDispute => "raise_dispute",
            TransitionKind::Resolve(_) => "resolve_dispute",
        }
    }
}

/// Result of looking up a transition in the state table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionRule {
    /// Move to the given status
    Apply(ContractStatus),
    /// Already past this point; nothing to do
    Noop,
    /// Not allowed from the current status
    Invalid,
}

/// A transition request carrying only the data its target state needs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractEvent {
    DeliverWork {
        unlock_at: DateTime<Utc>,
        unlock_duration_ms: u64,
    },
    Release {
        trigger: ReleaseTrigger,
        payout_ref: Option<LedgerRef>,
    },
    RaiseDispute {
        reason: String,
    },
    Resolve {
        outcome: DisputeOutcome,
        payout_ref: Option<LedgerRef>,
    },
}

impl ContractEvent {
    pub fn kind(&self) -> TransitionKind {
        match self {
            ContractEvent::DeliverWork { .. } => TransitionKind::DeliverWork,
            ContractEvent::Release { .. } => TransitionKind::Release,
            ContractEvent::RaiseDispute { .. } => TransitionKind::RaiseDispute,
            ContractEvent::Resolve { outcome, .. } => TransitionKind::Resolve(*outcome),
        }
    }
}

/// Where a contract came from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ContractOrigin {
    /// Created through a gig on this engine
    #[default]
    Local,
    /// Discovered among the deposit address's unspent records
    Ledger { creation_height: u64 },
}

/// Details recorded when a contract is disputed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeInfo {
    pub reason: String,
    pub raised_at: DateTime<Utc>,
    /// Countdown left when the timer was halted
    pub remaining_ms: u64,
    pub outcome: Option<DisputeOutcome>,
}

/// A locked payment for a worker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Unique contract identifier
    pub id: ContractId,
    /// Worker the payment is for
    pub worker_id: WorkerId,
    /// Worker profile as it was when the contract was created (display only)
    pub worker_snapshot: WorkerProfile,
    /// Locked amount
    pub amount: Amount,
    /// Current lifecycle status
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
    /// Earliest release time; recomputed when work is delivered
    pub unlock_at: DateTime<Utc>,
    /// Unlock duration the current `unlock_at` was derived from
    pub unlock_duration_ms: u64,
    /// Deposit record backing this contract
    pub ledger_ref: Option<LedgerRef>,
    /// Payout transaction, once released
    pub payout_ref: Option<LedgerRef>,
    /// Address of the paying client, when known
    pub client_address: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub dispute: Option<DisputeInfo>,
    pub settled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub origin: ContractOrigin,
}

impl Contract {
    /// Create a new locked contract
    pub fn new(
        worker: &WorkerProfile,
        amount: Amount,
        created_at: DateTime<Utc>,
        unlock_duration: Duration,
    ) -> Self {
        let unlock_duration_ms = unlock_duration.as_millis() as u64;
        Self {
            id: ContractId::generate(),
            worker_id: worker.id.clone(),
            worker_snapshot: worker.clone(),
            amount,
            status: ContractStatus::Locked,
            created_at,
            unlock_at: created_at + chrono::Duration::milliseconds(unlock_duration_ms as i64),
            unlock_duration_ms,
            ledger_ref: None,
            payout_ref: None,
            client_address: None,
            delivered_at: None,
            dispute: None,
            settled_at: None,
            origin: ContractOrigin::Local,
        }
    }

    pub fn with_id(mut self, id: ContractId) -> Self {
        self.id = id;
        self
    }

    pub fn with_ledger_ref(mut self, ledger_ref: LedgerRef) -> Self {
        self.ledger_ref = Some(ledger_ref);
        self
    }

    pub fn with_client_address(mut self, address: impl Into<String>) -> Self {
        self.client_address = Some(address.into());
        self
    }

    pub fn with_origin(mut self, origin: ContractOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_unlock_at(mut self, unlock_at: DateTime<Utc>) -> Self {
        self.unlock_at = unlock_at;
        self
    }

    /// Check a transition against the state table without applying it
    pub fn check(&self, kind: TransitionKind) -> EscrowResult<TransitionRule> {
        match self.status.rule(kind) {
            TransitionRule::Invalid => Err(EscrowError::InvalidState {
                contract_id: self.id.clone(),
                status: self.status,
                event: kind.name(),
            }),
            rule => Ok(rule),
        }
    }

    /// Apply a transition. Returns the new status, or `None` for a no-op.
    ///
    /// On error the contract is left untouched.
    pub fn apply(
        &mut self,
        event: ContractEvent,
        now: DateTime<Utc>,
    ) -> EscrowResult<Option<ContractStatus>> {
        let next = match self.check(event.kind())? {
            TransitionRule::Apply(next) => next,
            _ => return Ok(None),
        };

        match event {
            ContractEvent::DeliverWork {
                unlock_at,
                unlock_duration_ms,
            } => {
                self.unlock_at = unlock_at;
                self.unlock_duration_ms = unlock_duration_ms;
                self.delivered_at = Some(now);
            }
            ContractEvent::Release { payout_ref, .. } => {
                self.payout_ref = payout_ref;
                self.settled_at = Some(now);
            }
            ContractEvent::RaiseDispute { reason } => {
                self.dispute = Some(DisputeInfo {
                    reason,
                    raised_at: now,
                    remaining_ms: self.remaining_at(now).as_millis() as u64,
                    outcome: None,
                });
            }
            ContractEvent::Resolve {
                outcome,
                payout_ref,
            } => {
                if let Some(dispute) = self.dispute.as_mut() {
                    dispute.outcome = Some(outcome);
                }
                self.payout_ref = payout_ref;
                self.settled_at = Some(now);
            }
        }

        self.status = next;
        Ok(Some(next))
    }

    /// Time left before the contract may be released
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        match self.status {
            ContractStatus::Locked => Duration::from_millis(self.unlock_duration_ms),
            ContractStatus::PendingRelease => self.remaining_at(now),
            ContractStatus::Disputed => Duration::from_millis(
                self.dispute.as_ref().map(|d| d.remaining_ms).unwrap_or(0),
            ),
            ContractStatus::Released | ContractStatus::Refunded => Duration::ZERO,
        }
    }

    /// Whether a pending contract's countdown has run out
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ContractStatus::PendingRelease && self.unlock_at <= now
    }

    fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.unlock_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}
