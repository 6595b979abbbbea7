//! Worker registry
//!
//! Owns every [`WorkerProfile`]. Each mutation runs under the profile's
//! dashmap entry lock, so a reader never sees a half-applied update and
//! operations on different workers never contend.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use escrow_types::{
    Amount, DisputeRecord, EscrowError, EscrowResult, WorkerId, WorkerProfile,
};
use tracing::{info, warn};

/// A stake decrement that would have gone below zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeClamp {
    /// Stake held before the decrement
    pub staked: Amount,
    /// Amount the caller tried to remove
    pub requested: Amount,
}

/// In-memory worker registry
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: DashMap<WorkerId, WorkerProfile>,
}

impl WorkerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the default worker set
    pub fn seeded(now: DateTime<Utc>) -> Self {
        let registry = Self::new();
        registry.restore(default_profiles(now));
        registry
    }

    /// Add a fresh profile with no history
    pub fn register_worker(
        &self,
        id: WorkerId,
        name: impl Into<String>,
    ) -> EscrowResult<WorkerProfile> {
        match self.workers.entry(id.clone()) {
            Entry::Occupied(_) => Err(EscrowError::DuplicateWorker(id)),
            Entry::Vacant(slot) => {
                let profile = WorkerProfile::new(id, name);
                info!(worker_id = %profile.id, name = %profile.name, "worker registered");
                slot.insert(profile.clone());
                Ok(profile)
            }
        }
    }

    /// Current profile snapshot
    pub fn get(&self, id: &WorkerId) -> Option<WorkerProfile> {
        self.workers.get(id).map(|p| p.clone())
    }

    pub fn require(&self, id: &WorkerId) -> EscrowResult<WorkerProfile> {
        self.get(id)
            .ok_or_else(|| EscrowError::WorkerNotFound(id.clone()))
    }

    pub fn contains(&self, id: &WorkerId) -> bool {
        self.workers.contains_key(id)
    }

    /// All profiles, ordered by id
    pub fn list(&self) -> Vec<WorkerProfile> {
        let mut profiles: Vec<_> = self.workers.iter().map(|p| p.clone()).collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Put funds at risk. Returns the updated profile.
    pub fn add_stake(&self, id: &WorkerId, amount: Amount) -> EscrowResult<WorkerProfile> {
        self.update(id, |profile| {
            profile.staked_amount = profile.staked_amount.saturating_add(amount);
        })
    }

    /// Take funds off risk, clamping at zero
    pub fn remove_stake(&self, id: &WorkerId, amount: Amount) -> EscrowResult<Option<StakeClamp>> {
        self.update_with(id, |profile| release_stake(profile, amount))
    }

    /// Apply a payout to the worker: stake down, one more completed job
    pub fn record_release(&self, id: &WorkerId, amount: Amount) -> EscrowResult<Option<StakeClamp>> {
        self.update_with(id, |profile| {
            let clamp = release_stake(profile, amount);
            profile.jobs_completed = profile.jobs_completed.saturating_add(1);
            clamp
        })
    }

    /// Apply a refund to the client: stake down, optionally a lost dispute
    pub fn record_refund(
        &self,
        id: &WorkerId,
        amount: Amount,
        dispute: Option<DisputeRecord>,
    ) -> EscrowResult<Option<StakeClamp>> {
        self.update_with(id, |profile| {
            let clamp = release_stake(profile, amount);
            if let Some(record) = dispute {
                profile.dispute_history.push(record);
            }
            clamp
        })
    }

    pub fn add_dispute(&self, id: &WorkerId, record: DisputeRecord) -> EscrowResult<WorkerProfile> {
        self.update(id, |profile| profile.dispute_history.push(record))
    }

    /// The provisional worker, created on first use
    pub fn ensure_provisional(&self) -> WorkerProfile {
        self.workers
            .entry(WorkerId::unknown())
            .or_insert_with(WorkerProfile::provisional)
            .clone()
    }

    /// Replace every profile with the default set
    pub fn reset(&self, now: DateTime<Utc>) {
        self.workers.clear();
        self.restore(default_profiles(now));
        info!(workers = self.workers.len(), "registry reset to defaults");
    }

    /// Insert profiles, replacing any with the same id
    pub fn restore(&self, profiles: impl IntoIterator<Item = WorkerProfile>) {
        for profile in profiles {
            self.workers.insert(profile.id.clone(), profile);
        }
    }

    pub fn clear(&self) {
        self.workers.clear();
    }

    fn update<F>(&self, id: &WorkerId, f: F) -> EscrowResult<WorkerProfile>
    where
        F: FnOnce(&mut WorkerProfile),
    {
        let mut entry = self
            .workers
            .get_mut(id)
            .ok_or_else(|| EscrowError::WorkerNotFound(id.clone()))?;
        f(entry.value_mut());
        Ok(entry.value().clone())
    }

    fn update_with<F, T>(&self, id: &WorkerId, f: F) -> EscrowResult<T>
    where
        F: FnOnce(&mut WorkerProfile) -> T,
    {
        let mut entry = self
            .workers
            .get_mut(id)
            .ok_or_else(|| EscrowError::WorkerNotFound(id.clone()))?;
        Ok(f(entry.value_mut()))
    }
}

fn release_stake(profile: &mut WorkerProfile, amount: Amount) -> Option<StakeClamp> {
    let staked = profile.staked_amount;
    let (remaining, clamped) = staked.clamped_sub(amount);
    profile.staked_amount = remaining;

    if clamped {
        warn!(
            worker_id = %profile.id,
            staked = staked.0,
            requested = amount.0,
            "stake decrement clamped at zero"
        );
        Some(StakeClamp {
            staked,
            requested: amount,
        })
    } else {
        None
    }
}

/// The fixed default worker set
pub fn default_profiles(now: DateTime<Utc>) -> Vec<WorkerProfile> {
    vec![
        WorkerProfile::new(WorkerId::new("alice"), "Alice Chen").with_jobs_completed(85),
        WorkerProfile::new(WorkerId::new("bob"), "Bob Martinez")
            .with_jobs_completed(25)
            .with_dispute(DisputeRecord::new(now - Duration::days(20), Amount::new(50))),
        WorkerProfile::new(WorkerId::new("charlie"), "Charlie Kim").with_jobs_completed(5),
        WorkerProfile::new(WorkerId::new("diana"), "Diana Patel")
            .with_jobs_completed(42)
            .with_staked_amount(Amount::new(800)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_registry() {
        let registry = WorkerRegistry::seeded(Utc::now());
        assert_eq!(registry.len(), 4);

        let bob = registry.require(&WorkerId::new("bob")).unwrap();
        assert_eq!(bob.jobs_completed, 25);
        assert_eq!(bob.dispute_history.len(), 1);

        let diana = registry.require(&WorkerId::new("diana")).unwrap();
        assert_eq!(diana.staked_amount, Amount::new(800));
    }

    #[test]
    fn test_register_duplicate_fails() {
        let registry = WorkerRegistry::new();
        registry.register_worker(WorkerId::new("eve"), "Eve").unwrap();

        let err = registry
            .register_worker(WorkerId::new("eve"), "Eve again")
            .unwrap_err();
        assert_eq!(err, EscrowError::DuplicateWorker(WorkerId::new("eve")));
    }

    #[test]
    fn test_missing_worker() {
        let registry = WorkerRegistry::new();
        let err = registry
            .add_stake(&WorkerId::new("ghost"), Amount::new(1))
            .unwrap_err();
        assert!(matches!(err, EscrowError::WorkerNotFound(_)));
    }

    #[test]
    fn test_release_updates_stake_and_jobs() {
        let registry = WorkerRegistry::new();
        let id = WorkerId::new("eve");
        registry.register_worker(id.clone(), "Eve").unwrap();
        registry.add_stake(&id, Amount::new(300)).unwrap();

        let clamp = registry.record_release(&id, Amount::new(100)).unwrap();
        assert!(clamp.is_none());

        let profile = registry.require(&id).unwrap();
        assert_eq!(profile.staked_amount, Amount::new(200));
        assert_eq!(profile.jobs_completed, 1);
    }

    #[test]
    fn test_stake_clamps_at_zero() {
        let registry = WorkerRegistry::new();
        let id = WorkerId::new("eve");
        registry.register_worker(id.clone(), "Eve").unwrap();
        registry.add_stake(&id, Amount::new(50)).unwrap();

        let clamp = registry.remove_stake(&id, Amount::new(80)).unwrap();
        assert_eq!(
            clamp,
            Some(StakeClamp {
                staked: Amount::new(50),
                requested: Amount::new(80),
            })
        );
        assert_eq!(registry.require(&id).unwrap().staked_amount, Amount::zero());
    }

    #[test]
    fn test_refund_records_dispute_without_job() {
        let registry = WorkerRegistry::new();
        let id = WorkerId::new("eve");
        registry.register_worker(id.clone(), "Eve").unwrap();
        registry.add_stake(&id, Amount::new(100)).unwrap();

        let record = DisputeRecord::new(Utc::now(), Amount::new(100));
        registry
            .record_refund(&id, Amount::new(100), Some(record))
            .unwrap();

        let profile = registry.require(&id).unwrap();
        assert_eq!(profile.jobs_completed, 0);
        assert_eq!(profile.staked_amount, Amount::zero());
        assert_eq!(profile.dispute_history.len(), 1);
    }

    #[test]
    fn test_provisional_worker_created_once() {
        let registry = WorkerRegistry::new();
        let first = registry.ensure_provisional();
        registry.add_stake(&first.id, Amount::new(10)).unwrap();

        let second = registry.ensure_provisional();
        assert!(second.provisional);
        assert_eq!(second.staked_amount, Amount::new(10));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let registry = WorkerRegistry::seeded(Utc::now());
        registry.register_worker(WorkerId::new("eve"), "Eve").unwrap();
        registry
            .record_release(&WorkerId::new("alice"), Amount::zero())
            .unwrap();

        registry.reset(Utc::now());

        assert_eq!(registry.len(), 4);
        assert!(!registry.contains(&WorkerId::new("eve")));
        assert_eq!(
            registry.require(&WorkerId::new("alice")).unwrap().jobs_completed,
            85
        );
    }
}
