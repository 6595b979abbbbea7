//! Trust scoring and unlock duration
//!
//! Pure functions of a profile and an instant. The score heals as dispute
//! records age, so callers must pass the time they want the answer for.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use escrow_types::{ReputationBreakdown, TrustColor, TrustTier, WorkerProfile};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Score points per completed job
pub const JOB_WEIGHT: i64 = 15;

/// Staked amount per score point
pub const STAKE_DIVISOR: u64 = 10;

/// Penalty for one dispute record given its age.
///
/// Buckets are half-open: `[0, 30d) → 100`, `[30d, 90d) → 50`,
/// `[90d, 365d) → 20`, `[365d, ∞) → 0`. Records dated in the future count
/// as fresh.
pub fn dispute_penalty(elapsed: ChronoDuration) -> i64 {
    if elapsed < ChronoDuration::days(30) {
        100
    } else if elapsed < ChronoDuration::days(90) {
        50
    } else if elapsed < ChronoDuration::days(365) {
        20
    } else {
        0
    }
}

/// Sum of decayed penalties over a worker's dispute history
pub fn total_dispute_penalty(profile: &WorkerProfile, now: DateTime<Utc>) -> i64 {
    profile
        .dispute_history
        .iter()
        .map(|record| dispute_penalty(now - record.occurred_at))
        .fold(0i64, i64::saturating_add)
}

/// Constants of the risk-additive unlock formula
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnlockPolicy {
    pub base_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    /// Reduction per completed job
    pub job_reduction_ms: u64,
    /// Jobs beyond this count earn no further reduction
    pub job_reduction_cap: u64,
    /// Staked amount per risk step
    pub risk_unit: u64,
    pub risk_step_ms: u64,
    pub risk_step_cap: u64,
    /// Added per lost dispute, regardless of age
    pub dispute_penalty_ms: u64,
}

impl Default for UnlockPolicy {
    fn default() -> Self {
        Self {
            base_ms: 30_000,
            min_ms: 5_000,
            max_ms: 120_000,
            job_reduction_ms: 1_000,
            job_reduction_cap: 25,
            risk_unit: 100,
            risk_step_ms: 1_000,
            risk_step_cap: 30,
            dispute_penalty_ms: 10_000,
        }
    }
}

/// Derives scores, classifications and unlock durations
#[derive(Debug, Clone, Default)]
pub struct ScoreEngine {
    policy: UnlockPolicy,
}

impl ScoreEngine {
    pub fn new(policy: UnlockPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &UnlockPolicy {
        &self.policy
    }

    /// `jobs * 15 + floor(staked / 10) - decayed dispute penalty`
    pub fn score(&self, profile: &WorkerProfile, now: DateTime<Utc>) -> i64 {
        combine(
            jobs_bonus(profile),
            staked_bonus(profile),
            total_dispute_penalty(profile, now),
        )
    }

    /// Full decomposition of the score at `now`
    pub fn breakdown(&self, profile: &WorkerProfile, now: DateTime<Utc>) -> ReputationBreakdown {
        let jobs_bonus = jobs_bonus(profile);
        let staked_bonus = staked_bonus(profile);
        let dispute_penalty = total_dispute_penalty(profile, now);
        let score = combine(jobs_bonus, staked_bonus, dispute_penalty);
        let trust_color = TrustColor::from_score(score);

        ReputationBreakdown {
            score,
            jobs_bonus,
            dispute_penalty,
            staked_bonus,
            tier: TrustTier::from_score(score),
            trust_color,
            trust_label: trust_color.label().to_string(),
            unlock_duration_ms: self.unlock_duration(profile).as_millis() as u64,
        }
    }

    /// Wait between work delivery and release.
    ///
    /// `clamp(base - min(jobs, cap) + min(staked / unit, cap) + disputes * step, min, max)`.
    /// Unlike the score, this does not depend on time.
    pub fn unlock_duration(&self, profile: &WorkerProfile) -> Duration {
        let p = &self.policy;

        let reduction = profile
            .jobs_completed
            .min(p.job_reduction_cap)
            .saturating_mul(p.job_reduction_ms);

        let risk_steps = if p.risk_unit == 0 {
            p.risk_step_cap
        } else {
            (profile.staked_amount.0 / p.risk_unit).min(p.risk_step_cap)
        };
        let risk_penalty = risk_steps
            .saturating_mul(p.risk_step_ms)
            .saturating_add(profile.disputes_lost().saturating_mul(p.dispute_penalty_ms));

        let raw = p.base_ms.saturating_add(risk_penalty).saturating_sub(reduction);
        Duration::from_millis(raw.clamp(p.min_ms, p.max_ms.max(p.min_ms)))
    }
}

fn combine(jobs_bonus: i64, staked_bonus: i64, penalty: i64) -> i64 {
    jobs_bonus.saturating_add(staked_bonus).saturating_sub(penalty)
}

fn jobs_bonus(profile: &WorkerProfile) -> i64 {
    i64::try_from(profile.jobs_completed)
        .unwrap_or(i64::MAX)
        .saturating_mul(JOB_WEIGHT)
}

fn staked_bonus(profile: &WorkerProfile) -> i64 {
    i64::try_from(profile.staked_amount.0 / STAKE_DIVISOR).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_types::{Amount, DisputeRecord, WorkerId};

    fn worker(jobs: u64) -> WorkerProfile {
        WorkerProfile::new(WorkerId::new("w"), "W").with_jobs_completed(jobs)
    }

    #[test]
    fn test_dispute_penalty_buckets() {
        assert_eq!(dispute_penalty(ChronoDuration::zero()), 100);
        assert_eq!(dispute_penalty(ChronoDuration::days(30) - ChronoDuration::milliseconds(1)), 100);
        assert_eq!(dispute_penalty(ChronoDuration::days(30)), 50);
        assert_eq!(dispute_penalty(ChronoDuration::days(90)), 20);
        assert_eq!(dispute_penalty(ChronoDuration::days(364)), 20);
        assert_eq!(dispute_penalty(ChronoDuration::days(365)), 0);
        assert_eq!(dispute_penalty(ChronoDuration::days(-1)), 100);
    }

    #[test]
    fn test_score_components() {
        let now = Utc::now();
        let profile = worker(25)
            .with_staked_amount(Amount::new(300))
            .with_dispute(DisputeRecord::new(now - ChronoDuration::days(20), Amount::new(50)));

        let engine = ScoreEngine::default();
        let breakdown = engine.breakdown(&profile, now);

        assert_eq!(breakdown.jobs_bonus, 375);
        assert_eq!(breakdown.staked_bonus, 30);
        assert_eq!(breakdown.dispute_penalty, 100);
        assert_eq!(breakdown.score, 305);
        assert_eq!(breakdown.tier, TrustTier::Tier2);
        assert_eq!(breakdown.trust_color, TrustColor::Yellow);
        assert_eq!(breakdown.trust_label, "MEDIUM");
        assert_eq!(engine.score(&profile, now), 305);
    }

    #[test]
    fn test_score_heals_over_time() {
        let now = Utc::now();
        let profile = worker(10).with_dispute(DisputeRecord::new(now, Amount::new(10)));
        let engine = ScoreEngine::default();

        assert_eq!(engine.score(&profile, now), 50);
        assert_eq!(engine.score(&profile, now + ChronoDuration::days(30)), 100);
        assert_eq!(engine.score(&profile, now + ChronoDuration::days(90)), 130);
        assert_eq!(engine.score(&profile, now + ChronoDuration::days(365)), 150);
    }

    #[test]
    fn test_tier_and_color_use_separate_scales() {
        let now = Utc::now();
        let engine = ScoreEngine::default();

        // 600: Tier 1 but only MEDIUM
        let b = engine.breakdown(&worker(40), now);
        assert_eq!(b.tier, TrustTier::Tier1);
        assert_eq!(b.trust_color, TrustColor::Yellow);

        // 105: Tier 2 but LOW
        let b = engine.breakdown(&worker(7), now);
        assert_eq!(b.tier, TrustTier::Tier2);
        assert_eq!(b.trust_color, TrustColor::Red);
    }

    #[test]
    fn test_unlock_duration_scenarios() {
        let engine = ScoreEngine::default();

        assert_eq!(engine.unlock_duration(&worker(58)), Duration::from_secs(5));
        assert_eq!(engine.unlock_duration(&worker(2)), Duration::from_secs(28));

        let risky = worker(0)
            .with_staked_amount(Amount::new(100_000))
            .with_dispute(DisputeRecord::new(Utc::now(), Amount::new(1)));
        // 30 + 30 + 10
        assert_eq!(engine.unlock_duration(&risky), Duration::from_secs(70));
    }

    #[test]
    fn test_score_saturates_for_extreme_profiles() {
        let now = Utc::now();
        let engine = ScoreEngine::default();

        let huge = worker(u64::MAX).with_staked_amount(Amount::new(u64::MAX));
        assert_eq!(engine.score(&huge, now), i64::MAX);
        assert_eq!(engine.breakdown(&huge, now).score, i64::MAX);

        let just_past = worker(i64::MAX as u64 + 1);
        assert_eq!(engine.score(&just_past, now), i64::MAX);

        let mut disputed = worker(u64::MAX);
        disputed = disputed.with_dispute(DisputeRecord::new(now, Amount::new(1)));
        assert_eq!(engine.score(&disputed, now), i64::MAX - 100);
    }

    #[test]
    fn test_unlock_duration_clamps_to_max() {
        let engine = ScoreEngine::default();
        let mut profile = worker(0).with_staked_amount(Amount::new(u64::MAX));
        for _ in 0..20 {
            profile = profile.with_dispute(DisputeRecord::new(Utc::now(), Amount::new(1)));
        }
        assert_eq!(engine.unlock_duration(&profile), Duration::from_secs(120));
    }
}
