//! Property tests for scoring and unlock durations

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use escrow_engine::score::{total_dispute_penalty, ScoreEngine};
use escrow_types::{Amount, DisputeRecord, WorkerId, WorkerProfile};
use proptest::prelude::*;
use std::time::Duration;

fn profile(jobs: u64, staked: u64, dispute_ages_days: &[i64]) -> WorkerProfile {
    let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut profile = WorkerProfile::new(WorkerId::new("p"), "P")
        .with_jobs_completed(jobs)
        .with_staked_amount(Amount::new(staked));
    for days in dispute_ages_days {
        profile = profile.with_dispute(DisputeRecord::new(
            epoch - ChronoDuration::days(*days),
            Amount::new(1),
        ));
    }
    profile
}

proptest! {
    #[test]
    fn prop_unlock_duration_bounded(
        jobs in any::<u64>(),
        staked in any::<u64>(),
        disputes in prop::collection::vec(0i64..1000, 0..40),
    ) {
        let d = ScoreEngine::default().unlock_duration(&profile(jobs, staked, &disputes));
        prop_assert!(d >= Duration::from_secs(5));
        prop_assert!(d <= Duration::from_secs(120));
    }

    #[test]
    fn prop_more_jobs_never_slower(
        jobs in 0u64..200,
        extra in 0u64..200,
        staked in 0u64..10_000,
    ) {
        let engine = ScoreEngine::default();
        let base = engine.unlock_duration(&profile(jobs, staked, &[]));
        let better = engine.unlock_duration(&profile(jobs + extra, staked, &[]));
        prop_assert!(better <= base);
    }

    #[test]
    fn prop_more_stake_never_faster(
        jobs in 0u64..50,
        staked in 0u64..100_000,
        extra in 0u64..100_000,
    ) {
        let engine = ScoreEngine::default();
        let base = engine.unlock_duration(&profile(jobs, staked, &[]));
        let riskier = engine.unlock_duration(&profile(jobs, staked + extra, &[]));
        prop_assert!(riskier >= base);
    }

    #[test]
    fn prop_penalty_never_grows_with_time(
        disputes in prop::collection::vec(0i64..800, 0..10),
        t1 in 0i64..800,
        dt in 0i64..800,
    ) {
        let p = profile(10, 0, &disputes);
        let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let engine = ScoreEngine::default();
        let earlier = epoch + ChronoDuration::days(t1);
        let later = earlier + ChronoDuration::days(dt);

        prop_assert!(total_dispute_penalty(&p, later) <= total_dispute_penalty(&p, earlier));
        prop_assert!(engine.score(&p, later) >= engine.score(&p, earlier));
    }
}

#[test]
fn test_penalty_drops_at_each_boundary() {
    let p = profile(0, 0, &[0]);
    let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let just_before = |days: i64| epoch + ChronoDuration::days(days) - ChronoDuration::milliseconds(1);

    for (days, before, after) in [(30, 100, 50), (90, 50, 20), (365, 20, 0)] {
        assert_eq!(total_dispute_penalty(&p, just_before(days)), before);
        assert_eq!(
            total_dispute_penalty(&p, epoch + ChronoDuration::days(days)),
            after
        );
    }
}
