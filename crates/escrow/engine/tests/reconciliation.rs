//! Merging ledger records through the engine

mod common;

use common::Harness;
use escrow_types::{
    Amount, ContractId, ContractOrigin, ContractStatus, EscrowError, EscrowEvent, UnspentRecord,
    WorkerId, REGISTER_WORKER,
};

#[tokio::test]
async fn test_same_record_twice_yields_one_contract() {
    let h = Harness::new();
    let address = h.deposit_address();
    h.ledger.insert_record(
        &address,
        UnspentRecord::new("a1b2", Amount::new(120), 400).with_register(REGISTER_WORKER, "diana"),
    );

    let first = h.engine.reconcile().await.unwrap();
    let second = h.engine.reconcile().await.unwrap();

    assert_eq!(first.merged, vec![ContractId::new("chain-a1b2")]);
    assert!(second.merged.is_empty());
    assert_eq!(second.skipped, 1);
    assert_eq!(h.engine.contracts().await.len(), 1);
    assert_eq!(h.staked("diana"), Amount::new(920));
}

#[tokio::test]
async fn test_two_distinct_records_yield_two_contracts() {
    let h = Harness::new();
    let address = h.deposit_address();
    h.ledger
        .insert_record(&address, UnspentRecord::new("r1", Amount::new(10), 1));
    h.ledger
        .insert_record(&address, UnspentRecord::new("r2", Amount::new(20), 2));

    let report = h.engine.reconcile().await.unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.merged.len(), 2);
    let contracts = h.engine.contracts().await;
    assert_eq!(contracts.len(), 2);
    assert!(contracts
        .iter()
        .all(|c| c.worker_id.is_unknown() && c.status == ContractStatus::Locked));
    assert_eq!(h.staked("unknown"), Amount::new(30));
}

#[tokio::test]
async fn test_local_deposits_are_not_remerged() {
    let h = Harness::new();
    h.gig("alice", 10).await;
    h.gig("bob", 20).await;

    let report = h.engine.reconcile().await.unwrap();

    assert_eq!(report.fetched, 2);
    assert!(report.merged.is_empty());
    assert_eq!(h.engine.contracts().await.len(), 2);
}

#[tokio::test]
async fn test_failed_query_leaves_state_untouched() {
    let h = Harness::new();
    h.gig("alice", 10).await;
    h.ledger.insert_record(
        &h.deposit_address(),
        UnspentRecord::new("late", Amount::new(5), 9),
    );
    h.ledger.fail_queries(true);
    let before = h.engine.snapshot().await;
    let mut rx = h.engine.subscribe();

    let err = h.engine.reconcile().await.unwrap_err();

    assert!(matches!(err, EscrowError::ReconciliationFailed(_)));
    let after = h.engine.snapshot().await;
    assert_eq!(after.workers, before.workers);
    assert_eq!(after.contracts, before.contracts);
    assert!(matches!(
        rx.try_recv().unwrap().event,
        EscrowEvent::ReconciliationFailed { .. }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reconciles_do_not_duplicate() {
    let h = Harness::new();
    let address = h.deposit_address();
    for i in 0..10 {
        h.ledger.insert_record(
            &address,
            UnspentRecord::new(format!("box{}", i), Amount::new(100), i),
        );
    }

    let (a, b, c) = tokio::join!(
        h.engine.reconcile(),
        h.engine.reconcile(),
        h.engine.reconcile()
    );
    let merged = a.unwrap().merged.len() + b.unwrap().merged.len() + c.unwrap().merged.len();

    assert_eq!(merged, 10);
    assert_eq!(h.engine.contracts().await.len(), 10);
    assert_eq!(h.staked("unknown"), Amount::new(1000));
}

#[tokio::test]
async fn test_reconciled_contract_completes_lifecycle() {
    let h = Harness::new();
    h.ledger.insert_record(
        &h.deposit_address(),
        UnspentRecord::new("ext", Amount::new(50), 77).with_register(REGISTER_WORKER, "alice"),
    );
    h.engine.reconcile().await.unwrap();
    let id = ContractId::new("chain-ext");

    let contract = h.engine.contract(&id).await.unwrap();
    assert_eq!(contract.worker_id, WorkerId::new("alice"));
    assert_eq!(contract.origin, ContractOrigin::Ledger { creation_height: 77 });

    h.engine.deliver_work(&id).await.unwrap();
    h.advance_secs(5);
    let released = h.engine.claim(&id).await.unwrap();

    assert_eq!(released.status, ContractStatus::Released);
    assert!(h.ledger.unspent_at(&h.deposit_address()).is_empty());
    assert_eq!(h.jobs("alice"), 86);
}
