//! Sessions that vanish at the store are replaced transparently.

use crate::config::SessionPoolOptions;
use crate::e2e_tests::helpers::{TestDatabase, fast_retries, select1_statement, update_statement};
use crate::rpc::RpcMethod;
use crate::simulation::SimulatedExecutionTime;
use crate::status::Status;

#[tokio::test(start_paused = true)]
async fn test_runner_replaces_lost_session() {
    let db = TestDatabase::new().await;
    db.store.invalidate_all_sessions();

    let mut runner = db.client.read_write_transaction();
    let count = runner
        .run(|ctx| async move { ctx.execute_update(&update_statement()).await })
        .await
        .unwrap();

    assert_eq!(count, 1);
    assert_eq!(runner.attempts(), 2);
    // The lost session was dropped from the pool, not returned to it.
    let stats = db.client.pool_stats();
    assert_eq!(stats.total, 1);
    assert_eq!(db.store.active_session_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_session_lost_at_commit_is_retried() {
    let db = TestDatabase::new().await;
    db.store.set_execution_time(
        RpcMethod::Commit,
        SimulatedExecutionTime::of_exception(Status::session_not_found("gone")),
    );

    let mut runner = db.client.read_write_transaction();
    runner
        .run(|ctx| async move { ctx.execute_update(&update_statement()).await })
        .await
        .unwrap();

    assert_eq!(runner.attempts(), 2);
    assert_eq!(db.store.request_count(RpcMethod::Commit), 2);
}

#[tokio::test]
async fn test_read_only_transaction_surfaces_lost_session() {
    let db = TestDatabase::with_options(
        SessionPoolOptions::default().with_min_sessions(1),
        fast_retries(),
    )
    .await;
    let mut transaction = db.client.read_only_transaction().await.unwrap();
    db.store.invalidate_all_sessions();

    let error = transaction
        .execute_query(&select1_statement())
        .await
        .unwrap_err();
    assert!(!matches!(error.disposition(), crate::error::Disposition::Fail));
    assert!(transaction.is_closed());
    assert_eq!(db.client.pool_stats().total, 0);
}
