//! A caller deadline stops the run with a timeout distinct from an abort,
//! and the session still goes back to the pool.

use std::time::Duration;

use crate::config::SessionPoolOptions;
use crate::e2e_tests::helpers::{TestDatabase, fast_retries, update_statement};
use crate::error::ClientError;
use crate::rpc::RpcMethod;
use crate::simulation::SimulatedExecutionTime;
use crate::status::Code;

#[tokio::test(start_paused = true)]
async fn test_slow_statement_hits_deadline() {
    let db = TestDatabase::new().await;
    db.store.set_execution_time(
        RpcMethod::ExecuteSql,
        SimulatedExecutionTime::of_delay(Duration::from_secs(30)),
    );

    let mut runner = db
        .client
        .read_write_transaction()
        .with_deadline(Duration::from_secs(1));
    let error = runner
        .run(|ctx| async move { ctx.execute_update(&update_statement()).await })
        .await
        .unwrap_err();

    assert!(matches!(error, ClientError::DeadlineExceeded { .. }));
    assert_eq!(error.code(), Code::DeadlineExceeded);
    assert!(!error.is_retryable());
    assert_eq!(db.client.pool_stats().checked_out, 0);
    assert_eq!(db.store.request_count(RpcMethod::Commit), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fast_statement_beats_deadline() {
    let db = TestDatabase::new().await;
    db.store.set_execution_time(
        RpcMethod::ExecuteSql,
        SimulatedExecutionTime::of_delay(Duration::from_millis(10)),
    );

    let mut runner = db
        .client
        .read_write_transaction()
        .with_deadline(Duration::from_secs(1));
    let count = runner
        .run(|ctx| async move { ctx.execute_update(&update_statement()).await })
        .await
        .unwrap();
    assert_eq!(count, 1);

    db.store.remove_all_execution_times();
}

#[tokio::test(start_paused = true)]
async fn test_deadline_during_session_creation_frees_the_slot() {
    let db = TestDatabase::with_options(
        SessionPoolOptions::default()
            .with_min_sessions(0)
            .with_max_sessions(1),
        fast_retries(),
    )
    .await;
    db.store.set_execution_time(
        RpcMethod::CreateSession,
        SimulatedExecutionTime::of_delay(Duration::from_secs(30)),
    );

    let mut runner = db
        .client
        .read_write_transaction()
        .with_deadline(Duration::from_secs(1));
    let error = runner
        .run(|ctx| async move { ctx.execute_update(&update_statement()).await })
        .await
        .unwrap_err();
    assert!(matches!(error, ClientError::DeadlineExceeded { .. }));

    let stats = db.client.pool_stats();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.checked_out, 0);
    assert_eq!(db.store.active_session_count(), 0);

    // The single slot is usable again
    db.store.remove_all_execution_times();
    let count = db
        .client
        .read_write_transaction()
        .run(|ctx| async move { ctx.execute_update(&update_statement()).await })
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(db.client.pool_stats().total, 1);
}
