//! Pool capacity, exhaustion and close as seen through the client.

use std::time::Duration;

use crate::config::SessionPoolOptions;
use crate::e2e_tests::helpers::{TestDatabase, fast_retries, select1_statement, update_statement};
use crate::error::ClientError;
use crate::rpc::RpcMethod;

#[tokio::test]
async fn test_operations_after_close_fail() {
    let db = TestDatabase::new().await;
    db.client.close().await;

    let mut runner = db.client.read_write_transaction();
    let result = runner
        .run(|ctx| async move { ctx.execute_update(&update_statement()).await })
        .await;
    assert_eq!(result, Err(ClientError::PoolClosed));

    let result = db.client.single_use().execute_query(&select1_statement()).await;
    assert!(matches!(result, Err(ClientError::PoolClosed)));

    assert_eq!(db.store.active_session_count(), 0);
    assert_eq!(db.store.request_count(RpcMethod::Commit), 0);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_pool_times_out() {
    let db = TestDatabase::with_options(
        SessionPoolOptions::default()
            .with_min_sessions(1)
            .with_max_sessions(1)
            .with_acquire_timeout(Duration::from_millis(200)),
        fast_retries(),
    )
    .await;

    let _held = db.client.read_only_transaction().await.unwrap();
    let error = db
        .client
        .single_use()
        .execute_query(&select1_statement())
        .await
        .unwrap_err();
    assert!(matches!(error, ClientError::PoolExhausted { max_sessions: 1, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_evicts_idle_sessions() {
    let db = TestDatabase::with_options(
        SessionPoolOptions::default()
            .with_min_sessions(1)
            .with_max_sessions(4)
            .with_idle_timeout(Duration::from_secs(30))
            .with_maintenance_interval(Duration::from_secs(5)),
        fast_retries(),
    )
    .await;
    let _maintenance = db.client.spawn_maintenance_task();

    let held = vec![
        db.client.read_only_transaction().await.unwrap(),
        db.client.read_only_transaction().await.unwrap(),
        db.client.read_only_transaction().await.unwrap(),
    ];
    drop(held);
    assert_eq!(db.client.pool_stats().idle, 3);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(db.client.pool_stats().total, 1);
    assert_eq!(db.store.active_session_count(), 1);
}
