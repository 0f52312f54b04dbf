//! With abort probability 1 every attempt aborts and the runner gives up at
//! its ceiling; with probability 0 it commits on the first attempt.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::config::SessionPoolOptions;
use crate::e2e_tests::helpers::{TestDatabase, fast_retries, update_statement};
use crate::error::ClientError;
use crate::rpc::RpcMethod;
use crate::status::Code;

#[tokio::test(start_paused = true)]
async fn test_certain_aborts_exhaust_retries() {
    let db = TestDatabase::with_options(
        SessionPoolOptions::default(),
        fast_retries().with_max_attempts(5),
    )
    .await;
    db.store.set_abort_probability(1.0);
    let calls = Arc::new(AtomicU32::new(0));

    let body_calls = Arc::clone(&calls);
    let mut runner = db.client.read_write_transaction();
    let result = runner
        .run(move |ctx| {
            body_calls.fetch_add(1, Ordering::SeqCst);
            async move { ctx.execute_update(&update_statement()).await }
        })
        .await;

    let error = result.unwrap_err();
    assert_eq!(error.code(), Code::Aborted);
    match error {
        ClientError::AbortedTooManyTimes { attempts, last } => {
            assert_eq!(attempts, 5);
            assert!(last.is_aborted());
        }
        other => panic!("expected AbortedTooManyTimes, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(db.store.aborted_transaction_count(), 5);
    assert_eq!(db.store.request_count(RpcMethod::Commit), 0);
    assert_eq!(db.client.pool_stats().checked_out, 0);
}

#[tokio::test]
async fn test_zero_probability_commits_first_time() {
    let db = TestDatabase::new().await;
    let mut runner = db.client.read_write_transaction();

    for _ in 0..20 {
        runner
            .run(|ctx| async move { ctx.execute_update(&update_statement()).await })
            .await
            .unwrap();
        assert_eq!(runner.attempts(), 1);
    }
    assert_eq!(db.store.aborted_transaction_count(), 0);
}
