//! A runner body executing one registered update commits and sees its count.

use crate::e2e_tests::helpers::{TestDatabase, update_statement};
use crate::rpc::RpcMethod;
use crate::transaction::Phase;

#[tokio::test]
async fn test_update_commits_with_row_count() {
    let db = TestDatabase::new().await;
    let mut runner = db.client.read_write_transaction();

    let count = runner
        .run(|ctx| async move { ctx.execute_update(&update_statement()).await })
        .await
        .unwrap();

    assert_eq!(count, 1);
    assert_eq!(runner.attempts(), 1);
    assert_eq!(runner.phase(), Phase::Succeeded);
    assert!(runner.commit_timestamp().is_some());
    assert_eq!(db.store.request_count(RpcMethod::Commit), 1);
    assert_eq!(db.store.statement_execution_count(&update_statement()), 1);
}

#[tokio::test]
async fn test_runner_can_be_reused() {
    let db = TestDatabase::new().await;
    let mut runner = db.client.read_write_transaction();

    for _ in 0..3 {
        let count = runner
            .run(|ctx| async move { ctx.execute_update(&update_statement()).await })
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(runner.attempts(), 1);
    }
    assert_eq!(db.store.request_count(RpcMethod::Commit), 3);
    // Every run reused the warm session.
    assert_eq!(db.store.request_count(RpcMethod::CreateSession), 1);
}
