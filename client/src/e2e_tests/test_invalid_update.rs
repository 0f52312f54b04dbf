//! A statement error fails the whole run immediately, with zero retries.

use crate::e2e_tests::helpers::{TestDatabase, invalid_update_statement};
use crate::error::ClientError;
use crate::rpc::RpcMethod;
use crate::status::Code;

#[tokio::test]
async fn test_invalid_update_is_not_retried() {
    let db = TestDatabase::new().await;
    let mut runner = db.client.read_write_transaction();

    let result = runner
        .run(|ctx| async move { ctx.execute_update(&invalid_update_statement()).await })
        .await;

    let error = result.unwrap_err();
    assert!(matches!(error, ClientError::Rpc(_)));
    assert_eq!(error.code(), Code::InvalidArgument);
    assert_eq!(error.to_string(), "INVALID_ARGUMENT: invalid statement");

    assert_eq!(runner.attempts(), 1);
    assert_eq!(db.store.statement_execution_count(&invalid_update_statement()), 1);
    assert_eq!(db.store.request_count(RpcMethod::Commit), 0);
}

#[tokio::test]
async fn test_session_is_returned_after_fatal_error() {
    let db = TestDatabase::new().await;
    let mut runner = db.client.read_write_transaction();

    let _ = runner
        .run(|ctx| async move { ctx.execute_update(&invalid_update_statement()).await })
        .await;

    let stats = db.client.pool_stats();
    assert_eq!(stats.checked_out, 0);
    assert_eq!(stats.idle, 1);
}
