//! A single-use read of `SELECT 1` yields exactly one row, then exhausts.

use crate::e2e_tests::helpers::{TestDatabase, select1_statement};
use crate::rpc::RpcMethod;

#[tokio::test]
async fn test_select1_yields_one_row() {
    let db = TestDatabase::new().await;

    let mut rs = db
        .client
        .single_use()
        .execute_query(&select1_statement())
        .await
        .unwrap();

    assert!(rs.advance().unwrap());
    assert_eq!(rs.get_i64("COL1").unwrap(), 1);
    assert_eq!(rs.get_i64(0_usize).unwrap(), 1);
    assert!(!rs.advance().unwrap());
    assert!(rs.is_exhausted());

    // Exhausted streams stay exhausted
    assert!(!rs.advance().unwrap());
    assert!(!rs.advance().unwrap());

    // No transaction was begun or committed for a single-use read
    assert_eq!(db.store.request_count(RpcMethod::BeginTransaction), 0);
    assert_eq!(db.store.request_count(RpcMethod::Commit), 0);
}

#[tokio::test]
async fn test_single_use_session_returns_on_close() {
    let db = TestDatabase::new().await;

    let mut rs = db
        .client
        .single_use()
        .execute_query(&select1_statement())
        .await
        .unwrap();
    assert_eq!(db.client.pool_stats().checked_out, 1);

    rs.close();
    assert_eq!(db.client.pool_stats().checked_out, 0);
    assert!(!rs.advance().unwrap());
}

#[tokio::test]
async fn test_single_use_session_returns_on_drop() {
    let db = TestDatabase::new().await;

    {
        let _rs = db
            .client
            .single_use()
            .execute_query(&select1_statement())
            .await
            .unwrap();
        assert_eq!(db.client.pool_stats().checked_out, 1);
    }
    assert_eq!(db.client.pool_stats().checked_out, 0);
}
