//! Multi-use read-only transactions run many queries on one session and are
//! never aborted.

use crate::e2e_tests::helpers::{TestDatabase, select1_statement};
use crate::rpc::RpcMethod;

#[tokio::test]
async fn test_multi_use_read_only_transaction() {
    let db = TestDatabase::new().await;
    db.store.set_abort_probability(1.0);

    let mut transaction = db.client.read_only_transaction().await.unwrap();
    for _ in 0..3 {
        let mut rs = transaction.execute_query(&select1_statement()).await.unwrap();
        assert!(rs.advance().unwrap());
        assert_eq!(rs.get_i64("COL1").unwrap(), 1);
        assert!(!rs.advance().unwrap());
    }
    assert_eq!(db.client.pool_stats().checked_out, 1);

    transaction.close();
    assert_eq!(db.client.pool_stats().checked_out, 0);
    assert_eq!(db.store.request_count(RpcMethod::BeginTransaction), 1);
    assert_eq!(db.store.statement_execution_count(&select1_statement()), 3);
    assert_eq!(db.store.aborted_transaction_count(), 0);
}
