//! A read followed by a write in one transaction commits exactly once, and
//! each statement runs exactly once.

use crate::e2e_tests::helpers::{TestDatabase, select1_statement, update_statement};
use crate::rpc::RpcMethod;

#[tokio::test]
async fn test_read_then_write_commits_once() {
    let db = TestDatabase::new().await;
    let mut runner = db.client.read_write_transaction();

    let (selected, updated) = runner
        .run(|ctx| async move {
            let mut rs = ctx.execute_query(&select1_statement()).await?;
            let mut selected = 0;
            while rs.advance()? {
                selected += rs.get_i64("COL1")?;
            }
            let updated = ctx.execute_update(&update_statement()).await?;
            Ok((selected, updated))
        })
        .await
        .unwrap();

    assert_eq!(selected, 1);
    assert_eq!(updated, 1);
    assert_eq!(runner.attempts(), 1);
    assert_eq!(db.store.statement_execution_count(&select1_statement()), 1);
    assert_eq!(db.store.statement_execution_count(&update_statement()), 1);
    assert_eq!(db.store.request_count(RpcMethod::BeginTransaction), 1);
    assert_eq!(db.store.request_count(RpcMethod::Commit), 1);
}
