//! Many runners share one pool without sharing sessions.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SessionPoolOptions;
use crate::e2e_tests::helpers::{TestDatabase, fast_retries, update_statement};
use crate::rpc::{RpcMethod, SessionName};
use crate::simulation::SimulatedExecutionTime;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_use_distinct_sessions() {
    let db = TestDatabase::with_options(
        SessionPoolOptions::default()
            .with_min_sessions(0)
            .with_max_sessions(4),
        fast_retries(),
    )
    .await;
    db.store.set_execution_time(
        RpcMethod::ExecuteSql,
        SimulatedExecutionTime::of_delay(Duration::from_millis(5)),
    );

    let in_use: Arc<Mutex<HashSet<SessionName>>> = Arc::new(Mutex::new(HashSet::new()));
    let mut handles = Vec::new();
    for _ in 0..16 {
        let client = db.client.clone();
        let in_use = Arc::clone(&in_use);
        handles.push(tokio::spawn(async move {
            let mut runner = client.read_write_transaction();
            runner
                .run(move |ctx| {
                    let in_use = Arc::clone(&in_use);
                    async move {
                        let name = ctx.session_name().clone();
                        assert!(
                            in_use.lock().unwrap().insert(name.clone()),
                            "session {name} checked out twice"
                        );
                        let result = ctx.execute_update(&update_statement()).await;
                        in_use.lock().unwrap().remove(&name);
                        result
                    }
                })
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }

    let stats = db.client.pool_stats();
    assert!(stats.total <= 4);
    assert_eq!(stats.checked_out, 0);
    assert_eq!(db.store.request_count(RpcMethod::Commit), 16);
}
