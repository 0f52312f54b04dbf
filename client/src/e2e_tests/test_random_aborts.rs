//! Under random aborts every run still commits exactly once, and the same
//! seed replays the same history.

use std::time::Duration;

use crate::config::{RetrySettings, SessionPoolOptions};
use crate::e2e_tests::helpers::{TestDatabase, update_statement};
use crate::rpc::RpcMethod;
use crate::simulation::MockStore;

const RUNS: u32 = 25;

struct History {
    attempts: Vec<u32>,
    aborted: u64,
    commit_requests: u64,
}

async fn run_with_seed(seed: u64) -> History {
    let db = TestDatabase::with_store(
        MockStore::with_seed(seed),
        SessionPoolOptions::default(),
        RetrySettings::default()
            .with_max_attempts(100)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(4)),
    )
    .await;
    db.store.set_abort_probability(0.3);

    let mut attempts = Vec::new();
    let mut runner = db.client.read_write_transaction().with_backoff_seed(seed);
    for _ in 0..RUNS {
        let count = runner
            .run(|ctx| async move {
                ctx.execute_update(&update_statement()).await?;
                ctx.execute_update(&update_statement()).await
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
        attempts.push(runner.attempts());
    }

    History {
        attempts,
        aborted: db.store.aborted_transaction_count(),
        commit_requests: db.store.request_count(RpcMethod::Commit),
    }
}

#[tokio::test(start_paused = true)]
async fn test_every_run_commits_exactly_once() {
    let history = run_with_seed(2024).await;

    // Each failed attempt corresponds to exactly one abort at the store.
    let retries: u32 = history.attempts.iter().map(|a| a - 1).sum();
    assert_eq!(u64::from(retries), history.aborted);
    assert!(history.aborted > 0, "seed should produce some aborts");
    assert!(history.commit_requests >= u64::from(RUNS));
}

#[tokio::test(start_paused = true)]
async fn test_same_seed_same_history() {
    let first = run_with_seed(77).await;
    let second = run_with_seed(77).await;
    assert_eq!(first.attempts, second.attempts);
    assert_eq!(first.aborted, second.aborted);
    assert_eq!(first.commit_requests, second.commit_requests);
}
