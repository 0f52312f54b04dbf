//! Common helpers for end-to-end tests.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::config::{ClientConfig, DatabaseId, RetrySettings, SessionPoolOptions};
use crate::database_client::DatabaseClient;
use crate::result_set::{Field, ResultSetData, TypeCode};
use crate::rpc::Rpc;
use crate::simulation::{MockStore, StatementResult};
use crate::statement::{Statement, Value};
use crate::status::Status;

pub const UPDATE_SQL: &str = "UPDATE FOO SET BAR=1 WHERE BAZ=2";
pub const SELECT1_SQL: &str = "SELECT 1 AS COL1";
pub const INVALID_UPDATE_SQL: &str = "UPDATE NON_EXISTENT_TABLE SET BAR=1 WHERE BAZ=2";

/// Install a test subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("client=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[must_use]
pub fn update_statement() -> Statement {
    Statement::of(UPDATE_SQL)
}

#[must_use]
pub fn select1_statement() -> Statement {
    Statement::of(SELECT1_SQL)
}

#[must_use]
pub fn invalid_update_statement() -> Statement {
    Statement::of(INVALID_UPDATE_SQL)
}

/// Register the three standard fixtures: an update counting one row, a
/// single-row `SELECT 1` and an update that fails with `INVALID_ARGUMENT`.
pub fn register_fixtures(store: &MockStore) {
    store.put_statement_result(StatementResult::update(update_statement(), 1));
    store.put_statement_result(StatementResult::query(
        select1_statement(),
        ResultSetData::new(vec![Field::new("COL1", TypeCode::Int64)])
            .with_row(vec![Value::Int64(1)]),
    ));
    store.put_statement_result(StatementResult::error(
        invalid_update_statement(),
        Status::invalid_argument("invalid statement"),
    ));
    store.set_abort_probability(0.0);
}

/// Retry settings with millisecond backoff so retry-heavy tests stay fast.
#[must_use]
pub fn fast_retries() -> RetrySettings {
    RetrySettings::default().with_backoff(Duration::from_millis(1), Duration::from_millis(8))
}

/// A mock store with the standard fixtures and a client connected to it.
pub struct TestDatabase {
    pub store: Arc<MockStore>,
    pub client: DatabaseClient,
}

impl TestDatabase {
    pub async fn new() -> Self {
        Self::with_options(SessionPoolOptions::default(), fast_retries()).await
    }

    pub async fn with_options(pool: SessionPoolOptions, retry: RetrySettings) -> Self {
        Self::with_store(MockStore::with_seed(42), pool, retry).await
    }

    pub async fn with_store(
        store: MockStore,
        pool: SessionPoolOptions,
        retry: RetrySettings,
    ) -> Self {
        init_tracing();
        let store = Arc::new(store);
        register_fixtures(&store);

        let config = ClientConfig::new(DatabaseId::new("test-project", "test-instance", "test-db"))
            .with_pool_options(pool)
            .with_retry_settings(retry);
        let client = DatabaseClient::new(config, Arc::clone(&store) as Arc<dyn Rpc>)
            .await
            .unwrap();

        Self { store, client }
    }
}
