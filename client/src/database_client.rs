//! Entry point tying configuration, the session pool and the transaction
//! types together for one database.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::{ClientConfig, DatabaseId, RetrySettings};
use crate::error::ClientError;
use crate::rpc::Rpc;
use crate::session::{PoolStats, SessionPool};
use crate::transaction::{ReadOnlyTransaction, SingleUse, TransactionRunner};

/// Client for a single database.
///
/// Cheap to clone; clones share the session pool.
#[derive(Debug, Clone)]
pub struct DatabaseClient {
    pool: SessionPool,
    retry: RetrySettings,
}

impl DatabaseClient {
    /// Validate `config`, build the session pool and warm it up.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` for invalid settings, or the error of a
    /// failed warm-up session.
    pub async fn new(config: ClientConfig, rpc: Arc<dyn Rpc>) -> Result<Self, ClientError> {
        config.validate()?;
        let pool = SessionPool::new(rpc, config.database, config.pool).await?;
        Ok(Self {
            pool,
            retry: config.retry,
        })
    }

    #[must_use]
    pub fn database(&self) -> &DatabaseId {
        self.pool.database()
    }

    #[must_use]
    pub const fn pool(&self) -> &SessionPool {
        &self.pool
    }

    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// A one-shot read in a temporary read-only transaction.
    #[must_use]
    pub fn single_use(&self) -> SingleUse {
        SingleUse::new(self.pool.clone())
    }

    /// A read-only transaction holding one session until it is closed.
    ///
    /// # Errors
    ///
    /// Returns the pool's error if no session can be checked out.
    pub async fn read_only_transaction(&self) -> Result<ReadOnlyTransaction, ClientError> {
        Ok(ReadOnlyTransaction::new(self.pool.acquire().await?))
    }

    /// A runner for read-write transactions using the client's retry settings.
    #[must_use]
    pub fn read_write_transaction(&self) -> TransactionRunner {
        TransactionRunner::new(self.pool.clone(), self.retry.clone())
    }

    /// Start background pool maintenance.
    #[must_use]
    pub fn spawn_maintenance_task(&self) -> JoinHandle<()> {
        self.pool.spawn_maintenance_task()
    }

    /// Close the session pool. Pending and future operations fail with
    /// `PoolClosed`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
