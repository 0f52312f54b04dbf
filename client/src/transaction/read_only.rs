//! Reads that never take locks and are never aborted.
//!
//! - `SingleUse` runs exactly one query in a temporary read-only transaction.
//!   The returned `ResultSet` owns the session until it is read to the end,
//!   closed or dropped.
//! - `ReadOnlyTransaction` runs any number of queries against one consistent
//!   snapshot and holds its session until it is closed or dropped.

use std::sync::Arc;

use crate::error::{ClientError, Disposition};
use crate::result_set::ResultSet;
use crate::rpc::{ExecuteSqlRequest, TransactionId, TransactionOptions, TransactionSelector};
use crate::session::{PooledSession, SessionPool};
use crate::statement::Statement;

/// Attempts for a read whose session turned out to be gone.
const SESSION_NOT_FOUND_ATTEMPTS: u32 = 2;

/// A one-shot read.
#[derive(Debug)]
pub struct SingleUse {
    pool: SessionPool,
}

impl SingleUse {
    pub(crate) const fn new(pool: SessionPool) -> Self {
        Self { pool }
    }

    /// Execute `statement` and return a stream over its rows.
    ///
    /// A missing session is replaced once; any other error is returned as is.
    pub async fn execute_query(self, statement: &Statement) -> Result<ResultSet, ClientError> {
        let mut attempt = 1;
        loop {
            let mut session = self.pool.acquire().await?;
            let request = ExecuteSqlRequest {
                session: session.name().clone(),
                transaction: TransactionSelector::SingleUse(TransactionOptions::ReadOnly),
                statement: statement.clone(),
                seqno: 0,
            };
            let rpc = Arc::clone(session.rpc());
            match rpc.execute_sql(request).await.map_err(ClientError::from) {
                Ok(result) => return Ok(ResultSet::with_session(result, session)),
                Err(error)
                    if error.disposition() == Disposition::RetryWithNewSession
                        && attempt < SESSION_NOT_FOUND_ATTEMPTS =>
                {
                    tracing::debug!("single-use read lost session {}: {}", session.name(), error);
                    session.discard();
                    attempt += 1;
                }
                Err(error) => {
                    if error.disposition() == Disposition::RetryWithNewSession {
                        session.discard();
                    }
                    return Err(error);
                }
            }
        }
    }
}

/// A multi-statement read-only transaction over a single snapshot.
#[derive(Debug)]
pub struct ReadOnlyTransaction {
    session: Option<PooledSession>,
    transaction: Option<TransactionId>,
}

impl ReadOnlyTransaction {
    pub(crate) const fn new(session: PooledSession) -> Self {
        Self {
            session: Some(session),
            transaction: None,
        }
    }

    /// Execute a query against the snapshot. The snapshot is taken by the
    /// first query.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidState` after `close`, or the classified
    /// store status. A missing session closes the transaction.
    pub async fn execute_query(&mut self, statement: &Statement) -> Result<ResultSet, ClientError> {
        let Some(session) = self.session.as_ref() else {
            return Err(ClientError::invalid_state(
                "read-only transaction has been closed",
            ));
        };
        let rpc = Arc::clone(session.rpc());
        let name = session.name().clone();

        let transaction = match self.transaction.clone() {
            Some(id) => Ok(id),
            None => rpc
                .begin_transaction(&name, TransactionOptions::ReadOnly)
                .await
                .inspect(|id| self.transaction = Some(id.clone())),
        };
        let result = match transaction {
            Ok(transaction) => {
                rpc.execute_sql(ExecuteSqlRequest {
                    session: name,
                    transaction: TransactionSelector::Id(transaction),
                    statement: statement.clone(),
                    seqno: 0,
                })
                .await
            }
            Err(status) => Err(status),
        }
        .map_err(ClientError::from);

        match result {
            Ok(result) => Ok(ResultSet::new(result)),
            Err(error) => {
                if error.disposition() == Disposition::RetryWithNewSession {
                    if let Some(mut session) = self.session.take() {
                        session.discard();
                    }
                }
                Err(error)
            }
        }
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    /// Return the session to the pool. Idempotent.
    pub fn close(&mut self) {
        self.session = None;
        self.transaction = None;
    }
}
