//! The statement surface handed to a transaction body.
//!
//! One `TransactionContext` exists per attempt. It is a cheap handle: clones
//! share the attempt state, and statements issued through any clone run one
//! at a time in issue order. The read-write transaction is begun lazily by the
//! first statement, so a body that issues nothing never talks to the store.
//!
//! # Attempt states
//!
//! ```text
//! Open --abort--> Aborted (every later call fails with the same abort)
//!   |                |
//!   `--commit/rollback/finish--> Finished (every later call is a misuse)
//! ```

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::ClientError;
use crate::result_set::{EncodedResultSet, ResultSet};
use crate::rpc::{
    CommitResponse, ExecuteSqlRequest, Rpc, SessionName, TransactionId, TransactionOptions,
    TransactionSelector,
};
use crate::statement::Statement;
use crate::status::Status;

#[derive(Debug, Default)]
struct AttemptState {
    transaction: Option<TransactionId>,
    seqno: u64,
    aborted: Option<ClientError>,
    finished: bool,
}

impl AttemptState {
    fn check_usable(&self) -> Result<(), ClientError> {
        if self.finished {
            return Err(ClientError::invalid_state(
                "transaction attempt has already finished",
            ));
        }
        if let Some(abort) = &self.aborted {
            return Err(abort.clone());
        }
        Ok(())
    }

    fn record(&mut self, error: &ClientError) {
        if error.is_aborted() && self.aborted.is_none() {
            self.aborted = Some(error.clone());
        }
    }
}

struct ContextInner {
    rpc: Arc<dyn Rpc>,
    session: SessionName,
    attempt: u32,
    state: Mutex<AttemptState>,
}

/// Handle through which a transaction body executes statements.
#[derive(Clone)]
pub struct TransactionContext {
    inner: Arc<ContextInner>,
}

impl TransactionContext {
    pub(crate) fn new(rpc: Arc<dyn Rpc>, session: SessionName, attempt: u32) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                rpc,
                session,
                attempt,
                state: Mutex::new(AttemptState::default()),
            }),
        }
    }

    /// 1-based number of the attempt this context belongs to.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.inner.attempt
    }

    #[must_use]
    pub fn session_name(&self) -> &SessionName {
        &self.inner.session
    }

    /// Execute a DML statement and return the exact number of affected rows.
    ///
    /// # Errors
    ///
    /// - `ClientError::Aborted` if the store aborted the transaction; the
    ///   body should return it so the runner can retry
    /// - `ClientError::Rpc` with `INVALID_ARGUMENT` if the statement does not
    ///   produce an update count
    /// - `ClientError::InvalidState` if the attempt has already finished
    pub async fn execute_update(&self, statement: &Statement) -> Result<i64, ClientError> {
        let result = self.execute(statement).await?;
        result.row_count.ok_or_else(|| {
            ClientError::Rpc(Status::invalid_argument(format!(
                "statement did not return an update count: {statement}"
            )))
        })
    }

    /// Execute a query inside the transaction.
    ///
    /// # Errors
    ///
    /// Same as [`execute_update`](Self::execute_update), minus the update
    /// count check.
    pub async fn execute_query(&self, statement: &Statement) -> Result<ResultSet, ClientError> {
        let result = self.execute(statement).await?;
        Ok(ResultSet::new(result))
    }

    async fn execute(&self, statement: &Statement) -> Result<EncodedResultSet, ClientError> {
        let mut state = self.inner.state.lock().await;
        state.check_usable()?;

        let transaction = if let Some(id) = state.transaction.clone() {
            id
        } else {
            let id = self
                .inner
                .rpc
                .begin_transaction(&self.inner.session, TransactionOptions::ReadWrite)
                .await
                .map_err(ClientError::from)
                .inspect_err(|e| state.record(e))?;
            tracing::debug!("attempt {} began transaction {}", self.inner.attempt, id);
            state.transaction = Some(id.clone());
            id
        };

        state.seqno += 1;
        let request = ExecuteSqlRequest {
            session: self.inner.session.clone(),
            transaction: TransactionSelector::Id(transaction),
            statement: statement.clone(),
            seqno: state.seqno,
        };
        self.inner
            .rpc
            .execute_sql(request)
            .await
            .map_err(ClientError::from)
            .inspect_err(|e| state.record(e))
    }

    /// The abort recorded during this attempt, if any.
    pub(crate) async fn abort_error(&self) -> Option<ClientError> {
        self.inner.state.lock().await.aborted.clone()
    }

    /// Commit the attempt. Returns `None` when no statement was executed,
    /// since there is no transaction to commit.
    pub(crate) async fn commit(&self) -> Result<Option<CommitResponse>, ClientError> {
        let mut state = self.inner.state.lock().await;
        state.check_usable()?;
        state.finished = true;

        let Some(transaction) = state.transaction.clone() else {
            return Ok(None);
        };
        let response = self
            .inner
            .rpc
            .commit(&self.inner.session, &transaction)
            .await
            .map_err(ClientError::from)
            .inspect_err(|e| state.record(e))?;
        drop(state);
        Ok(Some(response))
    }

    /// Best-effort rollback. Failures are logged, never returned.
    pub(crate) async fn rollback(&self) {
        let mut state = self.inner.state.lock().await;
        if state.finished {
            return;
        }
        state.finished = true;
        if state.aborted.is_some() {
            return;
        }
        let Some(transaction) = state.transaction.clone() else {
            return;
        };
        drop(state);

        if let Err(status) = self
            .inner
            .rpc
            .rollback(&self.inner.session, &transaction)
            .await
        {
            tracing::warn!("rollback of transaction {} failed: {}", transaction, status);
        }
    }

    /// Close the attempt without talking to the store.
    pub(crate) async fn finish(&self) {
        self.inner.state.lock().await.finished = true;
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("session", &self.inner.session)
            .field("attempt", &self.inner.attempt)
            .finish_non_exhaustive()
    }
}
