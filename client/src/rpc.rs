//! The RPC surface of the remote store.
//!
//! Transport, credentials and wire encoding live behind this trait. The
//! production implementation talks to the network; `simulation::MockStore`
//! answers in-process. Failures come back as a `Status` and are classified
//! by `ClientError::from`.

use std::fmt;

use futures::future::BoxFuture;

use crate::config::DatabaseId;
use crate::result_set::EncodedResultSet;
use crate::statement::Statement;
use crate::status::Status;

/// Opaque name of a server-side session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionName(String);

impl SessionName {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a server-side transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(String);

impl TransactionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of transaction to begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionOptions {
    /// Locking read-write transaction; may be aborted by the store.
    ReadWrite,
    /// Strong read-only snapshot; never aborted.
    ReadOnly,
}

/// Which transaction a statement runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionSelector {
    /// A temporary transaction that ends with the statement.
    SingleUse(TransactionOptions),
    /// A transaction previously returned by `begin_transaction`.
    Id(TransactionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteSqlRequest {
    pub session: SessionName,
    pub transaction: TransactionSelector,
    pub statement: Statement,
    /// Strictly increasing within a read-write transaction so the store can
    /// detect replayed DML.
    pub seqno: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResponse {
    pub commit_timestamp: prost_types::Timestamp,
}

/// RPC methods, used to address injected latency and request counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    CreateSession,
    DeleteSession,
    BeginTransaction,
    ExecuteSql,
    Commit,
    Rollback,
}

impl RpcMethod {
    pub const ALL: [Self; 6] = [
        Self::CreateSession,
        Self::DeleteSession,
        Self::BeginTransaction,
        Self::ExecuteSql,
        Self::Commit,
        Self::Rollback,
    ];
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateSession => "CreateSession",
            Self::DeleteSession => "DeleteSession",
            Self::BeginTransaction => "BeginTransaction",
            Self::ExecuteSql => "ExecuteSql",
            Self::Commit => "Commit",
            Self::Rollback => "Rollback",
        };
        f.write_str(name)
    }
}

/// Operations the client needs from the store.
///
/// Implementations must be safe to call concurrently from many tasks.
pub trait Rpc: Send + Sync {
    fn create_session<'a>(
        &'a self,
        database: &'a DatabaseId,
    ) -> BoxFuture<'a, Result<SessionName, Status>>;

    fn delete_session<'a>(&'a self, session: &'a SessionName) -> BoxFuture<'a, Result<(), Status>>;

    fn begin_transaction<'a>(
        &'a self,
        session: &'a SessionName,
        options: TransactionOptions,
    ) -> BoxFuture<'a, Result<TransactionId, Status>>;

    fn execute_sql(
        &self,
        request: ExecuteSqlRequest,
    ) -> BoxFuture<'_, Result<EncodedResultSet, Status>>;

    fn commit<'a>(
        &'a self,
        session: &'a SessionName,
        transaction: &'a TransactionId,
    ) -> BoxFuture<'a, Result<CommitResponse, Status>>;

    fn rollback<'a>(
        &'a self,
        session: &'a SessionName,
        transaction: &'a TransactionId,
    ) -> BoxFuture<'a, Result<(), Status>>;
}
