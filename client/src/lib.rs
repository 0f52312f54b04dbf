// Life of a read-write transaction:
// 1. `DatabaseClient::read_write_transaction` hands out a runner
// 2. The runner checks a session out of the pool
// 3. The body runs statements through a `TransactionContext`
//     - The first statement begins the transaction at the store
//     - Statements run one at a time, in the order the body issues them
// 4. The runner commits, or classifies the failure:
//     - Aborted or session lost: release the session, back off, run the body again
//     - Anything else: roll back and hand the error to the caller
// 5. The session goes back to the pool on every path
//
// System components:
//  - Session pool
//  - Transaction runner and context
//  - Result streams
//  - RPC surface, implemented in-process by the simulation module

mod config;
mod database_client;
mod error;
mod result_set;
mod rpc;
mod session;
mod statement;
mod status;
mod transaction;

pub mod simulation;

#[cfg(test)]
mod e2e_tests;

pub use config::{ClientConfig, ConfigError, DatabaseId, RetrySettings, SessionPoolOptions};
pub use database_client::DatabaseClient;
pub use error::{ClientError, Disposition};
pub use result_set::{
    ColumnIndex, EncodedResultSet, Field, ResultSet, ResultSetData, Row, TypeCode, encode_value,
};
pub use rpc::{
    CommitResponse, ExecuteSqlRequest, Rpc, RpcMethod, SessionName, TransactionId,
    TransactionOptions, TransactionSelector,
};
pub use session::{PoolStats, PooledSession, Session, SessionPool};
pub use statement::{Statement, Value};
pub use status::{Code, SESSION_NOT_FOUND_PREFIX, Status};
pub use transaction::{
    Backoff, Phase, ReadOnlyTransaction, SingleUse, TransactionContext, TransactionRunner,
};
