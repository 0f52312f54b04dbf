//! In-process store double with deterministic fault injection.
//!
//! `MockStore` answers the `Rpc` trait from canned statement results. It
//! tracks sessions and transactions the way a real store does, so session
//! loss and aborted transactions surface with the same status codes, and it
//! can abort read-write transactions at random from a seeded RNG.
//!
//! # Abort injection
//!
//! With abort probability `p`, every statement and every commit of a
//! read-write transaction is aborted independently with probability `p`.
//! Read-only and single-use reads are never aborted. Once a transaction is
//! aborted, every later statement or commit in it fails with `ABORTED`.
//!
//! # Isolation
//!
//! All state lives in the instance. Tests build their own store, or call
//! `reset` to return a shared one to its initial state.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::execution_time::SimulatedExecutionTime;
use super::results::{StatementOutcome, StatementResult};
use crate::config::DatabaseId;
use crate::result_set::EncodedResultSet;
use crate::rpc::{
    CommitResponse, ExecuteSqlRequest, Rpc, RpcMethod, SessionName, TransactionId,
    TransactionOptions, TransactionSelector,
};
use crate::statement::Statement;
use crate::status::Status;

/// Seconds part of the first commit timestamp handed out.
const COMMIT_EPOCH_SECONDS: i64 = 1_700_000_000;

#[derive(Debug)]
struct TransactionEntry {
    session: SessionName,
    options: TransactionOptions,
    aborted: bool,
    last_seqno: u64,
}

#[derive(Debug)]
struct StoreState {
    seed: u64,
    rng: StdRng,
    results: HashMap<Statement, StatementOutcome>,
    abort_probability: f64,
    abort_next_statement: bool,
    execution_times: HashMap<RpcMethod, SimulatedExecutionTime>,
    sessions: HashSet<SessionName>,
    transactions: HashMap<TransactionId, TransactionEntry>,
    next_session: u64,
    next_transaction: u64,
    commits: i64,
    request_counts: HashMap<RpcMethod, u64>,
    statement_counts: HashMap<Statement, u64>,
    aborted_transactions: u64,
}

impl StoreState {
    fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            results: HashMap::new(),
            abort_probability: 0.0,
            abort_next_statement: false,
            execution_times: HashMap::new(),
            sessions: HashSet::new(),
            transactions: HashMap::new(),
            next_session: 0,
            next_transaction: 0,
            commits: 0,
            request_counts: HashMap::new(),
            statement_counts: HashMap::new(),
            aborted_transactions: 0,
        }
    }

    fn check_session(&self, session: &SessionName) -> Result<(), Status> {
        if self.sessions.contains(session) {
            Ok(())
        } else {
            Err(Status::session_not_found(session.as_str()))
        }
    }

    /// Look up a transaction of `session` that can still be used.
    fn live_transaction(
        &mut self,
        session: &SessionName,
        id: &TransactionId,
    ) -> Result<&mut TransactionEntry, Status> {
        let entry = self
            .transactions
            .get_mut(id)
            .filter(|entry| entry.session == *session)
            .ok_or_else(|| Status::failed_precondition(format!("Transaction not found: {id}")))?;
        if entry.aborted {
            return Err(Status::aborted(format!("Transaction was aborted: {id}")));
        }
        Ok(entry)
    }

    fn should_inject_abort(&mut self) -> bool {
        if self.abort_probability <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < self.abort_probability
    }

    fn abort(&mut self, id: &TransactionId) -> Status {
        if let Some(entry) = self.transactions.get_mut(id) {
            entry.aborted = true;
        }
        self.aborted_transactions += 1;
        tracing::debug!("mock store aborted transaction {}", id);
        Status::aborted(format!("Transaction was aborted: {id}"))
    }
}

/// Fault-injecting, in-process implementation of [`Rpc`].
#[derive(Debug)]
pub struct MockStore {
    state: Mutex<StoreState>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    /// A store seeded with `0`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// A store whose random decisions are reproducible from `seed`.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Mutex::new(StoreState::new(seed)),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the outcome of a statement, replacing any earlier one.
    pub fn put_statement_result(&self, result: StatementResult) {
        self.state()
            .results
            .insert(result.statement, result.outcome);
    }

    /// Abort read-write statements and commits with probability `probability`.
    ///
    /// # Panics
    ///
    /// Panics if `probability` is outside `[0, 1]`.
    pub fn set_abort_probability(&self, probability: f64) {
        assert!(
            (0.0..=1.0).contains(&probability),
            "abort probability must be in [0, 1], got {probability}"
        );
        self.state().abort_probability = probability;
    }

    /// Abort the transaction of the next read-write statement.
    pub fn abort_next_statement(&self) {
        self.state().abort_next_statement = true;
    }

    pub fn set_execution_time(&self, method: RpcMethod, time: SimulatedExecutionTime) {
        self.state().execution_times.insert(method, time);
    }

    pub fn remove_all_execution_times(&self) {
        self.state().execution_times.clear();
    }

    /// Forget every session, as if the store had garbage collected them.
    pub fn invalidate_all_sessions(&self) {
        let mut state = self.state();
        state.sessions.clear();
        state.transactions.clear();
    }

    /// Return to the state of a freshly built store with the same seed.
    pub fn reset(&self) {
        let mut state = self.state();
        let seed = state.seed;
        *state = StoreState::new(seed);
    }

    #[must_use]
    pub fn request_count(&self, method: RpcMethod) -> u64 {
        self.state()
            .request_counts
            .get(&method)
            .copied()
            .unwrap_or(0)
    }

    /// How many times `statement` was executed, aborts excluded.
    #[must_use]
    pub fn statement_execution_count(&self, statement: &Statement) -> u64 {
        self.state()
            .statement_counts
            .get(statement)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn active_session_count(&self) -> usize {
        self.state().sessions.len()
    }

    #[must_use]
    pub fn aborted_transaction_count(&self) -> u64 {
        self.state().aborted_transactions
    }

    /// Count the request and apply the execution time configured for `method`.
    async fn simulate(&self, method: RpcMethod) -> Result<(), Status> {
        let (delay, error) = {
            let mut guard = self.state();
            let state = &mut *guard;
            *state.request_counts.entry(method).or_insert(0) += 1;
            match state.execution_times.get_mut(&method) {
                Some(time) => time.next(&mut state.rng),
                None => (std::time::Duration::ZERO, None),
            }
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        error.map_or(Ok(()), Err)
    }

    fn create_session_now(&self, database: &DatabaseId) -> SessionName {
        let mut state = self.state();
        state.next_session += 1;
        let name = SessionName::new(format!("{}/sessions/{}", database.name(), state.next_session));
        state.sessions.insert(name.clone());
        name
    }

    fn delete_session_now(&self, session: &SessionName) -> Result<(), Status> {
        let mut state = self.state();
        if !state.sessions.remove(session) {
            return Err(Status::session_not_found(session.as_str()));
        }
        state.transactions.retain(|_, entry| entry.session != *session);
        Ok(())
    }

    fn begin_transaction_now(
        &self,
        session: &SessionName,
        options: TransactionOptions,
    ) -> Result<TransactionId, Status> {
        let mut state = self.state();
        state.check_session(session)?;
        state.next_transaction += 1;
        let id = TransactionId::new(format!("txn-{}", state.next_transaction));
        state.transactions.insert(
            id.clone(),
            TransactionEntry {
                session: session.clone(),
                options,
                aborted: false,
                last_seqno: 0,
            },
        );
        Ok(id)
    }

    fn execute_sql_now(&self, request: &ExecuteSqlRequest) -> Result<EncodedResultSet, Status> {
        let mut state = self.state();
        state.check_session(&request.session)?;

        if let TransactionSelector::Id(id) = &request.transaction {
            let entry = state.live_transaction(&request.session, id)?;
            if entry.options == TransactionOptions::ReadWrite {
                if request.seqno <= entry.last_seqno {
                    return Err(Status::failed_precondition(format!(
                        "sequence number {} already used in transaction {id}",
                        request.seqno
                    )));
                }
                entry.last_seqno = request.seqno;

                let forced = std::mem::take(&mut state.abort_next_statement);
                if forced || state.should_inject_abort() {
                    return Err(state.abort(id));
                }
            }
        }

        *state
            .statement_counts
            .entry(request.statement.clone())
            .or_insert(0) += 1;

        match state.results.get(&request.statement) {
            Some(outcome) => outcome.respond(),
            None => {
                tracing::error!(
                    "mock store has no result registered for statement: {}",
                    request.statement
                );
                Err(Status::internal(format!(
                    "There is no result registered for the statement: {}",
                    request.statement
                )))
            }
        }
    }

    fn commit_now(
        &self,
        session: &SessionName,
        id: &TransactionId,
    ) -> Result<CommitResponse, Status> {
        let mut state = self.state();
        state.check_session(session)?;
        let options = state.live_transaction(session, id)?.options;
        if options == TransactionOptions::ReadOnly {
            return Err(Status::failed_precondition(format!(
                "Cannot commit a read-only transaction: {id}"
            )));
        }
        if state.should_inject_abort() {
            return Err(state.abort(id));
        }

        state.transactions.remove(id);
        state.commits += 1;
        Ok(CommitResponse {
            commit_timestamp: prost_types::Timestamp {
                seconds: COMMIT_EPOCH_SECONDS + state.commits,
                nanos: 0,
            },
        })
    }

    fn rollback_now(&self, session: &SessionName, id: &TransactionId) -> Result<(), Status> {
        let mut state = self.state();
        state.check_session(session)?;
        match state.transactions.remove(id) {
            Some(_) => Ok(()),
            None => Err(Status::failed_precondition(format!(
                "Transaction not found: {id}"
            ))),
        }
    }
}

impl Rpc for MockStore {
    fn create_session<'a>(
        &'a self,
        database: &'a DatabaseId,
    ) -> BoxFuture<'a, Result<SessionName, Status>> {
        async move {
            self.simulate(RpcMethod::CreateSession).await?;
            Ok(self.create_session_now(database))
        }
        .boxed()
    }

    fn delete_session<'a>(&'a self, session: &'a SessionName) -> BoxFuture<'a, Result<(), Status>> {
        async move {
            self.simulate(RpcMethod::DeleteSession).await?;
            self.delete_session_now(session)
        }
        .boxed()
    }

    fn begin_transaction<'a>(
        &'a self,
        session: &'a SessionName,
        options: TransactionOptions,
    ) -> BoxFuture<'a, Result<TransactionId, Status>> {
        async move {
            self.simulate(RpcMethod::BeginTransaction).await?;
            self.begin_transaction_now(session, options)
        }
        .boxed()
    }

    fn execute_sql(
        &self,
        request: ExecuteSqlRequest,
    ) -> BoxFuture<'_, Result<EncodedResultSet, Status>> {
        async move {
            self.simulate(RpcMethod::ExecuteSql).await?;
            self.execute_sql_now(&request)
        }
        .boxed()
    }

    fn commit<'a>(
        &'a self,
        session: &'a SessionName,
        transaction: &'a TransactionId,
    ) -> BoxFuture<'a, Result<CommitResponse, Status>> {
        async move {
            self.simulate(RpcMethod::Commit).await?;
            self.commit_now(session, transaction)
        }
        .boxed()
    }

    fn rollback<'a>(
        &'a self,
        session: &'a SessionName,
        transaction: &'a TransactionId,
    ) -> BoxFuture<'a, Result<(), Status>> {
        async move {
            self.simulate(RpcMethod::Rollback).await?;
            self.rollback_now(session, transaction)
        }
        .boxed()
    }
}
