//! The retrying read-write transaction runner.
//!
//! # Life of a `run`
//!
//! 1. `Idle → Attempting`: check a session out of the pool and build a fresh
//!    `TransactionContext` for the attempt.
//! 2. Call the body with the context. The body is opaque; the runner only
//!    looks at what it returns and at whether the store aborted the attempt.
//! 3. `Attempting → Committing`: the body succeeded and the attempt was not
//!    aborted, so commit. An attempt that executed nothing commits trivially.
//! 4. Classify the outcome:
//!    - success: `Succeeded`, return the body's value
//!    - abort or missing session: release (discarding a missing session),
//!      `BackingOff`, then back to step 1 with a new attempt
//!    - anything else: best-effort rollback, `Failed`, return the error as is
//! 5. Once `max_attempts` or `max_elapsed` is spent, fail with
//!    `AbortedTooManyTimes` carrying the last attempt's error.
//!
//! Each attempt runs inside a `transaction` tracing span tagged with its
//! attempt number.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::Instrument;

use super::backoff::Backoff;
use super::context::TransactionContext;
use crate::config::RetrySettings;
use crate::error::{ClientError, Disposition};
use crate::session::{PooledSession, SessionPool};

/// Where a runner is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Attempting,
    Committing,
    BackingOff,
    Succeeded,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Attempting => "attempting",
            Self::Committing => "committing",
            Self::BackingOff => "backing-off",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Runs a transaction body until it commits or fails for good.
#[derive(Debug)]
pub struct TransactionRunner {
    pool: SessionPool,
    retry: RetrySettings,
    deadline: Option<Duration>,
    backoff_seed: Option<u64>,
    phase: Phase,
    attempts: u32,
    commit_timestamp: Option<prost_types::Timestamp>,
}

impl TransactionRunner {
    #[must_use]
    pub const fn new(pool: SessionPool, retry: RetrySettings) -> Self {
        Self {
            pool,
            retry,
            deadline: None,
            backoff_seed: None,
            phase: Phase::Idle,
            attempts: 0,
            commit_timestamp: None,
        }
    }

    /// Bound the whole `run`, retries and backoff included.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_retry_settings(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Make backoff jitter reproducible.
    #[must_use]
    pub const fn with_backoff_seed(mut self, seed: u64) -> Self {
        self.backoff_seed = Some(seed);
        self
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Attempts made by the last `run`.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Commit timestamp of the last successful `run`. `None` if it executed
    /// no statement.
    #[must_use]
    pub const fn commit_timestamp(&self) -> Option<&prost_types::Timestamp> {
        self.commit_timestamp.as_ref()
    }

    /// Run `body` in a read-write transaction, retrying aborted attempts.
    ///
    /// The body is called once per attempt with a fresh context and must be
    /// safe to re-execute from scratch. Its value is returned only after a
    /// successful commit.
    ///
    /// # Errors
    ///
    /// - Any non-retryable error from the body, the store or the pool, unchanged
    /// - `ClientError::AbortedTooManyTimes` when the retry ceiling is hit
    /// - `ClientError::DeadlineExceeded` when the deadline expires first
    pub async fn run<T, F, Fut>(&mut self, body: F) -> Result<T, ClientError>
    where
        T: Send,
        F: FnMut(TransactionContext) -> Fut + Send,
        Fut: Future<Output = Result<T, ClientError>> + Send,
    {
        self.attempts = 0;
        self.commit_timestamp = None;
        self.transition(Phase::Idle);

        let Some(deadline) = self.deadline else {
            return self.run_attempts(body).await;
        };
        let outcome = tokio::time::timeout(deadline, self.run_attempts(body)).await;
        outcome.unwrap_or_else(|_| {
            tracing::warn!(
                "transaction deadline of {:?} expired after {} attempts",
                deadline,
                self.attempts
            );
            self.transition(Phase::Failed);
            Err(ClientError::DeadlineExceeded { deadline })
        })
    }

    async fn run_attempts<T, F, Fut>(&mut self, mut body: F) -> Result<T, ClientError>
    where
        F: FnMut(TransactionContext) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let started = Instant::now();
        let mut backoff = match self.backoff_seed {
            Some(seed) => Backoff::with_seed(&self.retry, seed),
            None => Backoff::new(&self.retry),
        };

        loop {
            self.attempts += 1;
            let attempt = self.attempts;
            self.transition(Phase::Attempting);

            let mut session = match self.pool.acquire().await {
                Ok(session) => session,
                Err(e) => {
                    self.transition(Phase::Failed);
                    return Err(e);
                }
            };

            let outcome = self
                .attempt(&session, attempt, &mut body)
                .instrument(tracing::debug_span!("transaction", attempt))
                .await;

            let error = match outcome {
                Ok(value) => {
                    self.transition(Phase::Succeeded);
                    tracing::debug!("transaction committed after {} attempts", attempt);
                    return Ok(value);
                }
                Err(error) => error,
            };

            match error.disposition() {
                Disposition::Fail => {
                    self.transition(Phase::Failed);
                    return Err(error);
                }
                Disposition::RetryWithNewSession => session.discard(),
                Disposition::Retry => {}
            }
            drop(session);

            let out_of_time = self
                .retry
                .max_elapsed
                .is_some_and(|limit| started.elapsed() >= limit);
            if attempt >= self.retry.max_attempts || out_of_time {
                tracing::warn!("giving up on transaction after {} attempts: {}", attempt, error);
                self.transition(Phase::Failed);
                return Err(ClientError::AbortedTooManyTimes {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            let delay = backoff.next_delay(attempt, error.retry_delay());
            tracing::warn!(
                "transaction attempt {} failed, retrying in {:?}: {}",
                attempt,
                delay,
                error
            );
            self.transition(Phase::BackingOff);
            tokio::time::sleep(delay).await;
        }
    }

    /// One attempt: run the body, then commit or clean up.
    async fn attempt<T, F, Fut>(
        &mut self,
        session: &PooledSession,
        attempt: u32,
        body: &mut F,
    ) -> Result<T, ClientError>
    where
        F: FnMut(TransactionContext) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let context =
            TransactionContext::new(Arc::clone(session.rpc()), session.name().clone(), attempt);

        let result = body(context.clone()).await;

        // An abort wins over whatever the body made of it.
        if let Some(abort) = context.abort_error().await {
            context.finish().await;
            return Err(abort);
        }

        match result {
            Ok(value) => {
                self.transition(Phase::Committing);
                let response = context.commit().await?;
                self.commit_timestamp = response.map(|r| r.commit_timestamp);
                Ok(value)
            }
            Err(error) => {
                if error.is_retryable() {
                    context.finish().await;
                } else {
                    context.rollback().await;
                }
                Err(error)
            }
        }
    }

    fn transition(&mut self, next: Phase) {
        if self.phase != next {
            tracing::trace!("transaction runner {} -> {}", self.phase, next);
            self.phase = next;
        }
    }
}
