//! Bounded pool of sessions.
//!
//! # Invariants
//!
//! - `total` (idle + checked out + being created) never exceeds `max_sessions`.
//!   Every checked-out or in-creation session is backed by a semaphore permit,
//!   and a permit holder only creates a session when the idle set is empty.
//!   A slot reserved for a session being created is given back if the
//!   creation fails or its future is dropped.
//! - A session is in the idle set or owned by exactly one `PooledSession`,
//!   never both.
//! - After `close`, no session is handed out and every session that comes back
//!   is deleted at the store.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::Session;
use super::maintainer;
use crate::config::{DatabaseId, SessionPoolOptions};
use crate::error::ClientError;
use crate::rpc::{Rpc, SessionName};

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Sessions waiting in the idle set.
    pub idle: usize,
    /// Sessions checked out or being created.
    pub checked_out: usize,
    /// Live sessions known to the pool.
    pub total: usize,
    /// Sessions created since the pool was built.
    pub created: u64,
    /// Sessions deleted or dropped since the pool was built.
    pub deleted: u64,
}

struct PoolState {
    idle: Vec<Session>,
    total: usize,
    closed: bool,
    created: u64,
    deleted: u64,
}

pub(crate) struct PoolInner {
    rpc: Arc<dyn Rpc>,
    database: DatabaseId,
    options: SessionPoolOptions,
    state: Mutex<PoolState>,
    semaphore: Arc<Semaphore>,
}

impl PoolInner {
    fn lock_state(&self) -> Result<MutexGuard<'_, PoolState>, ClientError> {
        self.state
            .lock()
            .map_err(|_| ClientError::lock_poisoned("session pool"))
    }

    /// Lock for paths that cannot report errors (drop, cleanup).
    fn lock_state_recover(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn rpc(&self) -> &Arc<dyn Rpc> {
        &self.rpc
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock_state_recover().closed
    }

    /// Create a session for a slot that has already been reserved in `total`.
    ///
    /// The reservation is returned if creation fails or this future is dropped.
    async fn create_reserved(&self, reservation: Reservation<'_>) -> Result<Session, ClientError> {
        match self.rpc.create_session(&self.database).await {
            Ok(name) => {
                tracing::debug!("created session {}", name);
                reservation.fulfil();
                Ok(Session::new(name))
            }
            Err(status) => {
                drop(reservation);
                tracing::warn!("failed to create session: {}", status);
                Err(ClientError::from(status))
            }
        }
    }

    async fn delete(&self, name: &SessionName) {
        match self.rpc.delete_session(name).await {
            Ok(()) => tracing::debug!("deleted session {}", name),
            Err(status) => tracing::warn!("failed to delete session {}: {}", name, status),
        }
    }

    /// Return a session from a guard.
    fn release(self: &Arc<Self>, mut session: Session, discard: bool) {
        let delete = {
            let mut state = self.lock_state_recover();
            if state.closed || discard {
                state.total -= 1;
                state.deleted += 1;
                // A discarded session is already gone at the store.
                state.closed && !discard
            } else {
                session.touch();
                state.idle.push(session);
                return;
            }
        };

        if delete {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let inner = Arc::clone(self);
                let name = session.name;
                handle.spawn(async move { inner.delete(&name).await });
            } else {
                tracing::warn!(
                    "no runtime available to delete session {} after pool close",
                    session.name
                );
            }
        }
    }
}

/// A slot counted in `total` for a session that is still being created.
///
/// Dropping it without [`fulfil`](Self::fulfil) gives the slot back.
struct Reservation<'a> {
    pool: &'a PoolInner,
    pending: bool,
}

impl<'a> Reservation<'a> {
    /// Reserve a slot. The caller holds the state lock and has already
    /// incremented `total`.
    const fn new(pool: &'a PoolInner) -> Self {
        Self {
            pool,
            pending: true,
        }
    }

    fn fulfil(mut self) {
        self.pending = false;
        self.pool.lock_state_recover().created += 1;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.pending {
            self.pool.lock_state_recover().total -= 1;
        }
    }
}

enum Checkout<'a> {
    Idle(Session),
    Create(Reservation<'a>),
}

/// A session checked out of the pool.
///
/// Dropping the guard returns the session to the pool, on every exit path.
/// Call [`discard`](Self::discard) first if the session must not be reused.
pub struct PooledSession {
    session: Session,
    pool: Arc<PoolInner>,
    discarded: bool,
    // Released after the session is back in the idle set, see `Drop`.
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    #[must_use]
    pub const fn name(&self) -> &SessionName {
        self.session.name()
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Remove the session from the pool when this guard is dropped.
    ///
    /// The session is not deleted at the store. Use this when the store no
    /// longer knows the session; any other session discarded here stays alive
    /// at the store until the store expires it.
    pub const fn discard(&mut self) {
        self.discarded = true;
    }

    pub(crate) fn rpc(&self) -> &Arc<dyn Rpc> {
        self.pool.rpc()
    }
}

impl fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSession")
            .field("name", self.session.name())
            .field("discarded", &self.discarded)
            .finish_non_exhaustive()
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        self.pool.release(self.session.clone(), self.discarded);
    }
}

/// Bounded, concurrency-safe pool of sessions for one database.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    /// Build a pool and eagerly create `min_sessions` sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid or a warm-up session
    /// cannot be created.
    pub async fn new(
        rpc: Arc<dyn Rpc>,
        database: DatabaseId,
        options: SessionPoolOptions,
    ) -> Result<Self, ClientError> {
        options.validate()?;
        let pool = Self {
            inner: Arc::new(PoolInner {
                rpc,
                database,
                semaphore: Arc::new(Semaphore::new(options.max_sessions)),
                options,
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    total: 0,
                    closed: false,
                    created: 0,
                    deleted: 0,
                }),
            }),
        };

        let warmed = match pool.replenish().await {
            Ok(warmed) => warmed,
            Err(e) => {
                // Delete the sessions created before the failure.
                pool.close().await;
                return Err(e);
            }
        };
        tracing::info!(
            "session pool for {} ready: {} warm sessions (min={}, max={})",
            pool.inner.database,
            warmed,
            pool.inner.options.min_sessions,
            pool.inner.options.max_sessions
        );
        Ok(pool)
    }

    /// Check out a session, waiting for capacity if the pool is at its maximum.
    ///
    /// Reuses the most recently released idle session, or creates a new one.
    ///
    /// # Errors
    ///
    /// - `ClientError::PoolClosed` if the pool is closed before or while waiting
    /// - `ClientError::PoolExhausted` if no capacity frees up within `acquire_timeout`
    /// - The classified status if session creation fails
    pub async fn acquire(&self) -> Result<PooledSession, ClientError> {
        let timeout = self.inner.options.acquire_timeout;
        let permit =
            match tokio::time::timeout(timeout, Arc::clone(&self.inner.semaphore).acquire_owned())
                .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(ClientError::PoolClosed),
                Err(_) => {
                    return Err(ClientError::PoolExhausted {
                        max_sessions: self.inner.options.max_sessions,
                        waited: timeout,
                    });
                }
            };

        let checkout = {
            let mut state = self.inner.lock_state()?;
            if state.closed {
                return Err(ClientError::PoolClosed);
            }
            if let Some(session) = state.idle.pop() {
                Checkout::Idle(session)
            } else {
                state.total += 1;
                Checkout::Create(Reservation::new(&self.inner))
            }
        };

        let session = match checkout {
            Checkout::Idle(session) => session,
            Checkout::Create(reservation) => self.inner.create_reserved(reservation).await?,
        };

        tracing::debug!("checked out session {}", session.name());
        Ok(PooledSession {
            session,
            pool: Arc::clone(&self.inner),
            discarded: false,
            _permit: permit,
        })
    }

    /// Evict stale idle sessions and top the pool back up to `min_sessions`.
    ///
    /// Errors are logged, not returned; maintenance runs in the background.
    pub async fn maintain(&self) {
        let evicted = self.evict_idle();
        for session in &evicted {
            self.inner.delete(session.name()).await;
        }
        if !evicted.is_empty() {
            tracing::debug!("evicted {} idle sessions", evicted.len());
        }

        if let Err(e) = self.replenish().await {
            tracing::warn!("failed to replenish session pool: {e}");
        }
    }

    /// Remove idle sessions unused for longer than `idle_timeout`, keeping at
    /// least `min_sessions` live sessions.
    fn evict_idle(&self) -> Vec<Session> {
        let idle_timeout = self.inner.options.idle_timeout;
        if idle_timeout == Duration::ZERO {
            return Vec::new();
        }
        let Some(cutoff) = Instant::now().checked_sub(idle_timeout) else {
            return Vec::new();
        };

        let mut state = self.inner.lock_state_recover();
        if state.closed {
            return Vec::new();
        }
        let min = self.inner.options.min_sessions;
        let mut evicted = Vec::new();
        // Oldest first so the most recently used sessions survive.
        state.idle.sort_by_key(Session::last_used);
        let mut index = 0;
        while index < state.idle.len() {
            if state.total <= min {
                break;
            }
            if state.idle[index].last_used() < cutoff {
                evicted.push(state.idle.remove(index));
                state.total -= 1;
                state.deleted += 1;
            } else {
                index += 1;
            }
        }
        evicted
    }

    /// Create sessions until `min_sessions` are live. Returns how many were created.
    async fn replenish(&self) -> Result<usize, ClientError> {
        let mut created = 0;
        loop {
            // Hold a permit while creating so the size invariant covers this path too.
            let Ok(permit) = Arc::clone(&self.inner.semaphore).try_acquire_owned() else {
                return Ok(created);
            };
            let reservation = {
                let mut state = self.inner.lock_state()?;
                if state.closed || state.total >= self.inner.options.min_sessions {
                    return Ok(created);
                }
                state.total += 1;
                Reservation::new(&self.inner)
            };
            let mut session = self.inner.create_reserved(reservation).await?;
            session.touch();

            // The pool may have been closed while the session was being created.
            let orphan = {
                let mut state = self.inner.lock_state_recover();
                if state.closed {
                    state.total -= 1;
                    state.deleted += 1;
                    Some(session)
                } else {
                    state.idle.push(session);
                    None
                }
            };
            drop(permit);
            if let Some(session) = orphan {
                self.inner.delete(session.name()).await;
                return Ok(created);
            }
            created += 1;
        }
    }

    /// Close the pool.
    ///
    /// Wakes every waiting `acquire` with `PoolClosed` and deletes all idle
    /// sessions at the store. Sessions still checked out are deleted when
    /// their guards are dropped. Closing twice is a no-op.
    pub async fn close(&self) {
        let idle = {
            let mut state = self.inner.lock_state_recover();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            state.total -= idle.len();
            state.deleted += idle.len() as u64;
            idle
        };
        self.inner.semaphore.close();

        for session in &idle {
            self.inner.delete(session.name()).await;
        }
        tracing::info!(
            "session pool for {} closed, deleted {} idle sessions",
            self.inner.database,
            idle.len()
        );
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock_state_recover();
        PoolStats {
            idle: state.idle.len(),
            checked_out: state.total - state.idle.len(),
            total: state.total,
            created: state.created,
            deleted: state.deleted,
        }
    }

    #[must_use]
    pub fn options(&self) -> &SessionPoolOptions {
        &self.inner.options
    }

    #[must_use]
    pub fn database(&self) -> &DatabaseId {
        &self.inner.database
    }

    /// Run `maintain` every `maintenance_interval` in the background.
    ///
    /// The task holds only a weak reference and exits once the pool is
    /// dropped or closed.
    #[must_use]
    pub fn spawn_maintenance_task(&self) -> JoinHandle<()> {
        maintainer::spawn_maintenance_task(
            Arc::downgrade(&self.inner),
            self.inner.options.maintenance_interval,
        )
    }

    pub(crate) const fn from_inner(inner: Arc<PoolInner>) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("database", &self.inner.database)
            .field("stats", &self.stats())
            .finish()
    }
}
